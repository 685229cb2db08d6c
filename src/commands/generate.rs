//! Generate testdata command implementation.
//!
//! Generates synthetic test data JSON files for testing.

use chrono::Utc;
use herakles_proc_monitor::source::{TestData, TestProcess, TestThread};
use herakles_proc_monitor::ProcessType;
use rand::seq::SliceRandom;
use rand::Rng;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

const ORIGINS: [&str; 6] = [
    "https://www.example.org",
    "https://news.example.com",
    "https://mail.example.net",
    "https://video.example.tv",
    "https://docs.example.io",
    "https://shop.example.store",
];

const SPECIAL_TYPES: [&str; 5] = ["gpu", "extension", "socket", "rdd", "utility"];

const THREAD_NAMES: [&str; 8] = [
    "Renderer",
    "DOM Worker",
    "JS Watchdog",
    "Timer",
    "Socket Thread",
    "StyleThread#0",
    "ImgDecoder #1",
    "",
];

/// Generates synthetic test data JSON file for testing purposes.
pub fn command_generate_testdata(
    output: PathBuf,
    web_count: usize,
    others_count: usize,
    max_threads: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    debug!(
        "Generating test data: web_count={}, others_count={}, max_threads={}, output={}",
        web_count,
        others_count,
        max_threads,
        output.display()
    );

    let test_data = generate_test_data(&mut rand::thread_rng(), web_count, others_count, max_threads);

    // Write to file as pretty-printed JSON
    let json_content = serde_json::to_string_pretty(&test_data)?;
    fs::write(&output, &json_content)?;

    println!(
        "✅ Generated test data: {} processes in {}",
        test_data.processes.len(),
        output.display()
    );

    Ok(())
}

/// Builds a tree with one main process, `web_count` web content processes,
/// `others_count` special processes and one preallocated process.
pub fn generate_test_data(
    rng: &mut impl Rng,
    web_count: usize,
    others_count: usize,
    max_threads: usize,
) -> TestData {
    let mut processes: Vec<TestProcess> = Vec::with_capacity(web_count + others_count + 2);
    let mut current_pid: u32 = 1000;

    processes.push(generate_random_process(
        rng,
        current_pid,
        None,
        ProcessType::Browser,
        String::new(),
        max_threads,
    ));

    for i in 0..web_count {
        current_pid += 1;
        let process_type = if i % 2 == 0 {
            ProcessType::WebIsolated
        } else {
            ProcessType::Web
        };
        let origin = ORIGINS[i % ORIGINS.len()].to_string();
        processes.push(generate_random_process(
            rng,
            current_pid,
            Some(current_pid as u64),
            process_type,
            origin,
            max_threads,
        ));
    }

    for i in 0..others_count {
        current_pid += 1;
        let process_type = ProcessType::from(SPECIAL_TYPES[i % SPECIAL_TYPES.len()]);
        processes.push(generate_random_process(
            rng,
            current_pid,
            Some(current_pid as u64),
            process_type,
            String::new(),
            max_threads,
        ));
    }

    current_pid += 1;
    processes.push(generate_random_process(
        rng,
        current_pid,
        Some(current_pid as u64),
        ProcessType::Preallocated,
        String::new(),
        max_threads,
    ));

    TestData {
        version: "1.0".to_string(),
        generated_at: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        processes,
    }
}

/// Generates a random test process with realistic memory and CPU values.
fn generate_random_process(
    rng: &mut impl Rng,
    pid: u32,
    child_id: Option<u64>,
    process_type: ProcessType,
    origin: String,
    max_threads: usize,
) -> TestProcess {
    // RSS: 10 MB - 1 GB (in bytes)
    let resident_set_size = rng.gen_range(10 * 1024 * 1024..1024 * 1024 * 1024_u64);

    // Virtual: 2-8x RSS
    let virtual_memory_size = resident_set_size * rng.gen_range(2..8_u64);

    // Growth: -64 KB/s .. +256 KB/s
    let resident_growth: i64 = rng.gen_range(-64 * 1024..256 * 1024);

    // Per-thread user rates, summed for the process
    let thread_count = rng.gen_range(1..=max_threads.max(1));
    let threads: Vec<TestThread> = (0..thread_count)
        .map(|i| {
            let name = if i == 0 {
                "Main".to_string()
            } else {
                THREAD_NAMES.choose(rng).copied().unwrap_or_default().to_string()
            };
            TestThread {
                tid: if i == 0 { pid } else { pid * 100 + i as u32 },
                name,
                cpu_user: rng.gen_range(0..50_000_000_000),
                cpu_kernel: rng.gen_range(0..5_000_000_000),
                cpu_user_rate: rng.gen_range(0.0..0.25),
                cpu_kernel_rate: rng.gen_range(0.0..0.05),
            }
        })
        .collect();

    let sum = |f: fn(&TestThread) -> f64| threads.iter().map(f).sum::<f64>();
    let sum_u64 = |f: fn(&TestThread) -> u64| threads.iter().map(f).sum::<u64>();

    TestProcess {
        pid,
        child_id,
        filename: match process_type {
            ProcessType::Browser => "herakles".to_string(),
            _ => "herakles-child".to_string(),
        },
        process_type,
        origin,
        virtual_memory_size,
        resident_set_size,
        resident_growth,
        cpu_user: sum_u64(|t| t.cpu_user),
        cpu_kernel: sum_u64(|t| t.cpu_kernel),
        cpu_user_rate: sum(|t| t.cpu_user_rate),
        cpu_kernel_rate: sum(|t| t.cpu_kernel_rate),
        threads,
    }
}
