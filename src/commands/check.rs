//! Check command implementation.
//!
//! Validates configuration and that the configured process tree can be read.

use herakles_proc_monitor::source::procfs::{scan_tree, HostClock};
use herakles_proc_monitor::source::testdata::load_test_data_from_file;
use herakles_proc_monitor::source::types::TYPE_RULES;
use std::path::{Path, PathBuf};

use crate::config::{validate_effective_config, Config, DEFAULT_PROC_ROOT, DEFAULT_ROOT_PID};

/// Validates system requirements and configuration
pub fn command_check(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Herakles Process Monitor - System Check");
    println!("==========================================");

    let mut all_ok = true;

    println!("\n⚙️  Checking configuration...");
    match validate_effective_config(config) {
        Ok(_) => println!("   ✅ Configuration is valid"),
        Err(e) => {
            println!("   ❌ Configuration invalid: {}", e);
            all_ok = false;
        }
    }

    if let Some(path) = &config.test_data_file {
        println!("\n🧪 Checking test data...");
        match load_test_data_from_file(path) {
            Ok(data) => println!(
                "   ✅ {} processes in {}",
                data.processes.len(),
                path.display()
            ),
            Err(e) => {
                println!("   ❌ {}", e);
                all_ok = false;
            }
        }
    } else {
        let proc_root = config
            .proc_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PROC_ROOT));
        let root_pid = config.root_pid.unwrap_or(DEFAULT_ROOT_PID);
        all_ok &= check_proc(&proc_root, root_pid);
    }

    println!("\n📊 Checking process type rules...");
    if TYPE_RULES.is_empty() {
        println!("   ⚠️  No process type rules loaded");
    } else {
        println!("   ✅ {} rules loaded", TYPE_RULES.len());
    }

    println!("\n📋 Summary:");
    if all_ok {
        println!("   ✅ All checks passed - system is ready");
        Ok(())
    } else {
        println!("   ❌ Some checks failed - please review warnings");
        std::process::exit(1);
    }
}

fn check_proc(proc_root: &Path, root_pid: u32) -> bool {
    println!("\n📁 Checking {} filesystem...", proc_root.display());
    if !proc_root.exists() {
        println!("   ❌ {} not found", proc_root.display());
        return false;
    }
    println!("   ✅ {} accessible", proc_root.display());

    let clock = HostClock::detect();
    println!(
        "   ✅ {} clock ticks/s, page size {} bytes",
        clock.ticks_per_second, clock.page_size
    );

    match scan_tree(proc_root, root_pid, clock, &TYPE_RULES) {
        Ok(processes) => {
            let threads: usize = processes.iter().map(|p| p.threads.len()).sum();
            println!(
                "   ✅ Root pid {}: {} processes, {} threads",
                root_pid,
                processes.len(),
                threads
            );
            true
        }
        Err(e) => {
            println!("   ❌ Cannot read tree of pid {}: {}", root_pid, e);
            false
        }
    }
}
