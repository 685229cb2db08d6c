//! Synthetic snapshot source backed by a JSON test data file.
//!
//! Each process and thread carries base counters plus per-second rates. A
//! capture advances the counters by the time elapsed since the source was
//! created, so slopes computed from successive captures match the rates.

use ahash::AHashSet as HashSet;
use serde::{Deserialize, Serialize};
use std::fs;
use std::future::Future;
use std::path::Path;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::SourceError;
use crate::snapshot::{ProcessSample, ProcessType, Snapshot, ThreadSample};

use super::SnapshotSource;

const NS_PER_S: f64 = 1_000_000_000.0;

/// Test thread entry for JSON serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestThread {
    pub tid: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub cpu_user: u64,
    #[serde(default)]
    pub cpu_kernel: u64,
    /// User CPU rate in cores (1.0 = one saturated core).
    #[serde(default)]
    pub cpu_user_rate: f64,
    #[serde(default)]
    pub cpu_kernel_rate: f64,
}

/// Test process entry for JSON serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestProcess {
    pub pid: u32,
    #[serde(default)]
    pub child_id: Option<u64>,
    pub filename: String,
    #[serde(rename = "type")]
    pub process_type: ProcessType,
    #[serde(default)]
    pub origin: String,
    pub virtual_memory_size: u64,
    pub resident_set_size: u64,
    /// Resident memory growth in bytes per second, may be negative.
    #[serde(default)]
    pub resident_growth: i64,
    #[serde(default)]
    pub cpu_user: u64,
    #[serde(default)]
    pub cpu_kernel: u64,
    #[serde(default)]
    pub cpu_user_rate: f64,
    #[serde(default)]
    pub cpu_kernel_rate: f64,
    #[serde(default)]
    pub threads: Vec<TestThread>,
}

/// Root structure for test data JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestData {
    pub version: String,
    pub generated_at: String,
    pub processes: Vec<TestProcess>,
}

impl TestData {
    /// Rejects data that could never come from a real host.
    pub fn validate(&self) -> Result<(), SourceError> {
        let mut pids = HashSet::new();
        for p in &self.processes {
            if !pids.insert(p.pid) {
                return Err(SourceError::TestData(format!("duplicate pid {}", p.pid)));
            }
            let rates = [p.cpu_user_rate, p.cpu_kernel_rate]
                .into_iter()
                .chain(p.threads.iter().flat_map(|t| [t.cpu_user_rate, t.cpu_kernel_rate]));
            for rate in rates {
                if !rate.is_finite() || rate < 0.0 {
                    return Err(SourceError::TestData(format!(
                        "invalid CPU rate {} for pid {}",
                        rate, p.pid
                    )));
                }
            }
            let mut tids = HashSet::new();
            for t in &p.threads {
                if !tids.insert(t.tid) {
                    return Err(SourceError::TestData(format!(
                        "duplicate tid {} in pid {}",
                        t.tid, p.pid
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Load test data from JSON file.
pub fn load_test_data_from_file(path: &Path) -> Result<TestData, SourceError> {
    debug!("Loading test data from: {}", path.display());

    let content =
        fs::read_to_string(path).map_err(|e| SourceError::io(path.display().to_string(), e))?;
    let test_data: TestData = serde_json::from_str(&content)
        .map_err(|e| SourceError::TestData(format!("failed to parse JSON: {}", e)))?;
    test_data.validate()?;

    info!(
        "Loaded test data version {} from {} ({} processes)",
        test_data.version,
        test_data.generated_at,
        test_data.processes.len()
    );

    Ok(test_data)
}

fn advance(base: u64, rate: f64, elapsed_s: f64) -> u64 {
    base.saturating_add((rate * elapsed_s * NS_PER_S) as u64)
}

fn thread_at(t: &TestThread, elapsed_s: f64) -> ThreadSample {
    ThreadSample {
        tid: t.tid,
        name: t.name.clone(),
        cpu_user: advance(t.cpu_user, t.cpu_user_rate, elapsed_s),
        cpu_kernel: advance(t.cpu_kernel, t.cpu_kernel_rate, elapsed_s),
        start_time: None,
    }
}

fn process_at(p: &TestProcess, elapsed_s: f64) -> ProcessSample {
    let growth = (p.resident_growth as f64 * elapsed_s) as i64;
    let resident = (p.resident_set_size as i64).saturating_add(growth).max(0) as u64;
    ProcessSample {
        pid: p.pid,
        child_id: p.child_id,
        filename: p.filename.clone(),
        process_type: p.process_type.clone(),
        origin: p.origin.clone(),
        virtual_memory_size: p.virtual_memory_size,
        resident_set_size: resident,
        cpu_user: advance(p.cpu_user, p.cpu_user_rate, elapsed_s),
        cpu_kernel: advance(p.cpu_kernel, p.cpu_kernel_rate, elapsed_s),
        start_time: None,
        threads: p.threads.iter().map(|t| thread_at(t, elapsed_s)).collect(),
    }
}

/// Snapshot source replaying synthetic counters.
#[derive(Debug, Clone)]
pub struct TestDataSource {
    data: TestData,
    started: Instant,
}

impl TestDataSource {
    pub fn new(data: TestData) -> Self {
        Self {
            data,
            started: Instant::now(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, SourceError> {
        Ok(Self::new(load_test_data_from_file(path)?))
    }

    pub fn data(&self) -> &TestData {
        &self.data
    }
}

impl SnapshotSource for TestDataSource {
    fn capture(&mut self) -> impl Future<Output = Result<Snapshot, SourceError>> + Send {
        let now = Instant::now();
        let elapsed_s = now.duration_since(self.started).as_secs_f64();
        let processes: Vec<ProcessSample> = self
            .data
            .processes
            .iter()
            .map(|p| process_at(p, elapsed_s))
            .collect();
        async move { Ok(Snapshot::new(now, processes)) }
    }
}
