//! Point-in-time process and thread samples.
//!
//! A [`Snapshot`] is produced by a [`crate::source::SnapshotSource`] in one
//! capture and is never mutated afterwards. Raw CPU counters are cumulative
//! nanoseconds; memory sizes are bytes.

use ahash::AHashMap as HashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::Instant;

/// Kind of process, as reported by the snapshot source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProcessType {
    /// The main process of the monitored tree.
    Browser,
    Web,
    WebIsolated,
    WebLargeAllocation,
    WithCoopCoep,
    Preallocated,
    /// Any other process kind, carrying the raw type string.
    Other(String),
}

impl ProcessType {
    pub fn as_str(&self) -> &str {
        match self {
            ProcessType::Browser => "browser",
            ProcessType::Web => "web",
            ProcessType::WebIsolated => "webIsolated",
            ProcessType::WebLargeAllocation => "webLargeAllocation",
            ProcessType::WithCoopCoep => "withCoopCoep",
            ProcessType::Preallocated => "preallocated",
            ProcessType::Other(raw) => raw,
        }
    }

    /// Coarse group used by the default ordering.
    ///
    /// The main process comes first (0), then web content (1), then every
    /// other special process (2), and preallocated processes last (3).
    pub fn display_rank(&self) -> u8 {
        match self {
            ProcessType::Browser => 0,
            ProcessType::Web
            | ProcessType::WebIsolated
            | ProcessType::WebLargeAllocation
            | ProcessType::WithCoopCoep => 1,
            ProcessType::Preallocated => 3,
            ProcessType::Other(_) => 2,
        }
    }
}

impl From<String> for ProcessType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "browser" => ProcessType::Browser,
            "web" => ProcessType::Web,
            "webIsolated" => ProcessType::WebIsolated,
            "webLargeAllocation" => ProcessType::WebLargeAllocation,
            "withCoopCoep" => ProcessType::WithCoopCoep,
            "preallocated" => ProcessType::Preallocated,
            _ => ProcessType::Other(raw),
        }
    }
}

impl From<&str> for ProcessType {
    fn from(raw: &str) -> Self {
        ProcessType::from(raw.to_string())
    }
}

impl From<ProcessType> for String {
    fn from(t: ProcessType) -> Self {
        match t {
            ProcessType::Other(raw) => raw,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for ProcessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw counters of a single thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadSample {
    pub tid: u32,
    #[serde(default)]
    pub name: String,
    pub cpu_user: u64,
    pub cpu_kernel: u64,
    /// Start time in clock ticks since boot, when the source knows it.
    #[serde(default)]
    pub start_time: Option<u64>,
}

/// Raw counters of a single process and its threads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSample {
    pub pid: u32,
    /// Host-assigned child identifier; `None` for the main process.
    #[serde(default)]
    pub child_id: Option<u64>,
    pub filename: String,
    #[serde(rename = "type")]
    pub process_type: ProcessType,
    #[serde(default)]
    pub origin: String,
    pub virtual_memory_size: u64,
    pub resident_set_size: u64,
    pub cpu_user: u64,
    pub cpu_kernel: u64,
    /// Start time in clock ticks since boot. Two samples with the same pid
    /// but different start times belong to different processes.
    #[serde(default)]
    pub start_time: Option<u64>,
    #[serde(default)]
    pub threads: Vec<ThreadSample>,
}

/// Whether two observations with the same id describe the same incarnation.
/// Unknown start times never disqualify a match.
pub(crate) fn same_incarnation(a: Option<u64>, b: Option<u64>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

/// A full point-in-time capture of the monitored process tree.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub timestamp: Instant,
    pub processes: HashMap<u32, ProcessSample>,
}

impl Snapshot {
    pub fn new(timestamp: Instant, processes: impl IntoIterator<Item = ProcessSample>) -> Self {
        Self {
            timestamp,
            processes: processes.into_iter().map(|p| (p.pid, p)).collect(),
        }
    }

    pub fn get(&self, pid: u32) -> Option<&ProcessSample> {
        self.processes.get(&pid)
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }
}

/// A process sample paired with the capture time of its snapshot.
#[derive(Debug, Clone, Copy)]
pub struct TimedSample<'a> {
    pub sample: &'a ProcessSample,
    pub timestamp: Instant,
}

impl<'a> TimedSample<'a> {
    pub fn new(sample: &'a ProcessSample, timestamp: Instant) -> Self {
        Self { sample, timestamp }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_type_round_trips_known_and_unknown_names() {
        assert_eq!(ProcessType::from("webIsolated"), ProcessType::WebIsolated);
        assert_eq!(
            ProcessType::from("gpu"),
            ProcessType::Other("gpu".to_string())
        );
        assert_eq!(String::from(ProcessType::Preallocated), "preallocated");
        assert_eq!(ProcessType::Other("rdd".into()).to_string(), "rdd");
    }

    #[test]
    fn display_rank_groups() {
        assert_eq!(ProcessType::Browser.display_rank(), 0);
        assert_eq!(ProcessType::WithCoopCoep.display_rank(), 1);
        assert_eq!(ProcessType::from("socket").display_rank(), 2);
        assert_eq!(ProcessType::Preallocated.display_rank(), 3);
    }

    #[test]
    fn process_sample_deserializes_with_defaults() {
        let json = r#"{
            "pid": 42,
            "filename": "content",
            "type": "web",
            "virtual_memory_size": 4096,
            "resident_set_size": 1024,
            "cpu_user": 10,
            "cpu_kernel": 5
        }"#;
        let sample: ProcessSample = serde_json::from_str(json).unwrap();
        assert_eq!(sample.pid, 42);
        assert_eq!(sample.child_id, None);
        assert_eq!(sample.process_type, ProcessType::Web);
        assert!(sample.origin.is_empty());
        assert!(sample.threads.is_empty());
    }

    #[test]
    fn snapshot_indexes_by_pid() {
        let sample = ProcessSample {
            pid: 7,
            child_id: Some(3),
            filename: "x".into(),
            process_type: ProcessType::Web,
            origin: String::new(),
            virtual_memory_size: 0,
            resident_set_size: 0,
            cpu_user: 0,
            cpu_kernel: 0,
            start_time: None,
            threads: vec![],
        };
        let snap = Snapshot::new(Instant::now(), vec![sample]);
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.get(7).map(|p| p.child_id), Some(Some(3)));
        assert!(snap.get(8).is_none());
    }
}
