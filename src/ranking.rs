//! Ordering of process and thread deltas.
//!
//! With no column selected, processes are grouped by display rank, then
//! ordered by name, then by descending user CPU rate. A selected column has
//! its own comparator; selecting the same column again flips the direction.
//!
//! Ties that no comparator resolves keep whatever order the input had, and
//! the input comes from a hash map, so their relative order is unspecified.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::delta::{ProcessDelta, ThreadDelta};
use crate::error::MonitorError;

/// Sortable column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortKey {
    Pid,
    Type,
    Name,
    CpuTotal,
    Threads,
    MemoryResident,
}

impl SortKey {
    pub const ALL: [SortKey; 6] = [
        SortKey::Pid,
        SortKey::Type,
        SortKey::Name,
        SortKey::CpuTotal,
        SortKey::Threads,
        SortKey::MemoryResident,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::Pid => "pid",
            SortKey::Type => "type",
            SortKey::Name => "name",
            SortKey::CpuTotal => "cpu-total",
            SortKey::Threads => "threads",
            SortKey::MemoryResident => "memory-resident",
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SortKey::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| MonitorError::UnsupportedSortKey(s.to_string()))
    }
}

/// Selected column and direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SortState {
    pub column: Option<SortKey>,
    pub ascending: bool,
}

impl Default for SortState {
    fn default() -> Self {
        Self {
            column: None,
            ascending: true,
        }
    }
}

impl SortState {
    pub fn by(column: SortKey, ascending: bool) -> Self {
        Self {
            column: Some(column),
            ascending,
        }
    }

    /// Flips the direction for the current column, or switches to a new
    /// column in ascending direction.
    pub fn toggle_or_set(&mut self, key: SortKey) {
        if self.column == Some(key) {
            self.ascending = !self.ascending;
        } else {
            self.column = Some(key);
            self.ascending = true;
        }
    }

    pub fn is_default(&self) -> bool {
        self.column.is_none()
    }

    fn apply_direction(&self, order: Ordering) -> Ordering {
        if self.ascending {
            order
        } else {
            order.reverse()
        }
    }
}

/// Case-insensitive comparison that falls back to the exact text, so that
/// "apple" sorts before "Banana" and "a" before "A" is still deterministic.
pub fn locale_compare(a: &str, b: &str) -> Ordering {
    let folded = a
        .chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase));
    folded.then_with(|| a.cmp(b))
}

fn slope_or_zero(slope: Option<f64>) -> f64 {
    slope.unwrap_or(0.0)
}

fn compare_processes(a: &ProcessDelta, b: &ProcessDelta, column: Option<SortKey>) -> Ordering {
    match column {
        Some(SortKey::Pid) => b.pid.cmp(&a.pid),
        Some(SortKey::Type) => locale_compare(&a.origin, &b.origin)
            .then_with(|| locale_compare(a.process_type.as_str(), b.process_type.as_str())),
        Some(SortKey::Name) => locale_compare(a.name(), b.name()),
        Some(SortKey::CpuTotal) => b.total_cpu.cmp(&a.total_cpu),
        Some(SortKey::Threads) => b.threads.len().cmp(&a.threads.len()),
        Some(SortKey::MemoryResident) => b.total_resident_size.cmp(&a.total_resident_size),
        None => a
            .display_rank
            .cmp(&b.display_rank)
            .then_with(|| locale_compare(a.name(), b.name()))
            // Same-named processes are told apart by CPU use.
            .then_with(|| {
                slope_or_zero(b.slope_cpu_user).total_cmp(&slope_or_zero(a.slope_cpu_user))
            }),
    }
}

fn compare_threads(a: &ThreadDelta, b: &ThreadDelta, column: Option<SortKey>) -> Ordering {
    match column {
        Some(SortKey::Name) => locale_compare(&a.name, &b.name),
        // Equal totals stay unresolved.
        Some(SortKey::CpuTotal) => b.total_cpu.cmp(&a.total_cpu),
        Some(SortKey::Threads)
        | Some(SortKey::MemoryResident)
        | Some(SortKey::Type)
        | Some(SortKey::Pid)
        | None => b.tid.cmp(&a.tid),
    }
}

/// Sorts process deltas in place.
pub fn rank_processes(deltas: &mut [ProcessDelta], sort: SortState) {
    deltas.sort_by(|a, b| sort.apply_direction(compare_processes(a, b, sort.column)));
}

/// Sorts the threads of an expanded process in place.
pub fn rank_threads(threads: &mut [ThreadDelta], sort: SortState) {
    threads.sort_by(|a, b| sort.apply_direction(compare_threads(a, b, sort.column)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::ProcessType;

    fn delta(pid: u32, t: &str, filename: &str) -> ProcessDelta {
        let process_type = ProcessType::from(t);
        ProcessDelta {
            pid,
            child_id: Some(pid as u64),
            filename: filename.into(),
            display_rank: process_type.display_rank(),
            process_type,
            origin: String::new(),
            total_virtual_memory_size: 0,
            delta_virtual_memory_size: None,
            total_resident_size: 0,
            delta_resident_size: None,
            total_cpu_user: 0,
            slope_cpu_user: None,
            total_cpu_kernel: 0,
            slope_cpu_kernel: None,
            total_cpu: 0,
            slope_cpu: None,
            threads: vec![],
        }
    }

    fn thread(tid: u32, name: &str, total: u64) -> ThreadDelta {
        ThreadDelta {
            tid,
            name: name.into(),
            total_cpu_user: total,
            slope_cpu_user: None,
            total_cpu_kernel: 0,
            slope_cpu_kernel: None,
            total_cpu: total,
            slope_cpu: None,
        }
    }

    fn types(deltas: &[ProcessDelta]) -> Vec<&str> {
        deltas.iter().map(|d| d.process_type.as_str()).collect()
    }

    #[test]
    fn default_order_groups_by_rank() {
        let mut deltas = vec![
            delta(1, "preallocated", "x"),
            delta(2, "browser", "x"),
            delta(3, "web", "x"),
        ];
        rank_processes(&mut deltas, SortState::default());
        assert_eq!(types(&deltas), vec!["browser", "web", "preallocated"]);
    }

    #[test]
    fn default_order_puts_special_processes_between_web_and_preallocated() {
        let mut deltas = vec![
            delta(1, "preallocated", "x"),
            delta(2, "gpu", "x"),
            delta(3, "webIsolated", "x"),
            delta(4, "browser", "x"),
        ];
        rank_processes(&mut deltas, SortState::default());
        assert_eq!(
            types(&deltas),
            vec!["browser", "webIsolated", "gpu", "preallocated"]
        );
    }

    #[test]
    fn default_order_breaks_ties_by_name_then_user_cpu() {
        let mut a = delta(1, "web", "same");
        a.slope_cpu_user = Some(0.1);
        let mut b = delta(2, "web", "same");
        b.slope_cpu_user = Some(0.9);
        let c = delta(3, "web", "alpha");
        let mut d = delta(4, "web", "same");
        d.slope_cpu_user = None;

        let mut deltas = vec![a, b, c, d];
        rank_processes(&mut deltas, SortState::default());
        let pids: Vec<u32> = deltas.iter().map(|d| d.pid).collect();
        assert_eq!(pids, vec![3, 2, 1, 4]);
    }

    #[test]
    fn cpu_total_toggle_reverses_exactly() {
        let mut deltas: Vec<ProcessDelta> = (1..=6)
            .map(|pid| {
                let mut d = delta(pid, "web", "x");
                d.total_cpu = (pid as u64 * 37) % 11;
                d
            })
            .collect();
        let mut sort = SortState::default();
        sort.toggle_or_set(SortKey::CpuTotal);
        assert!(sort.ascending);
        rank_processes(&mut deltas, sort);
        let forward: Vec<u64> = deltas.iter().map(|d| d.total_cpu).collect();
        assert!(forward.windows(2).all(|w| w[0] >= w[1]));

        sort.toggle_or_set(SortKey::CpuTotal);
        assert!(!sort.ascending);
        rank_processes(&mut deltas, sort);
        let backward: Vec<u64> = deltas.iter().map(|d| d.total_cpu).collect();
        let mut reversed = forward.clone();
        reversed.reverse();
        assert_eq!(backward, reversed);

        let mut pids: Vec<u32> = deltas.iter().map(|d| d.pid).collect();
        pids.sort_unstable();
        assert_eq!(pids, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn selecting_new_column_resets_direction() {
        let mut sort = SortState::by(SortKey::Pid, false);
        sort.toggle_or_set(SortKey::Name);
        assert_eq!(sort, SortState::by(SortKey::Name, true));
    }

    #[test]
    fn explicit_columns() {
        let mut a = delta(10, "web", "beta");
        a.total_resident_size = 100;
        a.threads = vec![thread(1, "t", 0)];
        let mut b = delta(20, "gpu", "Alpha");
        b.total_resident_size = 300;
        let mut c = delta(15, "web", "gamma");
        c.total_resident_size = 200;
        c.threads = vec![thread(1, "t", 0), thread(2, "t", 0)];
        c.origin = "https://a.example".into();
        let deltas = vec![a, b, c];

        let pids = |key: SortKey| {
            let mut d = deltas.clone();
            rank_processes(&mut d, SortState::by(key, true));
            d.iter().map(|d| d.pid).collect::<Vec<u32>>()
        };

        assert_eq!(pids(SortKey::Pid), vec![20, 15, 10]);
        assert_eq!(pids(SortKey::MemoryResident), vec![20, 15, 10]);
        assert_eq!(pids(SortKey::Threads), vec![15, 10, 20]);
        // Origin wins over filename as the display name.
        assert_eq!(pids(SortKey::Name), vec![20, 10, 15]);
        // Empty origins sort first, then by type.
        assert_eq!(pids(SortKey::Type), vec![20, 10, 15]);
    }

    #[test]
    fn thread_ordering() {
        let base = vec![thread(3, "beta", 5), thread(9, "Alpha", 50), thread(5, "gamma", 5)];

        let mut t = base.clone();
        rank_threads(&mut t, SortState::default());
        assert_eq!(t.iter().map(|t| t.tid).collect::<Vec<_>>(), vec![9, 5, 3]);

        let mut t = base.clone();
        rank_threads(&mut t, SortState::by(SortKey::Name, true));
        assert_eq!(t.iter().map(|t| t.tid).collect::<Vec<_>>(), vec![9, 3, 5]);

        let mut t = base.clone();
        rank_threads(&mut t, SortState::by(SortKey::CpuTotal, true));
        assert_eq!(t[0].tid, 9);

        let mut t = base;
        rank_threads(&mut t, SortState::by(SortKey::MemoryResident, false));
        assert_eq!(t.iter().map(|t| t.tid).collect::<Vec<_>>(), vec![3, 5, 9]);
    }

    #[test]
    fn sort_key_parsing() {
        assert_eq!("cpu-total".parse::<SortKey>().unwrap(), SortKey::CpuTotal);
        for key in SortKey::ALL {
            assert_eq!(key.as_str().parse::<SortKey>().unwrap(), key);
        }
        assert_eq!(
            "column-bogus".parse::<SortKey>().unwrap_err(),
            MonitorError::UnsupportedSortKey("column-bogus".into())
        );
    }

    #[test]
    fn locale_compare_is_case_insensitive_first() {
        assert_eq!(locale_compare("apple", "Banana"), Ordering::Less);
        assert_eq!(locale_compare("a", "A"), "a".cmp("A"));
        assert_eq!(locale_compare("same", "same"), Ordering::Equal);
    }
}
