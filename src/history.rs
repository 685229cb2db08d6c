//! Time-windowed snapshot history.
//!
//! The buffer keeps snapshots in ascending timestamp order. New samples are
//! only pulled once the sampling interval has elapsed, and entries older than
//! the retention window (relative to the newest entry) are evicted on update.
//! Reads never evict.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, trace, warn};

use crate::error::SourceError;
use crate::snapshot::{same_incarnation, Snapshot, TimedSample};
use crate::source::SnapshotSource;

/// Ordered, time-aged sequence of snapshots.
#[derive(Debug)]
pub struct HistoryBuffer {
    samples: VecDeque<Snapshot>,
    sampling_interval: Duration,
    retention_window: Duration,
}

impl HistoryBuffer {
    pub fn new(sampling_interval: Duration, retention_window: Duration) -> Self {
        Self {
            samples: VecDeque::new(),
            sampling_interval,
            retention_window,
        }
    }

    pub fn sampling_interval(&self) -> Duration {
        self.sampling_interval
    }

    pub fn retention_window(&self) -> Duration {
        self.retention_window
    }

    /// Delay after the first sample, slightly longer than one interval so the
    /// next update is guaranteed to sample again.
    pub fn bootstrap_delay(&self) -> Duration {
        self.sampling_interval + self.sampling_interval / 10
    }

    /// Pulls a new snapshot if one is due and evicts expired entries.
    ///
    /// Returns whether a snapshot was appended. A source failure leaves the
    /// buffer as it was before the failing capture.
    pub async fn update<S: SnapshotSource>(&mut self, source: &mut S) -> Result<bool, SourceError> {
        let mut sampled = false;

        if self.samples.is_empty() {
            let snapshot = source.capture().await?;
            debug!(
                "Bootstrap sample with {} processes, waiting {:?}",
                snapshot.len(),
                self.bootstrap_delay()
            );
            self.push(snapshot);
            sampled = true;
            sleep(self.bootstrap_delay()).await;
        }

        let due = match self.samples.back() {
            Some(last) => Instant::now().duration_since(last.timestamp) >= self.sampling_interval,
            None => true,
        };

        if due {
            let snapshot = source.capture().await?;
            trace!("Sampled {} processes", snapshot.len());
            sampled |= self.push(snapshot);
        }

        Ok(sampled)
    }

    /// Appends a snapshot and evicts expired entries.
    ///
    /// A snapshot older than the newest retained one is dropped.
    pub fn push(&mut self, snapshot: Snapshot) -> bool {
        if let Some(last) = self.samples.back() {
            if snapshot.timestamp < last.timestamp {
                warn!("Dropping out-of-order snapshot");
                return false;
            }
        }
        self.samples.push_back(snapshot);
        self.evict_expired();
        true
    }

    fn evict_expired(&mut self) {
        let latest = match self.samples.back() {
            Some(s) => s.timestamp,
            None => return,
        };
        while let Some(oldest) = self.samples.front() {
            if oldest.timestamp + self.retention_window < latest {
                self.samples.pop_front();
                trace!("Evicted expired snapshot, {} retained", self.samples.len());
            } else {
                break;
            }
        }
    }

    /// The most recently captured snapshot.
    pub fn latest(&self) -> Option<&Snapshot> {
        self.samples.back()
    }

    /// The oldest retained observation of `pid`, excluding the newest sample.
    ///
    /// `None` means the process is brand new. Comparing against the oldest
    /// observation gives the longest time base for rates. Observations of an
    /// earlier process that held the same pid are skipped.
    pub fn oldest_available(&self, pid: u32) -> Option<TimedSample<'_>> {
        let before_latest = self.samples.len().saturating_sub(1);
        let current_start = self.latest().and_then(|l| l.get(pid)).and_then(|s| s.start_time);
        self.samples
            .iter()
            .take(before_latest)
            .filter_map(|snap| snap.get(pid).map(|s| TimedSample::new(s, snap.timestamp)))
            .find(|prev| same_incarnation(prev.sample.start_time, current_start))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Capture times of all retained snapshots, oldest first.
    pub fn timestamps(&self) -> impl Iterator<Item = Instant> + '_ {
        self.samples.iter().map(|s| s.timestamp)
    }
}
