//! Refresh cycle orchestration.
//!
//! A [`RefreshScheduler`] owns the snapshot history together with the state
//! that only lives between display passes: which rows are expanded, which
//! children were reported hung, the sort selection and the time of the last
//! user interaction.
//!
//! One cycle is: update the history, skip the display when hidden, yield,
//! then run a display pass. A display pass is deferred while the user
//! interacted recently, unless forced. Each pass consumes the hung set and
//! rebuilds the expanded set from the processes that are still present.

use ahash::AHashSet as HashSet;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::delta::{compute_deltas, ProcessDelta, ThreadDelta};
use crate::error::{MonitorError, SourceError};
use crate::history::HistoryBuffer;
use crate::ranking::{rank_processes, rank_threads, SortKey, SortState};
use crate::source::SnapshotSource;

/// Timing and capacity settings of the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    pub sampling_interval: Duration,
    pub retention_window: Duration,
    pub refresh_interval: Duration,
    pub interaction_debounce: Duration,
    pub hang_queue_capacity: usize,
    pub default_sort: SortState,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sampling_interval: Duration::from_millis(1000),
            retention_window: Duration::from_millis(10_000),
            refresh_interval: Duration::from_millis(2000),
            interaction_debounce: Duration::from_millis(5000),
            hang_queue_capacity: 64,
            default_sort: SortState::default(),
        }
    }
}

/// One ranked process row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessRow {
    pub process: ProcessDelta,
    pub is_open: bool,
    pub is_hung: bool,
    /// Set on the last row of a display-rank group when the default order
    /// is active and the next row belongs to another group.
    pub separate_from_next_group: bool,
}

impl ProcessRow {
    /// Thread rows to show under this process, already sorted.
    pub fn visible_threads(&self) -> &[ThreadDelta] {
        if self.is_open {
            &self.process.threads
        } else {
            &[]
        }
    }
}

/// Output of one display pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayFrame {
    pub rows: Vec<ProcessRow>,
    pub sort: SortState,
}

impl DisplayFrame {
    pub fn hung_count(&self) -> usize {
        self.rows.iter().filter(|r| r.is_hung).count()
    }
}

/// What a full update cycle ended with.
#[derive(Debug)]
pub enum CycleOutcome {
    Displayed(DisplayFrame),
    /// Sampled, but the display is hidden.
    Hidden,
    /// Sampled, but the user interacted within the debounce window.
    Deferred,
    /// The source failed; the history was left untouched.
    SourceUnavailable(SourceError),
}

/// Sending half of the bounded hang-report feed.
#[derive(Debug, Clone)]
pub struct HangReporter {
    tx: mpsc::Sender<u64>,
}

impl HangReporter {
    /// Reports a hung child. Returns false when the queue is full or the
    /// scheduler is gone; the report is dropped in that case.
    pub fn report(&self, child_id: u64) -> bool {
        match self.tx.try_send(child_id) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("Hang queue full, dropping report for child {}", child_id);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

pub struct RefreshScheduler {
    history: HistoryBuffer,
    interaction_debounce: Duration,
    refresh_interval: Duration,
    sort: SortState,
    expanded: HashSet<u32>,
    hung: HashSet<u64>,
    hang_tx: mpsc::Sender<u64>,
    hang_rx: mpsc::Receiver<u64>,
    last_interaction: Option<Instant>,
    visible: bool,
}

impl RefreshScheduler {
    pub fn new(config: &MonitorConfig) -> Self {
        let (hang_tx, hang_rx) = mpsc::channel(config.hang_queue_capacity.max(1));
        Self {
            history: HistoryBuffer::new(config.sampling_interval, config.retention_window),
            interaction_debounce: config.interaction_debounce,
            refresh_interval: config.refresh_interval,
            sort: config.default_sort,
            expanded: HashSet::new(),
            hung: HashSet::new(),
            hang_tx,
            hang_rx,
            last_interaction: None,
            visible: true,
        }
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    pub fn sort(&self) -> SortState {
        self.sort
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_expanded(&self, pid: u32) -> bool {
        self.expanded.contains(&pid)
    }

    pub fn hang_reporter(&self) -> HangReporter {
        HangReporter {
            tx: self.hang_tx.clone(),
        }
    }

    /// Runs one full cycle against `source`.
    ///
    /// Source failures are recoverable and reported through the outcome;
    /// only engine contract violations are returned as errors.
    pub async fn update<S: SnapshotSource>(
        &mut self,
        source: &mut S,
    ) -> Result<CycleOutcome, MonitorError> {
        if let Err(e) = self.history.update(source).await {
            warn!("Snapshot capture failed, skipping cycle: {}", e);
            return Ok(CycleOutcome::SourceUnavailable(e));
        }

        if !self.visible {
            trace!("Display hidden, sampled only");
            return Ok(CycleOutcome::Hidden);
        }

        // Yield to other tasks (HTTP, stdin reader) before the display pass.
        tokio::task::yield_now().await;

        Ok(match self.display(false)? {
            Some(frame) => CycleOutcome::Displayed(frame),
            None => CycleOutcome::Deferred,
        })
    }

    fn interacted_recently(&self) -> bool {
        match self.last_interaction {
            Some(at) => Instant::now().duration_since(at) < self.interaction_debounce,
            None => false,
        }
    }

    fn drain_hang_reports(&mut self) {
        while let Ok(child_id) = self.hang_rx.try_recv() {
            self.hung.insert(child_id);
        }
    }

    /// Runs a display pass. Returns `None` when deferred by a recent
    /// interaction and `force` is not set.
    pub fn display(&mut self, force: bool) -> Result<Option<DisplayFrame>, MonitorError> {
        if !force && self.interacted_recently() {
            debug!("Recent interaction, deferring display");
            return Ok(None);
        }

        let mut deltas = compute_deltas(&self.history)?;
        rank_processes(&mut deltas, self.sort);

        self.drain_hang_reports();
        let open = std::mem::take(&mut self.expanded);
        let hung = std::mem::take(&mut self.hung);

        let mut rows: Vec<ProcessRow> = Vec::with_capacity(deltas.len());
        for mut process in deltas {
            let is_open = open.contains(&process.pid);
            // Child id 0 is never a real child.
            let is_hung = process
                .child_id
                .filter(|&id| id != 0)
                .map_or(false, |id| hung.contains(&id));
            if is_open {
                self.expanded.insert(process.pid);
                rank_threads(&mut process.threads, self.sort);
            }
            if self.sort.is_default() {
                if let Some(prev) = rows.last_mut() {
                    prev.separate_from_next_group =
                        prev.process.display_rank != process.display_rank;
                }
            }
            rows.push(ProcessRow {
                process,
                is_open,
                is_hung,
                separate_from_next_group: false,
            });
        }

        debug!(
            "Display pass: {} rows, {} expanded, {} hung",
            rows.len(),
            self.expanded.len(),
            rows.iter().filter(|r| r.is_hung).count()
        );

        Ok(Some(DisplayFrame {
            rows,
            sort: self.sort,
        }))
    }

    /// Expands or collapses a process row. Returns the new state.
    ///
    /// Expanding counts as an interaction, so the next timed pass is
    /// deferred.
    pub fn toggle_expanded(&mut self, pid: u32) -> bool {
        self.note_interaction();
        if self.expanded.remove(&pid) {
            false
        } else {
            self.expanded.insert(pid);
            true
        }
    }

    /// Selects a sort column and redisplays immediately.
    pub fn select_sort(&mut self, key: SortKey) -> Result<Option<DisplayFrame>, MonitorError> {
        self.sort.toggle_or_set(key);
        debug!(
            "Sort by {} {}",
            key,
            if self.sort.ascending { "ascending" } else { "descending" }
        );
        self.display(true)
    }

    pub fn note_interaction(&mut self) {
        self.last_interaction = Some(Instant::now());
    }

    /// Changes visibility. Becoming visible forces a display pass.
    pub fn set_visible(&mut self, visible: bool) -> Result<Option<DisplayFrame>, MonitorError> {
        let was_visible = self.visible;
        self.visible = visible;
        if visible && !was_visible {
            self.display(true)
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{ProcessSample, ProcessType, ThreadSample};
    use crate::source::ReplaySource;

    fn sample(pid: u32, t: &str, cpu_user: u64) -> ProcessSample {
        ProcessSample {
            pid,
            child_id: if t == "browser" { None } else { Some(pid as u64 * 10) },
            filename: format!("proc{}", pid),
            process_type: ProcessType::from(t),
            origin: String::new(),
            virtual_memory_size: 0,
            resident_set_size: 1024,
            cpu_user,
            cpu_kernel: 0,
            start_time: None,
            threads: vec![
                ThreadSample {
                    tid: pid,
                    name: "main".into(),
                    cpu_user,
                    cpu_kernel: 0,
                    start_time: None,
                },
                ThreadSample {
                    tid: pid + 1000,
                    name: "worker".into(),
                    cpu_user: 0,
                    cpu_kernel: 0,
                    start_time: None,
                },
            ],
        }
    }

    fn tree(cpu: u64) -> Vec<ProcessSample> {
        vec![
            sample(1, "browser", cpu),
            sample(2, "web", cpu),
            sample(3, "preallocated", cpu),
        ]
    }

    fn source(cycles: usize) -> ReplaySource {
        let mut source = ReplaySource::new();
        for i in 0..cycles as u64 {
            source.push(tree(i * 1_000_000));
        }
        source
    }

    fn pids(frame: &DisplayFrame) -> Vec<u32> {
        frame.rows.iter().map(|r| r.process.pid).collect()
    }

    fn displayed(outcome: CycleOutcome) -> DisplayFrame {
        match outcome {
            CycleOutcome::Displayed(frame) => frame,
            other => panic!("expected a frame, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_update_bootstraps_and_displays() {
        let mut scheduler = RefreshScheduler::new(&MonitorConfig::default());
        let mut source = source(2);

        let frame = displayed(scheduler.update(&mut source).await.unwrap());
        assert_eq!(scheduler.history().len(), 2);
        assert_eq!(pids(&frame), vec![1, 2, 3]);
        assert!(frame.rows.iter().all(|r| r.process.slope_cpu_user.is_some()));
    }

    #[tokio::test(start_paused = true)]
    async fn group_separators_only_in_default_order() {
        let mut scheduler = RefreshScheduler::new(&MonitorConfig::default());
        let mut source = source(2);
        let frame = displayed(scheduler.update(&mut source).await.unwrap());

        let separators: Vec<bool> = frame
            .rows
            .iter()
            .map(|r| r.separate_from_next_group)
            .collect();
        assert_eq!(separators, vec![true, true, false]);

        let frame = scheduler.select_sort(SortKey::Pid).unwrap().unwrap();
        assert_eq!(pids(&frame), vec![3, 2, 1]);
        assert!(frame.rows.iter().all(|r| !r.separate_from_next_group));
    }

    #[tokio::test(start_paused = true)]
    async fn hidden_display_still_samples() {
        let mut scheduler = RefreshScheduler::new(&MonitorConfig::default());
        let mut source = source(3);
        assert!(scheduler.set_visible(false).unwrap().is_none());

        let outcome = scheduler.update(&mut source).await.unwrap();
        assert!(matches!(outcome, CycleOutcome::Hidden));
        assert_eq!(scheduler.history().len(), 2);

        // Becoming visible again forces a pass.
        let frame = scheduler.set_visible(true).unwrap().unwrap();
        assert_eq!(frame.rows.len(), 3);
        assert!(scheduler.set_visible(true).unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn interaction_defers_unless_forced() {
        let mut scheduler = RefreshScheduler::new(&MonitorConfig::default());
        let mut source = source(4);
        scheduler.update(&mut source).await.unwrap();

        scheduler.note_interaction();
        tokio::time::advance(Duration::from_secs(2)).await;
        let outcome = scheduler.update(&mut source).await.unwrap();
        assert!(matches!(outcome, CycleOutcome::Deferred));
        assert_eq!(scheduler.history().len(), 3);

        assert!(scheduler.display(true).unwrap().is_some());

        tokio::time::advance(Duration::from_secs(3)).await;
        let outcome = scheduler.update(&mut source).await.unwrap();
        assert!(matches!(outcome, CycleOutcome::Displayed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn source_failure_skips_cycle() {
        let mut scheduler = RefreshScheduler::new(&MonitorConfig::default());
        let mut source = source(2);
        source.push_outage();
        scheduler.update(&mut source).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        let outcome = scheduler.update(&mut source).await.unwrap();
        assert!(matches!(
            outcome,
            CycleOutcome::SourceUnavailable(SourceError::Unavailable(_))
        ));
        assert_eq!(scheduler.history().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn expanded_rows_survive_only_while_present() {
        let mut scheduler = RefreshScheduler::new(&MonitorConfig::default());
        let mut source = ReplaySource::new();
        source.push(tree(0)).push(tree(1_000_000));
        source.push(vec![sample(1, "browser", 2_000_000)]);
        scheduler.update(&mut source).await.unwrap();

        assert!(scheduler.toggle_expanded(2));
        assert!(scheduler.toggle_expanded(3));
        assert!(!scheduler.toggle_expanded(3));

        let frame = scheduler.display(true).unwrap().unwrap();
        let open: Vec<bool> = frame.rows.iter().map(|r| r.is_open).collect();
        assert_eq!(open, vec![false, true, false]);
        // Default order sorts threads by descending tid.
        let tids: Vec<u32> = frame.rows[1].visible_threads().iter().map(|t| t.tid).collect();
        assert_eq!(tids, vec![1002, 2]);
        assert!(frame.rows[0].visible_threads().is_empty());

        // pid 2 exits; its expanded state is dropped.
        tokio::time::advance(Duration::from_secs(5)).await;
        let frame = scheduler.update(&mut source).await.unwrap();
        let frame = displayed(frame);
        assert_eq!(pids(&frame), vec![1]);
        assert!(!scheduler.is_expanded(2));
    }

    #[tokio::test(start_paused = true)]
    async fn hang_reports_are_consumed_by_one_pass() {
        let mut scheduler = RefreshScheduler::new(&MonitorConfig::default());
        let mut source = source(2);
        scheduler.update(&mut source).await.unwrap();

        let reporter = scheduler.hang_reporter();
        assert!(reporter.report(20));
        // The main process has no child id and can never be flagged.
        assert!(reporter.report(0));

        let frame = scheduler.display(true).unwrap().unwrap();
        let hung: Vec<u32> = frame
            .rows
            .iter()
            .filter(|r| r.is_hung)
            .map(|r| r.process.pid)
            .collect();
        assert_eq!(hung, vec![2]);
        assert_eq!(frame.hung_count(), 1);

        let frame = scheduler.display(true).unwrap().unwrap();
        assert_eq!(frame.hung_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn child_id_zero_is_never_flagged() {
        let mut scheduler = RefreshScheduler::new(&MonitorConfig::default());
        let zero = || ProcessSample {
            child_id: Some(0),
            ..sample(4, "web", 0)
        };
        let mut source = ReplaySource::new();
        source.push(vec![zero()]).push(vec![zero()]);
        scheduler.update(&mut source).await.unwrap();

        assert!(scheduler.hang_reporter().report(0));
        let frame = scheduler.display(true).unwrap().unwrap();
        assert_eq!(frame.rows[0].process.child_id, Some(0));
        assert_eq!(frame.hung_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn deferred_pass_keeps_hang_reports() {
        let mut scheduler = RefreshScheduler::new(&MonitorConfig::default());
        let mut source = source(2);
        scheduler.update(&mut source).await.unwrap();

        scheduler.hang_reporter().report(30);
        scheduler.note_interaction();
        assert!(scheduler.display(false).unwrap().is_none());

        let frame = scheduler.display(true).unwrap().unwrap();
        assert_eq!(frame.hung_count(), 1);
    }

    #[test]
    fn hang_queue_is_bounded() {
        let config = MonitorConfig {
            hang_queue_capacity: 2,
            ..MonitorConfig::default()
        };
        let scheduler = RefreshScheduler::new(&config);
        let reporter = scheduler.hang_reporter();
        assert!(reporter.report(1));
        assert!(reporter.report(2));
        assert!(!reporter.report(3));
    }

    #[tokio::test(start_paused = true)]
    async fn sort_direction_toggles_on_reselect() {
        let mut scheduler = RefreshScheduler::new(&MonitorConfig::default());
        let mut source = source(2);
        scheduler.update(&mut source).await.unwrap();

        let frame = scheduler.select_sort(SortKey::Pid).unwrap().unwrap();
        assert_eq!(pids(&frame), vec![3, 2, 1]);
        let frame = scheduler.select_sort(SortKey::Pid).unwrap().unwrap();
        assert_eq!(pids(&frame), vec![1, 2, 3]);
        assert!(!frame.sort.ascending);
    }
}
