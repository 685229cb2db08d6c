//! Per-process and per-thread activity monitoring.
//!
//! The engine samples a process tree through a [`SnapshotSource`], keeps a
//! short time-windowed [`HistoryBuffer`], turns it into per-process rates
//! ([`delta`]), orders them ([`ranking`]) and drives the whole cycle from a
//! [`RefreshScheduler`]. The [`format`] module turns raw numbers into the
//! strings shown to users.

pub mod delta;
pub mod error;
pub mod format;
pub mod history;
pub mod ranking;
pub mod scheduler;
pub mod snapshot;
pub mod source;

pub use delta::{compute_deltas, ProcessDelta, ThreadDelta};
pub use error::{MonitorError, SourceError};
pub use history::HistoryBuffer;
pub use ranking::{SortKey, SortState};
pub use scheduler::{
    CycleOutcome, DisplayFrame, HangReporter, MonitorConfig, ProcessRow, RefreshScheduler,
};
pub use snapshot::{ProcessSample, ProcessType, Snapshot, ThreadSample};
pub use source::SnapshotSource;
