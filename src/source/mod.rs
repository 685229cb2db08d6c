//! Snapshot sources.
//!
//! The engine consumes snapshots through the [`SnapshotSource`] trait and
//! never looks at where they come from. This module provides:
//! - [`ProcfsSource`]: Linux `/proc` reader for a process tree
//! - [`TestDataSource`]: synthetic counters from a JSON test data file
//! - [`ReplaySource`]: a fixed queue of process lists, mostly for tests

pub mod procfs;
pub mod replay;
pub mod testdata;
pub mod types;

use std::future::Future;

use crate::error::SourceError;
use crate::snapshot::Snapshot;

pub use procfs::ProcfsSource;
pub use replay::ReplaySource;
pub use testdata::{TestData, TestDataSource, TestProcess, TestThread};
pub use types::{TypeRule, TypeRules};

/// Producer of full point-in-time snapshots.
///
/// `capture` is the only suspending step of an update cycle. A failure means
/// the process tree could not be read this time; callers retry on the next
/// tick.
pub trait SnapshotSource {
    fn capture(&mut self) -> impl Future<Output = Result<Snapshot, SourceError>> + Send;
}
