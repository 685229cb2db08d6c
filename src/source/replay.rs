use std::collections::VecDeque;
use std::future::Future;

use tokio::time::Instant;

use crate::error::SourceError;
use crate::snapshot::{ProcessSample, Snapshot};

use super::SnapshotSource;

/// Source that hands out prepared process lists in order.
///
/// Each capture is stamped with the current (tokio) time. A `None` entry
/// simulates a source outage for that capture; an exhausted queue is also
/// reported as unavailable.
#[derive(Debug, Default)]
pub struct ReplaySource {
    frames: VecDeque<Option<Vec<ProcessSample>>>,
    captures: usize,
}

impl ReplaySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, processes: Vec<ProcessSample>) -> &mut Self {
        self.frames.push_back(Some(processes));
        self
    }

    pub fn push_outage(&mut self) -> &mut Self {
        self.frames.push_back(None);
        self
    }

    /// Number of capture attempts so far, including failed ones.
    pub fn captures(&self) -> usize {
        self.captures
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl SnapshotSource for ReplaySource {
    fn capture(&mut self) -> impl Future<Output = Result<Snapshot, SourceError>> + Send {
        self.captures += 1;
        let next = self.frames.pop_front();
        async move {
            match next {
                Some(Some(processes)) => Ok(Snapshot::new(Instant::now(), processes)),
                Some(None) => Err(SourceError::Unavailable("simulated outage".into())),
                None => Err(SourceError::Unavailable("replay exhausted".into())),
            }
        }
    }
}
