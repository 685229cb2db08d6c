//! Published frame cache.
//!
//! The refresh loop stores the latest display frame here after every cycle so
//! that HTTP handlers never touch the scheduler itself.

use herakles_proc_monitor::DisplayFrame;
use std::time::Instant;

/// Latest frame with update timing information.
#[derive(Clone, Default)]
pub struct FrameCache {
    pub frame: Option<DisplayFrame>,
    pub last_updated: Option<Instant>,
    pub update_duration_seconds: f64,
    /// Whether the last cycle could read the process tree.
    pub update_success: bool,
}

impl FrameCache {
    /// Stores a new frame from a successful display pass.
    pub fn publish(&mut self, frame: DisplayFrame, duration_seconds: f64) {
        self.frame = Some(frame);
        self.last_updated = Some(Instant::now());
        self.update_duration_seconds = duration_seconds;
        self.update_success = true;
    }

    /// Records a cycle that sampled without producing a frame.
    pub fn record_cycle(&mut self, success: bool, duration_seconds: f64) {
        self.update_duration_seconds = duration_seconds;
        self.update_success = success;
        if success {
            self.last_updated = Some(Instant::now());
        }
    }

    pub fn process_count(&self) -> usize {
        self.frame.as_ref().map_or(0, |f| f.rows.len())
    }
}
