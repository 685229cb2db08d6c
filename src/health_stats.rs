//! Running statistics about refresh cycles, rendered by `/health`.

use std::fmt::Write as FmtWrite;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

#[derive(Clone, Copy, Default)]
struct RunningStat {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    last: f64,
}

impl RunningStat {
    fn add(&mut self, value: f64) {
        if self.count == 0 {
            *self = RunningStat {
                count: 1,
                sum: value,
                min: value,
                max: value,
                last: value,
            };
            return;
        }
        self.count += 1;
        self.sum += value;
        self.last = value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / (self.count as f64)
        }
    }
}

#[derive(Default)]
struct Stat {
    inner: Mutex<RunningStat>,
}

impl Stat {
    fn add_sample(&self, value: f64) {
        if let Ok(mut s) = self.inner.lock() {
            s.add(value);
        }
    }

    /// (current, average, max, min, count)
    fn snapshot(&self) -> (f64, f64, f64, f64, u64) {
        if let Ok(s) = self.inner.lock() {
            (s.last, s.avg(), s.max, s.min, s.count)
        } else {
            (0.0, 0.0, 0.0, 0.0, 0)
        }
    }
}

pub struct HealthStats {
    displayed_processes: Stat,
    cycle_duration_seconds: Stat,
    history_samples: Stat,
    total_cycles: AtomicU64,
    failed_cycles: AtomicU64,
    deferred_cycles: AtomicU64,
    started: Instant,
}

impl Default for HealthStats {
    fn default() -> Self {
        Self {
            displayed_processes: Stat::default(),
            cycle_duration_seconds: Stat::default(),
            history_samples: Stat::default(),
            total_cycles: AtomicU64::new(0),
            failed_cycles: AtomicU64::new(0),
            deferred_cycles: AtomicU64::new(0),
            started: Instant::now(),
        }
    }
}

impl HealthStats {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn record_cycle(&self, processes: usize, cycle_duration_seconds: f64, history_len: usize) {
        self.displayed_processes.add_sample(processes as f64);
        self.cycle_duration_seconds
            .add_sample(cycle_duration_seconds);
        self.history_samples.add_sample(history_len as f64);
        self.total_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.total_cycles.fetch_add(1, Ordering::Relaxed);
        self.failed_cycles.fetch_add(1, Ordering::Relaxed);
    }

    /// A cycle that sampled but did not display (hidden or deferred).
    pub fn record_deferred(&self, cycle_duration_seconds: f64, history_len: usize) {
        self.cycle_duration_seconds
            .add_sample(cycle_duration_seconds);
        self.history_samples.add_sample(history_len as f64);
        self.total_cycles.fetch_add(1, Ordering::Relaxed);
        self.deferred_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_cycles(&self) -> u64 {
        self.total_cycles.load(Ordering::Relaxed)
    }

    pub fn failed_cycles(&self) -> u64 {
        self.failed_cycles.load(Ordering::Relaxed)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    pub fn render_table(&self) -> String {
        let (dp_cur, dp_avg, dp_max, dp_min, _dp_count) = self.displayed_processes.snapshot();
        let (cd_cur, cd_avg, cd_max, cd_min, _cd_count) = self.cycle_duration_seconds.snapshot();
        let (hs_cur, hs_avg, hs_max, hs_min, _hs_count) = self.history_samples.snapshot();

        let left_col = 26usize;
        let col_w = 12usize;

        let mut out = String::new();

        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "metric",
            "current",
            "average",
            "max",
            "min",
            left = left_col,
            col = col_w
        )
        .ok();

        writeln!(out, "{}", "-".repeat(left_col + 3 + (col_w + 3) * 4)).ok();

        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "displayed processes",
            format!("{:.0}", dp_cur),
            format!("{:.1}", dp_avg),
            format!("{:.0}", dp_max),
            format!("{:.0}", dp_min),
            left = left_col,
            col = col_w
        )
        .ok();

        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "cycle duration (s)",
            format!("{:.3}", cd_cur),
            format!("{:.3}", cd_avg),
            format!("{:.3}", cd_max),
            format!("{:.3}", cd_min),
            left = left_col,
            col = col_w
        )
        .ok();

        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "history samples",
            format!("{:.0}", hs_cur),
            format!("{:.1}", hs_avg),
            format!("{:.0}", hs_max),
            format!("{:.0}", hs_min),
            left = left_col,
            col = col_w
        )
        .ok();

        writeln!(out).ok();
        writeln!(out, "number of cycles: {}", self.total_cycles()).ok();
        writeln!(out, "failed cycles: {}", self.failed_cycles()).ok();
        writeln!(
            out,
            "deferred cycles: {}",
            self.deferred_cycles.load(Ordering::Relaxed)
        )
        .ok();
        writeln!(out, "uptime (s): {}", self.uptime_seconds()).ok();

        out
    }
}
