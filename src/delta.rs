//! Rate computation between two observations of the same process.
//!
//! Slopes are expressed in cores: a CPU counter that grew by one second of
//! CPU time over one second of wall time yields 1.0. A process or thread seen
//! for the first time has no slopes.

use ahash::AHashMap as HashMap;
use serde::Serialize;
use tracing::trace;

use crate::error::MonitorError;
use crate::history::HistoryBuffer;
use crate::snapshot::{same_incarnation, ProcessType, ThreadSample, TimedSample};

/// Rates and totals of one thread.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadDelta {
    pub tid: u32,
    pub name: String,
    /// Total user CPU in ns.
    pub total_cpu_user: u64,
    pub slope_cpu_user: Option<f64>,
    /// Total kernel CPU in ns.
    pub total_cpu_kernel: u64,
    pub slope_cpu_kernel: Option<f64>,
    /// Total user + kernel CPU in ns.
    pub total_cpu: u64,
    pub slope_cpu: Option<f64>,
}

/// Rates and totals of one process and its threads.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessDelta {
    pub pid: u32,
    pub child_id: Option<u64>,
    pub filename: String,
    #[serde(rename = "type")]
    pub process_type: ProcessType,
    pub origin: String,
    pub total_virtual_memory_size: u64,
    pub delta_virtual_memory_size: Option<i64>,
    pub total_resident_size: u64,
    pub delta_resident_size: Option<i64>,
    pub total_cpu_user: u64,
    pub slope_cpu_user: Option<f64>,
    pub total_cpu_kernel: u64,
    pub slope_cpu_kernel: Option<f64>,
    pub total_cpu: u64,
    pub slope_cpu: Option<f64>,
    pub threads: Vec<ThreadDelta>,
    pub display_rank: u8,
}

impl ProcessDelta {
    /// Name used for display and name ordering: the origin when known,
    /// otherwise the filename.
    pub fn name(&self) -> &str {
        if self.origin.is_empty() {
            &self.filename
        } else {
            &self.origin
        }
    }
}

fn counter_delta(cur: u64, prev: u64) -> i64 {
    (cur as i128 - prev as i128).clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

fn slope(cur: u64, prev: u64, delta_t_ns: f64) -> f64 {
    counter_delta(cur, prev) as f64 / delta_t_ns
}

/// Computes a thread delta. `prev` and `delta_t_ns` come together: without a
/// previous observation there are no slopes.
pub fn thread_delta(
    cur: &ThreadSample,
    prev: Option<(&ThreadSample, f64)>,
) -> Result<ThreadDelta, MonitorError> {
    let name = if cur.name.is_empty() {
        "???".to_string()
    } else {
        cur.name.clone()
    };

    let mut result = ThreadDelta {
        tid: cur.tid,
        name,
        total_cpu_user: cur.cpu_user,
        slope_cpu_user: None,
        total_cpu_kernel: cur.cpu_kernel,
        slope_cpu_kernel: None,
        total_cpu: cur.cpu_user.saturating_add(cur.cpu_kernel),
        slope_cpu: None,
    };

    let (prev, delta_t_ns) = match prev {
        Some(p) => p,
        None => return Ok(result),
    };
    if prev.tid != cur.tid {
        return Err(MonitorError::ThreadIdentity {
            expected: prev.tid,
            found: cur.tid,
        });
    }

    let user = slope(cur.cpu_user, prev.cpu_user, delta_t_ns);
    let kernel = slope(cur.cpu_kernel, prev.cpu_kernel, delta_t_ns);
    result.slope_cpu_user = Some(user);
    result.slope_cpu_kernel = Some(kernel);
    result.slope_cpu = Some(user + kernel);
    Ok(result)
}

/// Computes the delta of `cur` against the oldest retained observation.
///
/// Fails when `prev` describes a different pid. A `prev` with a different
/// start time belonged to an earlier process with the same pid and is
/// ignored; the same holds for threads. Threads only present in `prev` have
/// exited and are dropped.
pub fn process_delta(
    cur: TimedSample<'_>,
    prev: Option<TimedSample<'_>>,
) -> Result<ProcessDelta, MonitorError> {
    let c = cur.sample;
    let mut result = ProcessDelta {
        pid: c.pid,
        child_id: c.child_id,
        filename: c.filename.clone(),
        process_type: c.process_type.clone(),
        origin: c.origin.clone(),
        total_virtual_memory_size: c.virtual_memory_size,
        delta_virtual_memory_size: None,
        total_resident_size: c.resident_set_size,
        delta_resident_size: None,
        total_cpu_user: c.cpu_user,
        slope_cpu_user: None,
        total_cpu_kernel: c.cpu_kernel,
        slope_cpu_kernel: None,
        total_cpu: c.cpu_user.saturating_add(c.cpu_kernel),
        slope_cpu: None,
        threads: Vec::new(),
        display_rank: c.process_type.display_rank(),
    };

    let prev = match prev {
        Some(p) => p,
        None => {
            result.threads = c
                .threads
                .iter()
                .map(|t| thread_delta(t, None))
                .collect::<Result<_, _>>()?;
            return Ok(result);
        }
    };

    let p = prev.sample;
    if p.pid != c.pid {
        return Err(MonitorError::ProcessIdentity {
            expected: p.pid,
            found: c.pid,
        });
    }
    if !same_incarnation(p.start_time, c.start_time) {
        trace!("pid {}: reused by a new process, treating as first observation", c.pid);
        return process_delta(cur, None);
    }

    let delta_t_ns = cur.timestamp.saturating_duration_since(prev.timestamp).as_nanos() as f64;
    if delta_t_ns <= 0.0 {
        trace!("pid {}: zero time base, treating as first observation", c.pid);
        return process_delta(cur, None);
    }

    let prev_threads: HashMap<u32, &ThreadSample> = p.threads.iter().map(|t| (t.tid, t)).collect();
    result.threads = c
        .threads
        .iter()
        .map(|t| {
            let prev = prev_threads
                .get(&t.tid)
                .filter(|pt| same_incarnation(pt.start_time, t.start_time));
            thread_delta(t, prev.map(|pt| (*pt, delta_t_ns)))
        })
        .collect::<Result<_, _>>()?;

    result.delta_virtual_memory_size =
        Some(counter_delta(c.virtual_memory_size, p.virtual_memory_size));
    result.delta_resident_size = Some(counter_delta(c.resident_set_size, p.resident_set_size));

    let user = slope(c.cpu_user, p.cpu_user, delta_t_ns);
    let kernel = slope(c.cpu_kernel, p.cpu_kernel, delta_t_ns);
    result.slope_cpu_user = Some(user);
    result.slope_cpu_kernel = Some(kernel);
    result.slope_cpu = Some(user + kernel);
    Ok(result)
}

/// Deltas for every process of the latest snapshot.
///
/// Each process is compared with its oldest retained observation. An empty
/// history yields no deltas.
pub fn compute_deltas(history: &HistoryBuffer) -> Result<Vec<ProcessDelta>, MonitorError> {
    let latest = match history.latest() {
        Some(l) => l,
        None => return Ok(Vec::new()),
    };

    latest
        .processes
        .values()
        .map(|cur| {
            let cur = TimedSample::new(cur, latest.timestamp);
            process_delta(cur, history.oldest_available(cur.sample.pid))
        })
        .collect()
}
