//! Linux `/proc` snapshot source.
//!
//! Captures the process tree rooted at a configurable pid: the root itself is
//! reported as the main (`browser`) process and every descendant is
//! classified with [`TypeRules`]. Per-process files are read in parallel with
//! rayon on a blocking task.

use ahash::AHashMap as HashMap;
use rayon::prelude::*;
use std::collections::VecDeque;
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::SourceError;
use crate::snapshot::{ProcessSample, ProcessType, Snapshot, ThreadSample};

use super::types::{TypeRules, TYPE_RULES};
use super::SnapshotSource;

const NS_PER_S: u64 = 1_000_000_000;
const DEFAULT_TICKS_PER_SECOND: u64 = 100;
const DEFAULT_PAGE_SIZE: u64 = 4096;

/// Kernel constants needed to turn `/proc` values into ns and bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostClock {
    pub ticks_per_second: u64,
    pub page_size: u64,
}

impl HostClock {
    /// Reads `_SC_CLK_TCK` and `_SC_PAGESIZE`, falling back to common values.
    pub fn detect() -> Self {
        // SAFETY: sysconf has no preconditions and only reads configuration.
        let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
        // SAFETY: as above.
        let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        Self {
            ticks_per_second: if ticks > 0 {
                ticks as u64
            } else {
                DEFAULT_TICKS_PER_SECOND
            },
            page_size: if page > 0 {
                page as u64
            } else {
                DEFAULT_PAGE_SIZE
            },
        }
    }

    fn ticks_to_ns(&self, ticks: u64) -> u64 {
        ticks.saturating_mul(NS_PER_S) / self.ticks_per_second.max(1)
    }
}

impl Default for HostClock {
    fn default() -> Self {
        Self {
            ticks_per_second: DEFAULT_TICKS_PER_SECOND,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Fields of `/proc/<pid>/stat` used by the monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatFields {
    pub comm: String,
    pub ppid: u32,
    pub utime: u64,
    pub stime: u64,
    /// Clock ticks after boot at which the process started.
    pub start_time: u64,
    pub vsize: u64,
    pub rss_pages: u64,
}

/// Parses the content of a `stat` file.
///
/// The comm field may contain spaces and parentheses, so the remaining fields
/// are split after the last `)`.
pub fn parse_stat(content: &str) -> Result<StatFields, SourceError> {
    let open = content
        .find('(')
        .ok_or_else(|| SourceError::parse("stat", "missing '('"))?;
    let close = content
        .rfind(')')
        .ok_or_else(|| SourceError::parse("stat", "missing ')'"))?;
    if close < open {
        return Err(SourceError::parse("stat", "malformed comm field"));
    }
    let comm = content[open + 1..close].to_string();

    // Index 0 is the state field (field 3 in proc(5)).
    let rest: Vec<&str> = content[close + 1..].split_whitespace().collect();
    if rest.len() < 22 {
        return Err(SourceError::parse(
            "stat",
            format!("expected at least 22 fields after comm, got {}", rest.len()),
        ));
    }

    let field = |idx: usize, name: &str| -> Result<u64, SourceError> {
        rest[idx]
            .parse::<u64>()
            .map_err(|e| SourceError::parse(format!("stat {}", name), e.to_string()))
    };

    Ok(StatFields {
        comm,
        ppid: field(1, "ppid")? as u32,
        utime: field(11, "utime")?,
        stime: field(12, "stime")?,
        start_time: field(19, "starttime")?,
        vsize: field(20, "vsize")?,
        rss_pages: field(21, "rss")?,
    })
}

/// Scans the process tree rooted at `root_pid`.
pub fn scan_tree(
    proc_root: &Path,
    root_pid: u32,
    clock: HostClock,
    rules: &TypeRules,
) -> Result<Vec<ProcessSample>, SourceError> {
    let pids = list_pids(proc_root)?;
    debug!("Found {} pid entries under {}", pids.len(), proc_root.display());

    let parsed: Vec<(u32, StatFields)> = pids
        .par_iter()
        .filter_map(|&pid| {
            let path = proc_root.join(pid.to_string()).join("stat");
            let content = fs::read_to_string(&path).ok()?;
            match parse_stat(&content) {
                Ok(stat) => Some((pid, stat)),
                Err(e) => {
                    trace!("Skipping pid {}: {}", pid, e);
                    None
                }
            }
        })
        .collect();
    let stats: HashMap<u32, StatFields> = parsed.into_iter().collect();

    if !stats.contains_key(&root_pid) {
        return Err(SourceError::RootNotFound(root_pid));
    }

    let tree = descendants(root_pid, &stats);

    let processes: Vec<ProcessSample> = tree
        .par_iter()
        .filter_map(|&pid| {
            let stat = stats.get(&pid)?;
            let is_root = pid == root_pid;
            read_process(proc_root, pid, stat, is_root, clock, rules)
        })
        .collect();

    if processes.is_empty() {
        return Err(SourceError::Unavailable(format!(
            "no readable processes under root pid {}",
            root_pid
        )));
    }

    Ok(processes)
}

/// Numeric directory names under the proc root.
fn list_pids(proc_root: &Path) -> Result<Vec<u32>, SourceError> {
    let entries = fs::read_dir(proc_root)
        .map_err(|e| SourceError::io(proc_root.display().to_string(), e))?;
    Ok(entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name();
            let name = name.to_str()?;
            if !name.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            name.parse().ok()
        })
        .collect())
}

/// Root pid followed by all its descendants, breadth first.
fn descendants(root_pid: u32, stats: &HashMap<u32, StatFields>) -> Vec<u32> {
    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    for (&pid, stat) in stats.iter() {
        if pid != root_pid {
            children.entry(stat.ppid).or_default().push(pid);
        }
    }

    let mut out = Vec::new();
    let mut queue = VecDeque::from([root_pid]);
    while let Some(pid) = queue.pop_front() {
        out.push(pid);
        if let Some(kids) = children.get(&pid) {
            queue.extend(kids.iter().copied());
        }
    }
    out
}

fn read_cmdline(proc_path: &Path) -> Vec<String> {
    match fs::read(proc_path.join("cmdline")) {
        Ok(content) => content
            .split(|&b| b == 0u8)
            .filter(|s| !s.is_empty())
            .map(|s| String::from_utf8_lossy(s).into_owned())
            .collect(),
        Err(_) => Vec::new(),
    }
}

fn read_threads(proc_path: &Path, clock: HostClock) -> Option<Vec<ThreadSample>> {
    let task_dir = proc_path.join("task");
    let entries = fs::read_dir(&task_dir).ok()?;

    let mut threads: Vec<ThreadSample> = entries
        .flatten()
        .filter_map(|entry| {
            let tid: u32 = entry.file_name().to_str()?.parse().ok()?;
            let content = fs::read_to_string(entry.path().join("stat")).ok()?;
            let stat = parse_stat(&content).ok()?;
            Some(ThreadSample {
                tid,
                name: stat.comm,
                cpu_user: clock.ticks_to_ns(stat.utime),
                cpu_kernel: clock.ticks_to_ns(stat.stime),
                start_time: Some(stat.start_time),
            })
        })
        .collect();
    threads.sort_by_key(|t| t.tid);
    Some(threads)
}

fn read_process(
    proc_root: &Path,
    pid: u32,
    stat: &StatFields,
    is_root: bool,
    clock: HostClock,
    rules: &TypeRules,
) -> Option<ProcessSample> {
    let proc_path = proc_root.join(pid.to_string());

    // A process that exited between the listing and now has no task dir.
    let threads = match read_threads(&proc_path, clock) {
        Some(t) => t,
        None => {
            debug!("Skipping pid {}: task directory unavailable", pid);
            return None;
        }
    };

    let process_type = if is_root {
        ProcessType::Browser
    } else {
        rules.classify(&stat.comm, &read_cmdline(&proc_path))
    };

    Some(ProcessSample {
        pid,
        child_id: if is_root { None } else { Some(pid as u64) },
        filename: stat.comm.clone(),
        process_type,
        origin: String::new(),
        virtual_memory_size: stat.vsize,
        resident_set_size: stat.rss_pages.saturating_mul(clock.page_size),
        cpu_user: clock.ticks_to_ns(stat.utime),
        cpu_kernel: clock.ticks_to_ns(stat.stime),
        start_time: Some(stat.start_time),
        threads,
    })
}

/// Snapshot source backed by `/proc`.
#[derive(Debug, Clone)]
pub struct ProcfsSource {
    proc_root: PathBuf,
    root_pid: u32,
    clock: HostClock,
    rules: Arc<TypeRules>,
}

impl ProcfsSource {
    pub fn new(proc_root: impl Into<PathBuf>, root_pid: u32) -> Self {
        Self {
            proc_root: proc_root.into(),
            root_pid,
            clock: HostClock::detect(),
            rules: Arc::new(TYPE_RULES.clone()),
        }
    }

    pub fn with_clock(mut self, clock: HostClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_rules(mut self, rules: TypeRules) -> Self {
        self.rules = Arc::new(rules);
        self
    }

    pub fn root_pid(&self) -> u32 {
        self.root_pid
    }

    pub fn proc_root(&self) -> &Path {
        &self.proc_root
    }
}

impl SnapshotSource for ProcfsSource {
    fn capture(&mut self) -> impl Future<Output = Result<Snapshot, SourceError>> + Send {
        let proc_root = self.proc_root.clone();
        let root_pid = self.root_pid;
        let clock = self.clock;
        let rules = Arc::clone(&self.rules);
        async move {
            let timestamp = Instant::now();
            let processes =
                tokio::task::spawn_blocking(move || scan_tree(&proc_root, root_pid, clock, &rules))
                    .await
                    .map_err(|e| SourceError::Task(e.to_string()))??;
            debug!("Captured {} processes under root pid {}", processes.len(), root_pid);
            Ok(Snapshot::new(timestamp, processes))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn stat_line(pid: u32, comm: &str, ppid: u32, utime: u64, stime: u64, vsize: u64, rss: u64) -> String {
        format!(
            "{pid} ({comm}) S {ppid} 1 1 0 -1 4194560 100 0 0 0 {utime} {stime} 0 0 20 0 1 0 12345 {vsize} {rss} 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0\n"
        )
    }

    fn write_process(root: &Path, pid: u32, comm: &str, ppid: u32, cmdline: &[&str], threads: &[(u32, &str, u64, u64)]) {
        let dir = root.join(pid.to_string());
        fs::create_dir_all(dir.join("task")).unwrap();
        fs::write(dir.join("stat"), stat_line(pid, comm, ppid, 300, 100, 8192, 10)).unwrap();
        fs::write(dir.join("cmdline"), cmdline.join("\0")).unwrap();
        for (tid, name, ut, st) in threads {
            let tdir = dir.join("task").join(tid.to_string());
            fs::create_dir_all(&tdir).unwrap();
            fs::write(tdir.join("stat"), stat_line(*tid, name, ppid, *ut, *st, 0, 0)).unwrap();
        }
    }

    #[test]
    fn parse_stat_handles_spaces_and_parens_in_comm() {
        let line = stat_line(99, "Web (Content) x", 1, 250, 50, 4096, 3);
        let stat = parse_stat(&line).unwrap();
        assert_eq!(stat.comm, "Web (Content) x");
        assert_eq!(stat.ppid, 1);
        assert_eq!(stat.utime, 250);
        assert_eq!(stat.stime, 50);
        assert_eq!(stat.start_time, 12345);
        assert_eq!(stat.vsize, 4096);
        assert_eq!(stat.rss_pages, 3);
    }

    #[test]
    fn parse_stat_rejects_truncated_content() {
        assert!(parse_stat("12 (bash) S 1 2 3").is_err());
        assert!(parse_stat("garbage").is_err());
    }

    #[test]
    fn scan_tree_collects_root_and_descendants_only() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write_process(root, 100, "firefox", 1, &["firefox"], &[(100, "firefox", 200, 100)]);
        write_process(root, 101, "Web Content", 100, &["firefox", "-contentproc", "tab"], &[(101, "Web Content", 100, 0), (105, "DOM Worker", 50, 50)]);
        write_process(root, 102, "GPU Process", 101, &["firefox"], &[(102, "GPU Process", 10, 0)]);
        write_process(root, 200, "unrelated", 1, &["unrelated"], &[(200, "unrelated", 1, 1)]);
        fs::create_dir_all(root.join("self")).unwrap();

        let rules = TypeRules::from_toml_str(include_str!("../../data/process_types.toml")).unwrap();
        let clock = HostClock { ticks_per_second: 100, page_size: 4096 };
        let mut samples = scan_tree(root, 100, clock, &rules).unwrap();
        samples.sort_by_key(|s| s.pid);

        let pids: Vec<u32> = samples.iter().map(|s| s.pid).collect();
        assert_eq!(pids, vec![100, 101, 102]);

        let main = &samples[0];
        assert_eq!(main.process_type, ProcessType::Browser);
        assert_eq!(main.child_id, None);
        assert_eq!(main.cpu_user, 3 * NS_PER_S);
        assert_eq!(main.cpu_kernel, NS_PER_S);
        assert_eq!(main.resident_set_size, 10 * 4096);

        let content = &samples[1];
        assert_eq!(content.process_type, ProcessType::Web);
        assert_eq!(content.child_id, Some(101));
        assert_eq!(content.threads.len(), 2);
        assert_eq!(content.threads[1].name, "DOM Worker");
        assert_eq!(content.threads[1].cpu_user, NS_PER_S / 2);

        assert_eq!(samples[2].process_type, ProcessType::Other("gpu".into()));
    }

    #[test]
    fn scan_tree_reports_missing_root() {
        let tmp = TempDir::new().unwrap();
        write_process(tmp.path(), 5, "init", 0, &["init"], &[(5, "init", 1, 1)]);
        let err = scan_tree(tmp.path(), 77, HostClock::default(), &TypeRules::default()).unwrap_err();
        assert!(matches!(err, SourceError::RootNotFound(77)));
    }

    #[tokio::test]
    async fn capture_stamps_snapshot() {
        let tmp = TempDir::new().unwrap();
        write_process(tmp.path(), 10, "main", 1, &["main"], &[(10, "main", 1, 1)]);
        let mut source = ProcfsSource::new(tmp.path(), 10)
            .with_clock(HostClock::default())
            .with_rules(TypeRules::default());
        let before = Instant::now();
        let snap = source.capture().await.unwrap();
        assert!(snap.timestamp >= before);
        assert_eq!(snap.len(), 1);
    }
}
