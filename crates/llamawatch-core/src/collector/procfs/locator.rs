//! Locates the inference server process and samples its resource usage.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info, trace, warn};

use crate::collector::procfs::parser::{
    ProcStat, parse_cmdline, parse_proc_stat, parse_proc_status,
};
use crate::collector::traits::FileSystem;
use crate::config::DuplicatePolicy;

/// Clock ticks per second (USER_HZ). Standard value for Linux.
const CLK_TCK: u64 = 100;

/// Page size used when `VmRSS` is missing and `stat.rss` (pages) is the only source.
const PAGE_SIZE: u64 = 4096;

/// Identity of a located server process.
///
/// A PID alone is not an identity: the kernel reuses PIDs after a process is
/// reaped. The start time pins the handle to one process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: u32,
    /// Start time in clock ticks since boot (`/proc/[pid]/stat` field 22).
    pub start_ticks: u64,
}

/// Resource usage of the server process at one point in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UsageSample {
    /// CPU usage since the previous sample, in percent of one core
    /// (a multi-threaded server can exceed 100).
    pub cpu_percent: f64,
    /// Resident set size in bytes.
    pub rss_bytes: u64,
}

/// Error type for sampling failures. All variants are recoverable: the
/// handle is dropped and the process is located again on the next cycle.
#[derive(Debug)]
pub enum ProcessError {
    /// Process exited, or its PID now belongs to another process.
    ProcessGone(u32),
    /// The process files are not readable by this user.
    AccessDenied(u32),
    /// Parse error in process files.
    Parse(String),
}

impl std::fmt::Display for ProcessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessError::ProcessGone(pid) => write!(f, "process {} disappeared", pid),
            ProcessError::AccessDenied(pid) => write!(f, "access to process {} denied", pid),
            ProcessError::Parse(msg) => write!(f, "parse error: {}", msg),
        }
    }
}

impl std::error::Error for ProcessError {}

/// Outcome of one locate-and-sample step.
#[derive(Debug)]
pub enum ProcessObservation {
    /// The server process was sampled.
    Sampled {
        handle: ProcessHandle,
        usage: UsageSample,
        /// The handle was acquired this cycle and differs from the last
        /// process sampled, i.e. the server restarted.
        restarted: bool,
    },
    /// No process matches the signature (not started yet, or restarting).
    NotFound,
    /// The cached or freshly located process could not be sampled; the
    /// handle has been dropped.
    Lost { pid: u32, error: ProcessError },
}

struct CpuBaseline {
    handle: ProcessHandle,
    ticks: u64,
    at: Instant,
}

/// Finds the server process by command-line signature and samples it.
///
/// Owns the process handle; callers only ever see copies for the duration
/// of one cycle.
pub struct ProcessLocator<F: FileSystem> {
    fs: F,
    proc_path: String,
    signature: String,
    duplicate_policy: DuplicatePolicy,
    self_pid: u32,
    cached: Option<ProcessHandle>,
    baseline: Option<CpuBaseline>,
    last_identity: Option<ProcessHandle>,
}

impl<F: FileSystem> ProcessLocator<F> {
    /// Creates a new locator.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `proc_path` - Base path to proc filesystem (usually "/proc")
    /// * `signature` - Substring identifying the server in its command line
    pub fn new(fs: F, proc_path: impl Into<String>, signature: impl Into<String>) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
            signature: signature.into(),
            duplicate_policy: DuplicatePolicy::default(),
            self_pid: std::process::id(),
            cached: None,
            baseline: None,
            last_identity: None,
        }
    }

    /// Sets how duplicate server processes are reported.
    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    /// Returns a mutable reference to the underlying filesystem.
    pub fn fs_mut(&mut self) -> &mut F {
        &mut self.fs
    }

    /// Returns the currently cached handle, if any.
    pub fn cached(&self) -> Option<ProcessHandle> {
        self.cached
    }

    /// Drops the cached handle and CPU baseline.
    pub fn invalidate(&mut self) {
        self.cached = None;
        self.baseline = None;
    }

    fn pid_path(&self, pid: u32, file: &str) -> PathBuf {
        PathBuf::from(format!("{}/{}/{}", self.proc_path, pid, file))
    }

    fn read_pid_file(&self, pid: u32, file: &str) -> Result<String, ProcessError> {
        self.fs
            .read_to_string(&self.pid_path(pid, file))
            .map_err(|e| match e.kind() {
                io::ErrorKind::PermissionDenied => ProcessError::AccessDenied(pid),
                _ => ProcessError::ProcessGone(pid),
            })
    }

    fn read_stat(&self, pid: u32) -> Result<ProcStat, ProcessError> {
        let content = self.read_pid_file(pid, "stat")?;
        parse_proc_stat(&content).map_err(|e| ProcessError::Parse(e.message))
    }

    /// Scans the process table for the server.
    ///
    /// Returns the matching process with the lowest PID. Entries that vanish
    /// or cannot be read mid-scan count as non-matching.
    pub fn locate(&self) -> Option<ProcessHandle> {
        let entries = match self.fs.read_dir(Path::new(&self.proc_path)) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %self.proc_path, error = %e, "cannot list process table");
                return None;
            }
        };

        let mut matches: Vec<ProcessHandle> = entries
            .iter()
            .filter_map(|entry| entry.file_name()?.to_str()?.parse::<u32>().ok())
            .filter(|pid| *pid != self.self_pid)
            .filter_map(|pid| self.match_pid(pid))
            .collect();
        matches.sort_by_key(|h| h.pid);

        let chosen = *matches.first()?;
        if matches.len() > 1 && self.duplicate_policy == DuplicatePolicy::Warn {
            let pids: Vec<u32> = matches.iter().map(|h| h.pid).collect();
            warn!(
                ?pids,
                chosen = chosen.pid,
                signature = %self.signature,
                "multiple server processes match, using lowest pid"
            );
        }
        Some(chosen)
    }

    fn match_pid(&self, pid: u32) -> Option<ProcessHandle> {
        let cmdline = match self.read_pid_file(pid, "cmdline") {
            Ok(cmdline) => cmdline,
            Err(e) => {
                trace!(pid, error = %e, "skipping unreadable process");
                return None;
            }
        };
        if !parse_cmdline(&cmdline)
            .iter()
            .any(|arg| arg.contains(self.signature.as_str()))
        {
            return None;
        }

        let stat = self.read_stat(pid).ok()?;
        if is_dead_state(stat.state) {
            return None;
        }
        Some(ProcessHandle {
            pid,
            start_ticks: stat.starttime,
        })
    }

    /// Returns `true` while the handle still refers to a running process.
    pub fn is_alive(&self, handle: &ProcessHandle) -> bool {
        let pid_dir = PathBuf::from(format!("{}/{}", self.proc_path, handle.pid));
        if !self.fs.exists(&pid_dir) {
            return false;
        }
        self.read_stat(handle.pid)
            .is_ok_and(|stat| stat.starttime == handle.start_ticks && !is_dead_state(stat.state))
    }

    /// Samples CPU and resident memory of `handle`.
    pub fn sample(&mut self, handle: &ProcessHandle) -> Result<UsageSample, ProcessError> {
        self.sample_at(handle, Instant::now())
    }

    /// Samples `handle` as of `now`.
    ///
    /// CPU percent is the delta of `utime + stime` against the previous
    /// sample of the same handle; the first sample after acquisition is 0.
    pub fn sample_at(
        &mut self,
        handle: &ProcessHandle,
        now: Instant,
    ) -> Result<UsageSample, ProcessError> {
        let pid = handle.pid;
        let stat = self.read_stat(pid)?;
        if stat.starttime != handle.start_ticks || is_dead_state(stat.state) {
            return Err(ProcessError::ProcessGone(pid));
        }

        let status = self.read_pid_file(pid, "status")?;
        let rss_bytes = match parse_proc_status(&status).ok().and_then(|s| s.vm_rss) {
            Some(kb) => kb * 1024,
            None => stat.rss.max(0) as u64 * PAGE_SIZE,
        };

        let ticks = stat.utime + stat.stime;
        let cpu_percent = match &self.baseline {
            Some(prev) if prev.handle == *handle => {
                let elapsed = now.saturating_duration_since(prev.at).as_secs_f64();
                if elapsed > 0.0 {
                    let cpu_secs = ticks.saturating_sub(prev.ticks) as f64 / CLK_TCK as f64;
                    cpu_secs / elapsed * 100.0
                } else {
                    0.0
                }
            }
            _ => 0.0,
        };
        self.baseline = Some(CpuBaseline {
            handle: *handle,
            ticks,
            at: now,
        });

        Ok(UsageSample {
            cpu_percent,
            rss_bytes,
        })
    }

    /// Resolves the handle (locating when none is cached) and samples it.
    ///
    /// On any sampling error the handle is dropped so the next call locates
    /// the process again.
    pub fn observe(&mut self, now: Instant) -> ProcessObservation {
        let (handle, fresh) = match self.cached {
            Some(handle) => (handle, false),
            None => match self.locate() {
                Some(handle) => {
                    info!(pid = handle.pid, "server process located");
                    self.cached = Some(handle);
                    (handle, true)
                }
                None => {
                    debug!(signature = %self.signature, "server process not found");
                    return ProcessObservation::NotFound;
                }
            },
        };

        match self.sample_at(&handle, now) {
            Ok(usage) => {
                let restarted = fresh && self.last_identity.is_some_and(|prev| prev != handle);
                if restarted {
                    info!(pid = handle.pid, "server process restarted");
                }
                self.last_identity = Some(handle);
                ProcessObservation::Sampled {
                    handle,
                    usage,
                    restarted,
                }
            }
            Err(error) => {
                self.invalidate();
                warn!(pid = handle.pid, error = %error, "server process lost");
                ProcessObservation::Lost {
                    pid: handle.pid,
                    error,
                }
            }
        }
    }
}

fn is_dead_state(state: char) -> bool {
    matches!(state, 'Z' | 'X')
}
