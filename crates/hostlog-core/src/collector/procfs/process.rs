//! Per-process reads from `/proc/[pid]/stat`.

use crate::collector::procfs::parser::{
    ParseError, StatusMemory, parse_proc_stat, parse_status_memory,
};
use crate::collector::traits::FileSystem;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Page size used to convert RSS pages to bytes. Standard value for Linux.
const PAGE_SIZE: u64 = 4096;

/// Error type for collection failures.
#[derive(Debug, Error)]
pub enum CollectError {
    /// Process disappeared during collection.
    #[error("process {0} disappeared")]
    ProcessGone(u32),
    /// I/O error reading `/proc` or `/sys` files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Parse error in a `/proc` or `/sys` file.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Raw per-process figures from one read of `/proc/[pid]/stat`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSample {
    pub pid: u32,
    pub name: String,
    /// Start time in jiffies after boot. Together with `pid` this identifies
    /// one process instance across PID reuse.
    pub starttime: u64,
    /// utime + stime, in jiffies.
    pub cpu_ticks: u64,
    pub rss_bytes: u64,
}

/// Enumerates processes under a proc root.
pub struct ProcessReader<F: FileSystem> {
    fs: F,
    proc_path: String,
}

impl<F: FileSystem> ProcessReader<F> {
    /// Creates a new process reader.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `proc_path` - Base path to proc filesystem (usually "/proc")
    pub fn new(fs: F, proc_path: impl Into<String>) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
        }
    }

    /// Reads a single process.
    ///
    /// A missing or unreadable stat file means the process exited (or is
    /// hidden from us) between enumeration and read.
    pub fn read_process(&self, pid: u32) -> Result<ProcessSample, CollectError> {
        let stat_path = format!("{}/{}/stat", self.proc_path, pid);
        let content = self
            .fs
            .read_to_string(Path::new(&stat_path))
            .map_err(|_| CollectError::ProcessGone(pid))?;
        let stat = parse_proc_stat(&content)?;

        Ok(ProcessSample {
            pid: stat.pid,
            name: stat.comm,
            starttime: stat.starttime,
            cpu_ticks: stat.utime + stat.stime,
            rss_bytes: stat.rss.max(0) as u64 * PAGE_SIZE,
        })
    }

    /// Reads every live process.
    ///
    /// Processes that disappear or fail to parse are skipped; only failure to
    /// list the proc root itself is an error.
    pub fn read_all(&self) -> Result<Vec<ProcessSample>, CollectError> {
        let entries = self.fs.read_dir(Path::new(&self.proc_path))?;

        let mut processes = Vec::with_capacity(entries.len());

        for entry in entries {
            let Some(pid) = entry
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.parse::<u32>().ok())
            else {
                continue;
            };

            match self.read_process(pid) {
                Ok(sample) => processes.push(sample),
                Err(CollectError::ProcessGone(_)) => continue,
                Err(e) => debug!("skipping process {}: {}", pid, e),
            }
        }

        Ok(processes)
    }

    /// Reads the resident memory of the calling process from
    /// `<proc>/self/status`.
    pub fn read_self_memory(&self) -> Result<StatusMemory, CollectError> {
        let path = format!("{}/self/status", self.proc_path);
        let content = self.fs.read_to_string(Path::new(&path))?;
        Ok(parse_status_memory(&content)?)
    }
}
