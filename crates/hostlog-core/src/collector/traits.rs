//! Abstractions over filesystem and subprocess access.
//!
//! Probes never touch `std::fs` or `std::process` directly. They go through
//! [`FileSystem`] and [`CommandRunner`], so the same code reads the real
//! `/proc` and `/sys` trees in production and an in-memory tree in tests.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::statvfs::statvfs;

/// Capacity figures for one mounted filesystem, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskUsage {
    pub total: u64,
    pub free: u64,
    /// Space available to unprivileged users (excludes reserved blocks).
    pub available: u64,
}

impl DiskUsage {
    /// Used space as a percentage, computed the way `df` does:
    /// `used / (used + available)`.
    pub fn used_percent(&self) -> f64 {
        let used = self.total.saturating_sub(self.free);
        let denom = used + self.available;
        if denom == 0 {
            return 0.0;
        }
        used as f64 / denom as f64 * 100.0
    }
}

/// Abstraction for filesystem operations.
pub trait FileSystem {
    /// Reads the entire contents of a file as a string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Checks if a path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Lists entries in a directory.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// Returns capacity figures for the filesystem mounted at `path`.
    fn disk_usage(&self, path: &Path) -> io::Result<DiskUsage>;
}

/// Real filesystem implementation that delegates to `std::fs` and `statvfs(3)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl RealFs {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for RealFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(path)?;
        let mut paths = Vec::new();
        for entry in entries {
            paths.push(entry?.path());
        }
        Ok(paths)
    }

    fn disk_usage(&self, path: &Path) -> io::Result<DiskUsage> {
        let stat = statvfs(path).map_err(io::Error::from)?;

        let frsize = stat.fragment_size() as u64;
        Ok(DiskUsage {
            total: stat.blocks() as u64 * frsize,
            free: stat.blocks_free() as u64 * frsize,
            available: stat.blocks_available() as u64 * frsize,
        })
    }
}

/// Runs external utilities such as `vcgencmd`.
///
/// Every invocation is bounded by a timeout. A command that does not finish
/// in time is killed and reported as [`io::ErrorKind::TimedOut`].
pub trait CommandRunner {
    /// Runs `program` with `args` and returns its stdout on success.
    ///
    /// A non-zero exit status is an error.
    fn run(&self, program: &str, args: &[&str], timeout: Duration) -> io::Result<String>;
}

/// Spawns real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommands;

impl SystemCommands {
    /// Poll interval while waiting for a child to exit.
    const POLL: Duration = Duration::from_millis(10);

    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for SystemCommands {
    fn run(&self, program: &str, args: &[&str], timeout: Duration) -> io::Result<String> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        // Drain stdout on a helper thread so a chatty child can't block on a
        // full pipe while we wait for it.
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("child stdout not captured"))?;
        let reader = thread::spawn(move || {
            let mut buf = Vec::new();
            stdout.read_to_end(&mut buf).map(|_| buf)
        });

        let deadline = Instant::now() + timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                drop(reader);
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("{} timed out after {:?}", program, timeout),
                ));
            }
            thread::sleep(Self::POLL);
        };

        let output = reader
            .join()
            .map_err(|_| io::Error::other("stdout reader panicked"))??;

        if !status.success() {
            return Err(io::Error::other(format!("{} exited with {}", program, status)));
        }

        Ok(String::from_utf8_lossy(&output).into_owned())
    }
}
