//! Boot time and uptime.

use std::path::Path;

use chrono::{Local, TimeZone};

use super::{Probe, ProbeFailure, ProbeResult, Readings};
use crate::collector::procfs::parser::{parse_kernel_stat, parse_uptime};
use crate::collector::traits::FileSystem;

/// Renders uptime the way `uptime -p` does: largest units first, zero units
/// skipped, minutes always shown when nothing else is.
pub fn format_uptime(seconds: u64) -> String {
    let minutes_total = seconds / 60;
    let weeks = minutes_total / (60 * 24 * 7);
    let days = minutes_total / (60 * 24) % 7;
    let hours = minutes_total / 60 % 24;
    let minutes = minutes_total % 60;

    let mut parts = Vec::new();
    for (n, unit) in [(weeks, "week"), (days, "day"), (hours, "hour")] {
        if n > 0 {
            parts.push(plural(n, unit));
        }
    }
    if minutes > 0 || parts.is_empty() {
        parts.push(plural(minutes, "minute"));
    }

    format!("up {}", parts.join(", "))
}

fn plural(n: u64, unit: &str) -> String {
    if n == 1 {
        format!("{} {}", n, unit)
    } else {
        format!("{} {}s", n, unit)
    }
}

pub struct BootProbe<F: FileSystem> {
    fs: F,
    proc_path: String,
}

impl<F: FileSystem> BootProbe<F> {
    pub fn new(fs: F, proc_path: impl Into<String>) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
        }
    }

    fn read(&self) -> Result<Readings, ProbeFailure> {
        let mut r = Readings::new();

        let uptime = self
            .fs
            .read_to_string(Path::new(&format!("{}/uptime", self.proc_path)))?;
        let seconds = parse_uptime(&uptime)?.max(0.0) as u64;
        r.set("uptime_s", seconds);
        r.set("uptime", format_uptime(seconds));

        // btime is optional: a broken /proc/stat still leaves uptime.
        let btime = self
            .fs
            .read_to_string(Path::new(&format!("{}/stat", self.proc_path)))
            .ok()
            .and_then(|s| parse_kernel_stat(&s).ok())
            .map(|s| s.btime)
            .filter(|&b| b > 0);
        r.set_opt(
            "boot_time",
            btime.and_then(|b| Local.timestamp_opt(b as i64, 0).single()),
        );

        Ok(r)
    }
}

impl<F: FileSystem> Probe for BootProbe<F> {
    fn name(&self) -> &'static str {
        "boot"
    }

    fn fields(&self) -> Vec<String> {
        ["boot_time", "uptime_s", "uptime"].map(String::from).to_vec()
    }

    fn sample(&mut self) -> ProbeResult {
        self.read().into()
    }
}
