//! CPU utilisation, counters, frequency and load average.

use std::path::{Path, PathBuf};

use super::{Probe, ProbeFailure, ProbeResult, Readings, round};
use crate::collector::procfs::parser::{CpuTimes, KernelStat, parse_kernel_stat, parse_loadavg};
use crate::collector::traits::FileSystem;

/// Frequency summary across cores, in MHz.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct FreqSummary {
    pub current: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Lists `cpuN` directories under `<sys>/devices/system/cpu`, ordered by N.
pub(crate) fn cpu_dirs<F: FileSystem>(fs: &F, sys_path: &str) -> Vec<(u32, PathBuf)> {
    let root = format!("{}/devices/system/cpu", sys_path);
    let Ok(entries) = fs.read_dir(Path::new(&root)) else {
        return Vec::new();
    };

    let mut cpus: Vec<(u32, PathBuf)> = entries
        .into_iter()
        .filter_map(|p| {
            let id = p
                .file_name()?
                .to_str()?
                .strip_prefix("cpu")?
                .parse::<u32>()
                .ok()?;
            Some((id, p))
        })
        .collect();
    cpus.sort_by_key(|(id, _)| *id);
    cpus
}

/// Reads a cpufreq file (kHz) and returns MHz.
pub(crate) fn read_khz_as_mhz<F: FileSystem>(fs: &F, path: &Path) -> Option<f64> {
    fs.read_to_string(path)
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(|khz| khz as f64 / 1000.0)
}

fn cpufreq_summary<F: FileSystem>(fs: &F, sys_path: &str) -> Option<FreqSummary> {
    let mut current = Vec::new();
    let mut min: Option<f64> = None;
    let mut max: Option<f64> = None;

    for (_, dir) in cpu_dirs(fs, sys_path) {
        let freq = dir.join("cpufreq");
        if let Some(cur) = read_khz_as_mhz(fs, &freq.join("scaling_cur_freq")) {
            current.push(cur);
        }
        if let Some(lo) = read_khz_as_mhz(fs, &freq.join("cpuinfo_min_freq")) {
            min = Some(min.map_or(lo, |m| m.min(lo)));
        }
        if let Some(hi) = read_khz_as_mhz(fs, &freq.join("cpuinfo_max_freq")) {
            max = Some(max.map_or(hi, |m| m.max(hi)));
        }
    }

    if current.is_empty() {
        return None;
    }
    Some(FreqSummary {
        current: current.iter().sum::<f64>() / current.len() as f64,
        min,
        max,
    })
}

/// Mean of the `cpu MHz` lines, for hosts without cpufreq (most VMs).
fn cpuinfo_mhz(content: &str) -> Option<f64> {
    let values: Vec<f64> = content
        .lines()
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            (key.trim() == "cpu MHz").then(|| value.trim().parse().ok())?
        })
        .collect();

    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

/// Busy share of the jiffies between `prev` and `cur`. Without a previous
/// read the share since boot is returned.
fn busy_percent(prev: Option<&CpuTimes>, cur: &CpuTimes) -> f64 {
    let (total, idle) = match prev {
        Some(p) => (
            cur.total().saturating_sub(p.total()),
            cur.idle_all().saturating_sub(p.idle_all()),
        ),
        None => (cur.total(), cur.idle_all()),
    };
    if total == 0 {
        return 0.0;
    }
    total.saturating_sub(idle) as f64 / total as f64 * 100.0
}

/// Logical CPU count: per-CPU lines of `/proc/stat`, else `processor` lines
/// of `/proc/cpuinfo`.
pub(crate) fn logical_cpus<F: FileSystem>(fs: &F, proc_path: &str) -> Option<usize> {
    let from_stat = fs
        .read_to_string(Path::new(&format!("{}/stat", proc_path)))
        .ok()
        .and_then(|s| parse_kernel_stat(&s).ok())
        .map(|s| s.cpu_count())
        .filter(|&n| n > 0);

    from_stat.or_else(|| {
        let cpuinfo = fs
            .read_to_string(Path::new(&format!("{}/cpuinfo", proc_path)))
            .ok()?;
        let n = cpuinfo
            .lines()
            .filter(|l| l.split(':').next().is_some_and(|k| k.trim() == "processor"))
            .count();
        (n > 0).then_some(n)
    })
}

pub struct CpuProbe<F: FileSystem> {
    fs: F,
    proc_path: String,
    sys_path: String,
    prev: Option<CpuTimes>,
}

impl<F: FileSystem> CpuProbe<F> {
    pub fn new(fs: F, proc_path: impl Into<String>, sys_path: impl Into<String>) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
            sys_path: sys_path.into(),
            prev: None,
        }
    }

    fn read_stat(&self) -> Result<KernelStat, ProbeFailure> {
        let content = self
            .fs
            .read_to_string(Path::new(&format!("{}/stat", self.proc_path)))?;
        Ok(parse_kernel_stat(&content)?)
    }

    fn frequency(&self) -> Option<FreqSummary> {
        cpufreq_summary(&self.fs, &self.sys_path).or_else(|| {
            let cpuinfo = self
                .fs
                .read_to_string(Path::new(&format!("{}/cpuinfo", self.proc_path)))
                .ok()?;
            cpuinfo_mhz(&cpuinfo).map(|current| FreqSummary {
                current,
                min: None,
                max: None,
            })
        })
    }
}

impl<F: FileSystem> Probe for CpuProbe<F> {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn fields(&self) -> Vec<String> {
        [
            "cpu_pct",
            "cpu_count",
            "cpu_ctx_switches",
            "cpu_interrupts",
            "cpu_soft_interrupts",
            "cpu_syscalls",
            "cpu_freq_mhz",
            "cpu_freq_min_mhz",
            "cpu_freq_max_mhz",
        ]
        .map(String::from)
        .to_vec()
    }

    fn sample(&mut self) -> ProbeResult {
        let stat = match self.read_stat() {
            Ok(s) => s,
            Err(e) => return ProbeResult::Failed(e),
        };
        let Some(aggregate) = stat.aggregate().cloned() else {
            return ProbeResult::Failed(ProbeFailure::error("no aggregate cpu line"));
        };

        let mut r = Readings::new();
        r.set(
            "cpu_pct",
            round(busy_percent(self.prev.as_ref(), &aggregate), 1),
        );
        r.set("cpu_count", stat.cpu_count());
        r.set("cpu_ctx_switches", stat.ctxt);
        r.set("cpu_interrupts", stat.intr);
        r.set("cpu_soft_interrupts", stat.softirq);
        // cpu_syscalls: Linux keeps no system-wide syscall counter.

        if let Some(freq) = self.frequency() {
            r.set("cpu_freq_mhz", round(freq.current, 2));
            r.set_opt("cpu_freq_min_mhz", freq.min.map(|v| round(v, 2)));
            r.set_opt("cpu_freq_max_mhz", freq.max.map(|v| round(v, 2)));
        }

        self.prev = Some(aggregate);
        ProbeResult::Ok(r)
    }
}

/// Load average as a percentage of the logical core count.
pub struct LoadProbe<F: FileSystem> {
    fs: F,
    proc_path: String,
}

impl<F: FileSystem> LoadProbe<F> {
    pub fn new(fs: F, proc_path: impl Into<String>) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
        }
    }

    fn read(&self) -> Result<Readings, ProbeFailure> {
        let content = self
            .fs
            .read_to_string(Path::new(&format!("{}/loadavg", self.proc_path)))?;
        let load = parse_loadavg(&content)?;
        let cores = logical_cpus(&self.fs, &self.proc_path)
            .ok_or_else(|| ProbeFailure::error("cannot determine cpu count"))?
            as f64;

        let mut r = Readings::new();
        r.set("load_1m_pct", round(load.one / cores * 100.0, 2));
        r.set("load_5m_pct", round(load.five / cores * 100.0, 2));
        r.set("load_15m_pct", round(load.fifteen / cores * 100.0, 2));
        Ok(r)
    }
}

impl<F: FileSystem> Probe for LoadProbe<F> {
    fn name(&self) -> &'static str {
        "load"
    }

    fn fields(&self) -> Vec<String> {
        ["load_1m_pct", "load_5m_pct", "load_15m_pct"]
            .map(String::from)
            .to_vec()
    }

    fn sample(&mut self) -> ProbeResult {
        self.read().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockFs;
    use crate::sample::Value;

    fn ok(result: ProbeResult) -> Readings {
        match result {
            ProbeResult::Ok(r) => r,
            ProbeResult::Failed(f) => panic!("probe failed: {}", f),
        }
    }

    #[test]
    fn test_cpu_probe_first_pass_uses_totals_since_boot() {
        let mut probe = CpuProbe::new(MockFs::typical_system(), "/proc", "/sys");
        let r = ok(probe.sample());

        // busy 13800 of 94800 jiffies
        assert_eq!(r.get("cpu_pct"), Some(&Value::Number(14.6)));
        assert_eq!(r.get("cpu_count"), Some(&Value::Number(4.0)));
        assert_eq!(r.get("cpu_ctx_switches"), Some(&Value::Number(500000.0)));
        assert_eq!(r.get("cpu_interrupts"), Some(&Value::Number(1000000.0)));
        assert_eq!(r.get("cpu_soft_interrupts"), Some(&Value::Number(300000.0)));
        assert!(r.get("cpu_syscalls").is_none());
        assert_eq!(r.get("cpu_freq_mhz"), Some(&Value::Number(2500.0)));
        assert_eq!(r.get("cpu_freq_min_mhz"), Some(&Value::Number(800.0)));
        assert_eq!(r.get("cpu_freq_max_mhz"), Some(&Value::Number(3600.0)));
    }

    #[test]
    fn test_cpu_probe_uses_delta_on_later_passes() {
        let fs = MockFs::typical_system();
        let mut probe = CpuProbe::new(fs.clone(), "/proc", "/sys");
        ok(probe.sample());

        // +300 busy, +100 idle
        fs.add_file(
            "/proc/stat",
            "cpu  10300 500 3000 80100 1000 200 100 0 0 0\ncpu0 1 0 0 0 0 0 0 0 0 0\n",
        );
        let r = ok(probe.sample());
        assert_eq!(r.get("cpu_pct"), Some(&Value::Number(75.0)));
    }

    #[test]
    fn test_cpu_freq_falls_back_to_cpuinfo() {
        let fs = MockFs::typical_system();
        fs.remove("/sys/devices/system/cpu");

        let r = ok(CpuProbe::new(fs, "/proc", "/sys").sample());
        assert_eq!(r.get("cpu_freq_mhz"), Some(&Value::Number(2500.0)));
        assert!(r.get("cpu_freq_max_mhz").is_none());
    }

    #[test]
    fn test_cpu_probe_garbage_stat_is_error() {
        let fs = MockFs::new();
        fs.add_file("/proc/stat", "garbage\n");

        let ProbeResult::Failed(f) = CpuProbe::new(fs, "/proc", "/sys").sample() else {
            panic!("expected failure");
        };
        assert_eq!(f.kind, crate::probe::FailureKind::Error);
    }

    #[test]
    fn test_load_probe_scales_by_core_count() {
        let r = ok(LoadProbe::new(MockFs::typical_system(), "/proc").sample());

        assert_eq!(r.get("load_1m_pct"), Some(&Value::Number(10.0)));
        assert_eq!(r.get("load_5m_pct"), Some(&Value::Number(5.0)));
        assert_eq!(r.get("load_15m_pct"), Some(&Value::Number(2.0)));
    }

    #[test]
    fn test_load_probe_counts_cpuinfo_processors_without_stat() {
        let fs = MockFs::typical_system();
        fs.remove("/proc/stat");

        // two processor entries in the fixture cpuinfo
        let r = ok(LoadProbe::new(fs, "/proc").sample());
        assert_eq!(r.get("load_1m_pct"), Some(&Value::Number(20.0)));
    }
}
