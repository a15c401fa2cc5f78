//! Physical memory totals and usage shares.

use std::path::Path;

use super::{Probe, ProbeFailure, ProbeResult, Readings, round};
use crate::collector::procfs::parser::parse_meminfo;
use crate::collector::traits::FileSystem;

/// Physical memory from `/proc/meminfo`. Sizes use decimal units
/// (1 GB = 10^9 bytes).
pub struct MemoryProbe<F: FileSystem> {
    fs: F,
    proc_path: String,
}

impl<F: FileSystem> MemoryProbe<F> {
    pub fn new(fs: F, proc_path: impl Into<String>) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
        }
    }

    fn read(&self) -> Result<Readings, ProbeFailure> {
        let content = self
            .fs
            .read_to_string(Path::new(&format!("{}/meminfo", self.proc_path)))?;
        let info = parse_meminfo(&content)?;

        let total = info.total_kb as f64;
        let available = info.available_kb.min(info.total_kb) as f64;

        let mut r = Readings::new();
        r.set("mem_total_gb", round(total * 1024.0 / 1e9, 2));
        r.set("mem_active_mb", round(info.active_kb as f64 * 1024.0 / 1e6, 2));
        r.set("mem_available_pct", round(available / total * 100.0, 1));
        r.set("mem_used_pct", round((total - available) / total * 100.0, 1));
        Ok(r)
    }
}

impl<F: FileSystem> Probe for MemoryProbe<F> {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn fields(&self) -> Vec<String> {
        [
            "mem_total_gb",
            "mem_active_mb",
            "mem_available_pct",
            "mem_used_pct",
        ]
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
    use crate::probe::FailureKind;
    use crate::sample::Value;

    #[test]
    fn test_memory_probe_typical_system() {
        let ProbeResult::Ok(r) = MemoryProbe::new(MockFs::typical_system(), "/proc").sample()
        else {
            panic!("memory probe failed");
        };

        assert_eq!(r.get("mem_total_gb"), Some(&Value::Number(16.78)));
        assert_eq!(r.get("mem_active_mb"), Some(&Value::Number(4194.3)));
        assert_eq!(r.get("mem_available_pct"), Some(&Value::Number(75.0)));
        assert_eq!(r.get("mem_used_pct"), Some(&Value::Number(25.0)));
    }

    #[test]
    fn test_memory_probe_without_memtotal_is_error() {
        let fs = MockFs::new();
        fs.add_file("/proc/meminfo", "MemFree: 100 kB\n");

        let ProbeResult::Failed(f) = MemoryProbe::new(fs, "/proc").sample() else {
            panic!("expected failure");
        };
        assert_eq!(f.kind, FailureKind::Error);
    }
}
