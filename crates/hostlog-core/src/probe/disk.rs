//! Filesystem capacity of the monitored mount point.

use std::path::{Path, PathBuf};

use super::{Probe, ProbeFailure, ProbeResult, Readings, round};
use crate::collector::traits::FileSystem;

/// Capacity of the filesystem holding one mount point.
pub struct DiskProbe<F: FileSystem> {
    fs: F,
    mount: PathBuf,
}

impl<F: FileSystem> DiskProbe<F> {
    pub fn new(fs: F, mount: impl AsRef<Path>) -> Self {
        Self {
            fs,
            mount: mount.as_ref().to_path_buf(),
        }
    }

    fn read(&self) -> Result<Readings, ProbeFailure> {
        let usage = self.fs.disk_usage(&self.mount)?;
        if usage.total == 0 {
            return Err(ProbeFailure::error(format!(
                "{} reports zero capacity",
                self.mount.display()
            )));
        }

        let mut r = Readings::new();
        r.set("disk_used_pct", round(usage.used_percent(), 1));
        r.set("disk_total_gb", round(usage.total as f64 / 1e9, 2));
        Ok(r)
    }
}

impl<F: FileSystem> Probe for DiskProbe<F> {
    fn name(&self) -> &'static str {
        "disk"
    }

    fn fields(&self) -> Vec<String> {
        ["disk_used_pct", "disk_total_gb"].map(String::from).to_vec()
    }

    fn sample(&mut self) -> ProbeResult {
        self.read().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockFs;
    use crate::collector::traits::DiskUsage;
    use crate::probe::FailureKind;
    use crate::sample::Value;

    #[test]
    fn test_disk_probe_typical_system() {
        let ProbeResult::Ok(r) = DiskProbe::new(MockFs::typical_system(), "/").sample() else {
            panic!("disk probe failed");
        };

        // 300 GB used, 175 GB available to users
        assert_eq!(r.get("disk_used_pct"), Some(&Value::Number(63.2)));
        assert_eq!(r.get("disk_total_gb"), Some(&Value::Number(500.0)));
    }

    #[test]
    fn test_disk_probe_missing_mount_is_unavailable() {
        let ProbeResult::Failed(f) = DiskProbe::new(MockFs::typical_system(), "/data").sample()
        else {
            panic!("expected failure");
        };
        assert_eq!(f.kind, FailureKind::Unavailable);
    }

    #[test]
    fn test_disk_probe_zero_capacity_is_error() {
        let fs = MockFs::new();
        fs.set_disk_usage("/", DiskUsage::default());

        let ProbeResult::Failed(f) = DiskProbe::new(fs, "/").sample() else {
            panic!("expected failure");
        };
        assert_eq!(f.kind, FailureKind::Error);
    }
}
