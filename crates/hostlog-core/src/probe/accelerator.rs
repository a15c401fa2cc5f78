//! GPU accelerator boards (NVIDIA Jetson).
//!
//! The GPU is a devfreq device whose frequencies are in Hz; its temperature
//! comes from the thermal zone typed `GPU-therm`. Per-core CPU frequencies
//! are reported too, since Jetson governors scale cores independently.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::cpu::{cpu_dirs, read_khz_as_mhz};
use super::sensors::read_millidegrees;
use super::{Probe, ProbeFailure, ProbeResult, Readings, round};
use crate::collector::traits::FileSystem;

/// devfreq node names used by Tegra GPUs across generations.
const GPU_NODES: &[&str] = &["gv11b", "gp10b", "ga10b", "gk20a", "gpu"];

fn read_hz_as_mhz<F: FileSystem>(fs: &F, path: &Path) -> Option<f64> {
    fs.read_to_string(path)
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(|hz| round(hz as f64 / 1e6, 2))
}

pub struct AcceleratorProbe<F: FileSystem> {
    fs: F,
    gpu: Option<PathBuf>,
    gpu_thermal: Option<PathBuf>,
    cores: Vec<(u32, PathBuf)>,
}

impl<F: FileSystem> AcceleratorProbe<F> {
    pub fn new(fs: F, sys_path: &str) -> Self {
        let gpu = Self::find_gpu(&fs, sys_path);
        let gpu_thermal = Self::find_gpu_thermal(&fs, sys_path);
        let cores = cpu_dirs(&fs, sys_path)
            .into_iter()
            .map(|(id, dir)| (id, dir.join("cpufreq/scaling_cur_freq")))
            .collect();

        debug!(
            "accelerator probe: gpu node {:?}, gpu thermal {:?}",
            gpu, gpu_thermal
        );
        Self {
            fs,
            gpu,
            gpu_thermal,
            cores,
        }
    }

    fn find_gpu(fs: &F, sys_path: &str) -> Option<PathBuf> {
        let mut nodes = fs
            .read_dir(Path::new(&format!("{}/class/devfreq", sys_path)))
            .ok()?;
        nodes.sort();
        nodes.into_iter().find(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| GPU_NODES.iter().any(|g| n.contains(g)))
        })
    }

    fn find_gpu_thermal(fs: &F, sys_path: &str) -> Option<PathBuf> {
        let mut zones = fs
            .read_dir(Path::new(&format!("{}/class/thermal", sys_path)))
            .ok()?;
        zones.sort();
        zones.into_iter().find_map(|zone| {
            let kind = fs.read_to_string(&zone.join("type")).ok()?;
            kind.trim()
                .to_ascii_lowercase()
                .starts_with("gpu")
                .then(|| zone.join("temp"))
        })
    }
}

impl<F: FileSystem> Probe for AcceleratorProbe<F> {
    fn name(&self) -> &'static str {
        "accelerator"
    }

    fn fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = [
            "gpu_freq_mhz",
            "gpu_min_freq_mhz",
            "gpu_max_freq_mhz",
            "gpu_temp_c",
        ]
        .map(String::from)
        .to_vec();
        fields.extend(self.cores.iter().map(|(id, _)| format!("cpu{}_freq_mhz", id)));
        fields
    }

    fn sample(&mut self) -> ProbeResult {
        let mut r = Readings::new();

        if let Some(ref gpu) = self.gpu {
            r.set_opt("gpu_freq_mhz", read_hz_as_mhz(&self.fs, &gpu.join("cur_freq")));
            r.set_opt("gpu_min_freq_mhz", read_hz_as_mhz(&self.fs, &gpu.join("min_freq")));
            r.set_opt("gpu_max_freq_mhz", read_hz_as_mhz(&self.fs, &gpu.join("max_freq")));
        }
        if let Some(ref zone) = self.gpu_thermal {
            r.set_opt("gpu_temp_c", read_millidegrees(&self.fs, zone));
        }
        for (id, path) in &self.cores {
            r.set_opt(
                format!("cpu{}_freq_mhz", id),
                read_khz_as_mhz(&self.fs, path).map(|v| round(v, 2)),
            );
        }

        if r.is_empty() {
            return ProbeResult::Failed(ProbeFailure::unavailable(
                "no gpu or cpu frequency source readable",
            ));
        }
        ProbeResult::Ok(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockFs;
    use crate::sample::Value;

    #[test]
    fn test_accelerator_fields_include_each_core() {
        let probe = AcceleratorProbe::new(MockFs::jetson(), "/sys");
        assert_eq!(
            probe.fields(),
            vec![
                "gpu_freq_mhz",
                "gpu_min_freq_mhz",
                "gpu_max_freq_mhz",
                "gpu_temp_c",
                "cpu0_freq_mhz",
                "cpu1_freq_mhz",
            ]
        );
    }

    #[test]
    fn test_accelerator_sample_jetson() {
        let mut probe = AcceleratorProbe::new(MockFs::jetson(), "/sys");
        let ProbeResult::Ok(r) = probe.sample() else {
            panic!("accelerator probe failed");
        };

        assert_eq!(r.get("gpu_freq_mhz"), Some(&Value::Number(306.0)));
        assert_eq!(r.get("gpu_min_freq_mhz"), Some(&Value::Number(114.75)));
        assert_eq!(r.get("gpu_max_freq_mhz"), Some(&Value::Number(1109.25)));
        assert_eq!(r.get("gpu_temp_c"), Some(&Value::Number(41.5)));
        assert_eq!(r.get("cpu0_freq_mhz"), Some(&Value::Number(1190.4)));
        assert_eq!(r.get("cpu1_freq_mhz"), Some(&Value::Number(1420.8)));
    }

    #[test]
    fn test_accelerator_without_gpu_node_reports_cores_only() {
        let fs = MockFs::jetson();
        fs.remove("/sys/class/devfreq");

        let mut probe = AcceleratorProbe::new(fs, "/sys");
        let ProbeResult::Ok(r) = probe.sample() else {
            panic!("accelerator probe failed");
        };
        assert!(r.get("gpu_freq_mhz").is_none());
        assert!(r.get("cpu0_freq_mhz").is_some());
    }

    #[test]
    fn test_accelerator_nothing_readable() {
        let mut probe = AcceleratorProbe::new(MockFs::new(), "/sys");
        assert_eq!(probe.fields().len(), 4);
        assert!(matches!(probe.sample(), ProbeResult::Failed(_)));
    }
}
