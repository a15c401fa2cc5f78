//! hwmon temperature sensors.
//!
//! Sensors are discovered once; each `tempN_input` of each hwmon chip becomes
//! a field `temp_<chip>_<label>` in °C. Sensors that appear later are not
//! picked up, and sensors that disappear report absent.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{Probe, ProbeFailure, ProbeResult, Readings, round};
use crate::collector::traits::FileSystem;

/// Lowercases and collapses anything outside `[a-z0-9]` to single `_`.
pub(crate) fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.trim().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}

/// Reads a millidegree file and returns °C.
pub(crate) fn read_millidegrees<F: FileSystem>(fs: &F, path: &Path) -> Option<f64> {
    fs.read_to_string(path)
        .ok()?
        .trim()
        .parse::<i64>()
        .ok()
        .map(|m| round(m as f64 / 1000.0, 1))
}

#[derive(Debug, Clone, PartialEq)]
struct Sensor {
    field: String,
    input: PathBuf,
}

pub struct SensorProbe<F: FileSystem> {
    fs: F,
    sensors: Vec<Sensor>,
}

impl<F: FileSystem> SensorProbe<F> {
    /// Scans `<sys>/class/hwmon`. Returns `None` when no temperature input
    /// exists, so the probe is left out of the schema entirely.
    pub fn discover(fs: F, sys_path: &str) -> Option<Self> {
        let root = format!("{}/class/hwmon", sys_path);
        let mut chips = fs.read_dir(Path::new(&root)).ok()?;
        chips.sort();

        let mut sensors = Vec::new();
        let mut taken = HashSet::new();

        for chip_dir in chips {
            let chip = fs
                .read_to_string(&chip_dir.join("name"))
                .ok()
                .map(|n| sanitize(&n))
                .filter(|n| !n.is_empty())
                .or_else(|| chip_dir.file_name()?.to_str().map(sanitize));
            let Some(chip) = chip else { continue };

            let Ok(entries) = fs.read_dir(&chip_dir) else {
                continue;
            };
            let mut inputs: Vec<(u32, PathBuf)> = entries
                .into_iter()
                .filter_map(|p| {
                    let n = p
                        .file_name()?
                        .to_str()?
                        .strip_prefix("temp")?
                        .strip_suffix("_input")?
                        .parse::<u32>()
                        .ok()?;
                    Some((n, p))
                })
                .collect();
            inputs.sort_by_key(|(n, _)| *n);

            for (n, input) in inputs {
                let label = fs
                    .read_to_string(&chip_dir.join(format!("temp{}_label", n)))
                    .ok()
                    .map(|l| sanitize(&l))
                    .filter(|l| !l.is_empty())
                    .unwrap_or_else(|| format!("temp{}", n));

                let base = format!("temp_{}_{}", chip, label);
                let mut field = base.clone();
                let mut suffix = 2;
                while !taken.insert(field.clone()) {
                    field = format!("{}_{}", base, suffix);
                    suffix += 1;
                }
                sensors.push(Sensor { field, input });
            }
        }

        if sensors.is_empty() {
            debug!("no hwmon temperature inputs under {}", root);
            return None;
        }
        debug!("discovered {} temperature sensors", sensors.len());
        Some(Self { fs, sensors })
    }
}

impl<F: FileSystem> Probe for SensorProbe<F> {
    fn name(&self) -> &'static str {
        "sensors"
    }

    fn fields(&self) -> Vec<String> {
        self.sensors.iter().map(|s| s.field.clone()).collect()
    }

    fn sample(&mut self) -> ProbeResult {
        let mut r = Readings::new();
        for sensor in &self.sensors {
            r.set_opt(&sensor.field, read_millidegrees(&self.fs, &sensor.input));
        }

        if r.is_empty() {
            return ProbeResult::Failed(ProbeFailure::unavailable(
                "no temperature sensor readable",
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
    fn test_sanitize() {
        assert_eq!(sanitize("Package id 0\n"), "package_id_0");
        assert_eq!(sanitize("cpu_thermal"), "cpu_thermal");
        assert_eq!(sanitize("  Tctl/Tdie "), "tctl_tdie");
    }

    #[test]
    fn test_discover_typical_system() {
        let probe = SensorProbe::discover(MockFs::typical_system(), "/sys").unwrap();
        assert_eq!(
            probe.fields(),
            vec!["temp_coretemp_package_id_0", "temp_coretemp_core_0"]
        );
    }

    #[test]
    fn test_sensor_without_label_uses_input_name() {
        let probe = SensorProbe::discover(MockFs::raspberry_pi("a02082"), "/sys").unwrap();
        assert_eq!(probe.fields(), vec!["temp_cpu_thermal_temp1"]);
    }

    #[test]
    fn test_no_sensors_leaves_probe_out() {
        assert!(SensorProbe::discover(MockFs::jetson(), "/sys").is_none());
    }

    #[test]
    fn test_duplicate_chips_get_suffixes() {
        let fs = MockFs::new();
        for hw in ["hwmon0", "hwmon1"] {
            fs.add_file(format!("/sys/class/hwmon/{}/name", hw), "nvme\n");
            fs.add_file(format!("/sys/class/hwmon/{}/temp1_input", hw), "38850\n");
            fs.add_file(format!("/sys/class/hwmon/{}/temp1_label", hw), "Composite\n");
        }

        let probe = SensorProbe::discover(fs, "/sys").unwrap();
        assert_eq!(
            probe.fields(),
            vec!["temp_nvme_composite", "temp_nvme_composite_2"]
        );
    }

    #[test]
    fn test_sample_reads_celsius_and_tolerates_vanished_sensor() {
        let fs = MockFs::typical_system();
        let mut probe = SensorProbe::discover(fs.clone(), "/sys").unwrap();

        let ProbeResult::Ok(r) = probe.sample() else {
            panic!("sensor probe failed");
        };
        assert_eq!(r.get("temp_coretemp_package_id_0"), Some(&Value::Number(45.0)));
        assert_eq!(r.get("temp_coretemp_core_0"), Some(&Value::Number(42.5)));

        fs.remove("/sys/class/hwmon/hwmon0/temp2_input");
        let ProbeResult::Ok(r) = probe.sample() else {
            panic!("sensor probe failed");
        };
        assert_eq!(r.len(), 1);

        fs.remove("/sys/class/hwmon");
        assert!(matches!(probe.sample(), ProbeResult::Failed(_)));
    }
}
