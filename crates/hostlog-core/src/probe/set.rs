//! The configured set of probes for this host.

use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::{
    AcceleratorProbe, BootProbe, CpuProbe, DiskProbe, FailureKind, GpioProbe, IdentityProbe,
    LoadProbe, MemoryProbe, NetworkProbe, Probe, ProbeFailure, ProbeResult, ProcessProbe,
    SbcProbe, SensorProbe,
};
use crate::collector::traits::{CommandRunner, FileSystem};
use crate::platform::{HardwareProfile, PlatformKind};
use crate::process::{DEFAULT_TOP_K, ProcessAggregator};

/// Knobs for [`ProbeSet::build`].
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub proc_path: String,
    pub sys_path: String,
    /// Mount point whose filesystem the disk probe reports.
    pub disk_path: String,
    pub top_k: usize,
    pub processes: bool,
    pub sensors: bool,
    /// Upper bound for each external command.
    pub command_timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            proc_path: "/proc".to_string(),
            sys_path: "/sys".to_string(),
            disk_path: "/".to_string(),
            top_k: DEFAULT_TOP_K,
            processes: true,
            sensors: true,
            command_timeout: Duration::from_secs(3),
        }
    }
}

/// What happened to one probe during the last pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub name: &'static str,
    pub duration: Duration,
    /// `None` when the probe succeeded.
    pub failure: Option<ProbeFailure>,
}

struct Entry {
    probe: Box<dyn Probe>,
    name: &'static str,
    fields: Vec<String>,
    failing: bool,
}

/// Ordered probes plus their declared fields.
///
/// Declared fields are captured when a probe is added and never re-queried,
/// so the schema cannot drift while the set is in use.
#[derive(Default)]
pub struct ProbeSet {
    entries: Vec<Entry>,
    last_outcomes: Vec<ProbeOutcome>,
    last_total: Duration,
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl ProbeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a probe; its fields follow those of earlier probes.
    pub fn push(&mut self, probe: Box<dyn Probe>) {
        let name = probe.name();
        let fields = probe.fields();
        debug!("probe {} declares {} fields", name, fields.len());
        self.entries.push(Entry {
            probe,
            name,
            fields,
            failing: false,
        });
    }

    /// Assembles the probes for a host in their fixed order: identity,
    /// platform (accelerator, or single-board then GPIO), sensors, boot, CPU,
    /// load, memory, disk, network, processes.
    pub fn build<F, R>(profile: &HardwareProfile, config: &ProbeConfig, fs: F, runner: R) -> Self
    where
        F: FileSystem + Clone + 'static,
        R: CommandRunner + Clone + 'static,
    {
        let mut set = Self::new();
        let proc = config.proc_path.as_str();
        let sys = config.sys_path.as_str();

        set.push(Box::new(IdentityProbe::new(fs.clone(), proc, sys)));

        match profile.kind {
            PlatformKind::Accelerator => {
                set.push(Box::new(AcceleratorProbe::new(fs.clone(), sys)));
            }
            PlatformKind::SingleBoardComputer => {
                set.push(Box::new(SbcProbe::new(runner.clone(), config.command_timeout)));
                set.push(Box::new(GpioProbe::new(
                    runner,
                    &profile.gpio_lines,
                    config.command_timeout,
                )));
            }
            PlatformKind::Generic => {}
        }

        if config.sensors {
            if let Some(sensors) = SensorProbe::discover(fs.clone(), sys) {
                set.push(Box::new(sensors));
            }
        }

        set.push(Box::new(BootProbe::new(fs.clone(), proc)));
        set.push(Box::new(CpuProbe::new(fs.clone(), proc, sys)));
        set.push(Box::new(LoadProbe::new(fs.clone(), proc)));
        set.push(Box::new(MemoryProbe::new(fs.clone(), proc)));
        set.push(Box::new(DiskProbe::new(fs.clone(), &config.disk_path)));
        set.push(Box::new(NetworkProbe::new(fs.clone(), proc)));

        if config.processes && config.top_k > 0 {
            set.push(Box::new(ProcessProbe::new(ProcessAggregator::new(
                fs,
                proc,
                config.top_k,
            ))));
        }

        info!(
            "probe set for {} host: {}",
            profile.kind,
            set.names().collect::<Vec<_>>().join(", ")
        );
        set
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|e| e.name)
    }

    /// `(probe name, declared fields)` in probe order.
    pub fn declared(&self) -> impl Iterator<Item = (&'static str, &[String])> {
        self.entries.iter().map(|e| (e.name, e.fields.as_slice()))
    }

    /// Runs every probe once, in order. Never fails: a probe that panics is
    /// reported as [`FailureKind::Error`].
    pub fn sample_all(&mut self) -> Vec<ProbeResult> {
        let pass_start = Instant::now();
        let mut results = Vec::with_capacity(self.entries.len());
        let mut outcomes = Vec::with_capacity(self.entries.len());

        for entry in &mut self.entries {
            let start = Instant::now();
            let result = panic::catch_unwind(AssertUnwindSafe(|| entry.probe.sample()))
                .unwrap_or_else(|payload| {
                    ProbeResult::Failed(ProbeFailure::error(format!(
                        "probe panicked: {}",
                        panic_message(payload.as_ref())
                    )))
                });
            let duration = start.elapsed();

            let failure = match &result {
                ProbeResult::Ok(_) => {
                    if entry.failing {
                        info!("probe {} recovered", entry.name);
                    }
                    entry.failing = false;
                    None
                }
                ProbeResult::Failed(f) => {
                    if !entry.failing {
                        if f.kind == FailureKind::Unavailable {
                            debug!("probe {} unavailable: {}", entry.name, f.reason);
                        } else {
                            warn!("probe {} failed: {}", entry.name, f);
                        }
                    }
                    entry.failing = true;
                    Some(f.clone())
                }
            };

            outcomes.push(ProbeOutcome {
                name: entry.name,
                duration,
                failure,
            });
            results.push(result);
        }

        self.last_outcomes = outcomes;
        self.last_total = pass_start.elapsed();
        results
    }

    /// Per-probe outcomes of the most recent [`sample_all`](Self::sample_all).
    pub fn last_outcomes(&self) -> &[ProbeOutcome] {
        &self.last_outcomes
    }

    /// Wall time of the most recent pass.
    pub fn last_total(&self) -> Duration {
        self.last_total
    }
}
