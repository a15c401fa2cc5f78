//! Hardware platform detection.
//!
//! Decides once, at startup, which probe variant the host gets. Checks run in
//! priority order and the first match wins:
//!
//! 1. NVIDIA Jetson accelerator board
//! 2. Raspberry Pi single-board computer
//! 3. anything else (generic)

use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use tracing::debug;

use crate::collector::procfs::parser::parse_cpuinfo_board;
use crate::collector::traits::FileSystem;
use crate::platform::revisions;

/// Cached result of [`detect_once`].
static PROFILE: OnceLock<HardwareProfile> = OnceLock::new();

/// Which family of platform probes applies to this host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformKind {
    Accelerator,
    SingleBoardComputer,
    Generic,
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accelerator => write!(f, "accelerator"),
            Self::SingleBoardComputer => write!(f, "single-board"),
            Self::Generic => write!(f, "generic"),
        }
    }
}

/// Resolved platform identity for the current host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareProfile {
    pub kind: PlatformKind,
    pub model_label: String,
    /// Pins on the GPIO header; 0 when there is none or it is unknown.
    pub pin_count: u8,
    /// BCM GPIO lines on the header, in ascending order.
    pub gpio_lines: Vec<u8>,
    /// Raw board revision code (single-board computers only).
    pub revision: Option<String>,
    /// Machine architecture, as `uname -m` reports it.
    pub machine: String,
}

impl fmt::Display for HardwareProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.kind, self.model_label, self.machine)?;
        if let Some(ref rev) = self.revision {
            write!(
                f,
                " rev {} with {} pins (revision table v{})",
                rev,
                self.pin_count,
                revisions::TABLE_VERSION
            )?;
        }
        Ok(())
    }
}

/// Reads the machine architecture, falling back to the compile target.
pub fn read_machine<F: FileSystem>(fs: &F, proc_path: &str) -> String {
    fs.read_to_string(Path::new(&format!("{}/sys/kernel/arch", proc_path)))
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| std::env::consts::ARCH.to_string())
}

/// Runs the detection checks against a (real or mock) filesystem.
pub struct PlatformDetector<F: FileSystem> {
    fs: F,
    proc_path: String,
    sys_path: String,
}

impl<F: FileSystem> PlatformDetector<F> {
    const TEGRA_RELEASE: &'static str = "/etc/nv_tegra_release";

    pub fn new(fs: F, proc_path: impl Into<String>, sys_path: impl Into<String>) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
            sys_path: sys_path.into(),
        }
    }

    /// Resolves the hardware profile. Never fails: the generic profile is
    /// the fallback for anything unrecognised.
    pub fn detect(&self) -> HardwareProfile {
        let machine = read_machine(&self.fs, &self.proc_path);

        if let Some(profile) = self.check_accelerator(&machine) {
            return profile;
        }
        debug!("no accelerator board detected");

        if let Some(profile) = self.check_single_board(&machine) {
            return profile;
        }
        debug!("no single-board computer detected");

        self.generic(machine)
    }

    fn device_tree(&self, node: &str) -> Option<String> {
        let path = format!("{}/device-tree/{}", self.proc_path, node);
        self.fs
            .read_to_string(Path::new(&path))
            .ok()
            .map(|s| s.trim_end_matches('\0').trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn check_accelerator(&self, machine: &str) -> Option<HardwareProfile> {
        let tegra_release = self.fs.exists(Path::new(Self::TEGRA_RELEASE));
        let tegra_compatible = self
            .device_tree("compatible")
            .is_some_and(|c| c.contains("nvidia,tegra"));

        if !tegra_release && !tegra_compatible {
            return None;
        }

        Some(HardwareProfile {
            kind: PlatformKind::Accelerator,
            model_label: self
                .device_tree("model")
                .unwrap_or_else(|| "NVIDIA Jetson".to_string()),
            pin_count: 0,
            gpio_lines: Vec::new(),
            revision: None,
            machine: machine.to_string(),
        })
    }

    fn check_single_board(&self, machine: &str) -> Option<HardwareProfile> {
        let cpuinfo = self
            .fs
            .read_to_string(Path::new(&format!("{}/cpuinfo", self.proc_path)))
            .ok()?;
        let board = parse_cpuinfo_board(&cpuinfo);
        let revision = board.revision?;

        let bcm_hardware = board
            .hardware
            .as_deref()
            .is_some_and(|h| h.starts_with("BCM"));
        let pi_model = board
            .model
            .or_else(|| self.device_tree("model"))
            .is_some_and(|m| m.starts_with("Raspberry Pi"));

        if !bcm_hardware && !pi_model {
            return None;
        }

        let entry = revisions::lookup(&revision);
        if entry == revisions::UNSUPPORTED {
            debug!("board revision {} is not in the revision table", revision);
        }

        Some(HardwareProfile {
            kind: PlatformKind::SingleBoardComputer,
            model_label: entry.model.to_string(),
            pin_count: entry.pin_count,
            gpio_lines: entry.gpio_lines.to_vec(),
            revision: Some(revision),
            machine: machine.to_string(),
        })
    }

    fn generic(&self, machine: String) -> HardwareProfile {
        let product = self
            .fs
            .read_to_string(Path::new(&format!(
                "{}/class/dmi/id/product_name",
                self.sys_path
            )))
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        HardwareProfile {
            kind: PlatformKind::Generic,
            model_label: product.unwrap_or_else(|| "generic".to_string()),
            pin_count: 0,
            gpio_lines: Vec::new(),
            revision: None,
            machine,
        }
    }
}

/// Detects the profile on first call and returns the cached result on every
/// later call, whatever detector is passed.
pub fn detect_once<F: FileSystem>(detector: &PlatformDetector<F>) -> &'static HardwareProfile {
    PROFILE.get_or_init(|| detector.detect())
}
