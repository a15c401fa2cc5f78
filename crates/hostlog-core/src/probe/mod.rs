//! Metric probes.
//!
//! A probe is an independently fallible read that contributes a fixed set of
//! named fields to every sample. Probes report failure as a value
//! ([`ProbeResult::Failed`]); the [`ProbeSet`] turns panics into failures too,
//! so nothing a probe does can abort a sampling pass.

use std::fmt;
use std::io;

use crate::collector::procfs::{CollectError, ParseError};
use crate::sample::Value;

mod accelerator;
mod boot;
mod cpu;
mod disk;
mod identity;
mod memory;
mod network;
mod processes;
mod sbc;
mod sensors;
mod set;

pub use accelerator::AcceleratorProbe;
pub use boot::BootProbe;
pub use cpu::{CpuProbe, LoadProbe};
pub use disk::DiskProbe;
pub use identity::IdentityProbe;
pub use memory::MemoryProbe;
pub use network::NetworkProbe;
pub use processes::ProcessProbe;
pub use sbc::{GpioProbe, SbcProbe};
pub use sensors::SensorProbe;
pub use set::{ProbeConfig, ProbeOutcome, ProbeSet};

/// Why a probe produced no values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The source does not exist on this host. Expected, not an error.
    Unavailable,
    /// The source exists but reading or parsing it failed.
    Error,
    /// An external command exceeded its time budget.
    TimedOut,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => write!(f, "unavailable"),
            Self::Error => write!(f, "error"),
            Self::TimedOut => write!(f, "timed out"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeFailure {
    pub kind: FailureKind,
    pub reason: String,
}

impl ProbeFailure {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Unavailable,
            reason: reason.into(),
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Error,
            reason: reason.into(),
        }
    }

    pub fn timed_out(reason: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::TimedOut,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.reason)
    }
}

impl From<io::Error> for ProbeFailure {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => Self::unavailable(e.to_string()),
            io::ErrorKind::TimedOut => Self::timed_out(e.to_string()),
            _ => Self::error(e.to_string()),
        }
    }
}

impl From<ParseError> for ProbeFailure {
    fn from(e: ParseError) -> Self {
        Self::error(e.to_string())
    }
}

impl From<CollectError> for ProbeFailure {
    fn from(e: CollectError) -> Self {
        match e {
            CollectError::Io(io) => io.into(),
            other => Self::error(other.to_string()),
        }
    }
}

/// Named values reported by one probe read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Readings {
    values: Vec<(String, Value)>,
}

impl Readings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a value; a later `set` of the same field wins.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        let field = field.into();
        let value = value.into();
        match self.values.iter_mut().find(|(f, _)| *f == field) {
            Some(slot) => slot.1 = value,
            None => self.values.push((field, value)),
        }
    }

    /// Records a value if there is one; `None` leaves the field unreported.
    pub fn set_opt<V: Into<Value>>(&mut self, field: impl Into<String>, value: Option<V>) {
        if let Some(v) = value {
            self.set(field, v);
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Moves the value for `field` out, leaving nothing behind.
    pub fn take(&mut self, field: &str) -> Option<Value> {
        let idx = self.values.iter().position(|(f, _)| f == field)?;
        Some(self.values.swap_remove(idx).1)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(f, _)| f.as_str())
    }
}

/// Outcome of one probe read.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeResult {
    Ok(Readings),
    Failed(ProbeFailure),
}

impl From<Result<Readings, ProbeFailure>> for ProbeResult {
    fn from(r: Result<Readings, ProbeFailure>) -> Self {
        match r {
            Ok(readings) => ProbeResult::Ok(readings),
            Err(failure) => ProbeResult::Failed(failure),
        }
    }
}

/// A metric source.
///
/// `fields` is fixed for the lifetime of the probe; `sample` may report a
/// subset of those fields (the rest become absent) but never others.
pub trait Probe {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Fields this probe contributes, in order.
    fn fields(&self) -> Vec<String>;

    /// Reads the source.
    fn sample(&mut self) -> ProbeResult;
}

/// Rounds to `places` decimal places so stored numbers stay readable.
pub(crate) fn round(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
