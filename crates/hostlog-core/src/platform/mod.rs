//! Platform detection and board lookup tables.

mod detector;
pub mod revisions;

pub use detector::{HardwareProfile, PlatformDetector, PlatformKind, detect_once, read_machine};
