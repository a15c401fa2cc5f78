//! Host data sources.
//!
//! Everything a probe reads goes through one of two seams, so probes run
//! unchanged against a real host and against in-memory fixtures.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        Probes                            │
//! │   /proc, /sys, /etc reads          vcgencmd, pinctrl     │
//! └──────────────┬──────────────────────────────┬────────────┘
//!                │                              │
//!         ┌──────▼──────┐                ┌──────▼────────┐
//!         │  FileSystem │ (trait)        │ CommandRunner │ (trait)
//!         └──────┬──────┘                └──────┬────────┘
//!        ┌───────┴───────┐              ┌───────┴────────┐
//!  ┌─────▼─────┐  ┌──────▼─────┐  ┌─────▼──────────┐ ┌───▼──────────┐
//!  │  RealFs   │  │   MockFs   │  │ SystemCommands │ │ MockCommands │
//!  │  (Linux)  │  │ +Scenarios │  │  (timeouts)    │ │  (Testing)   │
//!  └───────────┘  └────────────┘  └────────────────┘ └──────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use hostlog_core::collector::MockFs;
//! use hostlog_core::collector::procfs::ProcessReader;
//!
//! let fs = MockFs::typical_system();
//! let reader = ProcessReader::new(fs, "/proc");
//! assert_eq!(reader.read_all().unwrap().len(), 3);
//! ```

pub mod mock;
pub mod procfs;
pub mod traits;

pub use mock::{MockCommands, MockFs};
pub use traits::{CommandRunner, DiskUsage, FileSystem, RealFs, SystemCommands};
