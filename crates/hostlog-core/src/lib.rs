//! hostlog-core - sampling and persistence core of the hostlog collector.
//!
//! Provides:
//! - `collector`: filesystem and command seams, `/proc` parsers, mocks
//! - `platform`: hardware platform detection and board revision table
//! - `probe`: independently fallible metric sources and the probe set
//! - `process`: top-K process ranking folded by name
//! - `sample`: values, schema and the per-tick record
//! - `assembler`: merges probe results into a fixed-shape sample
//! - `storage`: append-only CSV store
//! - `scheduler`: drift-corrected sampling loop

pub mod assembler;
pub mod collector;
pub mod platform;
pub mod probe;
pub mod process;
pub mod sample;
pub mod scheduler;
pub mod storage;
