//! Readers for the Linux `/proc` filesystem.
//!
//! This module provides parsers and the per-process reader used by the
//! process aggregator.

pub mod parser;
pub mod process;

pub use parser::ParseError;
pub use process::{CollectError, ProcessReader, ProcessSample};
