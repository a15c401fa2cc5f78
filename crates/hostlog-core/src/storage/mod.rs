//! Durable sample storage.

mod sink;

pub use sink::{CsvSink, SinkError, destination_path};
