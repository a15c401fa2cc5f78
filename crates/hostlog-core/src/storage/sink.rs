//! Append-only CSV store.
//!
//! One file per (machine, calendar day), named
//! `params_<machine>_<Mon>_<DD>_<YYYY>.csv`. The header row is the schema's
//! field list and is written only when the file is empty. Every row is
//! written with a single `write_all` followed by `fdatasync`; a failed write
//! is rolled back by truncating to the previous length, and a torn row left
//! by a crash is cut off when the file is reopened.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::sample::{Sample, Schema};

/// Fatal store errors. Anything here stops the collector.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("CSV encoding error on {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("{path} has a header that does not match the current schema")]
    HeaderMismatch { path: PathBuf },
}

impl SinkError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn csv(path: &Path, source: csv::Error) -> Self {
        Self::Csv {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Store file for `machine` on `date` inside `dir`.
pub fn destination_path(dir: &Path, machine: &str, date: NaiveDate) -> PathBuf {
    let machine: String = machine
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    dir.join(format!("params_{}_{}.csv", machine, date.format("%b_%d_%Y")))
}

/// Encodes one CSV record, newline-terminated.
fn encode_record<I, T>(fields: I) -> Result<Vec<u8>, csv::Error>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut wtr = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    wtr.write_record(fields)?;
    wtr.flush()?;
    Ok(wtr.into_inner().map_err(|e| e.into_error())?)
}

/// Reads the first record of `data` as a header.
fn read_header(data: &[u8]) -> Option<Vec<String>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(data);
    let record = rdr.records().next()?.ok()?;
    Some(record.iter().map(str::to_string).collect())
}

struct OpenStore {
    date: NaiveDate,
    path: PathBuf,
    file: File,
    len: u64,
    schema: Arc<Schema>,
}

/// Appends samples to the day's store file.
pub struct CsvSink {
    dir: PathBuf,
    machine: String,
    current: Option<OpenStore>,
    rows_written: u64,
}

impl CsvSink {
    /// Creates the output directory if needed. Files are opened lazily on the
    /// first append.
    pub fn new(dir: impl Into<PathBuf>, machine: impl Into<String>) -> Result<Self, SinkError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| SinkError::io(&dir, e))?;
        Ok(Self {
            dir,
            machine: machine.into(),
            current: None,
            rows_written: 0,
        })
    }

    /// Path of the file currently open, if any.
    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_ref().map(|s| s.path.as_path())
    }

    /// Rows appended by this sink since it was created.
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Appends one row, durably. Switches files when the sample's calendar
    /// day differs from the open file's.
    pub fn append(&mut self, sample: &Sample) -> Result<(), SinkError> {
        let date = sample.captured_at().date_naive();
        let reopen = match self.current {
            Some(ref s) => s.date != date || !Arc::ptr_eq(&s.schema, sample.schema()),
            None => true,
        };
        let store = match self.current.take() {
            Some(store) if !reopen => self.current.insert(store),
            stale => {
                self.current = stale;
                self.close()?;
                let opened = self.open(date, Arc::clone(sample.schema()))?;
                self.current.insert(opened)
            }
        };
        let row = encode_record(sample.values().iter().map(|v| v.to_string()))
            .map_err(|e| SinkError::csv(&store.path, e))?;

        if let Err(e) = store.file.write_all(&row).and_then(|()| store.file.sync_data()) {
            if let Err(rollback) = store.file.set_len(store.len) {
                warn!(
                    "failed to roll back {} to {} bytes: {}",
                    store.path.display(),
                    store.len,
                    rollback
                );
            }
            return Err(SinkError::io(&store.path, e));
        }

        store.len += row.len() as u64;
        self.rows_written += 1;
        Ok(())
    }

    /// Flushes and closes the open file.
    pub fn close(&mut self) -> Result<(), SinkError> {
        if let Some(store) = self.current.take() {
            store
                .file
                .sync_all()
                .map_err(|e| SinkError::io(&store.path, e))?;
            debug!("closed {}", store.path.display());
        }
        Ok(())
    }

    fn open(&self, date: NaiveDate, schema: Arc<Schema>) -> Result<OpenStore, SinkError> {
        let path = destination_path(&self.dir, &self.machine, date);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)
            .map_err(|e| SinkError::io(&path, e))?;

        let mut len = self.recover(&path, &file, &schema)?;

        if len == 0 {
            let header =
                encode_record(schema.fields()).map_err(|e| SinkError::csv(&path, e))?;
            file.write_all(&header)
                .and_then(|()| file.sync_data())
                .map_err(|e| SinkError::io(&path, e))?;
            len = header.len() as u64;
            info!("created {}", path.display());
        } else {
            info!("appending to {}", path.display());
        }

        Ok(OpenStore {
            date,
            path,
            file,
            len,
            schema,
        })
    }

    /// Validates an existing file and cuts off a torn trailing row.
    /// Returns the usable length.
    ///
    /// The header is checked before anything is truncated, so a file that
    /// belongs to another schema is never modified.
    fn recover(&self, path: &Path, file: &File, schema: &Schema) -> Result<u64, SinkError> {
        let data = std::fs::read(path).map_err(|e| SinkError::io(path, e))?;
        if data.is_empty() {
            return Ok(0);
        }
        let mismatch = || SinkError::HeaderMismatch {
            path: path.to_path_buf(),
        };

        let valid_end = match data.iter().rposition(|&b| b == b'\n') {
            Some(pos) => pos + 1,
            None => {
                // A torn header is only ours if it is a prefix of our header.
                let header =
                    encode_record(schema.fields()).map_err(|e| SinkError::csv(path, e))?;
                if !header.starts_with(&data) {
                    return Err(mismatch());
                }
                0
            }
        };

        if valid_end > 0 {
            match read_header(&data[..valid_end]) {
                Some(header) if header == schema.fields() => {}
                _ => return Err(mismatch()),
            }
        }

        if valid_end < data.len() {
            warn!(
                "{}: {} bytes of a torn row after the last complete line, truncating",
                path.display(),
                data.len() - valid_end
            );
            file.set_len(valid_end as u64)
                .map_err(|e| SinkError::io(path, e))?;
        }
        Ok(valid_end as u64)
    }
}

impl Drop for CsvSink {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("failed to close store: {}", e);
        }
    }
}
