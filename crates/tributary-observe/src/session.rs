//! JSON Lines persistence for dispatch records
//!
//! One [`DispatchRecord`] per line. Blank lines are ignored on read so files
//! can be concatenated or hand-edited.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::ObserveError;
use crate::record::DispatchRecord;

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ObserveError + '_ {
    move |source| ObserveError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Write `records` to `path`, replacing any existing file
pub fn write_jsonl(path: impl AsRef<Path>, records: &[DispatchRecord]) -> Result<(), ObserveError> {
    let path = path.as_ref();
    let file = File::create(path).map_err(io_error(path))?;
    write_records(path, file, records)?;
    tracing::debug!(path = %path.display(), count = records.len(), "Wrote dispatch records");
    Ok(())
}

/// Append `records` to `path`, creating it if needed
pub fn append_jsonl(path: impl AsRef<Path>, records: &[DispatchRecord]) -> Result<(), ObserveError> {
    let path = path.as_ref();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_error(path))?;
    write_records(path, file, records)
}

fn write_records(path: &Path, file: File, records: &[DispatchRecord]) -> Result<(), ObserveError> {
    let mut writer = BufWriter::new(file);
    for (index, record) in records.iter().enumerate() {
        serde_json::to_writer(&mut writer, record).map_err(|source| ObserveError::Json {
            line: index + 1,
            source,
        })?;
        writer.write_all(b"\n").map_err(io_error(path))?;
    }
    writer.flush().map_err(io_error(path))
}

/// Read every record from `path`
pub fn read_jsonl(path: impl AsRef<Path>) -> Result<Vec<DispatchRecord>, ObserveError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(io_error(path))?;

    let mut records = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(io_error(path))?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|source| ObserveError::Json {
            line: index + 1,
            source,
        })?;
        records.push(record);
    }
    Ok(records)
}
