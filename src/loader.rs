use csv::{ReaderBuilder, Trim};
use log::{debug, info};
use std::fs;
use std::io::Read;
use std::path::Path;

use crate::error::{Result, SyncError};
use crate::timestamp::{is_searchable, timestamp_seconds};
use crate::types::Sample;

pub const TIMESTAMP_COLUMN: &str = "timestamp";

/// Fully buffered decode of the merged telemetry CSV.
#[derive(Clone, Debug, Default)]
pub struct DecodedTable {
    /// Column names in file order, timestamp excluded.
    pub columns: Vec<String>,
    pub samples: Vec<Sample>,
}

/// Read the whole source file.
///
/// Kept separate from decoding so the cache can key on the raw bytes.
pub fn read_source(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| SyncError::unreadable(path, e))
}

/// Decode a telemetry CSV from any reader.
///
/// Requires a header row with a `timestamp` column. Every record must have
/// as many cells as the header.
pub fn decode_csv<R: Read>(reader: R) -> Result<DecodedTable> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .trim(Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
    if !headers.iter().any(|h| h == TIMESTAMP_COLUMN) {
        return Err(SyncError::DecodeMalformed(format!(
            "missing '{}' column (found: {})",
            TIMESTAMP_COLUMN,
            headers.join(", ")
        )));
    }

    let mut samples = Vec::new();
    for (line_idx, row) in rdr.records().enumerate() {
        let record = row.map_err(|e| {
            // +2: one for the header, one for 1-based line numbers
            SyncError::DecodeMalformed(format!("line {}: {}", line_idx + 2, e))
        })?;

        let mut sample = Sample::default();
        for (column, cell) in headers.iter().zip(record.iter()) {
            sample.set_field(column, cell);
        }
        let seconds = timestamp_seconds(sample.timestamp.as_ref());
        if !is_searchable(seconds) {
            return Err(SyncError::DecodeMalformed(format!(
                "line {}: timestamp {} s is out of range",
                line_idx + 2,
                seconds
            )));
        }
        samples.push(sample);
    }

    let columns = headers
        .into_iter()
        .filter(|h| h != TIMESTAMP_COLUMN)
        .collect();

    debug!("Decoded {} CSV rows", samples.len());
    Ok(DecodedTable { columns, samples })
}

/// Read and decode a telemetry CSV file.
pub fn load_csv(path: &Path) -> Result<DecodedTable> {
    info!("Loading data from {}...", path.display());
    let bytes = read_source(path)?;
    decode_csv(bytes.as_slice())
}
