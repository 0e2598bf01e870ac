//! The CSV staging file handed from the fetch phase to the upload phase.

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};

/// Column order of the staging file.
pub const HEADER: [&str; 9] = [
    "First Name",
    "Last Name",
    "Date",
    "start_time",
    "end_time",
    "ID",
    "Session Type",
    "acwr",
    "rmssd",
];

/// One measurement as written by the fetch phase. Times are `HH:MM:SS` (UTC)
/// and the date is `YYYY-MM-DD`; both are kept as text so the upload phase
/// decides what is malformed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StagedRow {
    #[serde(rename = "First Name")]
    pub first_name: String,
    #[serde(rename = "Last Name")]
    pub last_name: String,
    #[serde(rename = "Date")]
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(rename = "ID", alias = "measurementId")]
    pub measurement_id: String,
    #[serde(rename = "Session Type", default)]
    pub session_type: Option<String>,
    #[serde(default)]
    pub acwr: Option<f64>,
    #[serde(default)]
    pub rmssd: Option<f64>,
}

#[derive(Debug, PartialEq)]
pub enum StagedFile {
    Missing,
    Empty,
    Rows(Vec<StagedRow>),
}

/// Write `rows` next to `path` and rename over it, so a concurrent reader
/// never sees a partial file. Zero rows still produce a header-only file.
pub fn write_atomic(path: &Path, rows: &[StagedRow]) -> SyncResult<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| SyncError::io(dir, e))?;
    {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(tmp.as_file_mut());
        wtr.write_record(HEADER)?;
        for row in rows {
            wtr.serialize(row)?;
        }
        wtr.flush().map_err(|e| SyncError::io(path, e))?;
    }
    tmp.as_file_mut()
        .flush()
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| SyncError::io(path, e))?;
    tmp.persist(path).map_err(|e| SyncError::io(path, e.error))?;
    info!("wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

/// Read the staging file. A missing or row-less file is a normal outcome;
/// rows that do not fit the schema are skipped with a warning.
pub fn read(path: &Path) -> SyncResult<StagedFile> {
    if !path.exists() {
        return Ok(StagedFile::Missing);
    }
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)?;

    let mut rows = Vec::new();
    for (line, result) in rdr.deserialize::<StagedRow>().enumerate() {
        match result {
            Ok(row) => rows.push(row),
            Err(e) => warn!("skipping staged row {}: {}", line + 1, e),
        }
    }
    if rows.is_empty() {
        return Ok(StagedFile::Empty);
    }
    Ok(StagedFile::Rows(rows))
}

/// Rows of a freshly fetched window plus the rows of a staging file left
/// behind by an earlier run that are not part of the new fetch. On an `ID`
/// clash the fresh row wins.
pub fn merge_pending(pending: Vec<StagedRow>, fresh: Vec<StagedRow>) -> Vec<StagedRow> {
    let fresh_ids: HashSet<&str> = fresh.iter().map(|r| r.measurement_id.as_str()).collect();
    let carried: Vec<StagedRow> = pending
        .into_iter()
        .filter(|r| !fresh_ids.contains(r.measurement_id.as_str()))
        .collect();
    if !carried.is_empty() {
        info!("carrying over {} rows from the previous staging file", carried.len());
    }
    let mut rows = fresh;
    rows.extend(carried);
    rows
}

/// Remove the staging file after a completed run.
pub fn remove(path: &Path) -> SyncResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            info!("removed staging file {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(SyncError::io(path, e)),
    }
}
