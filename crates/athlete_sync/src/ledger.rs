//! Append-only local record of uploaded measurement ids.
//!
//! The destination is only queried for a bounded lookback window; the ledger
//! catches re-fetched measurements that fall outside it.

use crate::error::{SyncError, SyncResult};
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const LEDGER_FILE: &str = "uploaded_ids.txt";

#[derive(Clone, Debug)]
pub struct UploadLedger {
    path: PathBuf,
}

impl UploadLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(LEDGER_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All recorded ids; an absent ledger is empty.
    pub fn load(&self) -> SyncResult<HashSet<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashSet::new()),
            Err(e) => Err(SyncError::io(&self.path, e)),
        }
    }

    pub fn record(&self, measurement_id: &str) -> SyncResult<()> {
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| SyncError::io(&self.path, e))?;
        writeln!(f, "{}", measurement_id).map_err(|e| SyncError::io(&self.path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_ledger_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = UploadLedger::in_dir(dir.path());
        assert!(ledger.load().unwrap().is_empty());
    }

    #[test]
    fn recorded_ids_are_loaded_back() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = UploadLedger::in_dir(dir.path());
        ledger.record("900-11").unwrap();
        ledger.record("901-11").unwrap();
        ledger.record("900-11").unwrap();
        let ids = ledger.load().unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("901-11"));
    }
}
