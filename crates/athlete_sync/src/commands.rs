//! The three scheduled entry points: fetch, upload, and both in sequence.

use crate::error::{SyncError, SyncResult};
use crate::lock::RunLock;
use crate::pipeline::{Outcome, Pipeline, fetch_to_staging};
use crate::staging;
use athlete_sync_client::{FetchWindow, MeasurementSource};
use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Prometheus text exposition of the last run's counters, for a node
/// exporter textfile collector pointed at the state directory.
pub const METRICS_FILE: &str = "athlete-sync.prom";

#[derive(Clone, Debug)]
pub struct Paths {
    pub staging: PathBuf,
    /// Holds the run lock and the upload ledger.
    pub state_dir: PathBuf,
}

impl Paths {
    fn ensure_state_dir(&self) -> SyncResult<()> {
        std::fs::create_dir_all(&self.state_dir).map_err(|e| SyncError::io(&self.state_dir, e))
    }
}

fn check_summary(outcome: Outcome) -> SyncResult<Outcome> {
    match outcome {
        Outcome::Uploaded(s) if s.failed > 0 => Err(SyncError::PartialUpload {
            failed: s.failed,
            attempted: s.attempted(),
        }),
        other => Ok(other),
    }
}

pub async fn fetch(
    source: &dyn MeasurementSource,
    days_back: u32,
    paths: &Paths,
    now: DateTime<Utc>,
) -> SyncResult<usize> {
    paths.ensure_state_dir()?;
    let _lock = RunLock::in_dir(&paths.state_dir)?;
    let window = FetchWindow::last_days(now.date_naive(), days_back);
    info!("fetching measurements {} .. {}", window.from_param(), window.to_param());
    fetch_to_staging(source, &window, &paths.staging).await
}

pub async fn upload(pipeline: &Pipeline, paths: &Paths, now: DateTime<Utc>) -> SyncResult<Outcome> {
    paths.ensure_state_dir()?;
    let _lock = RunLock::in_dir(&paths.state_dir)?;
    check_summary(pipeline.upload_staged(&paths.staging, now).await?)
}

/// Fetch, upload, then delete the staging file. The file is kept when any
/// insert was rejected; the next run's fetch merges the new window into it,
/// so the rejected rows are retried.
pub async fn run(
    source: &dyn MeasurementSource,
    days_back: u32,
    pipeline: &Pipeline,
    paths: &Paths,
    now: DateTime<Utc>,
) -> SyncResult<Outcome> {
    paths.ensure_state_dir()?;
    let _lock = RunLock::in_dir(&paths.state_dir)?;

    let window = FetchWindow::last_days(now.date_naive(), days_back);
    info!("fetching measurements {} .. {}", window.from_param(), window.to_param());
    fetch_to_staging(source, &window, &paths.staging).await?;
    if !paths.staging.exists() {
        return Err(SyncError::StagingMissing(paths.staging.clone()));
    }

    let outcome = check_summary(pipeline.upload_staged(&paths.staging, now).await?)?;
    staging::remove(&paths.staging)?;
    Ok(outcome)
}

/// Replace `<state_dir>/athlete-sync.prom` with `rendered`.
pub fn export_metrics(state_dir: &Path, rendered: &str) -> SyncResult<()> {
    std::fs::create_dir_all(state_dir).map_err(|e| SyncError::io(state_dir, e))?;
    let path = state_dir.join(METRICS_FILE);
    let mut tmp =
        tempfile::NamedTempFile::new_in(state_dir).map_err(|e| SyncError::io(state_dir, e))?;
    tmp.write_all(rendered.as_bytes())
        .map_err(|e| SyncError::io(&path, e))?;
    tmp.persist(&path).map_err(|e| SyncError::io(&path, e.error))?;
    Ok(())
}
