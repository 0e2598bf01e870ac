//! The upload pass: staged file → transform → year window → roster join →
//! dedup → insert. Every empty branch ends the pass successfully.

use crate::dedup::{SeenIds, filter_unseen};
use crate::error::SyncResult;
use crate::fetch::fetch_measurements;
use crate::ledger::UploadLedger;
use crate::roster::{Roster, UserId};
use crate::staging::{self, StagedFile};
use crate::transform::{into_upload_records, left_join, transform};
use crate::upload::{UploadSummary, upload_all};
use athlete_sync_client::{AthletePlatform, FetchWindow, MeasurementSource};
use chrono::{DateTime, Datelike, Days, Utc};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[derive(Clone, Debug)]
pub struct PipelineSettings {
    pub form_name: String,
    /// How far back the destination is asked for already-uploaded ids.
    pub dedup_lookback_days: u32,
    pub ledger: Option<UploadLedger>,
}

/// How an upload pass ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    NoStagingFile,
    NothingStaged,
    NothingInWindow,
    NoRosterMatches,
    AllDuplicates,
    Uploaded(UploadSummary),
}

impl Outcome {
    pub fn uploaded(&self) -> usize {
        match self {
            Outcome::Uploaded(s) => s.uploaded,
            _ => 0,
        }
    }
}

#[derive(Clone)]
pub struct Pipeline {
    platform: Arc<dyn AthletePlatform>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(platform: Arc<dyn AthletePlatform>, settings: PipelineSettings) -> Self {
        Self { platform, settings }
    }

    /// Upload the rows staged at `path`. `now` fixes the target year and the
    /// start of the dedup lookback.
    pub async fn upload_staged(&self, path: &Path, now: DateTime<Utc>) -> SyncResult<Outcome> {
        let rows = match staging::read(path)? {
            StagedFile::Missing => {
                info!("no staging file at {}; nothing to upload", path.display());
                return Ok(Outcome::NoStagingFile);
            }
            StagedFile::Empty => {
                info!("staging file has no rows; nothing to upload");
                return Ok(Outcome::NothingStaged);
            }
            StagedFile::Rows(rows) => rows,
        };
        info!("read {} staged rows", rows.len());

        let transformed = transform(rows, now.year());
        transformed.report("transform");
        if transformed.is_empty() {
            info!("no staged rows dated in {}; nothing to upload", now.year());
            return Ok(Outcome::NothingInWindow);
        }

        let roster = Roster::from_entries(self.platform.roster().await?);
        info!("roster has {} names", roster.len());
        let matched = into_upload_records(left_join(transformed.kept, &roster));
        matched.report("roster_join");
        if matched.is_empty() {
            info!("no rows matched platform users; nothing to upload");
            return Ok(Outcome::NoRosterMatches);
        }

        let mut seen = self.seen_ids(&matched.kept, now).await?;
        let fresh = filter_unseen(matched.kept, &mut seen);
        fresh.report("dedup");
        if fresh.is_empty() {
            info!("all rows already uploaded; nothing to upload");
            return Ok(Outcome::AllDuplicates);
        }

        let summary = upload_all(
            self.platform.as_ref(),
            &self.settings.form_name,
            &fresh.kept,
            self.settings.ledger.as_ref(),
        )
        .await?;
        Ok(Outcome::Uploaded(summary))
    }

    /// Ids from the local ledger plus those the destination reports for the
    /// lookback window.
    async fn seen_ids(
        &self,
        records: &[crate::transform::UploadRecord],
        now: DateTime<Utc>,
    ) -> SyncResult<SeenIds> {
        let mut seen = SeenIds::new();
        if let Some(ledger) = &self.settings.ledger {
            let local = ledger.load()?;
            info!("ledger {} lists {} uploaded ids", ledger.path().display(), local.len());
            seen.extend(local);
        }

        let user_ids: Vec<UserId> = records.iter().map(|r| r.user_id).collect();
        let since = now
            .checked_sub_days(Days::new(self.settings.dedup_lookback_days.into()))
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let remote = self
            .platform
            .existing_measurement_ids(&self.settings.form_name, &user_ids, since)
            .await?;
        info!(
            "destination lists {} ids in {} since {}",
            remote.len(),
            self.settings.form_name,
            since.date_naive()
        );
        seen.extend(remote);
        Ok(seen)
    }
}

/// Fetch the window's measurements and stage them at `path`. Rows still
/// staged from an earlier run that did not finish are kept alongside the new
/// ones. Returns the number of rows written.
pub async fn fetch_to_staging(
    source: &dyn MeasurementSource,
    window: &FetchWindow,
    path: &Path,
) -> SyncResult<usize> {
    let fresh = fetch_measurements(source, window).await?;
    let rows = match staging::read(path)? {
        StagedFile::Rows(pending) => staging::merge_pending(pending, fresh),
        StagedFile::Missing | StagedFile::Empty => fresh,
    };
    staging::write_atomic(path, &rows)?;
    Ok(rows.len())
}
