//! Fetch phase: monitoring API to staged rows.

use crate::error::SyncResult;
use crate::staging::StagedRow;
use athlete_sync_client::{Athlete, FetchWindow, MeasurementResults, MeasurementSource};
use tracing::{debug, info};

/// Walk athletes, their measurements in `window`, and each measurement's
/// results. Requests are issued one after another.
pub async fn fetch_measurements(
    source: &dyn MeasurementSource,
    window: &FetchWindow,
) -> SyncResult<Vec<StagedRow>> {
    let athletes = source.list_athletes().await?;
    info!("found {} athletes", athletes.len());

    let mut rows = Vec::new();
    for athlete in &athletes {
        let ids = source.list_measurement_ids(&athlete.athlete_id, window).await?;
        if ids.is_empty() {
            continue;
        }
        info!(
            "getting {} measurements for {} {}",
            ids.len(),
            athlete.first_name,
            athlete.last_name
        );
        for measurement_id in ids {
            let results = source
                .measurement_results(&athlete.athlete_id, &measurement_id)
                .await?;
            debug!(
                "{}-{}: rmssd={:?} acwr={:?}",
                measurement_id, athlete.athlete_id, results.rmssd, results.acwr
            );
            rows.push(staged_row(athlete, &measurement_id, results));
        }
    }
    info!("fetched {} measurements", rows.len());
    Ok(rows)
}

/// Build the staged row; the session date is the UTC date the measurement ended.
pub fn staged_row(athlete: &Athlete, measurement_id: &str, results: MeasurementResults) -> StagedRow {
    let start = results.start_time.unwrap_or(results.end_time);
    StagedRow {
        first_name: athlete.first_name.trim().to_string(),
        last_name: athlete.last_name.trim().to_string(),
        date: results.end_time.format("%Y-%m-%d").to_string(),
        start_time: start.format("%H:%M:%S").to_string(),
        end_time: results.end_time.format("%H:%M:%S").to_string(),
        measurement_id: format!("{}-{}", measurement_id, athlete.athlete_id),
        session_type: results.measurement_type,
        acwr: results.acwr,
        rmssd: results.rmssd,
    }
}
