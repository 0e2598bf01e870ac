//! Event construction and insertion into the destination form.

use crate::error::SyncResult;
use crate::ledger::UploadLedger;
use crate::transform::UploadRecord;
use athlete_sync_client::smartabase::ID_KEY;
use athlete_sync_client::{AthletePlatform, EventPair, EventRow, EventUser, FormEvent, SyncClientError};
use tracing::{info, warn};

pub const EVENT_DATE_FORMAT: &str = "%d/%m/%Y";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub uploaded: usize,
    pub failed: usize,
}

impl UploadSummary {
    pub fn attempted(&self) -> usize {
        self.uploaded + self.failed
    }
}

fn pair(key: &str, value: Option<String>) -> Option<EventPair> {
    value.map(|v| EventPair {
        key: key.to_string(),
        value: Some(v),
    })
}

pub fn build_event(form_name: &str, record: &UploadRecord) -> FormEvent {
    let date = record.session_date.format(EVENT_DATE_FORMAT).to_string();
    let pairs = [
        pair(ID_KEY, Some(record.measurement_id.clone())),
        pair("Session Type", record.session_type.clone()),
        pair("Time", Some(record.time.clone())),
        pair("ACWR", record.acwr.map(|v| v.to_string())),
        pair("RMSSD", record.rmssd.map(|v| v.to_string())),
    ]
    .into_iter()
    .flatten()
    .collect();

    FormEvent {
        form_name: form_name.to_string(),
        start_date: date.clone(),
        start_time: record.start_time.clone(),
        finish_date: date,
        finish_time: record.end_time.clone(),
        user_id: EventUser {
            user_id: record.user_id,
        },
        rows: vec![EventRow { row: 0, pairs }],
    }
}

/// Insert records one at a time. A rejected insert is logged and counted;
/// a transport or authentication failure aborts the run. Each accepted id is written to the
/// ledger straight away.
pub async fn upload_all(
    platform: &dyn AthletePlatform,
    form_name: &str,
    records: &[UploadRecord],
    ledger: Option<&UploadLedger>,
) -> SyncResult<UploadSummary> {
    let mut summary = UploadSummary::default();
    for record in records {
        let event = build_event(form_name, record);
        match platform.insert_event(&event).await {
            Ok(()) => {
                summary.uploaded += 1;
                metrics::counter!("athlete_sync_events_uploaded_total").increment(1);
                info!("uploaded {}", record.measurement_id);
                if let Some(ledger) = ledger {
                    ledger.record(&record.measurement_id)?;
                }
            }
            Err(e @ (SyncClientError::Http(_) | SyncClientError::Auth(_))) => {
                return Err(e.into());
            }
            Err(e) => {
                summary.failed += 1;
                metrics::counter!("athlete_sync_events_failed_total").increment(1);
                warn!("upload of {} failed: {}", record.measurement_id, e);
            }
        }
    }
    info!(
        "uploaded {} {} events ({} failed)",
        summary.uploaded, form_name, summary.failed
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::test_utils::FakePlatform;
    use chrono::NaiveDate;

    fn record() -> UploadRecord {
        UploadRecord {
            user_id: 42,
            session_date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            start_time: "6:55 AM".into(),
            end_time: "7:05 AM".into(),
            time: "7:05 AM".into(),
            measurement_id: "900-11".into(),
            session_type: Some("Night Recovery".into()),
            acwr: Some(1.25),
            rmssd: None,
        }
    }

    #[test]
    fn event_carries_form_dates_and_pairs() {
        let ev = build_event("Firstbeat", &record());
        assert_eq!(ev.form_name, "Firstbeat");
        assert_eq!(ev.start_date, "02/03/2026");
        assert_eq!(ev.finish_date, "02/03/2026");
        assert_eq!(ev.start_time, "6:55 AM");
        assert_eq!(ev.finish_time, "7:05 AM");
        assert_eq!(ev.user_id.user_id, 42);
        assert_eq!(ev.pair("ID"), Some("900-11"));
        assert_eq!(ev.pair("Time"), Some("7:05 AM"));
        assert_eq!(ev.pair("ACWR"), Some("1.25"));
        assert_eq!(ev.pair("Session Type"), Some("Night Recovery"));
    }

    #[test]
    fn absent_metrics_are_omitted() {
        let ev = build_event("Firstbeat", &record());
        assert_eq!(ev.pair("RMSSD"), None);
        assert_eq!(ev.rows[0].pairs.len(), 4);
    }

    #[tokio::test]
    async fn rejected_credentials_stop_after_first_insert() {
        let platform = FakePlatform::new().with_expired_credentials();
        let mut second = record();
        second.measurement_id = "901-11".into();

        let err = upload_all(&platform, "Firstbeat", &[record(), second], None)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Api(SyncClientError::Auth(_))));
        assert_eq!(err.exit_code(), 1);
        assert_eq!(*platform.insert_attempts.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn rejected_record_does_not_stop_the_rest() {
        let platform = FakePlatform::new().rejecting("900-11");
        let mut second = record();
        second.measurement_id = "901-11".into();

        let summary = upload_all(&platform, "Firstbeat", &[record(), second], None)
            .await
            .unwrap();
        assert_eq!(summary, UploadSummary { uploaded: 1, failed: 1 });
        assert_eq!(platform.inserted_ids(), vec!["901-11"]);
    }
}
