//! Staged rows to upload-ready records: date parsing, the target-year
//! window, 12-hour time formatting and the roster join.

use crate::filter::{DropReason, Filtered};
use crate::roster::{Resolution, Roster, UserId};
use crate::staging::StagedRow;
use chrono::{Datelike, NaiveDate, NaiveTime};

pub const STAGED_DATE_FORMAT: &str = "%Y-%m-%d";

/// A staged row with parsed date and display-ready times.
#[derive(Clone, Debug, PartialEq)]
pub struct TransformedRecord {
    pub first_name: String,
    pub last_name: String,
    pub session_date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    /// Copy of `end_time` for the form's generic `Time` field.
    pub time: String,
    pub measurement_id: String,
    pub session_type: Option<String>,
    pub acwr: Option<f64>,
    pub rmssd: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct JoinedRecord {
    pub record: TransformedRecord,
    pub resolution: Resolution,
}

/// A record with its resolved user; the name columns are gone.
#[derive(Clone, Debug, PartialEq)]
pub struct UploadRecord {
    pub user_id: UserId,
    pub session_date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub time: String,
    pub measurement_id: String,
    pub session_type: Option<String>,
    pub acwr: Option<f64>,
    pub rmssd: Option<f64>,
}

/// `HH:MM:SS` (or `HH:MM`) to `H:MM AM/PM` without a leading zero.
pub fn to_twelve_hour(s: &str) -> Option<String> {
    let s = s.trim();
    let t = NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()?;
    Some(t.format("%-I:%M %p").to_string())
}

/// Parse and reformat staged rows, keeping only sessions dated in `target_year`.
pub fn transform(rows: Vec<StagedRow>, target_year: i32) -> Filtered<TransformedRecord> {
    let mut out = Filtered::default();
    for row in rows {
        let Ok(session_date) = NaiveDate::parse_from_str(row.date.trim(), STAGED_DATE_FORMAT)
        else {
            out.drop_row(row.measurement_id, DropReason::MalformedDate);
            continue;
        };
        if session_date.year() != target_year {
            out.drop_row(row.measurement_id, DropReason::OutsideTargetYear);
            continue;
        }
        let (Some(start_time), Some(end_time)) =
            (to_twelve_hour(&row.start_time), to_twelve_hour(&row.end_time))
        else {
            out.drop_row(row.measurement_id, DropReason::MalformedTime);
            continue;
        };
        out.keep(TransformedRecord {
            first_name: row.first_name,
            last_name: row.last_name,
            session_date,
            time: end_time.clone(),
            start_time,
            end_time,
            measurement_id: row.measurement_id,
            session_type: row.session_type.filter(|s| !s.is_empty()),
            acwr: row.acwr,
            rmssd: row.rmssd,
        });
    }
    out
}

/// Left join onto the roster: every record is kept, unresolved ones without a user.
pub fn left_join(records: Vec<TransformedRecord>, roster: &Roster) -> Vec<JoinedRecord> {
    records
        .into_iter()
        .map(|record| {
            let resolution = roster.resolve(&record.first_name, &record.last_name);
            JoinedRecord { record, resolution }
        })
        .collect()
}

/// Drop joined records without a user id and strip the name columns.
pub fn into_upload_records(joined: Vec<JoinedRecord>) -> Filtered<UploadRecord> {
    let mut out = Filtered::default();
    for j in joined {
        let user_id = match j.resolution {
            Resolution::Resolved(id) => id,
            Resolution::Unmatched => {
                out.drop_row(j.record.measurement_id, DropReason::NoRosterMatch);
                continue;
            }
            Resolution::Ambiguous => {
                out.drop_row(j.record.measurement_id, DropReason::AmbiguousRosterMatch);
                continue;
            }
        };
        let r = j.record;
        out.keep(UploadRecord {
            user_id,
            session_date: r.session_date,
            start_time: r.start_time,
            end_time: r.end_time,
            time: r.time,
            measurement_id: r.measurement_id,
            session_type: r.session_type,
            acwr: r.acwr,
            rmssd: r.rmssd,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use athlete_sync_client::RosterEntry;

    fn staged(first: &str, last: &str, date: &str, id: &str) -> StagedRow {
        StagedRow {
            first_name: first.into(),
            last_name: last.into(),
            date: date.into(),
            start_time: "09:05:00".into(),
            end_time: "13:00:00".into(),
            measurement_id: id.into(),
            session_type: Some(String::new()),
            acwr: Some(1.3),
            rmssd: Some(48.0),
        }
    }

    #[test]
    fn twelve_hour_strips_leading_zero() {
        assert_eq!(to_twelve_hour("09:05:00").as_deref(), Some("9:05 AM"));
        assert_eq!(to_twelve_hour("13:00:00").as_deref(), Some("1:00 PM"));
        assert_eq!(to_twelve_hour("00:30:00").as_deref(), Some("12:30 AM"));
        assert_eq!(to_twelve_hour("12:00").as_deref(), Some("12:00 PM"));
        assert_eq!(to_twelve_hour("25:00:00"), None);
    }

    #[test]
    fn transform_formats_times_and_copies_end_time() {
        let out = transform(vec![staged("Jane", "Doe", "2026-03-02", "m1")], 2026);
        assert!(out.dropped.is_empty());
        let r = &out.kept[0];
        assert_eq!(r.session_date, NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
        assert_eq!(r.start_time, "9:05 AM");
        assert_eq!(r.end_time, "1:00 PM");
        assert_eq!(r.time, "1:00 PM");
        assert_eq!(r.session_type, None);
    }

    #[test]
    fn malformed_and_out_of_year_dates_are_dropped() {
        let out = transform(
            vec![
                staged("Jane", "Doe", "03/02/2026", "bad-format"),
                staged("Jane", "Doe", "2026-02-30", "out-of-range"),
                staged("Jane", "Doe", "2025-12-31", "last-year"),
                staged("Jane", "Doe", "2026-01-01", "ok"),
            ],
            2026,
        );
        assert_eq!(out.kept.len(), 1);
        assert_eq!(out.kept[0].measurement_id, "ok");
        assert_eq!(out.count(DropReason::MalformedDate), 2);
        assert_eq!(out.count(DropReason::OutsideTargetYear), 1);
    }

    #[test]
    fn malformed_time_is_dropped() {
        let mut row = staged("Jane", "Doe", "2026-03-02", "m1");
        row.end_time = "late".into();
        let out = transform(vec![row], 2026);
        assert!(out.is_empty());
        assert_eq!(out.dropped[0].reason, DropReason::MalformedTime);
    }

    #[test]
    fn join_attaches_ids_and_keeps_unmatched() {
        let roster = Roster::from_entries([RosterEntry {
            first_name: "Jane".into(),
            last_name: "Doe".into(),
            user_id: 42,
        }]);
        let records = transform(
            vec![
                staged("Jane", "Doe", "2026-03-02", "m1"),
                staged("Nobody", "Known", "2026-03-02", "m2"),
            ],
            2026,
        )
        .kept;
        let joined = left_join(records, &roster);
        assert_eq!(joined.len(), 2);
        assert_eq!(joined[0].resolution, Resolution::Resolved(42));
        assert_eq!(joined[1].resolution, Resolution::Unmatched);

        let upload = into_upload_records(joined);
        assert_eq!(upload.kept.len(), 1);
        assert_eq!(upload.kept[0].user_id, 42);
        assert_eq!(upload.dropped[0].measurement_id, "m2");
        assert_eq!(upload.dropped[0].reason, DropReason::NoRosterMatch);
    }

    #[test]
    fn ambiguous_names_are_not_attributed() {
        let roster = Roster::from_entries([
            RosterEntry {
                first_name: "Sam".into(),
                last_name: "Lee".into(),
                user_id: 1,
            },
            RosterEntry {
                first_name: "Sam".into(),
                last_name: "Lee".into(),
                user_id: 2,
            },
        ]);
        let records = transform(vec![staged("Sam", "Lee", "2026-03-02", "m1")], 2026).kept;
        let upload = into_upload_records(left_join(records, &roster));
        assert!(upload.is_empty());
        assert_eq!(upload.count(DropReason::AmbiguousRosterMatch), 1);
    }
}
