//! Time bounds for monitoring API queries.

use chrono::{DateTime, Days, NaiveDate, NaiveTime, SecondsFormat, Utc};

/// A closed UTC interval `[from, to]` handed to the measurements endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl FetchWindow {
    /// From midnight `days_back` days before `today` to the last microsecond of `today`.
    pub fn last_days(today: NaiveDate, days_back: u32) -> Self {
        let past = today
            .checked_sub_days(Days::new(days_back.into()))
            .unwrap_or(NaiveDate::MIN);
        let end_of_day = NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999).unwrap_or(NaiveTime::MIN);
        Self {
            from: past.and_time(NaiveTime::MIN).and_utc(),
            to: today.and_time(end_of_day).and_utc(),
        }
    }

    pub fn from_param(&self) -> String {
        self.from.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }

    pub fn to_param(&self) -> String {
        self.to.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }
}
