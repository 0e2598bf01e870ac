//! In-memory `MeasurementSource` and `AthletePlatform` fakes for unit tests.
#![cfg(test)]

use async_trait::async_trait;
use athlete_sync_client::{
    Athlete, AthletePlatform, FetchWindow, FormEvent, MeasurementResults, MeasurementSource,
    RosterEntry, SyncClientError,
};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Default)]
pub struct FakeSource {
    athletes: Vec<Athlete>,
    measurements: HashMap<String, Vec<String>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_athlete(mut self, id: &str, first: &str, last: &str, measurements: &[&str]) -> Self {
        self.athletes.push(Athlete {
            athlete_id: id.into(),
            first_name: first.into(),
            last_name: last.into(),
        });
        self.measurements
            .insert(id.into(), measurements.iter().map(|m| m.to_string()).collect());
        self
    }
}

#[async_trait]
impl MeasurementSource for FakeSource {
    async fn list_athletes(&self) -> Result<Vec<Athlete>, SyncClientError> {
        Ok(self.athletes.clone())
    }

    async fn list_measurement_ids(
        &self,
        athlete_id: &str,
        _window: &FetchWindow,
    ) -> Result<Vec<String>, SyncClientError> {
        Ok(self.measurements.get(athlete_id).cloned().unwrap_or_default())
    }

    async fn measurement_results(
        &self,
        _athlete_id: &str,
        _measurement_id: &str,
    ) -> Result<MeasurementResults, SyncClientError> {
        Ok(MeasurementResults {
            start_time: Some(Utc.with_ymd_and_hms(2026, 3, 2, 6, 55, 0).unwrap()),
            end_time: Utc.with_ymd_and_hms(2026, 3, 2, 7, 5, 0).unwrap(),
            measurement_type: Some("Night Recovery".into()),
            rmssd: Some(45.0),
            acwr: Some(1.1),
        })
    }
}

/// Records inserted events and the arguments of dedup queries.
#[derive(Default)]
pub struct FakePlatform {
    pub roster: Vec<RosterEntry>,
    pub existing: HashSet<String>,
    /// Measurement ids whose insert is rejected.
    pub rejected: HashSet<String>,
    /// Every insert fails with 401.
    pub credentials_expired: bool,
    pub inserted: Mutex<Vec<FormEvent>>,
    pub insert_attempts: Mutex<usize>,
    pub roster_calls: Mutex<usize>,
    pub dedup_since: Mutex<Option<DateTime<Utc>>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, first: &str, last: &str, user_id: i64) -> Self {
        self.roster.push(RosterEntry {
            first_name: first.into(),
            last_name: last.into(),
            user_id,
        });
        self
    }

    pub fn with_existing(mut self, id: &str) -> Self {
        self.existing.insert(id.into());
        self
    }

    pub fn rejecting(mut self, id: &str) -> Self {
        self.rejected.insert(id.into());
        self
    }

    pub fn with_expired_credentials(mut self) -> Self {
        self.credentials_expired = true;
        self
    }

    pub fn inserted_ids(&self) -> Vec<String> {
        self.inserted
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| e.pair("ID").map(str::to_string))
            .collect()
    }
}

#[async_trait]
impl AthletePlatform for FakePlatform {
    async fn roster(&self) -> Result<Vec<RosterEntry>, SyncClientError> {
        *self.roster_calls.lock().unwrap() += 1;
        Ok(self.roster.clone())
    }

    async fn existing_measurement_ids(
        &self,
        _form_name: &str,
        _user_ids: &[i64],
        since: DateTime<Utc>,
    ) -> Result<HashSet<String>, SyncClientError> {
        *self.dedup_since.lock().unwrap() = Some(since);
        Ok(self.existing.clone())
    }

    async fn insert_event(&self, event: &FormEvent) -> Result<(), SyncClientError> {
        *self.insert_attempts.lock().unwrap() += 1;
        if self.credentials_expired {
            return Err(SyncClientError::Auth("bad credentials".into()));
        }
        let id = event.pair("ID").unwrap_or_default();
        if self.rejected.contains(id) {
            return Err(SyncClientError::Api {
                status: 400,
                body: "rejected".into(),
            });
        }
        self.inserted.lock().unwrap().push(event.clone());
        Ok(())
    }
}
