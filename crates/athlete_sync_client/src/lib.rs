//! Typed clients for the Firstbeat Sports Cloud API and the Smartabase
//! athlete-management platform, plus the `MeasurementSource` and
//! `AthletePlatform` traits the sync pipeline is written against.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use thiserror::Error;

pub mod config;
pub mod firstbeat;
pub mod smartabase;
pub mod window;

pub use window::FetchWindow;

const BODY_SNIPPET_LEN: usize = 256;

#[derive(Debug, Error)]
pub enum SyncClientError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("api error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("analysis still in progress: {0}")]
    Pending(String),
}

impl SyncClientError {
    /// Map a non-success status and its body to an error variant.
    pub fn from_status(status: u16, body: &str) -> Self {
        let body: String = body.chars().take(BODY_SNIPPET_LEN).collect();
        match status {
            404 => SyncClientError::NotFound(body),
            401 | 403 => SyncClientError::Auth(body),
            _ => SyncClientError::Api { status, body },
        }
    }
}

/// One athlete as listed by the monitoring team roster.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Athlete {
    #[serde(deserialize_with = "deserialize_id")]
    pub athlete_id: String,
    pub first_name: String,
    pub last_name: String,
}

/// An account the API consumer may read.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    #[serde(deserialize_with = "deserialize_id")]
    pub account_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub authorized_by: Option<AccountAuthorizer>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccountAuthorizer {
    #[serde(default)]
    pub coach_id: Option<i64>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    #[serde(deserialize_with = "deserialize_id")]
    pub team_id: String,
    #[serde(default)]
    pub name: String,
}

/// Derived results of a single measurement.
#[derive(Clone, Debug, PartialEq)]
pub struct MeasurementResults {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: DateTime<Utc>,
    pub measurement_type: Option<String>,
    pub rmssd: Option<f64>,
    pub acwr: Option<f64>,
}

/// One athlete from the destination platform's user directory.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub first_name: String,
    pub last_name: String,
    pub user_id: i64,
}

/// A form event ready to be inserted into the destination platform.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FormEvent {
    pub form_name: String,
    pub start_date: String,
    pub start_time: String,
    pub finish_date: String,
    pub finish_time: String,
    pub user_id: EventUser,
    pub rows: Vec<EventRow>,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventUser {
    pub user_id: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventRow {
    #[serde(default)]
    pub row: u32,
    #[serde(default)]
    pub pairs: Vec<EventPair>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventPair {
    pub key: String,
    #[serde(default, deserialize_with = "deserialize_opt_string")]
    pub value: Option<String>,
}

impl FormEvent {
    /// Value of the first pair named `key`, across all rows.
    pub fn pair(&self, key: &str) -> Option<&str> {
        self.rows
            .iter()
            .flat_map(|r| r.pairs.iter())
            .find(|p| p.key == key)
            .and_then(|p| p.value.as_deref())
    }
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

fn deserialize_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let value: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(serde_json::Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected scalar value, got {other}"
        ))),
    }
}

/// Read side of the monitoring API.
#[async_trait]
pub trait MeasurementSource: Send + Sync {
    async fn list_athletes(&self) -> Result<Vec<Athlete>, SyncClientError>;

    /// Ids of the measurements an athlete recorded inside `window`.
    async fn list_measurement_ids(
        &self,
        athlete_id: &str,
        window: &FetchWindow,
    ) -> Result<Vec<String>, SyncClientError>;

    async fn measurement_results(
        &self,
        athlete_id: &str,
        measurement_id: &str,
    ) -> Result<MeasurementResults, SyncClientError>;
}

/// The destination platform: user directory, prior events, event insert.
#[async_trait]
pub trait AthletePlatform: Send + Sync {
    async fn roster(&self) -> Result<Vec<RosterEntry>, SyncClientError>;

    /// Measurement ids already stored in `form_name` for `user_ids`, limited to
    /// events synchronised since `since`.
    async fn existing_measurement_ids(
        &self,
        form_name: &str,
        user_ids: &[i64],
        since: DateTime<Utc>,
    ) -> Result<HashSet<String>, SyncClientError>;

    async fn insert_event(&self, event: &FormEvent) -> Result<(), SyncClientError>;
}
