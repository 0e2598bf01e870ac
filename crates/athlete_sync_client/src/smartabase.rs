//! HTTP client for the Smartabase athlete-management platform.

use crate::config::SmartabaseConfig;
use crate::{AthletePlatform, EventRow, FormEvent, RosterEntry, SyncClientError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

/// Pair key under which the measurement identifier is stored in a form row.
pub const ID_KEY: &str = "ID";

const SYNC_TIMEOUT: Duration = Duration::from_secs(60);
const INSERT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct SmartabaseClient {
    base_url: String,
    username: String,
    password: SecretString,
    app_id: String,
    group_name: Option<String>,
    client: reqwest::Client,
}

impl SmartabaseClient {
    pub fn new(config: &SmartabaseConfig) -> Result<Self, SyncClientError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            app_id: config.app_id.clone(),
            group_name: config.group_name.clone(),
            client,
        })
    }

    fn endpoint(&self, name: &str) -> String {
        format!(
            "{}/api/v1/{}?informat=json&format=json",
            self.base_url, name
        )
    }

    /// Build an authenticated POST request.
    fn post_request(&self, url: &str, timeout: Duration) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .basic_auth(&self.username, Some(self.password.expose_secret()))
            .header("X-APP-ID", &self.app_id)
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(timeout)
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        url: &str,
        body: &Value,
    ) -> Result<T, SyncClientError> {
        let resp = self.post_request(url, SYNC_TIMEOUT).json(body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncClientError::from_status(status.as_u16(), &body));
        }
        Ok(resp.json::<T>().await?)
    }

    /// Follow `nextCursor` until the server stops returning one or hands
    /// back the cursor it was just given.
    async fn paginate<T, F>(&self, url: &str, mut payload: Value, mut page: F) -> Result<(), SyncClientError>
    where
        T: DeserializeOwned,
        F: FnMut(T) -> Option<String>,
    {
        let mut previous: Option<String> = None;
        loop {
            let data: T = self.post_json(url, &payload).await?;
            match page(data) {
                Some(cursor) if cursor.is_empty() => return Ok(()),
                Some(cursor) if previous.as_deref() == Some(cursor.as_str()) => {
                    warn!("{} repeated cursor {}; stopping pagination", url, cursor);
                    return Ok(());
                }
                Some(cursor) => {
                    payload["cursor"] = Value::String(cursor.clone());
                    previous = Some(cursor);
                }
                None => return Ok(()),
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsersPage {
    #[serde(default)]
    users: Vec<RosterEntry>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Deserialize)]
struct EventsPage {
    #[serde(default)]
    export: Option<EventsExport>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventsExport {
    #[serde(default)]
    events: Vec<ExportedEvent>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Deserialize)]
struct ExportedEvent {
    #[serde(default)]
    rows: Vec<EventRow>,
}

#[async_trait]
impl AthletePlatform for SmartabaseClient {
    async fn roster(&self) -> Result<Vec<RosterEntry>, SyncClientError> {
        let url = self.endpoint("usersynchronise");
        let mut payload = json!({
            "lastSynchronisationTimeOnServer": 0,
            "paginate": true,
        });
        if let Some(group) = &self.group_name {
            payload["groupName"] = Value::String(group.clone());
        }

        let mut roster = Vec::new();
        self.paginate(&url, payload, |page: UsersPage| {
            roster.extend(page.users);
            page.next_cursor
        })
        .await?;
        debug!("smartabase roster has {} users", roster.len());
        Ok(roster)
    }

    async fn existing_measurement_ids(
        &self,
        form_name: &str,
        user_ids: &[i64],
        since: DateTime<Utc>,
    ) -> Result<HashSet<String>, SyncClientError> {
        if user_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let mut unique: Vec<i64> = user_ids.to_vec();
        unique.sort_unstable();
        unique.dedup();

        let url = self.endpoint("synchronise");
        let payload = json!({
            "formName": form_name,
            "lastSynchronisationTimeOnServer": since.timestamp_millis().max(0),
            "userIds": unique,
            "paginate": true,
        });

        let mut existing = HashSet::new();
        self.paginate(&url, payload, |page: EventsPage| {
            let export = page.export?;
            for event in &export.events {
                for row in &event.rows {
                    existing.extend(
                        row.pairs
                            .iter()
                            .filter(|p| p.key == ID_KEY)
                            .filter_map(|p| p.value.clone()),
                    );
                }
            }
            export.next_cursor
        })
        .await?;
        debug!("{} measurement ids already in {}", existing.len(), form_name);
        Ok(existing)
    }

    async fn insert_event(&self, event: &FormEvent) -> Result<(), SyncClientError> {
        let url = self.endpoint("eventimport");
        let resp = self
            .post_request(&url, INSERT_TIMEOUT)
            .json(event)
            .send()
            .await?;
        let status = resp.status();
        if status.as_u16() != 200 {
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncClientError::from_status(status.as_u16(), &body));
        }
        Ok(())
    }
}
