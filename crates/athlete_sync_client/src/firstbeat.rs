//! HTTP client for the Firstbeat Sports Cloud API.
//!
//! This module provides a reqwest-based implementation of the
//! [`MeasurementSource`](crate::MeasurementSource) trait.

use crate::config::FirstbeatConfig;
use crate::{
    Account, Athlete, FetchWindow, MeasurementResults, MeasurementSource, SyncClientError, Team,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use jwt_simple::prelude::{Claims, Duration as JwtDuration, HS256Key, MACLike};
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info};

/// Variables requested from the results endpoint, in request order.
const RESULT_VARS: &str = "rmssd,acwr";
const TOKEN_LIFETIME_MINS: u64 = 5;
const MAX_PENDING_ATTEMPTS: u32 = 5;
const PENDING_DELAY: Duration = Duration::from_secs(5);

/// Client for the Firstbeat Sports Cloud API using reqwest.
#[derive(Clone, Debug)]
pub struct FirstbeatClient {
    base_url: String,
    account_id: String,
    team_id: String,
    consumer_id: String,
    shared_secret: SecretString,
    api_key: Option<SecretString>,
    pending_delay: Duration,
    client: reqwest::Client,
}

impl FirstbeatClient {
    pub fn new(config: &FirstbeatConfig) -> Result<Self, SyncClientError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            account_id: config.account_id.clone(),
            team_id: config.team_id.clone(),
            consumer_id: config.consumer_id.clone(),
            shared_secret: config.shared_secret.clone(),
            api_key: config.api_key.clone(),
            pending_delay: PENDING_DELAY,
            client,
        })
    }

    /// Override the wait between polls of a measurement still being analysed.
    pub fn with_pending_delay(mut self, delay: Duration) -> Self {
        self.pending_delay = delay;
        self
    }

    /// Sign a short-lived HS256 token identifying this API consumer.
    ///
    /// Tokens are valid for five minutes, so a fresh one is minted per request.
    pub fn bearer_token(&self) -> Result<String, SyncClientError> {
        let key = HS256Key::from_bytes(self.shared_secret.expose_secret().as_bytes());
        let claims = Claims::create(JwtDuration::from_mins(TOKEN_LIFETIME_MINS))
            .with_issuer(&self.consumer_id);
        key.authenticate(claims)
            .map_err(|e| SyncClientError::Auth(format!("signing token: {e}")))
    }

    fn account_url(&self) -> String {
        format!("{}/sports/accounts/{}", self.base_url, self.account_id)
    }

    /// GET `url` and decode JSON, re-polling while the API answers 202.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, SyncClientError> {
        for attempt in 1..=MAX_PENDING_ATTEMPTS {
            let mut req = self
                .client
                .get(url)
                .bearer_auth(self.bearer_token()?)
                .header(ACCEPT, "application/json")
                .query(query);
            if let Some(key) = &self.api_key {
                req = req.header("x-api-key", key.expose_secret());
            }
            let resp = req.send().await?;

            let status = resp.status();
            if status == StatusCode::ACCEPTED {
                info!(attempt, "analysis in progress for {}", url);
                if attempt < MAX_PENDING_ATTEMPTS {
                    tokio::time::sleep(self.pending_delay).await;
                }
                continue;
            }
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(SyncClientError::from_status(status.as_u16(), &body));
            }
            // Read as text first so decode failures can quote the body.
            let text = resp.text().await?;
            return serde_json::from_str(&text).map_err(|e| {
                let body_snippet: String = text.chars().take(256).collect();
                SyncClientError::Decode(format!("{url}: {e} - body: {body_snippet}"))
            });
        }
        Err(SyncClientError::Pending(url.to_string()))
    }

    /// Fetch this consumer's API key. Only the bearer token is needed; the
    /// key is created on the first call and the same one returned afterwards.
    pub async fn api_key(&self) -> Result<SecretString, SyncClientError> {
        let url = format!("{}/account/api-key", self.base_url);
        let payload: ApiKeyPayload = self.get_json(&url, &[]).await?;
        info!("received Firstbeat API key for consumer {}", self.consumer_id);
        Ok(SecretString::new(payload.apikey.into()))
    }

    /// Accounts this API consumer has been granted access to.
    pub async fn list_accounts(&self) -> Result<Vec<Account>, SyncClientError> {
        let url = format!("{}/sports/accounts/", self.base_url);
        let payload: AccountsPayload = self.get_json(&url, &[]).await?;
        debug!("consumer can access {} accounts", payload.accounts.len());
        Ok(payload.accounts)
    }

    /// Teams of `account_id`.
    pub async fn list_teams(&self, account_id: &str) -> Result<Vec<Team>, SyncClientError> {
        let url = format!("{}/sports/accounts/{}/teams", self.base_url, account_id);
        let payload: TeamsPayload = self.get_json(&url, &[]).await?;
        Ok(payload.teams)
    }
}

#[derive(Deserialize)]
struct ApiKeyPayload {
    apikey: String,
}

#[derive(Deserialize)]
struct AccountsPayload {
    #[serde(default)]
    accounts: Vec<Account>,
}

#[derive(Deserialize)]
struct TeamsPayload {
    #[serde(default)]
    teams: Vec<Team>,
}

#[derive(Deserialize)]
struct AthletesPayload {
    #[serde(default)]
    athletes: Vec<Athlete>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MeasurementsPayload {
    #[serde(default)]
    measurements: Vec<MeasurementEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MeasurementEntry {
    #[serde(default)]
    measurement_id: Option<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultsPayload {
    #[serde(default)]
    start_time: Option<String>,
    end_time: String,
    #[serde(default)]
    measurement_type: Option<String>,
    #[serde(default)]
    variables: Vec<VariablePayload>,
}

#[derive(Deserialize)]
struct VariablePayload {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    value: Option<serde_json::Value>,
}

impl ResultsPayload {
    /// Value of the variable called `name`, or the one at `position` when the
    /// API omits variable names.
    fn variable(&self, name: &str, position: usize) -> Option<f64> {
        let named = self
            .variables
            .iter()
            .find(|v| v.name.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(name)));
        let var = match named {
            Some(v) => Some(v),
            None if self.variables.iter().all(|v| v.name.is_none()) => {
                self.variables.get(position)
            }
            None => None,
        };
        var.and_then(|v| v.value.as_ref()).and_then(as_f64)
    }
}

fn as_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn id_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse a timestamp as RFC 3339, or as a naive ISO datetime taken to be UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s.trim_end_matches('Z'), "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|ndt| ndt.and_utc())
}

#[async_trait]
impl MeasurementSource for FirstbeatClient {
    async fn list_athletes(&self) -> Result<Vec<Athlete>, SyncClientError> {
        let url = format!("{}/teams/{}/athletes", self.account_url(), self.team_id);
        let payload: AthletesPayload = self.get_json(&url, &[]).await?;
        debug!("team {} has {} athletes", self.team_id, payload.athletes.len());
        Ok(payload.athletes)
    }

    async fn list_measurement_ids(
        &self,
        athlete_id: &str,
        window: &FetchWindow,
    ) -> Result<Vec<String>, SyncClientError> {
        let url = format!(
            "{}/athletes/{}/measurements/",
            self.account_url(),
            athlete_id
        );
        let from = window.from_param();
        let to = window.to_param();
        let payload: MeasurementsPayload = self
            .get_json(&url, &[("fromTime", from.as_str()), ("toTime", to.as_str())])
            .await?;
        Ok(payload
            .measurements
            .iter()
            .filter_map(|m| m.measurement_id.as_ref().and_then(id_string))
            .collect())
    }

    async fn measurement_results(
        &self,
        athlete_id: &str,
        measurement_id: &str,
    ) -> Result<MeasurementResults, SyncClientError> {
        let url = format!(
            "{}/athletes/{}/measurements/{}/results",
            self.account_url(),
            athlete_id,
            measurement_id
        );
        let payload: ResultsPayload = self
            .get_json(&url, &[("format", "list"), ("var", RESULT_VARS)])
            .await?;
        let end_time = parse_timestamp(&payload.end_time).ok_or_else(|| {
            SyncClientError::Decode(format!("invalid endTime: {}", payload.end_time))
        })?;
        let start_time = payload.start_time.as_deref().and_then(parse_timestamp);
        Ok(MeasurementResults {
            start_time,
            end_time,
            measurement_type: payload.measurement_type.clone(),
            rmssd: payload.variable("rmssd", 0),
            acwr: payload.variable("acwr", 1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> FirstbeatConfig {
        FirstbeatConfig {
            consumer_id: "consumer".into(),
            shared_secret: SecretString::new("sekrit".into()),
            api_key: Some(SecretString::new("key".into())),
            base_url: "http://localhost/v1/".into(),
            account_id: "3-1".into(),
            team_id: "9".into(),
            days_back: 1,
        }
    }

    #[test]
    fn bearer_token_is_verifiable_with_shared_secret() {
        use jwt_simple::prelude::{NoCustomClaims, VerificationOptions};
        use std::collections::HashSet;

        let client = FirstbeatClient::new(&config()).expect("client");
        let token = client.bearer_token().expect("token");
        let key = HS256Key::from_bytes(b"sekrit");
        let opts = VerificationOptions {
            allowed_issuers: Some(HashSet::from(["consumer".to_string()])),
            ..Default::default()
        };
        let claims = key
            .verify_token::<NoCustomClaims>(&token, Some(opts))
            .expect("verify");
        assert_eq!(claims.issuer.as_deref(), Some("consumer"));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = FirstbeatClient::new(&config()).expect("client");
        assert_eq!(client.account_url(), "http://localhost/v1/sports/accounts/3-1");
    }

    #[test]
    fn variables_by_name_then_position() {
        let named: ResultsPayload = serde_json::from_value(json!({
            "endTime": "2026-03-02T08:00:00Z",
            "variables": [{"name": "acwr", "value": 1.2}, {"name": "rmssd", "value": "55.5"}]
        }))
        .unwrap();
        assert_eq!(named.variable("rmssd", 0), Some(55.5));
        assert_eq!(named.variable("acwr", 1), Some(1.2));

        let positional: ResultsPayload = serde_json::from_value(json!({
            "endTime": "2026-03-02T08:00:00Z",
            "variables": [{"value": 61.0}, {"value": null}]
        }))
        .unwrap();
        assert_eq!(positional.variable("rmssd", 0), Some(61.0));
        assert_eq!(positional.variable("acwr", 1), None);
    }

    #[test]
    fn parse_timestamp_accepts_zulu_and_naive() {
        let z = parse_timestamp("2026-03-02T08:15:00Z").unwrap();
        let naive = parse_timestamp("2026-03-02T08:15:00.250").unwrap();
        assert_eq!(z.format("%H:%M:%S").to_string(), "08:15:00");
        assert_eq!(naive.format("%H:%M:%S").to_string(), "08:15:00");
        assert!(parse_timestamp("yesterday").is_none());
    }
}
