use crate::SyncClientError;
use secrecy::SecretString;

pub const DEFAULT_FIRSTBEAT_BASE_URL: &str = "https://api.firstbeat.com/v1";
pub const DEFAULT_ACCOUNT_ID: &str = "3-4925";
pub const DEFAULT_TEAM_ID: &str = "20168";
pub const DEFAULT_APP_ID: &str = "firstbeat-sync";
pub const DEFAULT_FORM_NAME: &str = "Firstbeat";
pub const DEFAULT_DEDUP_LOOKBACK_DAYS: u32 = 30;

#[derive(Clone, Debug)]
pub struct FirstbeatConfig {
    pub consumer_id: String,
    pub shared_secret: SecretString,
    /// Absent only when loaded for the key bootstrap.
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub account_id: String,
    pub team_id: String,
    pub days_back: u32,
}

impl FirstbeatConfig {
    pub fn from_env() -> Result<Self, SyncClientError> {
        Self::from_env_with(|k| std::env::var(k).ok())
    }

    /// Testable helper that reads configuration values using the provided
    /// function instead of the process environment.
    pub fn from_env_with<F>(mut get: F) -> Result<Self, SyncClientError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let api_key = required(&mut get, "API_KEY")?;
        Self::load(get, Some(api_key))
    }

    /// Configuration for the `api-key` and `accounts` commands, which run
    /// before an API key exists. `API_KEY` is used when set.
    pub fn bootstrap_from_env() -> Result<Self, SyncClientError> {
        Self::bootstrap_from_env_with(|k| std::env::var(k).ok())
    }

    pub fn bootstrap_from_env_with<F>(mut get: F) -> Result<Self, SyncClientError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let api_key = get("API_KEY").filter(|v| !v.is_empty());
        Self::load(get, api_key)
    }

    fn load<F>(mut get: F, api_key: Option<String>) -> Result<Self, SyncClientError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let consumer_id = required(&mut get, "ID")?;
        let shared_secret = required(&mut get, "SHARED_SECRET")?;
        let days_back = parse_or(&mut get, "FIRSTBEAT_DAYS_BACK", 1)?;
        Ok(Self {
            consumer_id,
            shared_secret: SecretString::new(shared_secret.into()),
            api_key: api_key.map(|k| SecretString::new(k.into())),
            base_url: get("FIRSTBEAT_BASE_URL").unwrap_or_else(|| DEFAULT_FIRSTBEAT_BASE_URL.into()),
            account_id: get("FIRSTBEAT_ACCOUNT_ID").unwrap_or_else(|| DEFAULT_ACCOUNT_ID.into()),
            team_id: get("FIRSTBEAT_TEAM_ID").unwrap_or_else(|| DEFAULT_TEAM_ID.into()),
            days_back,
        })
    }
}

#[derive(Clone, Debug)]
pub struct SmartabaseConfig {
    pub base_url: String,
    pub username: String,
    pub password: SecretString,
    pub app_id: String,
    pub form_name: String,
    pub group_name: Option<String>,
    pub dedup_lookback_days: u32,
}

impl SmartabaseConfig {
    pub fn from_env() -> Result<Self, SyncClientError> {
        Self::from_env_with(|k| std::env::var(k).ok())
    }

    pub fn from_env_with<F>(mut get: F) -> Result<Self, SyncClientError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let base_url = required(&mut get, "SB_BASE_URL")?;
        let username = required(&mut get, "SB_USERNAME")?;
        let password = required(&mut get, "SB_PASSWORD")?;
        let dedup_lookback_days =
            parse_or(&mut get, "SB_DEDUP_LOOKBACK_DAYS", DEFAULT_DEDUP_LOOKBACK_DAYS)?;
        Ok(Self {
            base_url,
            username,
            password: SecretString::new(password.into()),
            app_id: get("SB_APP_ID").unwrap_or_else(|| DEFAULT_APP_ID.into()),
            form_name: get("SB_FORM_NAME").unwrap_or_else(|| DEFAULT_FORM_NAME.into()),
            group_name: get("SB_GROUP_NAME").filter(|g| !g.trim().is_empty()),
            dedup_lookback_days,
        })
    }
}

fn required<F>(get: &mut F, key: &str) -> Result<String, SyncClientError>
where
    F: FnMut(&str) -> Option<String>,
{
    get(key)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| SyncClientError::Config(format!("{key} missing")))
}

fn parse_or<F>(get: &mut F, key: &str, default: u32) -> Result<u32, SyncClientError>
where
    F: FnMut(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| SyncClientError::Config(format!("{key} is not a number: {raw}"))),
    }
}
