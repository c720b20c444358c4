use std::time::Duration;

use uuid::Uuid;

use crate::error::ApiError;

const DEFAULT_API_URL: &str = "https://localhost:7125/api/v1";
const DEFAULT_HUB_URL: &str = "https://localhost:7125/chatHub";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Connection settings for the REST API and the real-time hub.
///
/// The session token and user id are issued by the login flow, which lives
/// outside this crate; they are only read here.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub api_url: String,
    pub hub_url: String,
    pub token: String,
    pub user_id: Uuid,
    pub request_timeout: Duration,
}

impl ApiConfig {
    /// Load `.env` if present, then read `GIGDESK_*` variables.
    pub fn from_env() -> Result<Self, ApiError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ApiError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = lookup("GIGDESK_API_URL").unwrap_or_else(|| DEFAULT_API_URL.into());
        let hub_url = lookup("GIGDESK_HUB_URL").unwrap_or_else(|| DEFAULT_HUB_URL.into());

        let token = lookup("GIGDESK_TOKEN")
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::Config("GIGDESK_TOKEN is not set".into()))?;

        let user_id = lookup("GIGDESK_USER_ID")
            .ok_or_else(|| ApiError::Config("GIGDESK_USER_ID is not set".into()))?
            .parse::<Uuid>()
            .map_err(|e| ApiError::Config(format!("GIGDESK_USER_ID: {}", e)))?;

        let timeout_secs = match lookup("GIGDESK_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|e| ApiError::Config(format!("GIGDESK_TIMEOUT_SECS: {}", e)))?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self {
            api_url,
            hub_url,
            token,
            user_id,
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }
}
