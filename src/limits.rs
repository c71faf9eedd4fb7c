use crate::config::LimitsConfig;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::{fs, io, path::Path};
use thiserror::Error;

const OAUTH_BETA: &str = "oauth-2025-04-20";

/// Utilization of the two rolling billing windows. Either may be unknown.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageLimits {
    pub five_hour: Option<LimitWindow>,
    pub seven_day: Option<LimitWindow>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LimitWindow {
    #[serde(rename = "utilization")]
    pub utilization_percent: f64,
    #[serde(default)]
    pub resets_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
struct UsageResponse {
    #[serde(default)]
    five_hour: Option<LimitWindow>,
    #[serde(default)]
    seven_day: Option<LimitWindow>,
}

#[derive(Debug, Error)]
pub enum LimitsError {
    #[error("no OAuth access token in {0}")]
    MissingCredentials(String),
    #[error("failed to read credentials: {0}")]
    Credentials(#[from] io::Error),
    #[error("usage endpoint returned {0}")]
    Status(StatusCode),
    #[error("usage request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

pub struct LimitsFetcher {
    client: Client,
    config: LimitsConfig,
}

impl LimitsFetcher {
    pub fn new(config: LimitsConfig) -> Self {
        let client = Client::builder()
            .user_agent(concat!("claude-statusline/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout())
            .build()
            .unwrap_or_else(|err| {
                tracing::warn!(error = %err, "failed to build usage client, using defaults");
                Client::new()
            });
        Self { client, config }
    }

    /// Current window utilization; every failure degrades to "unknown".
    pub async fn fetch(&self) -> UsageLimits {
        if !self.config.enabled {
            return UsageLimits::default();
        }
        match self.try_fetch().await {
            Ok(limits) => limits,
            Err(err) => {
                tracing::debug!(error = %err, "usage limits unavailable");
                UsageLimits::default()
            }
        }
    }

    async fn try_fetch(&self) -> Result<UsageLimits, LimitsError> {
        let token = load_access_token(&self.config.credentials_path)?;
        let response = self
            .client
            .get(&self.config.endpoint)
            .bearer_auth(token)
            .header("anthropic-beta", OAUTH_BETA)
            .header("accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LimitsError::Status(status));
        }
        let body: UsageResponse = response.json().await?;
        Ok(UsageLimits {
            five_hour: body.five_hour,
            seven_day: body.seven_day,
        })
    }
}

/// Reads `claudeAiOauth.accessToken` from the local credentials file.
pub fn load_access_token(path: &Path) -> Result<String, LimitsError> {
    let contents = fs::read_to_string(path)?;
    let missing = || LimitsError::MissingCredentials(path.display().to_string());
    let json: Value = serde_json::from_str(&contents).map_err(|_| missing())?;
    json.get("claudeAiOauth")
        .and_then(|oauth| oauth.get("accessToken"))
        .and_then(|token| token.as_str())
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .ok_or_else(missing)
}
