//! GitHub Copilot device flow and API token lifecycle
//!
//! 1. `request_device_code` asks GitHub for a device/user code pair
//! 2. `poll_for_access_token` waits for the user to authorize in a browser
//!    and persists the resulting access token
//! 3. `get_api_token` exchanges the access token for a short-lived Copilot
//!    API token, cached in memory

use super::{DeviceCodeResponse, PollResult, TokenStore};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Public OAuth client id of the Copilot editor integrations
pub const COPILOT_CLIENT_ID: &str = "Iv1.b507a08c87ecfe98";

const GITHUB_DEVICE_CODE_URL: &str = "https://github.com/login/device/code";
const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const GITHUB_COPILOT_TOKEN_URL: &str = "https://api.github.com/copilot_internal/v2/token";
const COPILOT_API_URL: &str = "https://api.githubcopilot.com/chat/completions";

/// Editor identification expected by the Copilot endpoints
pub const COPILOT_HEADERS: [(&str, &str); 5] = [
    ("Copilot-Integration-Id", "vscode-chat"),
    ("User-Agent", "GitHubCopilotChat/0.26.7"),
    ("Editor-Version", "vscode/1.104.1"),
    ("Editor-Plugin-Version", "copilot-chat/0.26.7"),
    ("copilot-vision-request", "true"),
];

/// Models the Copilot subscription exposes
pub const COPILOT_MODELS: &[&str] = &[
    "gpt-4o",
    "gpt-4o-mini",
    "gpt-4.1",
    "gpt-4.1-mini",
    "gpt-4.1-nano",
    "o1",
    "o1-mini",
    "o1-pro",
    "o3",
    "o3-mini",
    "o4-mini",
    "claude-sonnet-4",
    "claude-3.5-sonnet",
    "claude-3.7-sonnet",
    "claude-3.7-sonnet-thought",
    "gemini-2.0-flash",
    "gemini-2.5-pro",
];

/// API tokens live ~30 minutes upstream; stop serving them well before that
pub const DEFAULT_API_TOKEN_TTL: Duration = Duration::from_secs(25 * 60);

/// Added to the polling interval on every `slow_down` response
const SLOW_DOWN_INCREMENT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopilotEndpoints {
    pub device_code_url: String,
    pub access_token_url: String,
    pub api_token_url: String,
    pub chat_url: String,
}

impl Default for CopilotEndpoints {
    fn default() -> Self {
        Self {
            device_code_url: GITHUB_DEVICE_CODE_URL.to_string(),
            access_token_url: GITHUB_TOKEN_URL.to_string(),
            api_token_url: GITHUB_COPILOT_TOKEN_URL.to_string(),
            chat_url: COPILOT_API_URL.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CopilotTokenResponse {
    token: String,
}

#[derive(Debug, Clone)]
struct CachedApiToken {
    value: String,
    expires_at: Instant,
}

/// What to do after one poll response
#[derive(Debug, PartialEq, Eq)]
enum PollStep {
    Token(String),
    Pending,
    SlowDown,
    Stop(PollResult),
    Unrecognized(String),
}

impl AccessTokenResponse {
    fn step(self) -> PollStep {
        if let Some(token) = self.access_token.filter(|t| !t.is_empty()) {
            return PollStep::Token(token);
        }
        match self.error.as_deref() {
            Some("authorization_pending") => PollStep::Pending,
            Some("slow_down") => PollStep::SlowDown,
            Some("expired_token") => PollStep::Stop(PollResult::Expired),
            Some("access_denied") => PollStep::Stop(PollResult::Denied),
            Some(other) => PollStep::Unrecognized(match self.error_description {
                Some(desc) => format!("{}: {}", other, desc),
                None => other.to_string(),
            }),
            None => PollStep::Unrecognized("response had neither token nor error".to_string()),
        }
    }
}

/// Device-flow authenticator and API token cache for GitHub Copilot
pub struct CopilotAuth {
    client: reqwest::Client,
    endpoints: CopilotEndpoints,
    store: TokenStore,
    api_token: Mutex<Option<CachedApiToken>>,
    api_token_ttl: Duration,
}

impl CopilotAuth {
    pub fn new(client: reqwest::Client, endpoints: CopilotEndpoints, data_dir: impl AsRef<Path>) -> Self {
        Self {
            client,
            endpoints,
            store: TokenStore::new(data_dir),
            api_token: Mutex::new(None),
            api_token_ttl: DEFAULT_API_TOKEN_TTL,
        }
    }

    pub fn with_api_token_ttl(mut self, ttl: Duration) -> Self {
        self.api_token_ttl = ttl;
        self
    }

    pub fn endpoints(&self) -> &CopilotEndpoints {
        &self.endpoints
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Whether an access token is stored. Does not contact GitHub.
    pub fn is_authenticated(&self) -> bool {
        self.store.exists()
    }

    /// Start the device flow
    pub async fn request_device_code(&self) -> Result<DeviceCodeResponse> {
        let params = [("client_id", COPILOT_CLIENT_ID), ("scope", "read:user")];

        let response = self
            .client
            .post(&self.endpoints.device_code_url)
            .header("Accept", "application/json")
            .form(&params)
            .send()
            .await
            .context("Failed to request device code from GitHub")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("GitHub device code request failed ({}): {}", status, text);
        }

        response
            .json::<DeviceCodeResponse>()
            .await
            .context("Failed to parse device code response")
    }

    /// Poll until the user authorizes, declines, the code expires, or
    /// `max_attempts` polls have been made.
    ///
    /// Sleeps `interval` before every poll. Dropping the returned future
    /// cancels the loop.
    pub async fn poll_for_access_token(
        &self,
        device_code: &str,
        interval: Duration,
        max_attempts: u32,
    ) -> Result<PollResult> {
        let mut interval = interval;
        let params = [
            ("client_id", COPILOT_CLIENT_ID),
            ("device_code", device_code),
            ("grant_type", "urn:ietf:params:oauth:grant-type:device_code"),
        ];

        tracing::info!(
            "Waiting for GitHub device flow authorization ({} attempts)",
            max_attempts
        );

        for attempt in 1..=max_attempts {
            tokio::time::sleep(interval).await;

            // GitHub answers 200 OK with an `error` field while pending
            let body: AccessTokenResponse = self
                .client
                .post(&self.endpoints.access_token_url)
                .header("Accept", "application/json")
                .form(&params)
                .send()
                .await
                .context("Failed to poll for access token")?
                .json()
                .await
                .context("Failed to parse access token response")?;

            match body.step() {
                PollStep::Token(token) => {
                    self.store.save(&token)?;
                    tracing::info!("GitHub Copilot authorization complete");
                    return Ok(PollResult::Authorized);
                }
                PollStep::Pending => {
                    tracing::debug!("Authorization pending (attempt {})", attempt);
                }
                PollStep::SlowDown => {
                    interval += SLOW_DOWN_INCREMENT;
                    tracing::debug!("Asked to slow down, polling every {:?}", interval);
                }
                PollStep::Stop(result) => {
                    tracing::info!("Device flow stopped: {}", result.message());
                    return Ok(result);
                }
                PollStep::Unrecognized(detail) => {
                    tracing::warn!("Unexpected device flow response: {}", detail);
                }
            }
        }

        Ok(PollResult::Exhausted)
    }

    /// Current Copilot API token, exchanging the stored access token when the
    /// cached one is missing or expired.
    ///
    /// `None` covers both "never authenticated" and "exchange failed".
    pub async fn get_api_token(&self) -> Option<String> {
        let mut cached = self.api_token.lock().await;

        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                tracing::debug!("Using cached Copilot API token");
                return Some(token.value.clone());
            }
        }
        *cached = None;

        let access_token = match self.store.load() {
            Ok(Some(token)) => token,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Failed to load Copilot access token: {:#}", e);
                return None;
            }
        };

        match self.exchange(&access_token).await {
            Ok(value) => {
                *cached = Some(CachedApiToken {
                    value: value.clone(),
                    expires_at: Instant::now() + self.api_token_ttl,
                });
                Some(value)
            }
            Err(e) => {
                tracing::warn!("Error getting Copilot API token: {:#}", e);
                None
            }
        }
    }

    async fn exchange(&self, access_token: &str) -> Result<String> {
        let mut req = self
            .client
            .get(&self.endpoints.api_token_url)
            .header("Authorization", format!("token {}", access_token))
            .header("Accept", "application/json");
        for (name, value) in COPILOT_HEADERS {
            req = req.header(name, value);
        }

        let response = req.send().await.context("Failed to get Copilot token")?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Failed to get Copilot token ({}): {}", status, text);
        }

        let parsed: CopilotTokenResponse = response
            .json()
            .await
            .context("Failed to parse Copilot token response")?;
        Ok(parsed.token)
    }

    /// Forget the stored access token and the cached API token.
    ///
    /// Holding the cache lock across the file delete keeps a concurrent
    /// `get_api_token` from re-populating the cache from the old file.
    pub async fn logout(&self) -> Result<()> {
        let mut cached = self.api_token.lock().await;
        self.store.delete()?;
        *cached = None;
        tracing::info!("Logged out of GitHub Copilot");
        Ok(())
    }
}
