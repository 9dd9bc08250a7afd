//! Authentication for OAuth device flow providers
//!
//! GitHub Copilot is the only device-flow backend: a long-lived GitHub
//! access token is obtained interactively, stored encrypted, and exchanged on
//! demand for short-lived Copilot API tokens.

mod copilot_oauth;
mod token_store;

pub use copilot_oauth::{
    CopilotAuth, CopilotEndpoints, COPILOT_CLIENT_ID, COPILOT_HEADERS, COPILOT_MODELS,
    DEFAULT_API_TOKEN_TTL,
};
pub use token_store::TokenStore;

use serde::{Deserialize, Serialize};

/// Device code response from the identity provider, passed through unmodified
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCodeResponse {
    /// The device verification code
    pub device_code: String,
    /// The code the user must enter
    pub user_code: String,
    /// URL where user must authorize
    pub verification_uri: String,
    /// How long until the codes expire (seconds)
    pub expires_in: u64,
    /// Minimum seconds between polling attempts
    pub interval: u64,
}

/// Terminal result of the polling loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResult {
    /// Access token obtained and persisted
    Authorized,
    /// Device code expired before the user authorized
    Expired,
    /// User declined the authorization request
    Denied,
    /// `max_attempts` polls without a decision
    Exhausted,
}

impl PollResult {
    pub fn is_success(&self) -> bool {
        matches!(self, PollResult::Authorized)
    }

    pub fn message(&self) -> &'static str {
        match self {
            PollResult::Authorized => "Successfully authenticated with GitHub Copilot",
            PollResult::Expired => "Device code expired before authorization",
            PollResult::Denied => "Authorization was denied",
            PollResult::Exhausted => "Authorization not completed in time",
        }
    }
}
