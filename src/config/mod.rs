//! Configuration management for llm-council

use crate::llm::auth::{CopilotEndpoints, DEFAULT_API_TOKEN_TTL};
use crate::llm::OPENROUTER_API_URL;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_NAME: &str = "llm-council";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub council: CouncilConfig,
    pub openrouter: OpenRouterConfig,
    pub copilot: CopilotConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8001,
            cors_origins: vec![
                "http://localhost:5173".to_string(),
                "http://localhost:3000".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanOut {
    #[default]
    Parallel,
    Sequential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CouncilConfig {
    /// Council members, as model identifiers
    pub models: Vec<String>,
    /// Synthesises the final answer
    pub chairman_model: String,
    pub title_model: String,
    pub query_timeout_secs: u64,
    pub title_timeout_secs: u64,
    pub fan_out: FanOut,
    /// Pause between queries when `fan_out = "sequential"`
    pub sequential_delay_ms: u64,
}

impl Default for CouncilConfig {
    fn default() -> Self {
        Self {
            models: vec![
                "copilot/gpt-4o".to_string(),
                "copilot/claude-sonnet-4".to_string(),
                "copilot/gemini-2.5-pro".to_string(),
                "copilot/o4-mini".to_string(),
            ],
            chairman_model: "copilot/gpt-4o".to_string(),
            title_model: "copilot/gpt-4o-mini".to_string(),
            query_timeout_secs: 120,
            title_timeout_secs: 30,
            fan_out: FanOut::Parallel,
            sequential_delay_ms: 1000,
        }
    }
}

impl CouncilConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn title_timeout(&self) -> Duration {
        Duration::from_secs(self.title_timeout_secs)
    }

    pub fn sequential_delay(&self) -> Duration {
        Duration::from_millis(self.sequential_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenRouterConfig {
    pub api_url: String,
    /// Overridden by `OPENROUTER_API_KEY`
    pub api_key: Option<String>,
    /// Advertised models; empty uses the built-in list
    pub models: Vec<String>,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_url: OPENROUTER_API_URL.to_string(),
            api_key: None,
            models: Vec::new(),
        }
    }
}

impl OpenRouterConfig {
    pub fn resolved_api_key(&self) -> Option<String> {
        std::env::var("OPENROUTER_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .or_else(|| self.api_key.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CopilotConfig {
    /// Advertised models; empty uses the Copilot allow-list
    pub models: Vec<String>,
    pub api_token_ttl_secs: u64,
    pub poll_interval_secs: u64,
    pub poll_max_attempts: u32,
    pub device_code_url: String,
    pub access_token_url: String,
    pub api_token_url: String,
    pub chat_url: String,
}

impl Default for CopilotConfig {
    fn default() -> Self {
        let endpoints = CopilotEndpoints::default();
        Self {
            models: Vec::new(),
            api_token_ttl_secs: DEFAULT_API_TOKEN_TTL.as_secs(),
            poll_interval_secs: 5,
            poll_max_attempts: 24,
            device_code_url: endpoints.device_code_url,
            access_token_url: endpoints.access_token_url,
            api_token_url: endpoints.api_token_url,
            chat_url: endpoints.chat_url,
        }
    }
}

impl CopilotConfig {
    pub fn endpoints(&self) -> CopilotEndpoints {
        CopilotEndpoints {
            device_code_url: self.device_code_url.clone(),
            access_token_url: self.access_token_url.clone(),
            api_token_url: self.api_token_url.clone(),
            chat_url: self.chat_url.clone(),
        }
    }

    pub fn api_token_ttl(&self) -> Duration {
        Duration::from_secs(self.api_token_ttl_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Defaults to the platform data directory
    pub data_dir: Option<PathBuf>,
}

impl Config {
    /// Load from the default location; a missing file yields defaults
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Invalid config file {}", path.display()))?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", APP_NAME) {
            let config_dir = proj_dirs.config_dir();
            std::fs::create_dir_all(config_dir)?;
            Ok(config_dir.join("config.toml"))
        } else {
            Ok(PathBuf::from("config.toml"))
        }
    }

    /// Directory holding credentials and conversations
    pub fn data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.storage.data_dir {
            return dir.clone();
        }
        directories::ProjectDirs::from("", "", APP_NAME)
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("data"))
    }

    /// Write the configuration as pretty-printed TOML
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}
