//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys, backend tokens) are referenced by env-var name in
//! the config and resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::expiry::ExpiryThresholds;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub app: ClientConfig,
    pub backend: BackendConfig,
    pub ai: AiConfig,
    #[serde(default)]
    pub expiry: ExpiryConfig,
    pub views: ViewsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    pub name: String,
    /// Clock tick period. The UI contract is one tick per second.
    #[serde(default = "default_tick_ms")]
    pub tick_interval_ms: u64,
    pub sync_interval_secs: u64,
    #[serde(default)]
    pub state_file: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    #[serde(default)]
    pub auth_token_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AiConfig {
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub image_model: Option<String>,
    pub api_key_env: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExpiryConfig {
    pub low_time_secs: u64,
    pub critical_time_secs: u64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            low_time_secs: 3600,
            critical_time_secs: 900,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ViewsConfig {
    pub enabled: bool,
    pub port: u16,
}

fn default_tick_ms() -> u64 {
    1000
}

fn default_timeout_secs() -> u64 {
    30
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        if config.expiry.critical_time_secs >= config.expiry.low_time_secs {
            anyhow::bail!(
                "expiry.critical_time_secs ({}) must be below expiry.low_time_secs ({})",
                config.expiry.critical_time_secs,
                config.expiry.low_time_secs
            );
        }
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// The AI service key. Startup must fail when it is missing or blank.
    pub fn ai_api_key(&self) -> Result<SecretString> {
        let key = Self::resolve_env(&self.ai.api_key_env)
            .context("AI service API key is required at startup")?;
        if key.trim().is_empty() {
            anyhow::bail!("Environment variable {} is set but empty", self.ai.api_key_env);
        }
        Ok(SecretString::new(key))
    }

    /// Optional bearer token for the marketplace backend.
    pub fn backend_token(&self) -> Option<String> {
        self.backend
            .auth_token_env
            .as_deref()
            .and_then(|env| std::env::var(env).ok())
            .filter(|t| !t.is_empty())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.app.tick_interval_ms.max(1))
    }

    pub fn expiry_thresholds(&self) -> ExpiryThresholds {
        ExpiryThresholds::new(
            chrono::Duration::seconds(self.expiry.low_time_secs as i64),
            chrono::Duration::seconds(self.expiry.critical_time_secs as i64),
        )
    }
}
