//! # Configuration Management Module
//!
//! Centralized, typed configuration for the relay, loaded from TOML with
//! sensible defaults and a small set of environment overrides.
//!
//! ## Configuration Structure
//!
//! - [`DeviceConfig`] - display capacity and pacing between chunks
//! - [`DeliverySection`] - retry budget and backoff unit for the bridge path
//! - [`MailboxConfig`] - mailbox location, credentials and timeouts
//! - [`LoggingConfig`] - log level and optional log file
//!
//! ## Usage
//!
//! ```rust,no_run
//! use braille_relay::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = Config::load("config.toml").await?;
//!     config.apply_env_overrides();
//!     config.validate()?;
//!
//!     println!("Chunk size: {}", config.device.max_chunk_size);
//!     println!("Mailbox: {}", config.mailbox.database_url);
//!
//!     Config::create_default("config.toml").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [device]
//! max_chunk_size = 80
//! inter_chunk_delay_ms = 2000
//! oversized_tokens = "split_all"
//!
//! [delivery]
//! max_retries = 3
//! backoff_unit_ms = 1000
//!
//! [mailbox]
//! database_url = "https://braille-display-default-rtdb.firebasedatabase.app"
//! auth_token = "..."
//! text_path = "/braille_display/text"
//! credentials_path = "firebase-credentials.json"
//!
//! [logging]
//! level = "info"
//! file = "braille-relay.log"
//! ```
//!
//! ## Environment Integration
//!
//! Precedence: CLI args > environment > config file > defaults. Recognized
//! variables: `BRAILLE_RELAY_DATABASE_URL`, `BRAILLE_RELAY_AUTH_TOKEN`,
//! `BRAILLE_RELAY_CREDENTIALS`, `BRAILLE_RELAY_TEXT_PATH`.

use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::delivery::{DeliveryConfig, OversizedTokenPolicy};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Braille cells on the display; the per-chunk character limit.
    pub max_chunk_size: usize,
    /// Pause between chunk writes (ms). 0 disables pacing.
    pub inter_chunk_delay_ms: u64,
    /// Handling of single words longer than `max_chunk_size`.
    pub oversized_tokens: OversizedTokenPolicy,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 80,
            inter_chunk_delay_ms: 2000,
            oversized_tokens: OversizedTokenPolicy::SplitAll,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliverySection {
    /// Attempts per chunk on the bridge path (first try included).
    pub max_retries: u32,
    /// Linear backoff unit (ms); attempt n waits unit * (n + 1).
    pub backoff_unit_ms: u64,
}

impl Default for DeliverySection {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_unit_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailboxConfig {
    /// Base URL of the realtime database holding the slot.
    #[serde(default)]
    pub database_url: String,
    /// Query credential for bridge writes.
    #[serde(default)]
    pub auth_token: String,
    #[serde(default = "default_text_path")]
    pub text_path: String,
    /// Credentials file for the direct session. Missing or invalid files
    /// leave the direct path disabled, as does an empty string.
    #[serde(default = "default_credentials_path", skip_serializing_if = "Option::is_none")]
    pub credentials_path: Option<String>,
    #[serde(default = "default_write_timeout")]
    pub write_timeout_seconds: u64,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_seconds: u64,
}

fn default_text_path() -> String {
    "/braille_display/text".to_string()
}

fn default_credentials_path() -> Option<String> {
    Some("firebase-credentials.json".to_string())
}

fn default_write_timeout() -> u64 {
    15
}

fn default_read_timeout() -> u64 {
    10
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            auth_token: String::new(),
            text_path: default_text_path(),
            credentials_path: default_credentials_path(),
            write_timeout_seconds: default_write_timeout(),
            read_timeout_seconds: default_read_timeout(),
        }
    }
}

impl MailboxConfig {
    pub fn has_bridge_credentials(&self) -> bool {
        !self.database_url.trim().is_empty() && !self.auth_token.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: Some("braille-relay.log".to_string()),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub delivery: DeliverySection,
    #[serde(default)]
    pub mailbox: MailboxConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        Self::from_toml(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Apply `BRAILLE_RELAY_*` variables from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup. Empty values are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = get("BRAILLE_RELAY_DATABASE_URL") {
            self.mailbox.database_url = url;
        }
        if let Some(token) = get("BRAILLE_RELAY_AUTH_TOKEN") {
            self.mailbox.auth_token = token;
        }
        if let Some(path) = get("BRAILLE_RELAY_CREDENTIALS") {
            self.mailbox.credentials_path = Some(path);
        }
        if let Some(path) = get("BRAILLE_RELAY_TEXT_PATH") {
            self.mailbox.text_path = path;
        }
    }

    /// Reject values the delivery loop cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.device.max_chunk_size == 0 {
            return Err(anyhow!("device.max_chunk_size must be at least 1"));
        }
        if self.delivery.max_retries == 0 {
            return Err(anyhow!("delivery.max_retries must be at least 1"));
        }
        if self.mailbox.text_path.trim_matches('/').is_empty() {
            return Err(anyhow!("mailbox.text_path must name a location"));
        }
        let url = self.mailbox.database_url.trim();
        if !url.is_empty() && !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(anyhow!(
                "mailbox.database_url must start with https:// (got '{}')",
                url
            ));
        }
        if self.mailbox.write_timeout_seconds == 0 || self.mailbox.read_timeout_seconds == 0 {
            return Err(anyhow!("mailbox timeouts must be at least 1 second"));
        }
        Ok(())
    }

    /// Per-call delivery parameters derived from this configuration.
    pub fn delivery_config(&self) -> DeliveryConfig {
        DeliveryConfig {
            max_chunk_size: self.device.max_chunk_size,
            inter_chunk_delay: Duration::from_millis(self.device.inter_chunk_delay_ms),
            max_retries: self.delivery.max_retries,
            backoff_unit: Duration::from_millis(self.delivery.backoff_unit_ms),
            oversized_tokens: self.device.oversized_tokens,
        }
    }
}
