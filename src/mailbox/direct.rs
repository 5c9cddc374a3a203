//! Direct client: privileged session writes.
//!
//! The session is opened once from a credentials file holding a pre-issued
//! access token:
//!
//! ```json
//! { "access_token": "ya29.a0Af...", "token_type": "Bearer", "expires_at": "2026-10-18T12:00:00Z" }
//! ```
//!
//! Unlike the bridge, the client keeps its connection pool; a write is a
//! single atomic PUT with `print=silent` and no retry wrapper.

use std::fmt;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;

use super::bridge::{classify_reqwest, resource_url, status_error};
use super::{MailboxRecord, MailboxTransport, TransportError, TransportMode};
use crate::config::MailboxConfig;
use crate::logutil::redact;

/// Parsed credentials file.
#[derive(Clone, Deserialize)]
pub struct DirectCredentials {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl fmt::Debug for DirectCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectCredentials")
            .field("access_token", &redact(&self.access_token))
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl DirectCredentials {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read credentials file {}", path.display()))?;
        let creds: DirectCredentials = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse credentials file {}", path.display()))?;
        creds.check(Utc::now())?;
        Ok(creds)
    }

    /// Reject blank or expired tokens before any write is attempted.
    pub fn check(&self, now: DateTime<Utc>) -> Result<()> {
        if self.access_token.trim().is_empty() {
            return Err(anyhow!("credentials file has an empty access_token"));
        }
        if let Some(expiry) = self.expires_at {
            if expiry <= now {
                return Err(anyhow!("access token expired at {}", expiry.to_rfc3339()));
            }
        }
        Ok(())
    }
}

/// Session-based direct transport.
#[derive(Debug, Clone)]
pub struct DirectClient {
    url: String,
    client: reqwest::Client,
}

impl DirectClient {
    /// Open the privileged session described by `config` and the credentials file at `path`.
    pub async fn establish(config: &MailboxConfig, path: &str) -> Result<Self> {
        let creds = DirectCredentials::load(path).await?;
        Self::with_credentials(config, &creds)
    }

    pub fn with_credentials(config: &MailboxConfig, creds: &DirectCredentials) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let value = format!("{} {}", creds.token_type, creds.access_token);
        let mut auth = HeaderValue::from_str(&value)
            .context("access token contains characters not valid in a header")?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(config.write_timeout_seconds))
            .build()
            .context("failed to build direct session client")?;

        Ok(Self {
            url: format!(
                "{}?print=silent",
                resource_url(&config.database_url, &config.text_path)
            ),
            client,
        })
    }
}

#[async_trait]
impl MailboxTransport for DirectClient {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn mode(&self) -> TransportMode {
        TransportMode::Direct
    }

    async fn write(&self, record: &MailboxRecord) -> Result<(), TransportError> {
        let response = self
            .client
            .put(&self.url)
            .json(record)
            .send()
            .await
            .map_err(classify_reqwest)?;

        let status = response.status();
        if status.is_success() {
            debug!("Direct set of {} accepted ({})", record.position_label(), status);
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(status_error(status, "direct set", &body))
        }
    }
}
