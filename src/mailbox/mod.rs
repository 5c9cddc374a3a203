//! # Mailbox Transport Module
//!
//! The braille display polls one remote location, the *mailbox slot*, and
//! renders whatever record it finds there. There is no queue and no
//! acknowledgment: every write replaces the previous record.
//!
//! This module defines the write side of that slot:
//!
//! - [`MailboxTransport`] - one blocking write of one [`MailboxRecord`]
//! - [`DirectClient`] - privileged session client (bearer token), used first
//! - [`BridgeClient`] - generic authenticated HTTP PUT, the fallback path
//! - [`MockMailbox`] - in-memory, logging-only stand-in when nothing is configured
//! - [`MailboxSession`] - built once at startup; composes direct and bridge
//!
//! ## Payload
//!
//! ```json
//! { "text": "This is a test", "chunk_number": 1, "total_chunks": 5, "timestamp": 1718000000.25 }
//! ```
//!
//! Notifications drop the chunk fields and add `"type": "notification"`.

pub mod bridge;
pub mod direct;
pub mod mock;

pub use bridge::{BridgeClient, BridgeSettings};
pub use direct::{DirectClient, DirectCredentials};
pub use mock::MockMailbox;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::MailboxConfig;
use crate::delivery::chunker::Chunk;
use crate::delivery::retry::{RetryPolicy, Sleeper};
use crate::logutil::preview;
use crate::metrics;

/// Which transport path served a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    Direct,
    Bridge,
    Mock,
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportMode::Direct => write!(f, "direct"),
            TransportMode::Bridge => write!(f, "bridge"),
            TransportMode::Mock => write!(f, "mock"),
        }
    }
}

/// Failure class of a transport write. Drives the retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    Timeout,
    ConnectionFailure,
    TlsFailure,
    Other,
}

impl TransportErrorKind {
    /// Timeouts, refused/reset connections and TLS failures share the linear backoff schedule.
    pub fn is_transient(self) -> bool {
        !matches!(self, TransportErrorKind::Other)
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::ConnectionFailure => "connection failure",
            TransportErrorKind::TlsFailure => "TLS failure",
            TransportErrorKind::Other => "transport error",
        };
        f.write_str(s)
    }
}

/// Error raised by a single mailbox write.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::ConnectionFailure, message)
    }

    pub fn tls(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::TlsFailure, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Other, message)
    }
}

/// The record written into the mailbox slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailboxRecord {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_number: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<usize>,
    /// Seconds since the Unix epoch, fractional.
    pub timestamp: f64,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl MailboxRecord {
    /// Record for one chunk of a chunked delivery, stamped with the current time.
    pub fn from_chunk(chunk: &Chunk) -> Self {
        Self {
            text: chunk.content.clone(),
            chunk_number: Some(chunk.index),
            total_chunks: Some(chunk.total),
            timestamp: epoch_seconds(),
            kind: None,
        }
    }

    /// Short standalone message without chunk accounting.
    pub fn notification(text: &str) -> Self {
        Self {
            text: text.to_string(),
            chunk_number: None,
            total_chunks: None,
            timestamp: epoch_seconds(),
            kind: Some("notification".to_string()),
        }
    }

    /// `i/n` label for logs; `-` for notifications.
    pub fn position_label(&self) -> String {
        match (self.chunk_number, self.total_chunks) {
            (Some(i), Some(n)) => format!("{i}/{n}"),
            _ => "-".to_string(),
        }
    }
}

fn epoch_seconds() -> f64 {
    let now = chrono::Utc::now();
    now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1_000_000.0
}

/// One write of one record into the remote slot.
///
/// Implementations must be `Send + Sync`: a [`MailboxSession`] is shared by
/// every delivery the process makes.
#[async_trait]
pub trait MailboxTransport: Send + Sync {
    /// Short name for logging ("direct", "bridge", "mock", ...).
    fn name(&self) -> &'static str;

    /// Path reported in [`crate::delivery::DeliveryOutcome::mode`] when this
    /// transport serves a write.
    fn mode(&self) -> TransportMode;

    /// Overwrite the slot with `record`.
    async fn write(&self, record: &MailboxRecord) -> Result<(), TransportError>;
}

/// Transports established once at process start.
///
/// `direct` is `Some` only when a privileged session could be opened; the
/// bridge slot always holds something, a [`MockMailbox`] when no bridge
/// credentials exist.
#[derive(Clone)]
pub struct MailboxSession {
    direct: Option<Arc<dyn MailboxTransport>>,
    bridge: Arc<dyn MailboxTransport>,
}

impl fmt::Debug for MailboxSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailboxSession")
            .field("direct", &self.direct.as_ref().map(|d| d.name()))
            .field("bridge", &self.bridge.name())
            .finish()
    }
}

impl MailboxSession {
    /// Assemble a session from already-built transports.
    pub fn from_parts(
        direct: Option<Arc<dyn MailboxTransport>>,
        bridge: Arc<dyn MailboxTransport>,
    ) -> Self {
        Self { direct, bridge }
    }

    /// Session that only logs; nothing leaves the process.
    pub fn mock() -> Self {
        Self::from_parts(None, Arc::new(MockMailbox::new()))
    }

    /// Open the transports described by `config`.
    ///
    /// Never fails: a missing or unusable credential file leaves the direct
    /// path unset, and missing bridge credentials fall back to mock mode, so
    /// the surrounding application keeps working without hardware.
    pub async fn establish(config: &MailboxConfig) -> Self {
        let credentials = config
            .credentials_path
            .as_deref()
            .filter(|p| !p.trim().is_empty());
        let direct: Option<Arc<dyn MailboxTransport>> = match credentials {
            Some(path) if !config.database_url.is_empty() => {
                match DirectClient::establish(config, path).await {
                    Ok(client) => {
                        info!("Direct mailbox session established ({})", path);
                        Some(Arc::new(client))
                    }
                    Err(e) => {
                        warn!("Direct mailbox session skipped: {e:#}; using bridge path");
                        None
                    }
                }
            }
            _ => None,
        };

        let bridge: Arc<dyn MailboxTransport> = if config.has_bridge_credentials() {
            match BridgeClient::new(BridgeSettings::from_config(config)) {
                Ok(client) => Arc::new(client),
                Err(e) => {
                    warn!("Bridge client unavailable: {e}; running in mock mode");
                    Arc::new(MockMailbox::new())
                }
            }
        } else {
            info!("Mailbox database_url/auth_token not configured; running in mock mode");
            Arc::new(MockMailbox::new())
        };

        Self { direct, bridge }
    }

    pub fn has_direct(&self) -> bool {
        self.direct.is_some()
    }

    /// Mode expected to serve writes: direct when a session exists, otherwise the bridge's mode.
    pub fn primary_mode(&self) -> TransportMode {
        match &self.direct {
            Some(direct) => direct.mode(),
            None => self.bridge.mode(),
        }
    }

    pub fn bridge(&self) -> &Arc<dyn MailboxTransport> {
        &self.bridge
    }

    /// Write one record: direct once, then the bridge under `retry`.
    ///
    /// A direct failure of any kind is logged and abandoned for this record;
    /// the bridge gets the full retry budget. Returns the mode that served
    /// the write, or the bridge's final error.
    pub async fn write(
        &self,
        record: &MailboxRecord,
        retry: &RetryPolicy,
        sleeper: &dyn Sleeper,
    ) -> Result<TransportMode, TransportError> {
        self.write_until(record, retry, sleeper, &CancellationToken::new())
            .await
    }

    /// [`write`](Self::write) whose bridge backoff waits end early when
    /// `cancel` fires; the last bridge error is returned in that case.
    pub async fn write_until(
        &self,
        record: &MailboxRecord,
        retry: &RetryPolicy,
        sleeper: &dyn Sleeper,
        cancel: &CancellationToken,
    ) -> Result<TransportMode, TransportError> {
        if let Some(direct) = &self.direct {
            match direct.write(record).await {
                Ok(()) => {
                    debug!(
                        "Wrote {} via {} ('{}')",
                        record.position_label(),
                        direct.name(),
                        preview(&record.text, 40)
                    );
                    return Ok(direct.mode());
                }
                Err(e) => {
                    metrics::inc_direct_fallbacks();
                    warn!(
                        "Direct write of {} failed ({}); falling back to {}",
                        record.position_label(),
                        e,
                        self.bridge.name()
                    );
                }
            }
        }

        retry
            .send_with_retry_until(self.bridge.as_ref(), record, sleeper, cancel)
            .await
            .map(|()| self.bridge.mode())
    }
}
