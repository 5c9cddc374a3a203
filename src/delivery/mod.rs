//! # Delivery Module
//!
//! Drives a piece of text onto the braille display one chunk at a time.
//!
//! The display reads a single overwritable mailbox slot and never
//! acknowledges what it has shown. Writing chunk N+1 before the reader has
//! consumed chunk N silently loses chunk N, so the [`DeliveryService`]
//! writes strictly in order and sleeps `inter_chunk_delay` between writes.
//! That pause is the only flow control available.
//!
//! ```rust,no_run
//! use braille_relay::config::Config;
//! use braille_relay::delivery::DeliveryService;
//! use braille_relay::mailbox::MailboxSession;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let session = MailboxSession::establish(&config.mailbox).await;
//!     let service = DeliveryService::new(session);
//!     let outcome = service
//!         .deliver("Chapter one. It was a bright cold day in April.", &config.delivery_config())
//!         .await;
//!     println!("{} ({}/{})", outcome.message, outcome.chunks_sent, outcome.total_chunks);
//!     Ok(())
//! }
//! ```

pub mod chunker;
pub mod outcome;
pub mod retry;

pub use chunker::{Chunk, ChunkError, OversizedTokenPolicy};
pub use outcome::{DeliveryOutcome, DeliveryStatus, NotificationOutcome};
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::logutil::preview;
use crate::mailbox::{MailboxRecord, MailboxSession, TransportError};
use crate::metrics;

/// Per-call delivery parameters. Built from [`crate::config::Config`] or by hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryConfig {
    pub max_chunk_size: usize,
    pub inter_chunk_delay: Duration,
    /// Attempts per chunk on the bridge path.
    pub max_retries: u32,
    pub backoff_unit: Duration,
    pub oversized_tokens: OversizedTokenPolicy,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 80,
            inter_chunk_delay: Duration::from_secs(2),
            max_retries: 3,
            backoff_unit: Duration::from_secs(1),
            oversized_tokens: OversizedTokenPolicy::SplitAll,
        }
    }
}

impl DeliveryConfig {
    pub fn validate(&self) -> Result<(), DeliveryError> {
        if self.max_chunk_size == 0 {
            return Err(DeliveryError::InvalidInput(ChunkError::ZeroLimit.to_string()));
        }
        if self.max_retries == 0 {
            return Err(DeliveryError::InvalidInput(
                "max_retries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.backoff_unit)
    }
}

/// Why a delivery ended in `Error`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("{0}")]
    InvalidInput(String),

    /// Both transport paths gave up on `chunk` (1-based).
    #[error("chunk {chunk} failed after {chunks_sent} delivered: {source}")]
    Transport {
        chunk: usize,
        chunks_sent: usize,
        #[source]
        source: TransportError,
    },

    #[error("delivery cancelled after {chunks_sent} chunk(s)")]
    Cancelled { chunks_sent: usize },
}

impl From<ChunkError> for DeliveryError {
    fn from(e: ChunkError) -> Self {
        DeliveryError::InvalidInput(e.to_string())
    }
}

/// Sequential chunked delivery into one mailbox slot.
///
/// Share it behind an `Arc`: every delivery holds the slot lock from first to
/// last chunk, so concurrent callers targeting the same display are
/// serialized instead of interleaving their chunk streams.
pub struct DeliveryService {
    session: MailboxSession,
    sleeper: Arc<dyn Sleeper>,
    slot_lock: Mutex<()>,
}

impl std::fmt::Debug for DeliveryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryService")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl DeliveryService {
    pub fn new(session: MailboxSession) -> Self {
        Self::with_sleeper(session, Arc::new(TokioSleeper))
    }

    /// Use a custom sleeper for pacing and backoff (tests record instead of waiting).
    pub fn with_sleeper(session: MailboxSession, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            session,
            sleeper,
            slot_lock: Mutex::new(()),
        }
    }

    pub fn session(&self) -> &MailboxSession {
        &self.session
    }

    /// Deliver `text` in order, pacing between chunks. Never panics or errors;
    /// the outcome carries the failure.
    pub async fn deliver(&self, text: &str, config: &DeliveryConfig) -> DeliveryOutcome {
        self.deliver_cancellable(text, config, &CancellationToken::new())
            .await
    }

    /// [`deliver`](Self::deliver) that stops early when `cancel` fires.
    ///
    /// Cancellation is observed before each chunk, while pacing and during
    /// bridge backoff waits; a write already in flight finishes first.
    pub async fn deliver_cancellable(
        &self,
        text: &str,
        config: &DeliveryConfig,
        cancel: &CancellationToken,
    ) -> DeliveryOutcome {
        let primary = self.session.primary_mode();
        if text.trim().is_empty() {
            return DeliveryOutcome::rejected(primary, ChunkError::EmptyText.into());
        }
        if let Err(e) = config.validate() {
            return DeliveryOutcome::rejected(primary, e);
        }
        let split = chunker::split_with(text, config.max_chunk_size, config.oversized_tokens);
        let contents = match split {
            Ok(contents) => contents,
            Err(e) => return DeliveryOutcome::rejected(primary, e.into()),
        };
        let chunks = Chunk::sequence(contents);
        let retry = config.retry_policy();

        let _slot = self.slot_lock.lock().await;
        info!(
            "Delivering {} chars as {} chunk(s) of <= {} (mode={}, delay={}ms)",
            text.chars().count(),
            chunks.len(),
            config.max_chunk_size,
            primary,
            config.inter_chunk_delay.as_millis()
        );

        let mut outcome = DeliveryOutcome::pending(chunks.len(), primary);
        for chunk in &chunks {
            if cancel.is_cancelled() {
                let chunks_sent = outcome.chunks_sent;
                return self.finish_failed(outcome, DeliveryError::Cancelled { chunks_sent });
            }

            let record = MailboxRecord::from_chunk(chunk);
            let written = self
                .session
                .write_until(&record, &retry, self.sleeper.as_ref(), cancel)
                .await;
            match written {
                Ok(mode) => {
                    metrics::inc_chunks_written();
                    outcome.record_sent(mode);
                    debug!(
                        "Chunk {}/{} delivered via {} ('{}')",
                        chunk.index,
                        chunk.total,
                        mode,
                        preview(&chunk.content, 40)
                    );
                }
                Err(_) if cancel.is_cancelled() => {
                    let chunks_sent = outcome.chunks_sent;
                    return self.finish_failed(outcome, DeliveryError::Cancelled { chunks_sent });
                }
                Err(source) => {
                    metrics::inc_chunks_failed();
                    let chunks_sent = outcome.chunks_sent;
                    return self.finish_failed(
                        outcome,
                        DeliveryError::Transport {
                            chunk: chunk.index,
                            chunks_sent,
                            source,
                        },
                    );
                }
            }

            if !chunk.is_last() && !config.inter_chunk_delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        let chunks_sent = outcome.chunks_sent;
                        let cancelled = DeliveryError::Cancelled { chunks_sent };
                        return self.finish_failed(outcome, cancelled);
                    }
                    _ = self.sleeper.sleep(config.inter_chunk_delay) => {}
                }
            }
        }

        metrics::inc_deliveries_completed();
        let done = outcome.complete();
        info!("{} (mode={})", done.message, done.mode);
        done
    }

    fn finish_failed(&self, outcome: DeliveryOutcome, error: DeliveryError) -> DeliveryOutcome {
        metrics::inc_deliveries_failed();
        let failed = outcome.fail(error);
        warn!(
            "{} ({}/{} chunk(s) delivered)",
            failed.message, failed.chunks_sent, failed.total_chunks
        );
        failed
    }

    /// Write one short message without chunking, e.g. a status notice.
    ///
    /// Same direct-then-bridge rule as chunked deliveries; the bridge uses
    /// the default retry budget.
    pub async fn deliver_single(&self, message: &str) -> NotificationOutcome {
        self.deliver_single_with(message, &RetryPolicy::default())
            .await
    }

    pub async fn deliver_single_with(
        &self,
        message: &str,
        retry: &RetryPolicy,
    ) -> NotificationOutcome {
        let primary = self.session.primary_mode();
        if message.trim().is_empty() {
            return NotificationOutcome {
                status: DeliveryStatus::Error,
                mode: primary,
                message: ChunkError::EmptyText.to_string(),
            };
        }

        let _slot = self.slot_lock.lock().await;
        let record = MailboxRecord::notification(message);
        match self.session.write(&record, retry, self.sleeper.as_ref()).await {
            Ok(mode) => {
                metrics::inc_chunks_written();
                info!("Notification sent via {} ('{}')", mode, preview(message, 40));
                NotificationOutcome {
                    status: DeliveryStatus::Success,
                    mode,
                    message: "Message sent".to_string(),
                }
            }
            Err(e) => {
                metrics::inc_chunks_failed();
                warn!("Notification failed: {}", e);
                NotificationOutcome {
                    status: DeliveryStatus::Error,
                    mode: primary,
                    message: e.to_string(),
                }
            }
        }
    }
}
