//! Bounded retry with linear backoff for bridge writes.
//!
//! Timeouts, connection failures and TLS failures wait `unit * (n + 1)`
//! after failed attempt `n` (0-indexed) and retry until `max_attempts` is
//! used up. Anything else gets a single extra attempt after one flat `unit`.
//! The last error is returned unchanged so callers still see its kind.

use std::time::Duration;

use async_trait::async_trait;
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::logutil::preview;
use crate::mailbox::{MailboxRecord, MailboxTransport, TransportError};
use crate::metrics;

/// Suspension point used for pacing and backoff waits.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_unit: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_unit: Duration) -> Self {
        Self {
            max_attempts,
            backoff_unit,
        }
    }

    /// Wait after failed transient attempt `attempt` (0-indexed).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff_unit.saturating_mul(attempt.saturating_add(1))
    }

    /// Write `record` through `transport`, retrying per the policy.
    pub async fn send_with_retry(
        &self,
        transport: &dyn MailboxTransport,
        record: &MailboxRecord,
        sleeper: &dyn Sleeper,
    ) -> Result<(), TransportError> {
        self.send_with_retry_until(transport, record, sleeper, &CancellationToken::new())
            .await
    }

    /// [`send_with_retry`](Self::send_with_retry) that gives up when `cancel`
    /// fires during a backoff wait, returning the error that caused the wait.
    pub async fn send_with_retry_until(
        &self,
        transport: &dyn MailboxTransport,
        record: &MailboxRecord,
        sleeper: &dyn Sleeper,
        cancel: &CancellationToken,
    ) -> Result<(), TransportError> {
        let attempts = self.max_attempts.max(1);
        let mut other_retried = false;
        let mut attempt: u32 = 0;

        loop {
            let err = match transport.write(record).await {
                Ok(()) => {
                    if attempt > 0 {
                        metrics::inc_bridge_recovered();
                        info!(
                            "Chunk {} written via {} after {} attempt(s)",
                            record.position_label(),
                            transport.name(),
                            attempt + 1
                        );
                    }
                    return Ok(());
                }
                Err(e) => e,
            };

            let exhausted = attempt + 1 >= attempts;
            let delay = if err.kind.is_transient() {
                warn!(
                    "{} on attempt {}/{} for chunk {} ('{}')",
                    err,
                    attempt + 1,
                    attempts,
                    record.position_label(),
                    preview(&record.text, 30)
                );
                self.backoff_for(attempt)
            } else if other_retried {
                error!(
                    "Chunk {} failed again via {}: {}",
                    record.position_label(),
                    transport.name(),
                    err
                );
                return Err(err);
            } else {
                other_retried = true;
                warn!(
                    "Error sending chunk {} via {}: {}",
                    record.position_label(),
                    transport.name(),
                    err
                );
                self.backoff_unit
            };

            if exhausted {
                error!(
                    "Chunk {} failed after {} attempt(s) via {}",
                    record.position_label(),
                    attempts,
                    transport.name()
                );
                return Err(err);
            }

            metrics::inc_bridge_retries();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(
                        "Retries for chunk {} abandoned: delivery cancelled",
                        record.position_label()
                    );
                    return Err(err);
                }
                _ = sleeper.sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}
