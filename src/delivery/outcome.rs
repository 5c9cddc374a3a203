//! Structured results handed back to callers of the delivery service.

use serde::Serialize;

use super::DeliveryError;
use crate::mailbox::TransportMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Success,
    Error,
}

/// Result of a chunked delivery.
///
/// Built up while chunks are written; `chunks_sent` never exceeds
/// `total_chunks`.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryOutcome {
    pub status: DeliveryStatus,
    pub chunks_sent: usize,
    pub total_chunks: usize,
    pub mode: TransportMode,
    pub message: String,
    #[serde(skip)]
    pub error: Option<DeliveryError>,
    #[serde(skip)]
    served: ModeTally,
}

#[derive(Debug, Clone, Copy, Default)]
struct ModeTally {
    direct: usize,
    bridge: usize,
    mock: usize,
}

impl ModeTally {
    fn add(&mut self, mode: TransportMode) {
        match mode {
            TransportMode::Direct => self.direct += 1,
            TransportMode::Bridge => self.bridge += 1,
            TransportMode::Mock => self.mock += 1,
        }
    }

    /// Mode that served the most writes; `fallback` wins ties it takes part in.
    fn majority(&self, fallback: TransportMode) -> TransportMode {
        let count = |m: TransportMode| match m {
            TransportMode::Direct => self.direct,
            TransportMode::Bridge => self.bridge,
            TransportMode::Mock => self.mock,
        };
        let mut best = fallback;
        for mode in [TransportMode::Direct, TransportMode::Bridge, TransportMode::Mock] {
            if count(mode) > count(best) {
                best = mode;
            }
        }
        best
    }
}

impl DeliveryOutcome {
    /// Outcome for a delivery stopped before any chunk was produced.
    pub fn rejected(mode: TransportMode, error: DeliveryError) -> Self {
        Self {
            status: DeliveryStatus::Error,
            chunks_sent: 0,
            total_chunks: 0,
            mode,
            message: error.to_string(),
            error: Some(error),
            served: ModeTally::default(),
        }
    }

    pub(crate) fn pending(total_chunks: usize, mode: TransportMode) -> Self {
        Self {
            status: DeliveryStatus::Success,
            chunks_sent: 0,
            total_chunks,
            mode,
            message: String::new(),
            error: None,
            served: ModeTally::default(),
        }
    }

    pub(crate) fn record_sent(&mut self, mode: TransportMode) {
        debug_assert!(self.chunks_sent < self.total_chunks);
        self.chunks_sent += 1;
        self.served.add(mode);
    }

    pub(crate) fn complete(mut self) -> Self {
        self.mode = self.served.majority(self.mode);
        self.status = DeliveryStatus::Success;
        self.message = format!(
            "Successfully sent {} chunk(s) to braille device",
            self.chunks_sent
        );
        self
    }

    pub(crate) fn fail(mut self, error: DeliveryError) -> Self {
        self.mode = self.served.majority(self.mode);
        self.status = DeliveryStatus::Error;
        self.message = format!("Error sending text: {error}");
        self.error = Some(error);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == DeliveryStatus::Success
    }
}

/// Result of a single unchunked notification.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationOutcome {
    pub status: DeliveryStatus,
    pub mode: TransportMode,
    pub message: String,
}

impl NotificationOutcome {
    pub fn is_success(&self) -> bool {
        self.status == DeliveryStatus::Success
    }
}
