//! Mock mailbox used when no credentials are configured.
//! Logs each write and keeps the slot in memory so `peek`-style checks still work.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use log::info;

use super::{MailboxRecord, MailboxTransport, TransportError, TransportMode};
use crate::logutil::preview;

#[derive(Debug, Default)]
pub struct MockMailbox {
    slot: Mutex<Option<MailboxRecord>>,
    writes: AtomicUsize,
}

impl MockMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record currently held in the in-memory slot.
    pub fn slot(&self) -> Option<MailboxRecord> {
        self.slot.lock().ok().and_then(|guard| guard.clone())
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MailboxTransport for MockMailbox {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn mode(&self) -> TransportMode {
        TransportMode::Mock
    }

    async fn write(&self, record: &MailboxRecord) -> Result<(), TransportError> {
        info!(
            "[MOCK] Chunk {}: {}",
            record.position_label(),
            preview(&record.text, 50)
        );
        if let Ok(mut guard) = self.slot.lock() {
            *guard = Some(record.clone());
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
