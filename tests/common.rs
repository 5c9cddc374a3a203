//! Test doubles shared by the integration tests.
//! Transports record what they were asked to write; sleepers record waits instead of waiting.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use braille_relay::delivery::{DeliveryService, Sleeper};
use braille_relay::mailbox::{
    MailboxRecord, MailboxSession, MailboxTransport, TransportError, TransportErrorKind,
    TransportMode,
};
use tokio_util::sync::CancellationToken;

pub const SAMPLE: &str =
    "This is a test message that should be split into multiple chunks based on the character limit.";

enum Behavior {
    Succeed,
    /// Fail with these kinds in order, then succeed.
    Script(Mutex<VecDeque<TransportErrorKind>>),
    Always(TransportErrorKind),
    /// Fail whenever the record's chunk number is listed.
    OnChunks(Vec<usize>, TransportErrorKind),
}

/// Transport double counting every attempt and keeping successful writes.
pub struct FakeTransport {
    name: &'static str,
    mode: TransportMode,
    behavior: Behavior,
    attempts: AtomicUsize,
    written: Mutex<Vec<MailboxRecord>>,
}

impl FakeTransport {
    fn build(mode: TransportMode, behavior: Behavior) -> Arc<Self> {
        let name = match mode {
            TransportMode::Direct => "fake-direct",
            TransportMode::Bridge => "fake-bridge",
            TransportMode::Mock => "fake-mock",
        };
        Arc::new(Self {
            name,
            mode,
            behavior,
            attempts: AtomicUsize::new(0),
            written: Mutex::new(Vec::new()),
        })
    }

    pub fn ok(mode: TransportMode) -> Arc<Self> {
        Self::build(mode, Behavior::Succeed)
    }

    pub fn flaky(mode: TransportMode, failures: Vec<TransportErrorKind>) -> Arc<Self> {
        Self::build(mode, Behavior::Script(Mutex::new(failures.into())))
    }

    pub fn failing(mode: TransportMode, kind: TransportErrorKind) -> Arc<Self> {
        Self::build(mode, Behavior::Always(kind))
    }

    pub fn failing_on(
        mode: TransportMode,
        chunks: Vec<usize>,
        kind: TransportErrorKind,
    ) -> Arc<Self> {
        Self::build(mode, Behavior::OnChunks(chunks, kind))
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn written(&self) -> Vec<MailboxRecord> {
        self.written.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.written().into_iter().map(|r| r.text).collect()
    }

    fn next_failure(&self, record: &MailboxRecord) -> Option<TransportErrorKind> {
        match &self.behavior {
            Behavior::Succeed => None,
            Behavior::Script(queue) => queue.lock().unwrap().pop_front(),
            Behavior::Always(kind) => Some(*kind),
            Behavior::OnChunks(chunks, kind) => record
                .chunk_number
                .filter(|n| chunks.contains(n))
                .map(|_| *kind),
        }
    }
}

#[async_trait]
impl MailboxTransport for FakeTransport {
    fn name(&self) -> &'static str {
        self.name
    }

    fn mode(&self) -> TransportMode {
        self.mode
    }

    async fn write(&self, record: &MailboxRecord) -> Result<(), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(kind) = self.next_failure(record) {
            let message = format!("{} refused {}", self.name, record.position_label());
            return Err(TransportError::new(kind, message));
        }
        self.written.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Records every requested wait and yields once so other tasks can run.
#[derive(Default)]
pub struct RecordingSleeper {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.waits.lock().unwrap().push(duration);
        tokio::task::yield_now().await;
    }
}

/// Cancels `token` the first time a wait is requested.
pub struct CancellingSleeper {
    pub token: CancellationToken,
}

#[async_trait]
impl Sleeper for CancellingSleeper {
    async fn sleep(&self, _duration: Duration) {
        self.token.cancel();
    }
}

pub fn session(direct: Option<Arc<FakeTransport>>, bridge: Arc<FakeTransport>) -> MailboxSession {
    MailboxSession::from_parts(
        direct.map(|d| d as Arc<dyn MailboxTransport>),
        bridge as Arc<dyn MailboxTransport>,
    )
}

pub fn service(
    direct: Option<Arc<FakeTransport>>,
    bridge: Arc<FakeTransport>,
    sleeper: Arc<RecordingSleeper>,
) -> DeliveryService {
    DeliveryService::with_sleeper(session(direct, bridge), sleeper)
}
