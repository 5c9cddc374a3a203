//! Process-wide delivery counters.
//! Cheap relaxed atomics; read back through [`snapshot`] for status output.
use std::sync::atomic::{AtomicU64, Ordering};

static CHUNKS_WRITTEN: AtomicU64 = AtomicU64::new(0);
static CHUNKS_FAILED: AtomicU64 = AtomicU64::new(0);
static DIRECT_FALLBACKS: AtomicU64 = AtomicU64::new(0);
static BRIDGE_RETRIES: AtomicU64 = AtomicU64::new(0);
static BRIDGE_RECOVERED: AtomicU64 = AtomicU64::new(0);
static DELIVERIES_COMPLETED: AtomicU64 = AtomicU64::new(0);
static DELIVERIES_FAILED: AtomicU64 = AtomicU64::new(0);

pub fn inc_chunks_written() {
    CHUNKS_WRITTEN.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_chunks_failed() {
    CHUNKS_FAILED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_direct_fallbacks() {
    DIRECT_FALLBACKS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_bridge_retries() {
    BRIDGE_RETRIES.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_bridge_recovered() {
    BRIDGE_RECOVERED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_deliveries_completed() {
    DELIVERIES_COMPLETED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_deliveries_failed() {
    DELIVERIES_FAILED.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub chunks_written: u64,
    pub chunks_failed: u64,
    pub direct_fallbacks: u64,
    pub bridge_retries: u64,
    pub bridge_recovered: u64,
    pub deliveries_completed: u64,
    pub deliveries_failed: u64,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        chunks_written: CHUNKS_WRITTEN.load(Ordering::Relaxed),
        chunks_failed: CHUNKS_FAILED.load(Ordering::Relaxed),
        direct_fallbacks: DIRECT_FALLBACKS.load(Ordering::Relaxed),
        bridge_retries: BRIDGE_RETRIES.load(Ordering::Relaxed),
        bridge_recovered: BRIDGE_RECOVERED.load(Ordering::Relaxed),
        deliveries_completed: DELIVERIES_COMPLETED.load(Ordering::Relaxed),
        deliveries_failed: DELIVERIES_FAILED.load(Ordering::Relaxed),
    }
}
