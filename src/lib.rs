//! # Braille Relay - chunked text delivery for refreshable braille displays
//!
//! A small braille display shows a fixed number of cells and polls a single
//! remote mailbox slot for what to render. Braille Relay takes arbitrary
//! text, splits it at word boundaries into display-sized chunks and writes
//! them one at a time into that slot, pacing the writes so the reader has
//! time to consume each one before it is overwritten.
//!
//! ## Features
//!
//! - **Word-respecting chunker**: greedy packing, character (not byte) counting,
//!   configurable oversized-word handling.
//! - **Two transport paths**: a privileged direct session when credentials are
//!   present, an authenticated HTTP bridge otherwise.
//! - **Bounded retries**: linear backoff for timeouts, connection and TLS failures
//!   and gateway errors; one extra try for anything else.
//! - **Mock mode**: with nothing configured every write is logged instead of sent.
//! - **Async design**: Tokio throughout, cancellable deliveries, one delivery per slot at a time.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use braille_relay::config::Config;
//! use braille_relay::delivery::DeliveryService;
//! use braille_relay::mailbox::MailboxSession;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = Config::load("config.toml").await?;
//!     config.apply_env_overrides();
//!
//!     let session = MailboxSession::establish(&config.mailbox).await;
//!     let service = DeliveryService::new(session);
//!     let outcome = service.deliver("Hello from the relay", &config.delivery_config()).await;
//!     println!("{}", outcome.message);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`delivery`] - chunker, retry policy, orchestrator and outcomes
//! - [`mailbox`] - slot record, transport trait, direct/bridge/mock clients
//! - [`source`] - text producers used by the CLI
//! - [`config`] - configuration loading and validation
//! - [`logutil`] - single-line log previews and secret redaction
//! - [`metrics`] - process-wide delivery counters
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   TextSource    │ ← OCR, files, stdin
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │ DeliveryService │ ← chunking, pacing, slot lock
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │ MailboxSession  │ ← direct once, bridge with retries
//! └─────────────────┘
//! ```

pub mod config;
pub mod delivery;
pub mod logutil;
pub mod mailbox;
pub mod metrics;
pub mod source;
