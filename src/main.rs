//! Binary entrypoint for the braille-relay CLI.
//!
//! Commands:
//! - `send [TEXT] [--file F]` - chunk and deliver text to the display
//! - `notify <MESSAGE>` - write one short unchunked message
//! - `chunk [TEXT] [--file F]` - preview chunking offline, nothing is sent
//! - `peek` - print the record currently in the mailbox slot
//! - `smoke-test` - write a test record, read it back and print JSON
//! - `init` - create a starter `config.toml`
//! - `status` - print the resolved configuration and transport mode
//!
//! See the library crate docs for module-level details: `braille_relay::`.
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use braille_relay::config::Config;
use braille_relay::delivery::{chunker, DeliveryService};
use braille_relay::logutil::{escape_log, redact};
use braille_relay::mailbox::{BridgeClient, BridgeSettings, MailboxSession};
use braille_relay::metrics;
use braille_relay::source;

#[derive(Parser)]
#[command(name = "braille-relay")]
#[command(about = "Deliver text to a refreshable braille display through its mailbox slot")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Chunk text and deliver it to the display
    Send {
        /// Text to send; `-` or omitted reads stdin
        text: Option<String>,
        /// Read text from a file instead
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Override the display's cell count
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Override the pause between chunks (milliseconds)
        #[arg(long)]
        delay_ms: Option<u64>,
        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write one short message without chunking
    Notify { message: String },
    /// Show how text would be chunked without sending anything
    Chunk {
        text: Option<String>,
        #[arg(short, long)]
        file: Option<PathBuf>,
        #[arg(long)]
        chunk_size: Option<usize>,
    },
    /// Print the record currently in the mailbox slot
    Peek,
    /// Write a test record, read it back and report as JSON
    SmokeTest {
        #[arg(long, default_value = "braille-relay smoke test")]
        text: String,
    },
    /// Initialize a new configuration file
    Init,
    /// Show resolved configuration and transport mode
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Init = cli.command {
        init_logging(&None, cli.verbose);
        if std::path::Path::new(&cli.config).exists() {
            warn!("{} already exists; leaving it untouched", cli.config);
            return Ok(());
        }
        Config::create_default(&cli.config).await?;
        info!("Configuration file created at {}", cli.config);
        return Ok(());
    }

    let config = load_config(&cli.config).await?;
    init_logging(&Some(config.clone()), cli.verbose);

    let ok = match cli.command {
        Commands::Send {
            text,
            file,
            chunk_size,
            delay_ms,
            json,
        } => {
            let src = source::select(text, file);
            let text = src.produce_text().await?;
            info!("Read {} chars from {}", text.chars().count(), src.label());

            let mut dc = config.delivery_config();
            if let Some(n) = chunk_size {
                dc.max_chunk_size = n;
            }
            if let Some(ms) = delay_ms {
                dc.inter_chunk_delay = std::time::Duration::from_millis(ms);
            }

            let session = MailboxSession::establish(&config.mailbox).await;
            let service = DeliveryService::new(session);
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                warn!(
                    "Interrupt received; stopping after the current write (Ctrl-C again to abort)"
                );
                on_signal.cancel();
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Second interrupt; aborting");
                    std::process::exit(130);
                }
            });

            let outcome = service.deliver_cancellable(&text, &dc, &cancel).await;
            if json {
                println!("{}", serde_json::to_string(&outcome)?);
            } else {
                println!(
                    "{} [{}/{} via {}]",
                    outcome.message, outcome.chunks_sent, outcome.total_chunks, outcome.mode
                );
            }
            outcome.is_success()
        }
        Commands::Notify { message } => {
            let session = MailboxSession::establish(&config.mailbox).await;
            let service = DeliveryService::new(session);
            let outcome = service
                .deliver_single_with(&message, &config.delivery_config().retry_policy())
                .await;
            println!("{} (via {})", outcome.message, outcome.mode);
            outcome.is_success()
        }
        Commands::Chunk {
            text,
            file,
            chunk_size,
        } => {
            let src = source::select(text, file);
            let text = src.produce_text().await?;
            let size = chunk_size.unwrap_or(config.device.max_chunk_size);
            let pieces = chunker::split_with(&text, size, config.device.oversized_tokens)
                .map_err(|e| anyhow!("{}", e))?;
            let total = pieces.len();
            for (i, piece) in pieces.iter().enumerate() {
                println!(
                    "{:>3}/{} [{:>2}] {}",
                    i + 1,
                    total,
                    piece.chars().count(),
                    escape_log(piece)
                );
            }
            true
        }
        Commands::Peek => {
            let bridge = bridge_client(&config)?;
            match bridge.read_slot().await? {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => println!("(slot is empty)"),
            }
            true
        }
        Commands::SmokeTest { text } => smoke_test(&config, &text).await?,
        Commands::Status => {
            let session = MailboxSession::establish(&config.mailbox).await;
            let direct = if session.has_direct() {
                "established"
            } else {
                "not available"
            };
            println!("braille-relay v{}", env!("CARGO_PKG_VERSION"));
            println!("  config:        {}", cli.config);
            println!("  primary mode:  {}", session.primary_mode());
            println!("  direct:        {}", direct);
            println!("  database url:  {}", empty_as_unset(&config.mailbox.database_url));
            println!("  auth token:    {}", redact(&config.mailbox.auth_token));
            println!("  text path:     {}", config.mailbox.text_path);
            println!("  chunk size:    {}", config.device.max_chunk_size);
            println!("  chunk delay:   {} ms", config.device.inter_chunk_delay_ms);
            println!(
                "  retries:       {} (unit {} ms)",
                config.delivery.max_retries, config.delivery.backoff_unit_ms
            );
            true
        }
        Commands::Init => unreachable!("handled above"),
    };

    debug!("metrics: {:?}", metrics::snapshot());
    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

/// Config file if present, defaults otherwise; env overrides applied last.
async fn load_config(path: &str) -> Result<Config> {
    let mut config = if std::path::Path::new(path).exists() {
        Config::load(path).await?
    } else {
        Config::default()
    };
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

fn bridge_client(config: &Config) -> Result<BridgeClient> {
    if !config.mailbox.has_bridge_credentials() {
        return Err(anyhow!(
            "mailbox.database_url and mailbox.auth_token must be set (or BRAILLE_RELAY_DATABASE_URL / BRAILLE_RELAY_AUTH_TOKEN)"
        ));
    }
    Ok(BridgeClient::new(BridgeSettings::from_config(&config.mailbox))?)
}

async fn smoke_test(config: &Config, text: &str) -> Result<bool> {
    let start = Instant::now();
    let session = MailboxSession::establish(&config.mailbox).await;
    let service = DeliveryService::new(session);
    let written = service
        .deliver_single_with(text, &config.delivery_config().retry_policy())
        .await;

    let can_read_back = written.is_success() && config.mailbox.has_bridge_credentials();
    let (read_back, read_error) = if !can_read_back {
        (None, None)
    } else {
        match bridge_client(config)?.read_slot().await {
            Ok(record) => (Some(record.map(|r| r.text == text).unwrap_or(false)), None),
            Err(e) => (None, Some(e.to_string())),
        }
    };

    let status_ok = written.is_success() && read_back != Some(false) && read_error.is_none();
    let payload = serde_json::json!({
        "status": if status_ok { "ok" } else { "failed" },
        "mode": written.mode,
        "write": written.message,
        "read_back_matches": read_back,
        "read_error": read_error,
        "elapsed_ms": start.elapsed().as_millis() as u64,
    });
    println!("{}", payload);
    Ok(status_ok)
}

fn empty_as_unset(s: &str) -> &str {
    if s.is_empty() {
        "<unset>"
    } else {
        s
    }
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let configured = config
        .as_ref()
        .and_then(|c| c.logging.level.parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Info);
    let base_level = match verbosity {
        0 => configured,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config
        .as_ref()
        .and_then(|c| c.logging.file.as_ref())
        .and_then(|file| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
                .ok()
        });

    if let Some(f) = log_file {
        let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
        // Mirror to the console only when someone is watching
        let is_tty = atty::is(atty::Stream::Stderr);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = write_mutex.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            writeln!(
                fmt,
                "{} [{}] {}",
                chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                record.level(),
                record.args()
            )
        });
    }
    let _ = builder.try_init();
}
