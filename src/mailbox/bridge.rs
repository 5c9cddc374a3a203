//! Bridge client: authenticated HTTP PUT into the mailbox slot.
//!
//! Every request carries `Connection: close` and the client keeps no idle
//! connections. The display's backend drops idle TLS connections without
//! notice, and a reused socket then fails the next write with an EOF in the
//! middle of the handshake.

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, trace};
use reqwest::header::CONNECTION;
use reqwest::StatusCode;

use super::{MailboxRecord, MailboxTransport, TransportError, TransportErrorKind, TransportMode};
use crate::config::MailboxConfig;
use crate::logutil::{preview, redact};

/// Connection parameters for [`BridgeClient`].
#[derive(Clone)]
pub struct BridgeSettings {
    pub database_url: String,
    pub text_path: String,
    pub auth_token: String,
    pub write_timeout: Duration,
    pub read_timeout: Duration,
}

impl fmt::Debug for BridgeSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeSettings")
            .field("database_url", &self.database_url)
            .field("text_path", &self.text_path)
            .field("auth_token", &redact(&self.auth_token))
            .field("write_timeout", &self.write_timeout)
            .field("read_timeout", &self.read_timeout)
            .finish()
    }
}

impl BridgeSettings {
    pub fn from_config(config: &MailboxConfig) -> Self {
        Self {
            database_url: config.database_url.clone(),
            text_path: config.text_path.clone(),
            auth_token: config.auth_token.clone(),
            write_timeout: Duration::from_secs(config.write_timeout_seconds),
            read_timeout: Duration::from_secs(config.read_timeout_seconds),
        }
    }
}

/// Resource URL of the slot, `{database_url}/{text_path}.json`.
pub(crate) fn resource_url(database_url: &str, text_path: &str) -> String {
    format!(
        "{}/{}.json",
        database_url.trim_end_matches('/'),
        text_path.trim_matches('/')
    )
}

/// Bridge transport over `reqwest`.
#[derive(Debug, Clone)]
pub struct BridgeClient {
    settings: BridgeSettings,
    client: reqwest::Client,
}

impl BridgeClient {
    pub fn new(settings: BridgeSettings) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| TransportError::other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { settings, client })
    }

    /// Full slot URL including the query credential.
    pub fn slot_url(&self) -> String {
        format!(
            "{}?auth={}",
            resource_url(&self.settings.database_url, &self.settings.text_path),
            urlencoding::encode(&self.settings.auth_token)
        )
    }

    /// Slot URL with the credential masked, for logs.
    pub fn display_url(&self) -> String {
        format!(
            "{}?auth={}",
            resource_url(&self.settings.database_url, &self.settings.text_path),
            redact(&self.settings.auth_token)
        )
    }

    /// Fetch the record currently in the slot; `None` when the slot is empty.
    pub async fn read_slot(&self) -> Result<Option<MailboxRecord>, TransportError> {
        debug!("Reading mailbox slot {}", self.display_url());
        let response = self
            .client
            .get(self.slot_url())
            .header(CONNECTION, "close")
            .timeout(self.settings.read_timeout)
            .send()
            .await
            .map_err(classify_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, "mailbox read", &body));
        }

        response
            .json::<Option<MailboxRecord>>()
            .await
            .map_err(|e| TransportError::other(format!("unreadable slot contents: {e}")))
    }
}

#[async_trait]
impl MailboxTransport for BridgeClient {
    fn name(&self) -> &'static str {
        "bridge"
    }

    fn mode(&self) -> TransportMode {
        TransportMode::Bridge
    }

    async fn write(&self, record: &MailboxRecord) -> Result<(), TransportError> {
        trace!("PUT {} ({})", self.display_url(), record.position_label());
        let response = self
            .client
            .put(self.slot_url())
            .header(CONNECTION, "close")
            .timeout(self.settings.write_timeout)
            .json(record)
            .send()
            .await
            .map_err(classify_reqwest)?;

        let status = response.status();
        if status.is_success() {
            debug!("Sent chunk {} via bridge ({})", record.position_label(), status);
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, "mailbox write", &body))
    }
}

pub(crate) fn classify_reqwest(err: reqwest::Error) -> TransportError {
    // the url carries the auth query
    let err = err.without_url();
    let chain = error_chain_text(&err);
    let kind = classify(err.is_timeout(), err.is_connect(), has_tls_cause(&err), &chain);
    TransportError::new(kind, chain)
}

/// Non-2xx response. Gateway and server-side failures share the transient
/// schedule with connection failures; everything else is final.
pub(crate) fn status_error(status: StatusCode, context: &str, body: &str) -> TransportError {
    let kind = match status.as_u16() {
        500 | 502 | 503 | 504 => TransportErrorKind::ConnectionFailure,
        _ => TransportErrorKind::Other,
    };
    TransportError::new(kind, format!("{context} returned {status}: {}", preview(body, 80)))
}

/// Join an error and all of its sources into one lowercase-searchable line.
pub(crate) fn error_chain_text(err: &(dyn StdError + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(inner) = source {
        let text = inner.to_string();
        if !parts.iter().any(|p| p.contains(&text)) {
            parts.push(text);
        }
        source = inner.source();
    }
    parts.join(": ")
}

/// Whether any error in the chain is a rustls error, bare or carried inside
/// an `io::Error` the way the TLS connector reports handshake failures.
pub(crate) fn has_tls_cause(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.downcast_ref::<rustls::Error>().is_some() {
            return true;
        }
        let wrapped = e
            .downcast_ref::<std::io::Error>()
            .and_then(|io| io.get_ref())
            .is_some_and(|inner| inner.downcast_ref::<rustls::Error>().is_some());
        if wrapped {
            return true;
        }
        current = e.source();
    }
    false
}

/// Map a failed request onto the retry taxonomy.
///
/// TLS is checked before the connect flag: a failed handshake surfaces from
/// the connector and would otherwise read as a plain connection failure.
pub(crate) fn classify(
    is_timeout: bool,
    is_connect: bool,
    is_tls: bool,
    chain: &str,
) -> TransportErrorKind {
    let lower = chain.to_ascii_lowercase();
    if is_timeout || lower.contains("timed out") {
        return TransportErrorKind::Timeout;
    }
    const TLS_MARKERS: [&str; 4] = ["certificate", "handshake", "rustls", "tls alert"];
    if is_tls || TLS_MARKERS.iter().any(|m| lower.contains(m)) {
        return TransportErrorKind::TlsFailure;
    }
    const CONN_MARKERS: [&str; 6] = [
        "connection refused",
        "connection reset",
        "connection closed",
        "broken pipe",
        "incomplete message",
        "dns error",
    ];
    if is_connect || CONN_MARKERS.iter().any(|m| lower.contains(m)) {
        return TransportErrorKind::ConnectionFailure;
    }
    TransportErrorKind::Other
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> BridgeSettings {
        BridgeSettings {
            database_url: "https://braille-display.example.app/".to_string(),
            text_path: "/braille_display/text".to_string(),
            auth_token: "tok/en+with=chars".to_string(),
            write_timeout: Duration::from_secs(15),
            read_timeout: Duration::from_secs(10),
        }
    }

    #[test]
    fn slot_url_joins_path_and_encodes_token() {
        let client = BridgeClient::new(settings()).unwrap();
        assert_eq!(
            client.slot_url(),
            "https://braille-display.example.app/braille_display/text.json?auth=tok%2Fen%2Bwith%3Dchars"
        );
        assert!(!client.display_url().contains("with"));
    }

    #[test]
    fn debug_output_masks_token() {
        let dbg = format!("{:?}", settings());
        assert!(!dbg.contains("tok/en+with=chars"));
    }

    #[test]
    fn classify_prefers_timeout_then_tls() {
        assert_eq!(classify(true, true, true, "anything"), TransportErrorKind::Timeout);
        assert_eq!(
            classify(false, true, true, "received corrupt message of type InvalidContentType"),
            TransportErrorKind::TlsFailure
        );
        assert_eq!(
            classify(false, false, false, "invalid peer certificate: UnknownIssuer"),
            TransportErrorKind::TlsFailure
        );
    }

    #[test]
    fn classify_connection_failures() {
        assert_eq!(
            classify(false, true, false, "tcp connect error: Connection refused (os error 111)"),
            TransportErrorKind::ConnectionFailure
        );
        assert_eq!(
            classify(false, false, false, "connection closed before message completed"),
            TransportErrorKind::ConnectionFailure
        );
        assert_eq!(
            classify(false, false, false, "builder error: relative URL"),
            TransportErrorKind::Other
        );
    }

    #[test]
    fn rustls_error_inside_io_error_is_tls() {
        let io = std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            rustls::Error::General("bad record".into()),
        );
        let err = Outer(io);
        assert!(has_tls_cause(&err));

        let plain = Outer(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"));
        assert!(!has_tls_cause(&plain));
    }

    #[test]
    fn server_errors_are_transient_client_errors_are_not() {
        for code in [500u16, 502, 503, 504] {
            let status = StatusCode::from_u16(code).unwrap();
            assert!(status_error(status, "mailbox write", "").kind.is_transient(), "{code}");
        }
        for code in [400u16, 401, 403, 404, 501] {
            let status = StatusCode::from_u16(code).unwrap();
            assert_eq!(
                status_error(status, "mailbox write", "").kind,
                TransportErrorKind::Other,
                "{code}"
            );
        }
    }

    #[derive(Debug)]
    struct Outer(std::io::Error);
    impl fmt::Display for Outer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "error sending request")
        }
    }
    impl StdError for Outer {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn chain_text_includes_sources() {
        let err = Outer(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset by peer",
        ));
        let text = error_chain_text(&err);
        assert_eq!(text, "error sending request: connection reset by peer");
        assert_eq!(
            classify(false, false, has_tls_cause(&err), &text),
            TransportErrorKind::ConnectionFailure
        );
    }
}
