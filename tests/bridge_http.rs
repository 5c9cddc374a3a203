mod common;

use std::time::Duration;

use braille_relay::delivery::{DeliveryConfig, DeliveryService, RetryPolicy};
use braille_relay::mailbox::{
    BridgeClient, BridgeSettings, MailboxRecord, MailboxSession, MailboxTransport,
    TransportErrorKind,
};
use common::RecordingSleeper;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Read one HTTP/1.1 request (headers plus Content-Length body) off `stream`.
async fn read_request(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf).to_string();
        if let Some(end) = text.find("\r\n\r\n") {
            let content_length = text[..end]
                .lines()
                .find_map(|l| {
                    let (k, v) = l.split_once(':')?;
                    k.eq_ignore_ascii_case("content-length")
                        .then(|| v.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).to_string()
}

/// Serve the given responses to consecutive connections and hand back the raw requests.
async fn serve(responses: Vec<(&'static str, &'static str)>) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let handle = tokio::spawn(async move {
        let mut requests = Vec::new();
        for (status, body) in responses {
            let (mut stream, _) = listener.accept().await.unwrap();
            requests.push(read_request(&mut stream).await);
            let reply = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(reply.as_bytes()).await.unwrap();
            let _ = stream.shutdown().await;
        }
        requests
    });
    (base, handle)
}

fn settings(base: &str) -> BridgeSettings {
    BridgeSettings {
        database_url: format!("{base}/"),
        text_path: "/braille_display/text".to_string(),
        auth_token: "tok/en".to_string(),
        write_timeout: Duration::from_secs(5),
        read_timeout: Duration::from_secs(5),
    }
}

fn body_of(request: &str) -> serde_json::Value {
    let (_, body) = request.split_once("\r\n\r\n").unwrap();
    serde_json::from_str(body).unwrap()
}

#[tokio::test]
async fn test_put_request_shape() {
    let (base, server) = serve(vec![("200 OK", "null")]).await;
    let client = BridgeClient::new(settings(&base)).unwrap();
    let record = MailboxRecord::notification("hello display");

    client.write(&record).await.unwrap();

    let requests = server.await.unwrap();
    let req = &requests[0];
    let first_line = req.lines().next().unwrap();
    assert_eq!(first_line, "PUT /braille_display/text.json?auth=tok%2Fen HTTP/1.1");
    assert!(req.to_ascii_lowercase().contains("connection: close"), "{req}");
    assert!(req.to_ascii_lowercase().contains("content-type: application/json"));
    let body = body_of(req);
    assert_eq!(body["text"], "hello display");
    assert_eq!(body["type"], "notification");
    assert!(body["timestamp"].is_number());
}

#[tokio::test]
async fn test_non_success_status_is_other() {
    let denied = r#"{"error":"Permission denied"}"#;
    let (base, server) = serve(vec![("401 Unauthorized", denied)]).await;
    let client = BridgeClient::new(settings(&base)).unwrap();

    let err = client
        .write(&MailboxRecord::notification("x"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, TransportErrorKind::Other);
    assert!(err.message.contains("401"), "{}", err.message);
    server.await.unwrap();
}

#[tokio::test]
async fn test_refused_connection_is_connection_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    let client = BridgeClient::new(settings(&base)).unwrap();

    let err = client
        .write(&MailboxRecord::notification("x"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, TransportErrorKind::ConnectionFailure);
    assert!(!err.message.contains("tok"), "token leaked: {}", err.message);
}

#[tokio::test]
async fn test_silent_server_is_timeout() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let hold = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
        drop(stream);
    });
    let mut s = settings(&base);
    s.write_timeout = Duration::from_millis(200);
    let client = BridgeClient::new(s).unwrap();

    let err = client
        .write(&MailboxRecord::notification("x"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, TransportErrorKind::Timeout);
    hold.abort();
}

#[tokio::test]
async fn test_plaintext_server_on_https_is_tls_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("https://{}", listener.local_addr().unwrap());
    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut hello = [0u8; 512];
        let _ = stream.read(&mut hello).await;
        let reply = "HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
        let _ = stream.write_all(reply.as_bytes()).await;
        let _ = stream.shutdown().await;
    });
    let client = BridgeClient::new(settings(&base)).unwrap();

    let err = client
        .write(&MailboxRecord::notification("x"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, TransportErrorKind::TlsFailure, "{}", err.message);
    assert!(err.kind.is_transient());
    server.await.unwrap();
}

#[tokio::test]
async fn test_server_error_is_transient_and_backs_off() {
    let (base, server) = serve(vec![
        ("503 Service Unavailable", "{}"),
        ("200 OK", "null"),
    ])
    .await;
    let client = BridgeClient::new(settings(&base)).unwrap();
    let sleeper = RecordingSleeper::new();
    let policy = RetryPolicy::new(3, Duration::from_millis(5));

    policy
        .send_with_retry(&client, &MailboxRecord::notification("again"), &*sleeper)
        .await
        .unwrap();

    assert_eq!(server.await.unwrap().len(), 2);
    assert_eq!(sleeper.waits(), vec![Duration::from_millis(5)]);
}

#[tokio::test]
async fn test_repeated_server_errors_back_off_linearly() {
    let (base, server) = serve(vec![
        ("503 Service Unavailable", "{}"),
        ("503 Service Unavailable", "{}"),
        ("200 OK", "null"),
    ])
    .await;
    let client = BridgeClient::new(settings(&base)).unwrap();
    let sleeper = RecordingSleeper::new();
    let unit = Duration::from_millis(5);
    let policy = RetryPolicy::new(3, unit);

    policy
        .send_with_retry(&client, &MailboxRecord::notification("again"), &*sleeper)
        .await
        .unwrap();

    assert_eq!(server.await.unwrap().len(), 3);
    assert_eq!(sleeper.waits(), vec![unit, unit * 2]);
}

#[tokio::test]
async fn test_read_slot_returns_record_or_none() {
    let stored =
        r#"{"text":"This is a test","chunk_number":1,"total_chunks":6,"timestamp":1718000000.25}"#;
    let (base, server) = serve(vec![("200 OK", stored), ("200 OK", "null")]).await;
    let client = BridgeClient::new(settings(&base)).unwrap();

    let record = client.read_slot().await.unwrap().unwrap();
    assert_eq!(record.text, "This is a test");
    assert_eq!(record.total_chunks, Some(6));
    assert!(client.read_slot().await.unwrap().is_none());

    let requests = server.await.unwrap();
    assert!(requests[0].starts_with("GET /braille_display/text.json?auth=tok%2Fen "));
}

#[tokio::test]
async fn test_delivery_over_bridge_writes_chunks_in_order() {
    let (base, server) = serve(vec![("200 OK", "null"); 3]).await;
    let client = BridgeClient::new(settings(&base)).unwrap();
    let session = MailboxSession::from_parts(None, std::sync::Arc::new(client));
    let svc = DeliveryService::with_sleeper(session, RecordingSleeper::new());
    let cfg = DeliveryConfig {
        max_chunk_size: 5,
        inter_chunk_delay: Duration::from_millis(1),
        ..DeliveryConfig::default()
    };

    let outcome = svc.deliver("aaaa bbbb cccc", &cfg).await;
    assert!(outcome.is_success(), "{}", outcome.message);

    let requests = server.await.unwrap();
    let numbers: Vec<i64> = requests
        .iter()
        .map(|r| body_of(r)["chunk_number"].as_i64().unwrap())
        .collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    assert_eq!(body_of(&requests[2])["text"], "cccc");
    assert_eq!(body_of(&requests[0])["total_chunks"], 3);
}
