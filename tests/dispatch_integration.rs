//! End-to-end dispatch tests against a local HTTP endpoint.
//!
//! Each test starts a one-shot HTTP stub on an ephemeral port, stores a
//! configuration in `SQLite`, triggers it through the real HTTP backend and
//! checks the result, the recorded health and the audit log.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use callhook::webhooks::{
    DeliveryAuditLog, DeliveryErrorKind, SIGNATURE_HEADER, SqliteAuditLog, SqliteWebhookStore,
    WebhookConfigStore, WebhookDispatcher, WebhookMessage, validate_webhook_config,
    verify_signature,
};
use callhook::{Error, EligibilityReason};
use serde_json::json;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration;

/// A request as seen by the stub.
struct Captured {
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

enum Reply {
    Status(u16),
    Hang(Duration),
}

/// Serves exactly one request and reports what it received.
fn spawn_stub(reply: Reply) -> (String, Receiver<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let url = format!("http://{}/hook", listener.local_addr().expect("addr"));
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        let mut reader = BufReader::new(stream.try_clone().expect("clone"));

        let mut headers = HashMap::new();
        let mut line = String::new();
        reader.read_line(&mut line).expect("request line");
        loop {
            line.clear();
            reader.read_line(&mut line).expect("header");
            let trimmed = line.trim_end();
            if trimmed.is_empty() {
                break;
            }
            if let Some((name, value)) = trimmed.split_once(':') {
                headers.insert(name.trim().to_lowercase(), value.trim().to_string());
            }
        }

        let len = headers
            .get("content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let mut body = vec![0; len];
        reader.read_exact(&mut body).expect("body");
        let _ = tx.send(Captured { headers, body });

        let mut stream = stream;
        match reply {
            Reply::Status(code) => {
                let response =
                    format!("HTTP/1.1 {code} Stub\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
                let _ = stream.write_all(response.as_bytes());
            },
            Reply::Hang(duration) => thread::sleep(duration),
        }
    });

    (url, rx)
}

struct Harness {
    dispatcher: WebhookDispatcher,
    store: Arc<SqliteWebhookStore>,
    audit: Arc<SqliteAuditLog>,
    webhook_id: String,
    _dir: tempfile::TempDir,
}

fn harness(url: &str, events: &[&str], timeout: Duration) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("callhook.db");
    let store = Arc::new(SqliteWebhookStore::open(&db).expect("store"));
    let audit = Arc::new(SqliteAuditLog::open(&db).expect("audit"));

    let created = store
        .create(
            validate_webhook_config(&json!({
                "workspaceId": "ws_1",
                "name": "crm",
                "url": url,
                "events": events,
                "headers": { "X-Tenant": "acme" },
                "secret": "s3cret"
            }))
            .expect("valid"),
        )
        .expect("create");

    let dispatcher = WebhookDispatcher::with_http(store.clone(), timeout, "callhook-test/1.0")
        .expect("client")
        .with_audit(audit.clone());

    Harness {
        dispatcher,
        store,
        audit,
        webhook_id: created.id,
        _dir: dir,
    }
}

fn scheduled() -> WebhookMessage {
    WebhookMessage::new(json!({ "event": "call.scheduled", "callId": "c-42", "at": 1 }))
}

#[test]
fn test_successful_delivery_is_signed() {
    let (url, rx) = spawn_stub(Reply::Status(200));
    let h = harness(&url, &["call.scheduled"], Duration::from_secs(5));

    let result = h
        .dispatcher
        .trigger_webhook(&h.webhook_id, &scheduled())
        .expect("dispatch");

    assert!(result.success);
    assert_eq!(result.status_code, Some(200));

    let captured = rx.recv_timeout(Duration::from_secs(5)).expect("request");
    let signature = captured
        .headers
        .get(&SIGNATURE_HEADER.to_lowercase())
        .expect("signature header");
    assert!(verify_signature("s3cret", &captured.body, signature));
    assert_eq!(captured.headers.get("x-tenant").map(String::as_str), Some("acme"));
    assert_eq!(
        captured.headers.get("x-webhook-event").map(String::as_str),
        Some("call.scheduled")
    );
    assert_eq!(
        captured.headers.get("user-agent").map(String::as_str),
        Some("callhook-test/1.0")
    );
    assert_eq!(
        captured.body,
        br#"{"at":1,"callId":"c-42","event":"call.scheduled"}"#.to_vec()
    );

    let stored = h.store.get(&h.webhook_id).expect("get").expect("present");
    assert_eq!(stored.failure_count, 0);
    assert!(stored.last_triggered.is_some());
    assert_eq!(h.audit.stats(&h.webhook_id).expect("stats").success, 1);
}

#[test]
fn test_server_error_increments_failures() {
    let (url, _rx) = spawn_stub(Reply::Status(500));
    let h = harness(&url, &[], Duration::from_secs(5));

    let result = h
        .dispatcher
        .trigger_webhook(&h.webhook_id, &scheduled())
        .expect("dispatch");

    assert!(!result.success);
    assert_eq!(result.status_code, Some(500));
    assert_eq!(result.error, Some(DeliveryErrorKind::HttpStatusError));

    let stored = h.store.get(&h.webhook_id).expect("get").expect("present");
    assert_eq!(stored.failure_count, 1);

    let history = h.audit.history(&h.webhook_id, 10).expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status_code, Some(500));
    assert_eq!(history[0].error.as_deref(), Some("HttpStatusError"));
}

#[test]
fn test_timeout_is_reported_without_status() {
    let (url, _rx) = spawn_stub(Reply::Hang(Duration::from_secs(3)));
    let h = harness(&url, &[], Duration::from_millis(300));

    let result = h
        .dispatcher
        .trigger_webhook(&h.webhook_id, &scheduled())
        .expect("dispatch");

    assert!(!result.success);
    assert_eq!(result.status_code, None);
    assert_eq!(result.error, Some(DeliveryErrorKind::TimeoutError));

    let stored = h.store.get(&h.webhook_id).expect("get").expect("present");
    assert_eq!(stored.failure_count, 1);
}

#[test]
fn test_connection_refused_is_network_error() {
    let url = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        format!("http://{}/hook", listener.local_addr().expect("addr"))
    };
    let h = harness(&url, &[], Duration::from_secs(2));

    let result = h
        .dispatcher
        .trigger_webhook(&h.webhook_id, &scheduled())
        .expect("dispatch");

    assert!(!result.success);
    assert_eq!(result.error, Some(DeliveryErrorKind::NetworkError));
}

#[test]
fn test_unsubscribed_kind_sends_nothing() {
    let (url, rx) = spawn_stub(Reply::Status(200));
    let h = harness(&url, &["call.completed"], Duration::from_secs(5));

    let err = h
        .dispatcher
        .trigger_webhook(&h.webhook_id, &scheduled())
        .expect_err("not eligible");

    match err {
        Error::NotEligible { reason, .. } => {
            assert_eq!(reason, EligibilityReason::NotSubscribed("call.scheduled".to_string()));
        },
        other => panic!("unexpected error: {other}"),
    }
    assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());

    let stored = h.store.get(&h.webhook_id).expect("get").expect("present");
    assert!(stored.last_triggered.is_none());
    assert_eq!(h.audit.stats(&h.webhook_id).expect("stats").total, 0);
}
