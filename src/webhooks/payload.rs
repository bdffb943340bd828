//! Outbound message bodies and HMAC signing.
//!
//! A [`WebhookMessage`] is an arbitrary JSON document. Before delivery it is
//! canonicalized (object keys sorted at every level, compact encoding) so
//! the signature is reproducible by any receiver that re-serializes the
//! same document.
//!
//! # Message shapes
//!
//! ```json
//! { "event": "call.scheduled", "data": { "title": "Intro Call", ... } }
//! { "event": "call.scheduled", "provider": "google", "data": { "summary": "Intro Call", ... } }
//! ```
//!
//! # HMAC signing
//!
//! When a configuration carries a secret, the canonical bytes are signed
//! with HMAC-SHA256 and sent in the `X-Webhook-Signature` header as
//! `sha256=<lowercase-hex>`.

use crate::calendar::CalendarFormatter;
use crate::models::Event;
use crate::{Error, Result};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Prefix of the signature header value.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// A message to deliver to a webhook endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WebhookMessage(Value);

impl WebhookMessage {
    /// Wraps an arbitrary JSON document.
    #[must_use]
    pub const fn new(value: Value) -> Self {
        Self(value)
    }

    /// Builds `{"event": <kind>, "data": <event>}` from a canonical event.
    ///
    /// # Errors
    ///
    /// Returns an error if the event cannot be serialized.
    pub fn from_event(event: &Event) -> Result<Self> {
        let data = serde_json::to_value(event).map_err(|e| Error::OperationFailed {
            operation: "serialize_event".to_string(),
            cause: e.to_string(),
        })?;

        Ok(Self(serde_json::json!({
            "event": event.kind.as_str(),
            "data": data,
        })))
    }

    /// Builds `{"event", "provider", "data"}` with the event rendered by a
    /// calendar formatter.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized.
    pub fn from_calendar_event(event: &Event, formatter: &dyn CalendarFormatter) -> Result<Self> {
        let data = formatter.format(event).to_value()?;

        Ok(Self(serde_json::json!({
            "event": event.kind.as_str(),
            "provider": formatter.provider().as_str(),
            "data": data,
        })))
    }

    /// Event kind carried by the message, if any.
    ///
    /// Read from the top-level `event` string, falling back to `kind`.
    #[must_use]
    pub fn event_kind(&self) -> Option<&str> {
        let obj = self.0.as_object()?;
        ["event", "kind"]
            .iter()
            .find_map(|key| obj.get(*key).and_then(Value::as_str))
            .map(str::trim)
            .filter(|kind| !kind.is_empty())
    }

    /// Returns the underlying JSON document.
    #[must_use]
    pub const fn as_value(&self) -> &Value {
        &self.0
    }

    /// Canonical wire bytes: sorted keys, compact.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(&canonicalize(&self.0)).map_err(|e| Error::OperationFailed {
            operation: "serialize_webhook_message".to_string(),
            cause: e.to_string(),
        })
    }
}

impl From<Value> for WebhookMessage {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Returns a copy of `value` with object keys sorted at every depth.
#[must_use]
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            let mut sorted = Map::with_capacity(entries.len());
            for (key, value) in entries {
                sorted.insert(key.clone(), canonicalize(value));
            }
            Value::Object(sorted)
        },
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Computes the HMAC-SHA256 signature header value for a payload.
///
/// # Errors
///
/// Returns an error if the MAC cannot be keyed.
///
/// # Example
///
/// ```rust
/// use callhook::webhooks::compute_hmac_signature;
///
/// let signature = compute_hmac_signature("my-secret", br#"{"event":"test"}"#).unwrap();
/// assert!(signature.starts_with("sha256="));
/// ```
pub fn compute_hmac_signature(secret: &str, payload: &[u8]) -> Result<String> {
    let mut mac = keyed_mac(secret)?;
    mac.update(payload);

    let signature = hex::encode(mac.finalize().into_bytes());
    Ok(format!("{SIGNATURE_PREFIX}{signature}"))
}

/// Verifies a signature header against a payload.
///
/// Accepts the value with or without the `sha256=` prefix. Comparison is
/// constant time.
///
/// # Example
///
/// ```rust
/// use callhook::webhooks::{compute_hmac_signature, verify_signature};
///
/// let body = br#"{"event":"test"}"#;
/// let signature = compute_hmac_signature("my-secret", body).unwrap();
/// assert!(verify_signature("my-secret", body, &signature));
/// ```
#[must_use]
pub fn verify_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    let hex_part = signature
        .trim()
        .strip_prefix(SIGNATURE_PREFIX)
        .unwrap_or_else(|| signature.trim());

    let Ok(expected) = hex::decode(hex_part) else {
        return false;
    };
    let Ok(mut mac) = keyed_mac(secret) else {
        return false;
    };

    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

fn keyed_mac(secret: &str) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| Error::OperationFailed {
        operation: "hmac_key".to_string(),
        cause: e.to_string(),
    })
}
