//! Webhook delivery backend trait and HTTP implementation.
//!
//! A backend performs exactly one POST and reports either the response
//! status or a classified transport failure. Interpreting the status
//! (2xx or not) and updating health is the dispatcher's job.
//!
//! # Failure classes
//!
//! | Class | Raised when |
//! |-------|-------------|
//! | `HttpStatusError` | A response arrived with a non-2xx status |
//! | `NetworkError` | DNS, connect, TLS or I/O failure before a response |
//! | `TimeoutError` | The request exceeded the configured timeout |

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Header carrying the HMAC signature.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// Header carrying the event kind.
pub const EVENT_HEADER: &str = "X-Webhook-Event";

/// Header carrying a unique id per attempt.
pub const DELIVERY_ID_HEADER: &str = "X-Webhook-Delivery-Id";

/// Default per-attempt timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Shortest accepted per-attempt timeout.
pub const MIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Longest accepted per-attempt timeout.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(300);

/// Checks that a per-attempt timeout lies within
/// [`MIN_TIMEOUT`]..=[`MAX_TIMEOUT`].
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the timeout is out of range.
pub fn check_timeout(timeout: Duration) -> Result<Duration> {
    if (MIN_TIMEOUT..=MAX_TIMEOUT).contains(&timeout) {
        Ok(timeout)
    } else {
        Err(Error::InvalidInput(format!(
            "delivery timeout must be between {}s and {}s, got {}s",
            MIN_TIMEOUT.as_secs(),
            MAX_TIMEOUT.as_secs(),
            timeout.as_secs_f64()
        )))
    }
}

/// Default `User-Agent`.
#[must_use]
pub fn default_user_agent() -> String {
    format!("callhook/{}", env!("CARGO_PKG_VERSION"))
}

/// A fully assembled POST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    /// Target URL.
    pub url: String,
    /// Headers in send order.
    pub headers: Vec<(String, String)>,
    /// Canonical JSON body.
    pub body: Vec<u8>,
}

impl OutboundRequest {
    /// Case-insensitive header lookup.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Why a delivery attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// The endpoint answered with a non-2xx status.
    HttpStatus {
        /// Response status.
        code: u16,
    },
    /// No response was received.
    Network {
        /// Transport error description.
        message: String,
    },
    /// The timeout elapsed.
    Timeout,
}

impl DeliveryFailure {
    /// Failure class.
    #[must_use]
    pub const fn kind(&self) -> DeliveryErrorKind {
        match self {
            Self::HttpStatus { .. } => DeliveryErrorKind::HttpStatusError,
            Self::Network { .. } => DeliveryErrorKind::NetworkError,
            Self::Timeout => DeliveryErrorKind::TimeoutError,
        }
    }

    /// Response status, if one was received.
    #[must_use]
    pub const fn status_code(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { code } => Some(*code),
            Self::Network { .. } | Self::Timeout => None,
        }
    }
}

impl fmt::Display for DeliveryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HttpStatus { code } => write!(f, "endpoint responded with HTTP {code}"),
            Self::Network { message } => write!(f, "network error: {message}"),
            Self::Timeout => f.write_str("request timed out"),
        }
    }
}

/// Failure class as reported in a [`DeliveryResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliveryErrorKind {
    /// Non-2xx response.
    HttpStatusError,
    /// Transport failure.
    NetworkError,
    /// Timeout.
    TimeoutError,
}

impl DeliveryErrorKind {
    /// Wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::HttpStatusError => "HttpStatusError",
            Self::NetworkError => "NetworkError",
            Self::TimeoutError => "TimeoutError",
        }
    }
}

impl fmt::Display for DeliveryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryResult {
    /// Whether the endpoint answered 2xx.
    pub success: bool,

    /// Response status (if a response arrived).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,

    /// Failure class (if failed).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<DeliveryErrorKind>,

    /// Human-readable failure cause.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,

    /// When the attempt started.
    pub attempted_at: DateTime<Utc>,

    /// Attempt duration in milliseconds.
    pub duration_ms: u64,
}

impl DeliveryResult {
    /// Creates a successful delivery result.
    #[must_use]
    pub const fn success(status_code: u16, attempted_at: DateTime<Utc>, duration_ms: u64) -> Self {
        Self {
            success: true,
            status_code: Some(status_code),
            error: None,
            error_detail: None,
            attempted_at,
            duration_ms,
        }
    }

    /// Creates a failed delivery result.
    #[must_use]
    pub fn failure(
        failure: &DeliveryFailure,
        attempted_at: DateTime<Utc>,
        duration_ms: u64,
    ) -> Self {
        Self {
            success: false,
            status_code: failure.status_code(),
            error: Some(failure.kind()),
            error_detail: Some(failure.to_string()),
            attempted_at,
            duration_ms,
        }
    }
}

/// Trait for webhook delivery backends.
///
/// This trait allows for different delivery implementations (HTTP, mock for testing).
pub trait WebhookDelivery: Send + Sync {
    /// Performs one POST.
    ///
    /// # Returns
    ///
    /// The response status for any response (2xx or not).
    ///
    /// # Errors
    ///
    /// Returns a [`DeliveryFailure`] if no response was received.
    fn post(&self, request: &OutboundRequest) -> std::result::Result<u16, DeliveryFailure>;
}

/// HTTP webhook delivery backend using reqwest.
pub struct HttpDeliveryBackend {
    /// HTTP client with connection pooling.
    client: reqwest::blocking::Client,
    timeout: Duration,
}

impl HttpDeliveryBackend {
    /// Creates a backend with the given per-attempt timeout and user agent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the timeout is out of range, or
    /// an error if the HTTP client cannot be built.
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let timeout = check_timeout(timeout)?;
        let client = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| Error::OperationFailed {
                operation: "build_http_client".to_string(),
                cause: e.to_string(),
            })?;

        Ok(Self { client, timeout })
    }

    /// Configured timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    fn header_map(headers: &[(String, String)]) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(headers.len());
        for (name, value) in headers {
            let parsed = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            );
            match parsed {
                (Ok(name), Ok(value)) => {
                    map.insert(name, value);
                },
                _ => tracing::warn!(header = %name, "Skipping invalid webhook header"),
            }
        }
        map
    }

    fn classify(err: &reqwest::Error) -> DeliveryFailure {
        if err.is_timeout() {
            DeliveryFailure::Timeout
        } else {
            DeliveryFailure::Network {
                message: err.to_string(),
            }
        }
    }
}

impl WebhookDelivery for HttpDeliveryBackend {
    fn post(&self, request: &OutboundRequest) -> std::result::Result<u16, DeliveryFailure> {
        let response = self
            .client
            .post(&request.url)
            .headers(Self::header_map(&request.headers))
            .timeout(self.timeout)
            .body(request.body.clone())
            .send()
            .map_err(|e| Self::classify(&e))?;

        Ok(response.status().as_u16())
    }
}

/// Mock delivery backend for testing.
#[cfg(test)]
pub struct MockDeliveryBackend {
    /// Responses to return, in order.
    responses: std::sync::Mutex<std::collections::VecDeque<std::result::Result<u16, DeliveryFailure>>>,
    /// Returned once the queue is empty.
    fallback: std::result::Result<u16, DeliveryFailure>,
    /// Requests that were posted.
    pub delivered: std::sync::Mutex<Vec<OutboundRequest>>,
}

#[cfg(test)]
impl MockDeliveryBackend {
    /// Creates a mock answering 200 unless responses are queued.
    pub fn new() -> Self {
        Self::always(Ok(200))
    }

    /// Creates a mock that always answers with `response`.
    pub fn always(response: std::result::Result<u16, DeliveryFailure>) -> Self {
        Self {
            responses: std::sync::Mutex::new(std::collections::VecDeque::new()),
            fallback: response,
            delivered: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Queues a response for the next delivery.
    pub fn queue_response(&self, result: std::result::Result<u16, DeliveryFailure>) {
        self.responses.lock().expect("lock").push_back(result);
    }

    /// Returns the number of deliveries made.
    pub fn delivery_count(&self) -> usize {
        self.delivered.lock().expect("lock").len()
    }

    /// Returns the most recent request.
    pub fn last_request(&self) -> Option<OutboundRequest> {
        self.delivered.lock().expect("lock").last().cloned()
    }
}

#[cfg(test)]
impl WebhookDelivery for MockDeliveryBackend {
    fn post(&self, request: &OutboundRequest) -> std::result::Result<u16, DeliveryFailure> {
        self.delivered.lock().expect("lock").push(request.clone());

        self.responses
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}
