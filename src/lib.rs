//! # Callhook
//!
//! Notification dispatch core for an outbound-calling application.
//!
//! Callhook turns scheduled calls and meetings into notifications for
//! external parties:
//!
//! - Calendar formatters project one canonical [`Event`] into
//!   provider-specific payloads (Google, Outlook)
//! - The webhook dispatcher signs, delivers and tracks the health of
//!   outbound HTTP notifications per endpoint configuration
//! - Incoming configuration is validated once at the persistence boundary
//!
//! ## Example
//!
//! ```rust,ignore
//! use callhook::webhooks::{SqliteWebhookStore, WebhookDispatcher, WebhookMessage};
//!
//! let store = Arc::new(SqliteWebhookStore::open(&db_path)?);
//! let dispatcher = WebhookDispatcher::with_http(store, Duration::from_secs(10), "callhook/0.3")?;
//! let result = dispatcher.trigger_webhook("wh_123", &WebhookMessage::new(json!({
//!     "event": "call.scheduled",
//!     "callId": "c-42",
//! })))?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod calendar;
pub mod cli;
pub mod config;
pub mod models;
pub mod observability;
#[cfg(feature = "http")]
pub mod server;
pub mod webhooks;

pub use calendar::{
    CalendarFormatter, CalendarPayload, CalendarProvider, GoogleCalendarPayload,
    OutlookCalendarPayload, format_for_google, format_for_outlook,
};
pub use config::CallhookConfig;
pub use models::{Attendee, Event, EventKind};
pub use webhooks::{
    DeliveryFailure, DeliveryResult, EligibilityReason, ValidationError, WebhookConfigStore,
    WebhookConfiguration, WebhookDispatcher, WebhookMessage,
};

/// Error type for callhook operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `Validation` | A proposed webhook configuration fails schema checks |
/// | `NotFound` | A webhook configuration id is unknown to the store |
/// | `NotEligible` | The configuration is inactive or not subscribed to the event kind |
/// | `InvalidInput` | Malformed events, messages or CLI arguments |
/// | `OperationFailed` | Storage, serialization or I/O failures |
///
/// Delivery failures (HTTP status, network, timeout) are not errors: they
/// are reported through a failed [`DeliveryResult`].
#[derive(Debug, ThisError)]
pub enum Error {
    /// Configuration input was rejected by the validator.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No webhook configuration exists with the given id.
    #[error("webhook configuration not found: {0}")]
    NotFound(String),

    /// The configuration exists but must not receive this message.
    ///
    /// Raised when:
    /// - The configuration is inactive
    /// - The message kind is not in the configuration's subscribed events
    #[error("webhook '{webhook_id}' not eligible: {reason}")]
    NotEligible {
        /// The configuration that was skipped.
        webhook_id: String,
        /// Why it was skipped.
        reason: EligibilityReason,
    },

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - `SQLite` operations fail
    /// - Filesystem I/O errors occur
    /// - A payload cannot be serialized
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Returns `true` for outcomes that are expected no-ops rather than faults.
    #[must_use]
    pub const fn is_not_eligible(&self) -> bool {
        matches!(self, Self::NotEligible { .. })
    }
}

/// Result type alias for callhook operations.
pub type Result<T> = std::result::Result<T, Error>;
