//! Outbound webhook notifications.
//!
//! A workspace registers webhook configurations (target URL, subscribed
//! event kinds, custom headers, optional signing secret). The application
//! then triggers one configuration at a time with a message; the dispatcher
//! decides eligibility, signs, POSTs once and records the outcome.
//!
//! # Architecture
//!
//! - **Validation** (`validation.rs`): untyped JSON to [`NewWebhookConfiguration`]
//! - **Config** (`config.rs`): stored record, eligibility and health
//! - **Store** (`store.rs`): persistence trait, memory and `SQLite` backends
//! - **Payload** (`payload.rs`): canonical JSON and HMAC signing
//! - **Delivery** (`delivery.rs`): HTTP delivery trait and implementation
//! - **Audit** (`audit.rs`): per-attempt delivery log
//! - **Dispatcher** (`dispatcher.rs`): the single trigger entry point
//!
//! # Example Configuration
//!
//! ```json
//! {
//!   "workspaceId": "ws_1",
//!   "name": "crm-sync",
//!   "url": "https://crm.example.com/hooks/calls",
//!   "events": ["call.scheduled", "call.completed"],
//!   "headers": { "X-Tenant": "acme" },
//!   "secret": "whsec_...",
//!   "active": true
//! }
//! ```
//!
//! # Verifying deliveries
//!
//! Receivers recompute `sha256=<hex HMAC-SHA256(secret, body)>` over the raw
//! request body and compare it with `X-Webhook-Signature`, e.g. with
//! [`verify_signature`].

mod audit;
mod config;
mod delivery;
mod dispatcher;
mod payload;
mod store;
mod validation;

pub use audit::{DeliveryAuditLog, DeliveryRecord, DeliveryStats, SqliteAuditLog};
pub use config::{
    AttemptOutcome, DeliveryHealth, EligibilityReason, HealthState, NewWebhookConfiguration,
    WILDCARD_EVENT, WebhookConfiguration,
};
pub use delivery::{
    DEFAULT_TIMEOUT, DELIVERY_ID_HEADER, DeliveryErrorKind, DeliveryFailure, DeliveryResult,
    EVENT_HEADER, HttpDeliveryBackend, MAX_TIMEOUT, MIN_TIMEOUT, OutboundRequest,
    SIGNATURE_HEADER, WebhookDelivery, check_timeout, default_user_agent,
};
pub use dispatcher::WebhookDispatcher;
#[cfg(test)]
pub(crate) use delivery::MockDeliveryBackend;
pub use payload::{
    SIGNATURE_PREFIX, WebhookMessage, canonicalize, compute_hmac_signature, verify_signature,
};
pub use store::{MemoryWebhookStore, SqliteWebhookStore, WebhookConfigStore, new_webhook_id};
pub use validation::{FieldIssue, ValidationError, validate_webhook_config};

use crate::Result;
use crate::config::CallhookConfig;
use std::sync::Arc;

/// Store, audit log and dispatcher wired over one `SQLite` database.
///
/// # Example
///
/// ```rust,ignore
/// use callhook::{CallhookConfig, webhooks::WebhookService};
///
/// let service = WebhookService::open(&CallhookConfig::load_default())?;
/// let created = service.create_webhook(&config_json)?;
/// let result = service.dispatcher().trigger_webhook(&created.id, &message)?;
/// ```
pub struct WebhookService {
    store: Arc<dyn WebhookConfigStore>,
    audit: Arc<dyn DeliveryAuditLog>,
    dispatcher: Arc<WebhookDispatcher>,
}

impl WebhookService {
    /// Opens the database under `config.data_dir` and builds an HTTP dispatcher.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the HTTP client
    /// cannot be built.
    pub fn open(config: &CallhookConfig) -> Result<Self> {
        let path = config.database_path();
        let store: Arc<dyn WebhookConfigStore> = Arc::new(SqliteWebhookStore::open(&path)?);
        let audit: Arc<dyn DeliveryAuditLog> = Arc::new(SqliteAuditLog::open(&path)?);

        let dispatcher = WebhookDispatcher::with_http(
            Arc::clone(&store),
            config.delivery_timeout,
            &config.user_agent,
        )?
        .with_audit(Arc::clone(&audit));

        tracing::debug!(database = %path.display(), "Webhook service opened");

        Ok(Self {
            store,
            audit,
            dispatcher: Arc::new(dispatcher),
        })
    }

    /// Assembles a service from existing parts.
    #[must_use]
    pub fn with_backends(
        store: Arc<dyn WebhookConfigStore>,
        delivery: Arc<dyn WebhookDelivery>,
        audit: Arc<dyn DeliveryAuditLog>,
    ) -> Self {
        let dispatcher =
            WebhookDispatcher::new(Arc::clone(&store), delivery).with_audit(Arc::clone(&audit));

        Self {
            store,
            audit,
            dispatcher: Arc::new(dispatcher),
        }
    }

    /// Validates and persists a proposed configuration.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Validation`] listing every failing field, or a
    /// storage error.
    pub fn create_webhook(&self, input: &serde_json::Value) -> Result<WebhookConfiguration> {
        let validated = validate_webhook_config(input)?;
        self.store.create(validated)
    }

    /// Configuration store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn WebhookConfigStore> {
        &self.store
    }

    /// Delivery audit log.
    #[must_use]
    pub fn audit(&self) -> &Arc<dyn DeliveryAuditLog> {
        &self.audit
    }

    /// Shared dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> Arc<WebhookDispatcher> {
        Arc::clone(&self.dispatcher)
    }
}
