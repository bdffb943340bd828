//! Single-attempt webhook dispatch.
//!
//! # Flow
//!
//! ```text
//! trigger_webhook(id, message)
//!        |
//!        v
//!   store.get(id) --missing--> Err(NotFound)
//!        |
//!        v
//!   eligibility --inactive / unsubscribed--> Err(NotEligible)
//!        |
//!        v
//!   canonical bytes -> HMAC signature -> POST (one attempt)
//!        |
//!        v
//!   store.record_attempt -> audit record -> DeliveryResult
//! ```
//!
//! Delivery failures are a failed [`DeliveryResult`], not an error. The
//! dispatcher never retries; that is the caller's policy.

use super::audit::{DeliveryAuditLog, DeliveryRecord};
use super::config::{AttemptOutcome, WebhookConfiguration};
use super::delivery::{
    DELIVERY_ID_HEADER, DeliveryFailure, DeliveryResult, EVENT_HEADER, HttpDeliveryBackend,
    OutboundRequest, SIGNATURE_HEADER, WebhookDelivery,
};
use super::payload::{WebhookMessage, compute_hmac_signature};
use super::store::WebhookConfigStore;
use crate::{Error, Result};
use chrono::{SubsecRound, Utc};
use secrecy::ExposeSecret;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Dispatches messages to stored webhook configurations.
pub struct WebhookDispatcher {
    /// Configuration persistence.
    store: Arc<dyn WebhookConfigStore>,
    /// Delivery backend for sending webhooks.
    delivery: Arc<dyn WebhookDelivery>,
    /// Optional audit log for recording delivery attempts.
    audit: Option<Arc<dyn DeliveryAuditLog>>,
}

impl WebhookDispatcher {
    /// Creates a dispatcher over the given store and delivery backend.
    #[must_use]
    pub fn new(store: Arc<dyn WebhookConfigStore>, delivery: Arc<dyn WebhookDelivery>) -> Self {
        Self {
            store,
            delivery,
            audit: None,
        }
    }

    /// Creates a dispatcher delivering over HTTP with the given timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_http(
        store: Arc<dyn WebhookConfigStore>,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self> {
        let backend = HttpDeliveryBackend::new(timeout, user_agent)?;
        Ok(Self::new(store, Arc::new(backend)))
    }

    /// Records every attempt in `audit`.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn DeliveryAuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Underlying configuration store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn WebhookConfigStore> {
        &self.store
    }

    /// Delivers `message` to the configuration `config_id` once.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if no configuration has this id
    /// - [`Error::NotEligible`] if it is inactive or not subscribed to the
    ///   message's event kind; no request is made and health is untouched
    /// - [`Error::OperationFailed`] if the store or serialization fails
    pub fn trigger_webhook(
        &self,
        config_id: &str,
        message: &WebhookMessage,
    ) -> Result<DeliveryResult> {
        metrics::counter!("webhook_triggers_total").increment(1);

        let config = self
            .store
            .get(config_id)?
            .ok_or_else(|| Error::NotFound(config_id.to_string()))?;

        let event_kind = message.event_kind();

        if let Err(reason) = config.check_eligibility(event_kind) {
            metrics::counter!("webhook_not_eligible_total").increment(1);
            tracing::debug!(
                webhook_id = %config.id,
                event_kind = ?event_kind,
                reason = %reason,
                "Webhook not eligible, skipping"
            );
            return Err(Error::NotEligible {
                webhook_id: config.id,
                reason,
            });
        }

        let request = build_request(&config, event_kind, message.canonical_bytes()?)?;

        metrics::counter!("webhook_deliveries_total", "webhook" => config.id.clone()).increment(1);

        // Stores keep millisecond precision.
        let attempted_at = Utc::now().trunc_subsecs(3);
        let start = Instant::now();
        let response = self.delivery.post(&request);
        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        metrics::histogram!("webhook_delivery_duration_ms", "webhook" => config.id.clone())
            .record(start.elapsed().as_secs_f64() * 1000.0);

        let (result, outcome) = match response {
            Ok(code) if (200..300).contains(&code) => (
                DeliveryResult::success(code, attempted_at, duration_ms),
                AttemptOutcome::Success,
            ),
            Ok(code) => (
                DeliveryResult::failure(
                    &DeliveryFailure::HttpStatus { code },
                    attempted_at,
                    duration_ms,
                ),
                AttemptOutcome::Failure,
            ),
            Err(failure) => (
                DeliveryResult::failure(&failure, attempted_at, duration_ms),
                AttemptOutcome::Failure,
            ),
        };

        let health = self
            .store
            .record_attempt(&config.id, outcome, attempted_at)?;

        self.log_delivery(&config, event_kind, &result);

        if result.success {
            metrics::counter!("webhook_deliveries_success_total", "webhook" => config.id.clone())
                .increment(1);
            tracing::debug!(
                webhook_id = %config.id,
                event_kind = ?event_kind,
                status_code = ?result.status_code,
                duration_ms = result.duration_ms,
                "Webhook delivered successfully"
            );
        } else {
            metrics::counter!("webhook_deliveries_failed_total", "webhook" => config.id.clone())
                .increment(1);
            tracing::warn!(
                webhook_id = %config.id,
                event_kind = ?event_kind,
                status_code = ?result.status_code,
                error = ?result.error,
                detail = ?result.error_detail,
                health = %health.state(),
                "Webhook delivery failed"
            );
        }

        Ok(result)
    }

    /// Writes an audit record; failures are logged, never propagated.
    fn log_delivery(
        &self,
        config: &WebhookConfiguration,
        event_kind: Option<&str>,
        result: &DeliveryResult,
    ) {
        let Some(audit) = &self.audit else {
            return;
        };

        let record = DeliveryRecord::new(config, event_kind, result);
        if let Err(e) = audit.store(&record) {
            tracing::error!(
                webhook_id = %config.id,
                error = %e,
                "Failed to log webhook delivery to audit database"
            );
        }
    }
}

/// Assembles headers and body for one attempt.
///
/// Configuration headers come first. Entries named like the signature or
/// `Content-Type` headers are dropped; the body is always signed JSON.
fn build_request(
    config: &WebhookConfiguration,
    event_kind: Option<&str>,
    body: Vec<u8>,
) -> Result<OutboundRequest> {
    let mut headers: Vec<(String, String)> = config
        .headers
        .iter()
        .filter(|(name, _)| !name.eq_ignore_ascii_case(SIGNATURE_HEADER))
        .filter(|(name, _)| !name.eq_ignore_ascii_case("content-type"))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();

    headers.push(("Content-Type".to_string(), "application/json".to_string()));
    headers.push((
        DELIVERY_ID_HEADER.to_string(),
        uuid::Uuid::new_v4().to_string(),
    ));
    if let Some(kind) = event_kind {
        headers.push((EVENT_HEADER.to_string(), kind.to_string()));
    }

    if let Some(secret) = &config.secret {
        let signature = compute_hmac_signature(secret.expose_secret(), &body)?;
        headers.push((SIGNATURE_HEADER.to_string(), signature));
    }

    Ok(OutboundRequest {
        url: config.url.clone(),
        headers,
        body,
    })
}
