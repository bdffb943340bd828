//! Webhook configuration records and delivery health.
//!
//! A [`WebhookConfiguration`] is owned by a workspace and persisted by a
//! [`WebhookConfigStore`](super::WebhookConfigStore). The dispatcher never
//! caches one: it re-reads the record on every trigger and writes back only
//! the health fields.
//!
//! ```json
//! {
//!   "id": "wh_3f9c...",
//!   "workspaceId": "ws_1",
//!   "name": "crm-sync",
//!   "url": "https://crm.example.com/hooks/calls",
//!   "events": ["call.scheduled", "call.completed"],
//!   "headers": { "X-Tenant": "acme" },
//!   "secret": "***REDACTED***",
//!   "active": true,
//!   "lastTriggered": "2024-01-01T10:00:02.113Z",
//!   "failureCount": 0
//! }
//! ```

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Subscription entry matching every event kind.
pub const WILDCARD_EVENT: &str = "*";

/// A persisted webhook delivery target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConfiguration {
    /// Store-assigned identifier.
    pub id: String,

    /// Owning workspace.
    pub workspace_id: String,

    /// Human-readable name.
    pub name: String,

    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Absolute target URL.
    pub url: String,

    /// Subscribed event kinds (empty = all events).
    #[serde(default)]
    pub events: BTreeSet<String>,

    /// Custom headers merged into every delivery.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Shared signing secret; absent means unsigned delivery.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "optional_secret_serde"
    )]
    pub secret: Option<SecretString>,

    /// Whether deliveries are allowed at all.
    pub active: bool,

    /// Time of the most recent delivery attempt.
    #[serde(default)]
    pub last_triggered: Option<DateTime<Utc>>,

    /// Consecutive delivery failures.
    #[serde(default)]
    pub failure_count: u32,

    /// Opaque routing tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,

    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl WebhookConfiguration {
    /// Checks if this configuration subscribes to the given event kind.
    #[must_use]
    pub fn matches_event(&self, kind: &str) -> bool {
        if self.events.is_empty() {
            return true; // Empty = all events
        }
        self.events.contains(WILDCARD_EVENT) || self.events.contains(kind)
    }

    /// Decides whether a message with the given kind may be delivered.
    ///
    /// Messages without a kind are only gated by `active`.
    ///
    /// # Errors
    ///
    /// Returns the reason the configuration is not eligible.
    pub fn check_eligibility(&self, kind: Option<&str>) -> Result<(), EligibilityReason> {
        if !self.active {
            return Err(EligibilityReason::Inactive);
        }

        match kind {
            Some(kind) if !self.matches_event(kind) => {
                Err(EligibilityReason::NotSubscribed(kind.to_string()))
            },
            _ => Ok(()),
        }
    }

    /// Returns the current delivery health.
    #[must_use]
    pub const fn health(&self) -> DeliveryHealth {
        DeliveryHealth {
            last_triggered: self.last_triggered,
            failure_count: self.failure_count,
        }
    }

    /// Overwrites the health fields.
    pub fn apply_health(&mut self, health: DeliveryHealth) {
        self.last_triggered = health.last_triggered;
        self.failure_count = health.failure_count;
    }
}

/// A validated configuration that has not been persisted yet.
///
/// Only produced by [`validate_webhook_config`](super::validate_webhook_config).
#[derive(Debug, Clone)]
pub struct NewWebhookConfiguration {
    /// Owning workspace.
    pub workspace_id: String,
    /// Human-readable name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Absolute target URL.
    pub url: String,
    /// Subscribed event kinds.
    pub events: BTreeSet<String>,
    /// Custom headers.
    pub headers: BTreeMap<String, String>,
    /// Signing secret.
    pub secret: Option<SecretString>,
    /// Initial active flag.
    pub active: bool,
    /// Routing tag.
    pub channel: Option<String>,
}

impl NewWebhookConfiguration {
    /// Materializes the record with store-assigned identity and fresh health.
    #[must_use]
    pub fn into_configuration(self, id: String, created_at: DateTime<Utc>) -> WebhookConfiguration {
        WebhookConfiguration {
            id,
            workspace_id: self.workspace_id,
            name: self.name,
            description: self.description,
            url: self.url,
            events: self.events,
            headers: self.headers,
            secret: self.secret,
            active: self.active,
            last_triggered: None,
            failure_count: 0,
            channel: self.channel,
            created_at,
        }
    }
}

/// Observable delivery-reliability signal of a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryHealth {
    /// Time of the most recent attempt.
    pub last_triggered: Option<DateTime<Utc>>,
    /// Consecutive failures.
    pub failure_count: u32,
}

impl DeliveryHealth {
    /// Health after an attempt with the given outcome.
    #[must_use]
    pub fn after(self, outcome: AttemptOutcome, at: DateTime<Utc>) -> Self {
        match outcome {
            AttemptOutcome::Success => Self {
                last_triggered: Some(at),
                failure_count: 0,
            },
            AttemptOutcome::Failure => Self {
                last_triggered: Some(at),
                failure_count: self.failure_count.saturating_add(1),
            },
        }
    }

    /// Position in the health state machine.
    #[must_use]
    pub const fn state(&self) -> HealthState {
        match self.failure_count {
            0 => HealthState::Healthy,
            n => HealthState::Degraded(n),
        }
    }
}

/// Outcome of one delivery attempt, as far as health is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// 2xx response.
    Success,
    /// Non-2xx response, network error or timeout.
    Failure,
}

/// Health state machine: `Healthy` ⇄ `Degraded(n)`, no terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    /// No failures since the last success.
    Healthy,
    /// `n` consecutive failures.
    Degraded(u32),
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => f.write_str("healthy"),
            Self::Degraded(n) => write!(f, "degraded ({n} consecutive failures)"),
        }
    }
}

/// Why a configuration was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "kind", rename_all = "snake_case")]
pub enum EligibilityReason {
    /// The configuration is switched off.
    Inactive,
    /// The configuration does not subscribe to this event kind.
    NotSubscribed(String),
}

impl fmt::Display for EligibilityReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inactive => f.write_str("configuration is inactive"),
            Self::NotSubscribed(kind) => write!(f, "not subscribed to '{kind}'"),
        }
    }
}

/// Serde module for optional `SecretString` fields.
mod optional_secret_serde {
    use secrecy::SecretString;
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S>(secret: &Option<SecretString>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // Never serialize the actual secret - use placeholder
        match secret {
            Some(_) => serializer.serialize_str("***REDACTED***"),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = Option::<String>::deserialize(deserializer)?;
        Ok(s.map(SecretString::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_config(events: &[&str], active: bool) -> WebhookConfiguration {
        WebhookConfiguration {
            id: "wh_1".to_string(),
            workspace_id: "ws_1".to_string(),
            name: "test".to_string(),
            description: None,
            url: "https://example.com/hook".to_string(),
            events: events.iter().map(|e| (*e).to_string()).collect(),
            headers: BTreeMap::new(),
            secret: Some(SecretString::from("s3cret")),
            active,
            last_triggered: None,
            failure_count: 0,
            channel: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_matches_event() {
        let config = test_config(&["call.scheduled", "call.completed"], true);

        assert!(config.matches_event("call.scheduled"));
        assert!(config.matches_event("call.completed"));
        assert!(!config.matches_event("lead.created"));
    }

    #[test]
    fn test_empty_events_matches_all() {
        let config = test_config(&[], true);
        assert!(config.matches_event("anything"));
    }

    #[test]
    fn test_wildcard_matches_all() {
        let config = test_config(&["*"], true);
        assert!(config.matches_event("anything"));
    }

    #[test]
    fn test_eligibility() {
        let inactive = test_config(&[], false);
        assert_eq!(
            inactive.check_eligibility(Some("call.scheduled")),
            Err(EligibilityReason::Inactive)
        );
        assert_eq!(inactive.check_eligibility(None), Err(EligibilityReason::Inactive));

        let subscribed = test_config(&["call.completed"], true);
        assert_eq!(
            subscribed.check_eligibility(Some("call.scheduled")),
            Err(EligibilityReason::NotSubscribed("call.scheduled".to_string()))
        );
        assert!(subscribed.check_eligibility(Some("call.completed")).is_ok());
        assert!(subscribed.check_eligibility(None).is_ok());
    }

    #[test]
    fn test_health_transitions() {
        let at = Utc
            .with_ymd_and_hms(2024, 1, 1, 12, 0, 0)
            .single()
            .expect("timestamp");

        let healthy = DeliveryHealth::default();
        assert_eq!(healthy.state(), HealthState::Healthy);

        let degraded = healthy
            .after(AttemptOutcome::Failure, at)
            .after(AttemptOutcome::Failure, at);
        assert_eq!(degraded.state(), HealthState::Degraded(2));
        assert_eq!(degraded.last_triggered, Some(at));

        let recovered = degraded.after(AttemptOutcome::Success, at);
        assert_eq!(recovered.state(), HealthState::Healthy);
        assert_eq!(recovered.failure_count, 0);
    }

    #[test]
    fn test_failure_count_saturates() {
        let health = DeliveryHealth {
            last_triggered: None,
            failure_count: u32::MAX,
        };
        let next = health.after(AttemptOutcome::Failure, Utc::now());
        assert_eq!(next.failure_count, u32::MAX);
    }

    #[test]
    fn test_secret_is_redacted_on_serialize() {
        let config = test_config(&[], true);
        let json = serde_json::to_string(&config).expect("serialize");

        assert!(json.contains("***REDACTED***"));
        assert!(!json.contains("s3cret"));
        assert!(json.contains("\"workspaceId\":\"ws_1\""));
        assert!(json.contains("\"failureCount\":0"));
    }
}
