//! Schema validation for proposed webhook configurations.
//!
//! Configuration arrives untyped (a JSON object from an API request or a
//! file). It is validated exactly once, here, and turned into a
//! [`NewWebhookConfiguration`]; nothing downstream re-checks it.
//!
//! Every rule is evaluated so the caller can present all problems at once.

use super::config::NewWebhookConfiguration;
use reqwest::Url;
use reqwest::header::{HeaderName, HeaderValue};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A single failed rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldIssue {
    /// Offending field (`headers.X-Foo`, `events[2]` for nested entries).
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

/// Rejected configuration, listing every failing field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// All failed rules, in field order.
    pub issues: Vec<FieldIssue>,
}

impl ValidationError {
    /// Returns `true` if the given field has at least one issue.
    #[must_use]
    pub fn has_issue(&self, field: &str) -> bool {
        self.issues.iter().any(|i| i.field == field)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid webhook configuration: ")?;
        for (i, issue) in self.issues.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", issue.field, issue.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Collects issues while fields are checked.
#[derive(Default)]
struct Issues(Vec<FieldIssue>);

impl Issues {
    fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldIssue {
            field: field.into(),
            message: message.into(),
        });
    }
}

/// Validates a proposed webhook configuration.
///
/// Rules:
/// - `name`, `workspaceId`: non-empty strings
/// - `url`: absolute `http`/`https` URL with a host
/// - `events` (optional): array of non-empty strings
/// - `headers` (optional): object of valid header names to string values
/// - `active` (optional): boolean, defaults to `true`
/// - `secret` (optional): non-empty string
/// - `description`, `channel` (optional): strings
///
/// # Errors
///
/// Returns a [`ValidationError`] enumerating every failing field.
pub fn validate_webhook_config(input: &Value) -> Result<NewWebhookConfiguration, ValidationError> {
    let Some(obj) = input.as_object() else {
        return Err(ValidationError {
            issues: vec![FieldIssue {
                field: "$".to_string(),
                message: "configuration must be a JSON object".to_string(),
            }],
        });
    };

    let mut issues = Issues::default();

    let name = required_string(obj, "name", &mut issues);
    let workspace_id = required_string(obj, "workspaceId", &mut issues);
    let url = validate_url(obj, &mut issues);
    let events = validate_events(obj, &mut issues);
    let headers = validate_headers(obj, &mut issues);
    let active = validate_active(obj, &mut issues);
    let secret = optional_string(obj, "secret", &mut issues);
    let description = optional_string(obj, "description", &mut issues);
    let channel = optional_string(obj, "channel", &mut issues);

    if matches!(secret.as_deref(), Some("")) {
        issues.push("secret", "must not be empty when present");
    }

    if !issues.0.is_empty() {
        return Err(ValidationError { issues: issues.0 });
    }

    Ok(NewWebhookConfiguration {
        workspace_id: workspace_id.unwrap_or_default(),
        name: name.unwrap_or_default(),
        description,
        url: url.unwrap_or_default(),
        events,
        headers,
        secret: secret.map(SecretString::from),
        active,
        channel,
    })
}

fn required_string(obj: &Map<String, Value>, field: &str, issues: &mut Issues) -> Option<String> {
    match obj.get(field) {
        None | Some(Value::Null) => {
            issues.push(field, "is required");
            None
        },
        Some(Value::String(s)) if s.trim().is_empty() => {
            issues.push(field, "must not be empty");
            None
        },
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            issues.push(field, "must be a string");
            None
        },
    }
}

fn optional_string(obj: &Map<String, Value>, field: &str, issues: &mut Issues) -> Option<String> {
    match obj.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            issues.push(field, "must be a string");
            None
        },
    }
}

fn validate_url(obj: &Map<String, Value>, issues: &mut Issues) -> Option<String> {
    let raw = required_string(obj, "url", issues)?;

    match Url::parse(&raw) {
        Ok(url) if !matches!(url.scheme(), "http" | "https") => {
            issues.push("url", format!("unsupported scheme '{}'", url.scheme()));
            None
        },
        Ok(url) if url.host_str().is_none_or(str::is_empty) => {
            issues.push("url", "must include a host");
            None
        },
        Ok(_) => Some(raw),
        Err(e) => {
            issues.push("url", format!("must be an absolute URL ({e})"));
            None
        },
    }
}

fn validate_events(obj: &Map<String, Value>, issues: &mut Issues) -> BTreeSet<String> {
    let mut events = BTreeSet::new();

    match obj.get("events") {
        None | Some(Value::Null) => {},
        Some(Value::Array(items)) => {
            for (i, item) in items.iter().enumerate() {
                match item {
                    Value::String(s) if !s.trim().is_empty() => {
                        events.insert(s.trim().to_string());
                    },
                    Value::String(_) => issues.push(format!("events[{i}]"), "must not be empty"),
                    _ => issues.push(format!("events[{i}]"), "must be a string"),
                }
            }
        },
        Some(_) => issues.push("events", "must be an array of strings"),
    }

    events
}

fn validate_headers(obj: &Map<String, Value>, issues: &mut Issues) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();

    match obj.get("headers") {
        None | Some(Value::Null) => {},
        Some(Value::Object(map)) => {
            for (name, value) in map {
                let field = format!("headers.{name}");
                if HeaderName::from_bytes(name.as_bytes()).is_err() {
                    issues.push(field.clone(), "is not a valid header name");
                }
                match value {
                    Value::String(s) if HeaderValue::from_str(s).is_ok() => {
                        headers.insert(name.clone(), s.clone());
                    },
                    Value::String(_) => issues.push(field, "is not a valid header value"),
                    _ => issues.push(field, "must be a string"),
                }
            }
        },
        Some(_) => issues.push("headers", "must be an object of string values"),
    }

    headers
}

fn validate_active(obj: &Map<String, Value>, issues: &mut Issues) -> bool {
    match obj.get("active") {
        None | Some(Value::Null) => true,
        Some(Value::Bool(b)) => *b,
        Some(_) => {
            issues.push("active", "must be a boolean");
            true
        },
    }
}
