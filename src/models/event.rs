//! Canonical, provider-agnostic event model.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Time zone used when an event does not specify one.
pub const DEFAULT_TIME_ZONE: &str = "UTC";

/// Kind of notifiable occurrence.
///
/// Serialized as its dotted wire name (`call.scheduled`, `call.completed`,
/// or the custom name verbatim).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum EventKind {
    /// A call or meeting was scheduled.
    CallScheduled,
    /// A call finished.
    CallCompleted,
    /// Any other application-defined event.
    Custom(String),
}

impl EventKind {
    /// Returns the wire name of this kind.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::CallScheduled => "call.scheduled",
            Self::CallCompleted => "call.completed",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "" => Err(Error::InvalidInput("event kind cannot be empty".to_string())),
            "call.scheduled" => Ok(Self::CallScheduled),
            "call.completed" => Ok(Self::CallCompleted),
            other => Ok(Self::Custom(other.to_string())),
        }
    }
}

impl TryFrom<String> for EventKind {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Custom(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

/// An invited participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendee {
    /// Email address.
    pub email: String,
    /// Optional display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl Attendee {
    /// Creates an attendee with only an email address.
    #[must_use]
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            display_name: None,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// A notifiable occurrence, typically a scheduled call.
///
/// Events are built once by the calling application and never mutated by
/// the formatters or the dispatcher. `end >= start` always holds for events
/// built through [`Event::new`] or deserialized through [`Event::from_json`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// What happened.
    pub kind: EventKind,
    /// Short title.
    pub title: String,
    /// Longer free-text description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Free-text location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Start instant.
    pub start: DateTime<Utc>,
    /// End instant.
    pub end: DateTime<Utc>,
    /// IANA zone used when rendering into provider payloads.
    #[serde(default = "default_time_zone")]
    pub time_zone: String,
    /// Ordered attendee list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attendees: Vec<Attendee>,
}

impl Event {
    /// Creates an event.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `end` is before `start`.
    pub fn new(
        kind: EventKind,
        title: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Self> {
        if end < start {
            return Err(Error::InvalidInput(format!(
                "event end ({end}) is before start ({start})"
            )));
        }

        Ok(Self {
            kind,
            title: title.into(),
            description: None,
            location: None,
            start,
            end,
            time_zone: default_time_zone(),
            attendees: Vec::new(),
        })
    }

    /// Parses an event from JSON, enforcing the same invariants as [`Event::new`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the JSON is malformed or `end < start`.
    pub fn from_json(json: &str) -> Result<Self> {
        let event: Self = serde_json::from_str(json)
            .map_err(|e| Error::InvalidInput(format!("malformed event: {e}")))?;
        if event.duration() < chrono::Duration::zero() {
            return Err(Error::InvalidInput(format!(
                "event end ({}) is before start ({})",
                event.end, event.start
            )));
        }
        Ok(event)
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the location.
    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Sets the rendering time zone.
    #[must_use]
    pub fn with_time_zone(mut self, time_zone: impl Into<String>) -> Self {
        self.time_zone = time_zone.into();
        self
    }

    /// Appends an attendee.
    #[must_use]
    pub fn with_attendee(mut self, attendee: Attendee) -> Self {
        self.attendees.push(attendee);
        self
    }

    /// Duration of the event.
    #[must_use]
    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }
}

fn default_time_zone() -> String {
    DEFAULT_TIME_ZONE.to_string()
}
