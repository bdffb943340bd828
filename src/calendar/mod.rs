//! Calendar payload formatters.
//!
//! Formatters are pure projections from the canonical [`Event`] into the
//! payload shape a calendar provider's API expects. They hold no state,
//! perform no I/O and never mutate their input, so they can be called from
//! any thread.
//!
//! # Providers
//!
//! | Provider | Formatter | Payload |
//! |----------|-----------|---------|
//! | `google` | [`GoogleCalendar`] | [`GoogleCalendarPayload`] |
//! | `outlook` | [`OutlookCalendar`] | [`OutlookCalendarPayload`] |
//!
//! Adding a provider means adding a variant to [`CalendarProvider`] and
//! [`CalendarPayload`] plus one new formatter module.
//!
//! # Date-time rendering
//!
//! Every `dateTime` is the UTC instant rendered with millisecond precision
//! and a `Z` suffix (`2024-01-01T10:00:00.000Z`). The event's IANA time zone
//! is carried verbatim and identically in `start.timeZone` and
//! `end.timeZone`.

mod google;
mod outlook;

pub use google::{
    GoogleAttendee, GoogleCalendar, GoogleCalendarPayload, GoogleReminderOverride,
    GoogleReminders, format_for_google,
};
pub use outlook::{
    OutlookAttendee, OutlookBody, OutlookCalendar, OutlookCalendarPayload, OutlookEmailAddress,
    OutlookLocation, format_for_outlook,
};

use crate::models::Event;
use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A start or end time as calendar APIs expect it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDateTime {
    /// ISO-8601 instant with explicit `Z`.
    pub date_time: String,
    /// IANA time zone identifier.
    pub time_zone: String,
}

impl EventDateTime {
    /// Renders an instant in the given zone.
    #[must_use]
    pub fn new(instant: DateTime<Utc>, time_zone: &str) -> Self {
        Self {
            date_time: instant.to_rfc3339_opts(SecondsFormat::Millis, true),
            time_zone: time_zone.to_string(),
        }
    }
}

/// Supported calendar providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalendarProvider {
    /// Google Calendar.
    Google,
    /// Microsoft Outlook / Graph.
    Outlook,
}

impl CalendarProvider {
    /// Returns all providers.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Google, Self::Outlook]
    }

    /// Returns the provider name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Outlook => "outlook",
        }
    }

    /// Returns the formatter for this provider.
    #[must_use]
    pub fn formatter(self) -> &'static dyn CalendarFormatter {
        static GOOGLE: GoogleCalendar = GoogleCalendar;
        static OUTLOOK: OutlookCalendar = OutlookCalendar;

        match self {
            Self::Google => &GOOGLE,
            Self::Outlook => &OUTLOOK,
        }
    }
}

impl fmt::Display for CalendarProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CalendarProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "google" | "gcal" => Ok(Self::Google),
            "outlook" | "microsoft" | "office365" => Ok(Self::Outlook),
            other => Err(Error::InvalidInput(format!(
                "unknown calendar provider: {other}"
            ))),
        }
    }
}

/// A provider-specific calendar payload.
///
/// Serializes as the inner payload with no wrapping tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CalendarPayload {
    /// Google Calendar event resource.
    Google(GoogleCalendarPayload),
    /// Outlook / Microsoft Graph event resource.
    Outlook(OutlookCalendarPayload),
}

impl CalendarPayload {
    /// Returns the provider this payload targets.
    #[must_use]
    pub const fn provider(&self) -> CalendarProvider {
        match self {
            Self::Google(_) => CalendarProvider::Google,
            Self::Outlook(_) => CalendarProvider::Outlook,
        }
    }

    /// Converts the payload to a JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_value(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| Error::OperationFailed {
            operation: "serialize_calendar_payload".to_string(),
            cause: e.to_string(),
        })
    }
}

/// Capability of projecting an [`Event`] into a provider payload.
///
/// Implementations must be deterministic: the same event always yields an
/// identical payload.
pub trait CalendarFormatter: Send + Sync {
    /// The provider this formatter targets.
    fn provider(&self) -> CalendarProvider;

    /// Formats the event.
    fn format(&self, event: &Event) -> CalendarPayload;
}
