//! Outlook / Microsoft Graph event resource.

use super::{CalendarFormatter, CalendarPayload, CalendarProvider, EventDateTime};
use crate::models::Event;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Content type used for event bodies.
const BODY_CONTENT_TYPE: &str = "Text";

/// Attendee type assigned to every invitee.
const ATTENDEE_TYPE: &str = "required";

/// Microsoft Graph `event` resource (subset used for inserts).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlookCalendarPayload {
    /// Event title.
    pub subject: String,
    /// Event body; absent when the event has no description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<OutlookBody>,
    /// Start time.
    pub start: EventDateTime,
    /// End time.
    pub end: EventDateTime,
    /// Location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<OutlookLocation>,
    /// Invitees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attendees: Option<Vec<OutlookAttendee>>,
}

/// Event body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlookBody {
    /// `Text` or `HTML`.
    pub content_type: String,
    /// Body text.
    pub content: String,
}

/// Event location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlookLocation {
    /// Human-readable location name.
    pub display_name: String,
}

/// Attendee entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlookAttendee {
    /// Address of the attendee.
    pub email_address: OutlookEmailAddress,
    /// `required`, `optional` or `resource`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub attendee_type: Option<String>,
}

/// Email address with optional name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlookEmailAddress {
    /// Email address.
    pub address: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Builds an Outlook payload.
///
/// A present description becomes a `Text` body; an absent description
/// yields no body at all.
#[must_use]
pub fn format_for_outlook(
    title: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    time_zone: &str,
    description: Option<&str>,
    location: Option<&str>,
) -> OutlookCalendarPayload {
    OutlookCalendarPayload {
        subject: title.to_string(),
        body: description.map(|content| OutlookBody {
            content_type: BODY_CONTENT_TYPE.to_string(),
            content: content.to_string(),
        }),
        start: EventDateTime::new(start, time_zone),
        end: EventDateTime::new(end, time_zone),
        location: location.map(|name| OutlookLocation {
            display_name: name.to_string(),
        }),
        attendees: None,
    }
}

/// Formatter for Outlook.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutlookCalendar;

impl CalendarFormatter for OutlookCalendar {
    fn provider(&self) -> CalendarProvider {
        CalendarProvider::Outlook
    }

    fn format(&self, event: &Event) -> CalendarPayload {
        let mut payload = format_for_outlook(
            &event.title,
            event.start,
            event.end,
            &event.time_zone,
            event.description.as_deref(),
            event.location.as_deref(),
        );

        if !event.attendees.is_empty() {
            payload.attendees = Some(
                event
                    .attendees
                    .iter()
                    .map(|a| OutlookAttendee {
                        email_address: OutlookEmailAddress {
                            address: a.email.clone(),
                            name: a.display_name.clone(),
                        },
                        attendee_type: Some(ATTENDEE_TYPE.to_string()),
                    })
                    .collect(),
            );
        }

        CalendarPayload::Outlook(payload)
    }
}
