//! Google Calendar event resource.

use super::{CalendarFormatter, CalendarPayload, CalendarProvider, EventDateTime};
use crate::models::Event;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Google Calendar `Event` resource (subset used for inserts).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleCalendarPayload {
    /// Event title.
    pub summary: String,
    /// Event description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Free-text location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Start time.
    pub start: EventDateTime,
    /// End time.
    pub end: EventDateTime,
    /// Invitees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attendees: Option<Vec<GoogleAttendee>>,
    /// Reminder settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminders: Option<GoogleReminders>,
}

impl GoogleCalendarPayload {
    /// Replaces the calendar's default reminders with one popup reminder.
    #[must_use]
    pub fn with_popup_reminder(mut self, minutes: u32) -> Self {
        self.reminders = Some(GoogleReminders {
            use_default: false,
            overrides: Some(vec![GoogleReminderOverride {
                method: "popup".to_string(),
                minutes,
            }]),
        });
        self
    }
}

/// Google attendee entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleAttendee {
    /// Email address.
    pub email: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Google reminder settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleReminders {
    /// Whether the calendar's default reminders apply.
    pub use_default: bool,
    /// Explicit reminders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<Vec<GoogleReminderOverride>>,
}

/// A single explicit reminder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoogleReminderOverride {
    /// `popup` or `email`.
    pub method: String,
    /// Minutes before start.
    pub minutes: u32,
}

/// Builds a Google Calendar payload.
///
/// This is a projection, not a validator: `end` is not required to be
/// after `start`.
#[must_use]
pub fn format_for_google(
    title: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    time_zone: &str,
    description: Option<&str>,
    location: Option<&str>,
) -> GoogleCalendarPayload {
    GoogleCalendarPayload {
        summary: title.to_string(),
        description: description.map(str::to_string),
        location: location.map(str::to_string),
        start: EventDateTime::new(start, time_zone),
        end: EventDateTime::new(end, time_zone),
        attendees: None,
        reminders: None,
    }
}

/// Formatter for Google Calendar.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoogleCalendar;

impl CalendarFormatter for GoogleCalendar {
    fn provider(&self) -> CalendarProvider {
        CalendarProvider::Google
    }

    fn format(&self, event: &Event) -> CalendarPayload {
        let mut payload = format_for_google(
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
                    .map(|a| GoogleAttendee {
                        email: a.email.clone(),
                        display_name: a.display_name.clone(),
                    })
                    .collect(),
            );
        }

        CalendarPayload::Google(payload)
    }
}
