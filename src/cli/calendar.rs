//! Calendar formatting command.

#![allow(clippy::print_stdout)]

use crate::calendar::{CalendarPayload, CalendarProvider};
use crate::models::Event;
use crate::{Error, Result};
use std::path::Path;

/// Reads an [`Event`] from a JSON file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or does not describe an event.
pub fn read_event_file(path: &Path) -> Result<Event> {
    let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
        operation: "read_event_file".to_string(),
        cause: format!("{}: {e}", path.display()),
    })?;
    Event::from_json(&contents)
}

/// Prints the provider payload for the event in `path`.
///
/// # Errors
///
/// Returns an error if the event cannot be read or serialized.
pub fn cmd_format(provider: CalendarProvider, path: &Path) -> Result<CalendarPayload> {
    let event = read_event_file(path)?;
    let payload = provider.formatter().format(&event);

    let json = serde_json::to_string_pretty(&payload.to_value()?).map_err(|e| {
        Error::OperationFailed {
            operation: "serialize_calendar_payload".to_string(),
            cause: e.to_string(),
        }
    })?;
    println!("{json}");

    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn event_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(
            file,
            r#"{{
                "kind": "call.scheduled",
                "title": "Intro Call",
                "start": "2024-01-01T10:00:00Z",
                "end": "2024-01-01T10:30:00Z",
                "timeZone": "UTC"
            }}"#
        )
        .expect("write");
        file
    }

    #[test]
    fn test_format_google() {
        let file = event_file();

        let payload = cmd_format(CalendarProvider::Google, file.path()).expect("format");
        let value = payload.to_value().expect("value");

        assert_eq!(payload.provider(), CalendarProvider::Google);
        assert_eq!(value["summary"], "Intro Call");
        assert_eq!(value["start"]["dateTime"], "2024-01-01T10:00:00.000Z");
    }

    #[test]
    fn test_format_outlook() {
        let file = event_file();

        let payload = cmd_format(CalendarProvider::Outlook, file.path()).expect("format");
        let value = payload.to_value().expect("value");

        assert_eq!(value["subject"], "Intro Call");
        assert!(value.get("body").is_none());
    }

    #[test]
    fn test_end_before_start_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(
            file,
            r#"{{
                "kind": "call.scheduled",
                "title": "Backwards",
                "start": "2024-01-01T10:30:00Z",
                "end": "2024-01-01T10:00:00Z"
            }}"#
        )
        .expect("write");

        assert!(read_event_file(file.path()).is_err());
    }

    #[test]
    fn test_invalid_event_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(file, r#"{{"title": "missing times"}}"#).expect("write");

        let err = read_event_file(file.path()).expect_err("invalid");
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
