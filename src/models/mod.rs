//! Data models for callhook.
//!
//! The canonical event representation shared by the calendar formatters and
//! the webhook dispatcher.

mod event;

pub use event::{Attendee, DEFAULT_TIME_ZONE, Event, EventKind};
