//! CLI command implementations.
//!
//! Each function backs one `callhook` subcommand. Output goes to stdout;
//! errors are returned for the binary to report.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `validate` | Check a webhook configuration file without storing it |
//! | `create` | Validate and store a webhook configuration |
//! | `list` | List stored configurations with their health |
//! | `trigger` | Deliver one message to one configuration |
//! | `history` | Show recent delivery attempts |
//! | `stats` | Show delivery statistics |
//! | `purge-history` | Delete a workspace's delivery records |
//! | `format` | Render an event as a Google or Outlook payload |
//! | `serve` | Run the HTTP trigger endpoint |
//!
//! # Example Usage
//!
//! ```bash
//! callhook create crm-hook.json
//! callhook trigger wh_0f3c... '{"event":"call.scheduled","callId":"c-42"}'
//! callhook trigger wh_0f3c... --event intro-call.json --provider google
//! callhook history wh_0f3c... --limit 20
//! ```

mod calendar;
mod webhook;

pub use calendar::{cmd_format, read_event_file};
pub use webhook::{
    OutputFormat, build_message, cmd_webhook_create, cmd_webhook_history, cmd_webhook_list,
    cmd_webhook_purge_history, cmd_webhook_stats, cmd_webhook_trigger, cmd_webhook_validate,
    parse_json_arg,
};

use crate::{Error, Result};
use std::path::Path;

/// Reads a file and parses it as JSON.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not JSON.
pub fn read_json_file(path: &Path) -> Result<serde_json::Value> {
    let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
        operation: "read_json_file".to_string(),
        cause: format!("{}: {e}", path.display()),
    })?;

    serde_json::from_str(&contents)
        .map_err(|e| Error::InvalidInput(format!("{} is not valid JSON: {e}", path.display())))
}

/// Truncates a string to at most `max_len` characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
