//! Webhook CLI commands.
//!
//! Provides commands for managing webhook notifications:
//! - Validate and create configurations
//! - List configurations with their delivery health
//! - Trigger a single delivery
//! - View delivery history and statistics
//! - Purge a workspace's delivery records

// CLI commands are allowed to use println! for output
#![allow(clippy::print_stdout)]

use super::{read_json_file, truncate};
use crate::calendar::CalendarProvider;
use crate::webhooks::{
    DeliveryRecord, DeliveryResult, DeliveryStats, WebhookConfiguration, WebhookMessage,
    WebhookService, validate_webhook_config,
};
use crate::{Error, Result};
use std::fmt::Write as _;
use std::path::Path;

/// Output format for listing commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Aligned text table.
    #[default]
    Table,
    /// Pretty-printed JSON.
    Json,
}

/// Parses a JSON command-line argument; `@path` reads the JSON from a file.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the argument is not valid JSON.
pub fn parse_json_arg(arg: &str) -> Result<serde_json::Value> {
    if let Some(path) = arg.strip_prefix('@') {
        return read_json_file(Path::new(path));
    }
    serde_json::from_str(arg).map_err(|e| Error::InvalidInput(format!("invalid JSON message: {e}")))
}

/// Builds the message to trigger from either raw JSON or an event file.
///
/// With an event file and a provider the message carries the provider
/// payload; without a provider it carries the canonical event.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] unless exactly one source is given and it
/// parses.
pub fn build_message(
    message: Option<&str>,
    event_file: Option<&Path>,
    provider: Option<CalendarProvider>,
) -> Result<WebhookMessage> {
    match (message, event_file) {
        (Some(raw), None) => {
            if provider.is_some() {
                return Err(Error::InvalidInput(
                    "--provider requires --event".to_string(),
                ));
            }
            Ok(WebhookMessage::new(parse_json_arg(raw)?))
        },
        (None, Some(path)) => {
            let event = super::read_event_file(path)?;
            match provider {
                Some(provider) => WebhookMessage::from_calendar_event(&event, provider.formatter()),
                None => WebhookMessage::from_event(&event),
            }
        },
        (Some(_), Some(_)) => Err(Error::InvalidInput(
            "give either a message or --event, not both".to_string(),
        )),
        (None, None) => Err(Error::InvalidInput(
            "a message or --event is required".to_string(),
        )),
    }
}

/// Validates a configuration file without storing it.
///
/// # Errors
///
/// Returns [`Error::Validation`] listing every failing field.
pub fn cmd_webhook_validate(path: &Path) -> Result<()> {
    let input = read_json_file(path)?;

    match validate_webhook_config(&input) {
        Ok(validated) => {
            println!("✓ {} is a valid webhook configuration", path.display());
            println!("  Name: {}", validated.name);
            println!("  URL: {}", validated.url);
            println!("  Events: {}", events_display(&validated.events));
            Ok(())
        },
        Err(validation) => {
            println!("✗ {} is invalid:", path.display());
            for issue in &validation.issues {
                println!("  {}: {}", issue.field, issue.message);
            }
            Err(validation.into())
        },
    }
}

/// Validates and stores a configuration file.
///
/// # Errors
///
/// Returns a validation or storage error.
pub fn cmd_webhook_create(service: &WebhookService, path: &Path) -> Result<WebhookConfiguration> {
    let input = read_json_file(path)?;
    let created = service.create_webhook(&input)?;

    println!("Created webhook '{}'", created.name);
    println!("  ID: {}", created.id);
    println!("  Workspace: {}", created.workspace_id);

    Ok(created)
}

/// Lists stored configurations.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub fn cmd_webhook_list(
    service: &WebhookService,
    workspace: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let configs = service.store().list(workspace)?;

    if configs.is_empty() {
        println!("No webhooks configured.");
        println!();
        println!("To add one, run: callhook create <config.json>");
        return Ok(());
    }

    match format {
        OutputFormat::Json => println!("{}", to_pretty_json(&configs, "serialize_webhooks")?),
        OutputFormat::Table => print!("{}", render_config_table(&configs)),
    }

    Ok(())
}

/// Triggers one delivery and prints the outcome.
///
/// An ineligible configuration is reported as skipped, not as an error.
///
/// # Errors
///
/// Returns [`Error::NotFound`] for an unknown id, or a storage error.
pub fn cmd_webhook_trigger(
    service: &WebhookService,
    webhook_id: &str,
    message: &WebhookMessage,
) -> Result<Option<DeliveryResult>> {
    println!("Triggering webhook '{webhook_id}'...");

    let result = match service.dispatcher().trigger_webhook(webhook_id, message) {
        Ok(result) => result,
        Err(Error::NotEligible { reason, .. }) => {
            println!("- Skipped: {reason}");
            return Ok(None);
        },
        Err(e) => return Err(e),
    };

    if result.success {
        println!("✓ Delivered");
    } else {
        println!("✗ Delivery failed");
    }
    if let Some(code) = result.status_code {
        println!("  Status code: {code}");
    }
    if let Some(error) = result.error {
        println!("  Error: {}", error.as_str());
    }
    if let Some(detail) = &result.error_detail {
        println!("  Detail: {detail}");
    }
    println!("  Duration: {}ms", result.duration_ms);

    Ok(Some(result))
}

/// Shows recent delivery attempts for a configuration, newest first.
///
/// # Errors
///
/// Returns an error if the audit log cannot be read.
pub fn cmd_webhook_history(
    service: &WebhookService,
    webhook_id: &str,
    limit: usize,
    format: OutputFormat,
) -> Result<()> {
    let records = service.audit().history(webhook_id, limit)?;

    if records.is_empty() {
        println!("No delivery history found.");
        return Ok(());
    }

    match format {
        OutputFormat::Json => println!("{}", to_pretty_json(&records, "serialize_history")?),
        OutputFormat::Table => print!("{}", render_history_table(&records)),
    }

    Ok(())
}

/// Shows delivery statistics and current health for a configuration.
///
/// # Errors
///
/// Returns [`Error::NotFound`] for an unknown id, or a storage error.
pub fn cmd_webhook_stats(service: &WebhookService, webhook_id: &str) -> Result<DeliveryStats> {
    let config = service
        .store()
        .get(webhook_id)?
        .ok_or_else(|| Error::NotFound(webhook_id.to_string()))?;
    let stats = service.audit().stats(webhook_id)?;

    print!("{}", render_stats(&config, &stats));

    Ok(stats)
}

/// Deletes a workspace's delivery records.
///
/// Without `force` only reports what would be deleted.
///
/// # Errors
///
/// Returns an error if the audit log cannot be accessed.
pub fn cmd_webhook_purge_history(
    service: &WebhookService,
    workspace_id: &str,
    force: bool,
) -> Result<usize> {
    if !force {
        println!("This will permanently delete all delivery records for workspace '{workspace_id}'.");
        println!("This action cannot be undone.");
        println!();
        println!("To proceed, run with --force flag.");
        return Ok(0);
    }

    let deleted = service.audit().delete_workspace_logs(workspace_id)?;
    println!("Deleted {deleted} delivery record(s) for workspace '{workspace_id}'.");

    Ok(deleted)
}

fn to_pretty_json<T: serde::Serialize>(value: &T, operation: &str) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| Error::OperationFailed {
        operation: operation.to_string(),
        cause: e.to_string(),
    })
}

fn events_display<'a>(events: impl IntoIterator<Item = &'a String>) -> String {
    let events: Vec<&str> = events.into_iter().map(String::as_str).collect();
    if events.is_empty() {
        "*".to_string()
    } else {
        events.join(", ")
    }
}

fn render_config_table(configs: &[WebhookConfiguration]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Configured Webhooks:");
    let _ = writeln!(out, "{}", "-".repeat(100));
    let _ = writeln!(
        out,
        "{:<38} {:<18} {:<8} {:<10} {:<24}",
        "ID", "NAME", "ACTIVE", "FAILURES", "EVENTS"
    );
    let _ = writeln!(out, "{}", "-".repeat(100));

    for config in configs {
        let _ = writeln!(
            out,
            "{:<38} {:<18} {:<8} {:<10} {:<24}",
            config.id,
            truncate(&config.name, 18),
            if config.active { "Yes" } else { "No" },
            config.failure_count,
            truncate(&events_display(&config.events), 24)
        );
    }

    let _ = writeln!(out, "{}", "-".repeat(100));
    let _ = writeln!(out, "Total: {} webhook(s)", configs.len());
    out
}

fn render_history_table(records: &[DeliveryRecord]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Webhook Delivery History:");
    let _ = writeln!(out, "{}", "-".repeat(90));
    let _ = writeln!(
        out,
        "{:<20} {:<8} {:<6} {:<16} {:<10} {:<20}",
        "EVENT", "STATUS", "CODE", "ERROR", "MS", "TIMESTAMP"
    );
    let _ = writeln!(out, "{}", "-".repeat(90));

    for record in records {
        let code = record
            .status_code
            .map_or_else(|| "-".to_string(), |c| c.to_string());
        let timestamp = chrono::DateTime::from_timestamp(record.timestamp, 0).map_or_else(
            || "Unknown".to_string(),
            |dt| dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        );

        let _ = writeln!(
            out,
            "{:<20} {:<8} {:<6} {:<16} {:<10} {:<20}",
            truncate(record.event_kind.as_deref().unwrap_or("-"), 20),
            if record.success { "✓ OK" } else { "✗ FAIL" },
            code,
            record.error.as_deref().unwrap_or("-"),
            record.duration_ms,
            timestamp
        );
    }

    let _ = writeln!(out, "{}", "-".repeat(90));
    let _ = writeln!(out, "Showing {} record(s)", records.len());
    out
}

fn render_stats(config: &WebhookConfiguration, stats: &DeliveryStats) -> String {
    #[allow(clippy::cast_precision_loss)]
    let success_pct = if stats.total > 0 {
        (stats.success as f64 / stats.total as f64) * 100.0
    } else {
        0.0
    };

    let mut out = String::new();
    let _ = writeln!(out, "Webhook '{}' ({})", config.name, config.id);
    let _ = writeln!(out, "  Health: {}", config.health().state());
    let _ = writeln!(
        out,
        "  Last triggered: {}",
        config
            .last_triggered
            .map_or_else(|| "never".to_string(), |t| t.to_rfc3339())
    );
    let _ = writeln!(out, "  Deliveries: {}", stats.total);
    let _ = writeln!(out, "  Succeeded: {} ({success_pct:.1}%)", stats.success);
    let _ = writeln!(out, "  Failed: {}", stats.failed);
    let _ = writeln!(out, "  Avg duration: {:.1}ms", stats.avg_duration_ms);
    out
}
