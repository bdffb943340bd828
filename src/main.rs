//! Binary entry point for callhook.
//!
//! This binary provides the CLI interface for managing and triggering
//! webhook notifications.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use callhook::CallhookConfig;
use callhook::calendar::CalendarProvider;
use callhook::cli::{
    OutputFormat, build_message, cmd_format, cmd_webhook_create, cmd_webhook_history,
    cmd_webhook_list, cmd_webhook_purge_history, cmd_webhook_stats, cmd_webhook_trigger,
    cmd_webhook_validate,
};
use callhook::observability::{self, InitOptions};
use callhook::webhooks::WebhookService;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Callhook - outbound webhook and calendar notifications for scheduled calls.
#[derive(Parser)]
#[command(name = "callhook")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "CALLHOOK_CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Validate a webhook configuration file without storing it.
    Validate {
        /// JSON configuration file.
        file: PathBuf,
    },

    /// Validate and store a webhook configuration.
    Create {
        /// JSON configuration file.
        file: PathBuf,
    },

    /// List stored webhook configurations.
    List {
        /// Only show this workspace.
        #[arg(short, long)]
        workspace: Option<String>,

        /// Output format.
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Deliver one message to one webhook configuration.
    Trigger {
        /// Webhook configuration ID.
        id: String,

        /// Message JSON, or @file.
        message: Option<String>,

        /// Build the message from an event JSON file instead.
        #[arg(short, long)]
        event: Option<PathBuf>,

        /// Render the event for a calendar provider: google or outlook.
        #[arg(short, long, requires = "event")]
        provider: Option<CalendarProvider>,
    },

    /// Show recent delivery attempts for a configuration.
    History {
        /// Webhook configuration ID.
        id: String,

        /// Maximum number of records.
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Output format.
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Show delivery statistics for a configuration.
    Stats {
        /// Webhook configuration ID.
        id: String,
    },

    /// Delete all delivery records of a workspace.
    PurgeHistory {
        /// Workspace ID.
        workspace: String,

        /// Actually delete.
        #[arg(long)]
        force: bool,
    },

    /// Render an event file as a calendar provider payload.
    Format {
        /// Calendar provider: google or outlook.
        provider: CalendarProvider,

        /// Event JSON file.
        file: PathBuf,
    },

    /// Run the HTTP trigger endpoint.
    Serve {
        /// Listen port (default from config).
        #[arg(short, long)]
        port: Option<u16>,
    },
}

/// Main entry point.
fn main() -> ExitCode {
    // Missing .env is normal.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    let expose_metrics = matches!(cli.command, Commands::Serve { .. });
    let observability = match observability::init_from_config(
        &config,
        InitOptions {
            verbose: cli.verbose,
            metrics_expose: expose_metrics,
        },
    ) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to initialize observability: {e}");
            return ExitCode::FAILURE;
        },
    };

    let result = run_command(cli.command, &config);

    // One-shot runs cannot be scraped; leave their counters in the log.
    if !expose_metrics && let Some(rendered) = observability.render_metrics() {
        tracing::debug!(metrics = %rendered, "Process metrics");
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
fn run_command(command: Commands, config: &CallhookConfig) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Validate { file } => cmd_webhook_validate(&file)?,

        Commands::Format { provider, file } => {
            cmd_format(provider, &file)?;
        },

        Commands::Create { file } => {
            cmd_webhook_create(&open_service(config)?, &file)?;
        },

        Commands::List { workspace, format } => {
            cmd_webhook_list(&open_service(config)?, workspace.as_deref(), format)?;
        },

        Commands::Trigger {
            id,
            message,
            event,
            provider,
        } => {
            let message = build_message(message.as_deref(), event.as_deref(), provider)?;
            cmd_webhook_trigger(&open_service(config)?, &id, &message)?;
        },

        Commands::History { id, limit, format } => {
            cmd_webhook_history(&open_service(config)?, &id, limit, format)?;
        },

        Commands::Stats { id } => {
            cmd_webhook_stats(&open_service(config)?, &id)?;
        },

        Commands::PurgeHistory { workspace, force } => {
            cmd_webhook_purge_history(&open_service(config)?, &workspace, force)?;
        },

        Commands::Serve { port } => cmd_serve(config, port)?,
    }

    Ok(())
}

/// Loads configuration: explicit file, else the default location, then env.
fn load_config(path: Option<&Path>) -> Result<CallhookConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => CallhookConfig::load_from_file(path)?,
        None => CallhookConfig::load_default(),
    };

    Ok(config.with_env_overrides())
}

fn open_service(config: &CallhookConfig) -> Result<WebhookService, Box<dyn std::error::Error>> {
    Ok(WebhookService::open(config)?)
}

/// Runs the HTTP trigger endpoint.
#[cfg(feature = "http")]
fn cmd_serve(config: &CallhookConfig, port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let service = open_service(config)?;
    let port = port.unwrap_or(config.server_port);

    callhook::server::run(service.dispatcher(), port)?;
    Ok(())
}

/// Runs the HTTP trigger endpoint (feature not enabled).
#[cfg(not(feature = "http"))]
fn cmd_serve(
    _config: &CallhookConfig,
    _port: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    Err("callhook was built without the `http` feature".into())
}
