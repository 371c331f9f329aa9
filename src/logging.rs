//! # Structured Logging Module
//!
//! Environment-aware structured logging for the engine's event loop and its
//! command lifecycle.

use chrono::Utc;
use std::io::IsTerminal;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use uuid::Uuid;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));
        let json = std::env::var("BRINECTL_LOG_FORMAT")
            .map(|f| f.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let layer = if json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(std::io::stdout().is_terminal())
                .with_filter(filter)
                .boxed()
        };

        // An embedding host may already own the global subscriber
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized, keeping it");
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            json,
            "Structured logging initialized"
        );
    });
}

/// Current environment from environment variables
pub fn get_environment() -> String {
    std::env::var("BRINECTL_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

/// Log structured data for wrap command operations
pub fn log_command_operation(
    operation: &str,
    wrap_cmd_id: &str,
    wrap_cmd_uuid: Option<Uuid>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        wrap_cmd_id = %wrap_cmd_id,
        wrap_cmd_uuid = ?wrap_cmd_uuid,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "COMMAND_OPERATION"
    );
}

/// Log structured data for node operations
pub fn log_node_operation(operation: &str, node_id: &str, status: &str, details: Option<&str>) {
    tracing::info!(
        operation = %operation,
        node_id = %node_id,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "NODE_OPERATION"
    );
}

/// Log errors with structured context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "ERROR"
    );
}
