//! # Structured Logging Module
//!
//! Environment-aware structured logging that outputs to both console and a
//! JSON log file, plus helpers that log each message's journey through the
//! processor with a fixed set of fields.

use chrono::Utc;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);

        let log_dir = PathBuf::from("log");
        if let Err(e) = fs::create_dir_all(&log_dir) {
            init_console_only(&log_level);
            tracing::warn!(
                error = %e,
                "Could not create log directory, logging to console only"
            );
            return;
        }

        // File name carries environment, PID and start time
        let pid = process::id();
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let log_filename = format!("{environment}.{pid}.{timestamp}.log");
        let log_path = log_dir.join(&log_filename);

        let file_appender = tracing_appender::rolling::never(&log_dir, &log_filename);
        let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

        let subscriber = tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_level(true)
                    .with_ansi(true)
                    .with_filter(env_filter(&log_level)),
            )
            .with(
                fmt::layer()
                    .with_writer(file_writer)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_level(true)
                    .with_ansi(false)
                    .json()
                    .with_filter(env_filter(&log_level)),
            );

        if subscriber.try_init().is_err() {
            // Host application already installed a subscriber
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = pid,
            environment = %environment,
            log_file = %log_path.display(),
            "🔧 STRUCTURED LOGGING: Initialized with file output"
        );

        // Keep the non-blocking writer alive for the life of the process
        std::mem::forget(guard);
    });
}

fn init_console_only(log_level: &str) {
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_filter(env_filter(log_level)))
        .try_init();
}

/// `RUST_LOG` wins over the environment default
fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("RESILIENCE_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Terminal outcome labels used in logs and metrics
pub mod outcome {
    pub const ACKED: &str = "acked";
    pub const DUPLICATE: &str = "duplicate";
    pub const RETRY_SIGNALED: &str = "retry_signaled";
    pub const DEAD_LETTERED: &str = "dead_lettered";
    pub const ROUTING_FAILED: &str = "routing_failed";
    pub const CANCELLED: &str = "cancelled";
}

/// Log the terminal outcome of one delivery
///
/// Fields are enough to reconstruct an event's journey without reading the
/// dead-letter topic.
pub fn log_message_outcome(
    outcome: &str,
    topic: &str,
    partition: i32,
    offset: i64,
    event_id: Option<&str>,
    retry_count: u32,
    details: Option<&str>,
) {
    let event_id = event_id.unwrap_or(crate::constants::UNKNOWN_EVENT_ID);
    match outcome {
        outcome::ACKED => tracing::info!(
            outcome = %outcome,
            topic = %topic,
            partition = partition,
            offset = offset,
            event_id = %event_id,
            retry_count = retry_count,
            details = details,
            "✅ MESSAGE_OUTCOME"
        ),
        outcome::DUPLICATE => tracing::debug!(
            outcome = %outcome,
            topic = %topic,
            partition = partition,
            offset = offset,
            event_id = %event_id,
            retry_count = retry_count,
            details = details,
            "⚠️ MESSAGE_OUTCOME"
        ),
        outcome::ROUTING_FAILED => tracing::error!(
            outcome = %outcome,
            topic = %topic,
            partition = partition,
            offset = offset,
            event_id = %event_id,
            retry_count = retry_count,
            details = details,
            "❌ MESSAGE_OUTCOME"
        ),
        _ => tracing::warn!(
            outcome = %outcome,
            topic = %topic,
            partition = partition,
            offset = offset,
            event_id = %event_id,
            retry_count = retry_count,
            details = details,
            "📋 MESSAGE_OUTCOME"
        ),
    }
}
