//! # Structured Logging Module
//!
//! Environment-aware structured logging on `tracing`, plus the `EventLogger`
//! sink the transport components write their lifecycle events to.

use crate::config::{ConfigManager, LoggingConfig};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use tracing_subscriber::{fmt as tracing_fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
///
/// Level comes from `RUST_LOG` if set, otherwise from the detected environment.
/// `PIRINA_LOG_FORMAT=json` switches to JSON lines.
pub fn init_structured_logging() {
    let json = std::env::var("PIRINA_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    init_logging(LoggingConfig { level: None, json });
}

/// Initialize structured logging from the `logging` configuration section
pub fn init_logging(config: LoggingConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = ConfigManager::detect_environment();
        let default_level = config
            .level
            .clone()
            .unwrap_or_else(|| get_log_level(&environment).to_string());

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_level.as_str()));

        // try_init: a global subscriber may already be installed by the host
        let result = if config.json {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_fmt::layer()
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_ansi(false)
                        .json(),
                )
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_fmt::layer()
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_level(true)
                        .with_ansi(true),
                )
                .try_init()
        };

        if result.is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        }

        tracing::info!(
            environment = %environment,
            level = %default_level,
            json = config.json,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

/// Severity of a transport event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        };
        f.write_str(label)
    }
}

/// Well-known transport events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventId {
    TransportInitialised,
    TransportStarted,
    TransportStopped,
    CircuitBreakerOpened,
    CircuitBreakerReset,
    MessageSendFailed,
    ListenerAttached,
    ListenerAttachFailed,
    QueueSetup,
    MessageDeadLettered,
}

impl EventId {
    /// Stable numeric code for log aggregation
    pub fn code(&self) -> u32 {
        match self {
            EventId::TransportInitialised => 1000,
            EventId::TransportStarted => 1001,
            EventId::TransportStopped => 1002,
            EventId::CircuitBreakerOpened => 1100,
            EventId::CircuitBreakerReset => 1101,
            EventId::MessageSendFailed => 1200,
            EventId::ListenerAttached => 1300,
            EventId::ListenerAttachFailed => 1301,
            EventId::QueueSetup => 1400,
            EventId::MessageDeadLettered => 1500,
        }
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

/// Structured event sink used by transport components
pub trait EventLogger: Send + Sync + fmt::Debug {
    fn log(&self, severity: Severity, event_id: EventId, source: &str, message: &str);
}

/// `EventLogger` that forwards to `tracing` at the matching level
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventLogger;

impl EventLogger for TracingEventLogger {
    fn log(&self, severity: Severity, event_id: EventId, source: &str, message: &str) {
        let code = event_id.code();
        match severity {
            Severity::Debug => {
                tracing::debug!(event_id = ?event_id, event_code = code, source = %source, "{message}")
            }
            Severity::Info => {
                tracing::info!(event_id = ?event_id, event_code = code, source = %source, "{message}")
            }
            Severity::Warning => {
                tracing::warn!(event_id = ?event_id, event_code = code, source = %source, "{message}")
            }
            Severity::Error | Severity::Critical => {
                tracing::error!(
                    event_id = ?event_id,
                    event_code = code,
                    source = %source,
                    critical = severity == Severity::Critical,
                    "{message}"
                )
            }
        }
    }
}

/// Log structured data for transport operations
pub fn log_transport_operation(
    operation: &str,
    queue_name: &str,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        queue_name = %queue_name,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📨 TRANSPORT_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}
