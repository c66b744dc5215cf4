//! Tracing setup for the broker.
//!
//! Standard output carries the JSONL protocol, so events go to standard error
//! only. Each request runs inside a `request` span naming the operation and
//! the calling user and conversation; events emitted by the zone and sandbox
//! layers while serving it inherit those fields.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::subscriber::SetGlobalDefaultError;
use tracing::{Span, Subscriber, info, info_span};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::{self, time::UtcTime};

use stowage_config::{Config, LogFormat};

const TELEMETRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::telemetry");

/// Target of the per-request span.
pub const REQUEST_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::request");

static INSTALLED_FORMAT: OnceCell<LogFormat> = OnceCell::new();

/// Proof that broker logging is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryHandle {
    format: LogFormat,
}

impl TelemetryHandle {
    /// Output format chosen by the call that installed logging.
    #[must_use]
    pub const fn format(self) -> LogFormat {
        self.format
    }
}

/// Errors raised while installing broker logging.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// `log_filter` is not a valid directive list.
    #[error("log filter `{filter}` is invalid: {message}")]
    Filter {
        /// Filter as configured.
        filter: String,
        /// Parser diagnostic.
        message: String,
    },
    /// Another global subscriber already owns the process.
    #[error("another tracing subscriber is already installed: {0}")]
    Subscriber(#[source] SetGlobalDefaultError),
}

/// Installs stderr logging for the broker once per process.
///
/// Later calls return a handle describing the logging installed by the first
/// successful call; their own configuration is ignored.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] for an unparsable `log_filter` and
/// [`TelemetryError::Subscriber`] when something else installed a global
/// subscriber first.
///
/// # Examples
///
/// ```rust
/// use stowage_config::{Config, LogFormat};
/// use stowaged::telemetry;
///
/// # fn main() -> Result<(), stowaged::TelemetryError> {
/// let handle = telemetry::initialise(&Config::default())?;
/// assert_eq!(handle.format(), LogFormat::Json);
/// assert_eq!(telemetry::initialise(&Config::default())?, handle);
/// # Ok(())
/// # }
/// ```
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    INSTALLED_FORMAT
        .get_or_try_init(|| install(config))
        .map(|format| TelemetryHandle { format: *format })
}

/// Span covering one broker request.
#[must_use]
pub fn request_span(operation: &'static str, user: &str, conversation: &str) -> Span {
    info_span!(target: REQUEST_TARGET, "request", operation, user, conversation)
}

fn install(config: &Config) -> Result<LogFormat, TelemetryError> {
    let filter = EnvFilter::try_new(config.log_filter()).map_err(|error| {
        TelemetryError::Filter {
            filter: config.log_filter().to_owned(),
            message: error.to_string(),
        }
    })?;
    let format = config.log_format();

    let stderr = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_timer(UtcTime::rfc_3339());

    let subscriber: Box<dyn Subscriber + Send + Sync> = match format {
        LogFormat::Json => Box::new(
            stderr
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(false)
                .finish(),
        ),
        LogFormat::Compact => Box::new(stderr.compact().finish()),
    };
    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)?;

    info!(
        target: TELEMETRY_TARGET,
        %format,
        filter = config.log_filter(),
        "broker logging installed"
    );
    Ok(format)
}
