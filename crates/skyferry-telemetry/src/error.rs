//! Failures raised while installing logging or building the transfer metrics registry.

use prometheus::Error as PrometheusError;
use thiserror::Error;
use tracing_subscriber::util::TryInitError;

/// Result alias for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Errors raised by telemetry helpers.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global tracing subscriber was already installed, usually by an earlier `init_logging`.
    #[error("logging is already initialised")]
    LoggingInstall {
        /// Subscriber error.
        #[source]
        source: TryInitError,
    },
    /// A `skyferry_*` collector had invalid options or labels.
    #[error("metric {metric} could not be built")]
    Collector {
        /// Metric name.
        metric: &'static str,
        /// Prometheus error.
        #[source]
        source: PrometheusError,
    },
    /// A `skyferry_*` collector clashed with one already in the registry.
    #[error("metric {metric} could not be registered")]
    Registration {
        /// Metric name.
        metric: &'static str,
        /// Prometheus error.
        #[source]
        source: PrometheusError,
    },
    /// The text exposition of the registry failed.
    #[error("metrics could not be rendered")]
    Render {
        /// Prometheus error.
        #[source]
        source: PrometheusError,
    },
    /// The text exposition produced bytes that were not UTF-8.
    #[error("rendered metrics were not utf-8")]
    RenderUtf8 {
        /// Conversion error.
        #[source]
        source: std::string::FromUtf8Error,
    },
}

impl TelemetryError {
    /// Single-line description including the source.
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::LoggingInstall { source } => format!("{self}: {source}"),
            Self::Collector { source, .. }
            | Self::Registration { source, .. }
            | Self::Render { source } => format!("{self}: {source}"),
            Self::RenderUtf8 { source } => format!("{self}: {source}"),
        }
    }
}
