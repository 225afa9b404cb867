//! # Design
//!
//! - Centralise application-level errors for bootstrap and command handling.
//! - Keep error messages constant while carrying context fields for debugging.
//! - Preserve source errors without re-logging at call sites.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Settings could not be loaded.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: skyferry_config::ConfigError,
    },
    /// Telemetry operations failed.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: skyferry_telemetry::TelemetryError,
    },
    /// Azure adapter construction failed.
    #[error("azure adapter operation failed")]
    Azure {
        /// Operation identifier.
        operation: &'static str,
        /// Source adapter error.
        source: skyferry_azure::AzureError,
    },
    /// IO operations failed.
    #[error("io operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Optional path involved in the failure.
        path: Option<PathBuf>,
        /// Source IO error.
        source: io::Error,
    },
    /// A request document was not valid JSON for a transfer request.
    #[error("request document is invalid")]
    RequestDocument {
        /// Path of the document.
        path: PathBuf,
        /// Source parse error.
        source: serde_json::Error,
    },
    /// No registered service can move data between the request's endpoints.
    #[error("no transfer service handles this request")]
    NoService {
        /// Request identifier.
        request_id: String,
        /// Source endpoint type.
        source_type: String,
        /// Destination endpoint type.
        destination_type: String,
    },
}

impl AppError {
    pub(crate) const fn config(
        operation: &'static str,
        source: skyferry_config::ConfigError,
    ) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn telemetry(
        operation: &'static str,
        source: skyferry_telemetry::TelemetryError,
    ) -> Self {
        Self::Telemetry { operation, source }
    }

    pub(crate) const fn azure(operation: &'static str, source: skyferry_azure::AzureError) -> Self {
        Self::Azure { operation, source }
    }

    /// Single-line description including context fields and the source.
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::Config { operation, source } => {
                format!("{self}: {operation}: {}", describe_config(source))
            }
            Self::Telemetry { operation, source } => {
                format!("{self}: {operation}: {}", source.detail())
            }
            Self::Azure { operation, source } => {
                format!("{self}: {operation}: {}", source.detail())
            }
            Self::Io {
                operation,
                path,
                source,
            } => match path {
                Some(path) => format!("{self}: {operation} {}: {source}", path.display()),
                None => format!("{self}: {operation}: {source}"),
            },
            Self::RequestDocument { path, source } => {
                format!("{self}: {}: {source}", path.display())
            }
            Self::NoService {
                request_id,
                source_type,
                destination_type,
            } => format!(
                "{self}: request `{request_id}` copies `{source_type}` to `{destination_type}`"
            ),
        }
    }
}

fn describe_config(err: &skyferry_config::ConfigError) -> String {
    use skyferry_config::ConfigError;
    match err {
        ConfigError::MissingField { section, field } => format!("{section}.{field} is required"),
        ConfigError::InvalidField {
            section,
            field,
            value,
            reason,
        } => match value {
            Some(value) => format!("{section}.{field} = `{value}` {reason}"),
            None => format!("{section}.{field} {reason}"),
        },
        ConfigError::UnknownField { section, field } => {
            format!("{section}.{field} is not a known setting")
        }
        ConfigError::Json { operation, source } => format!("{err}: {operation}: {source}"),
        ConfigError::Io { operation, source } => format!("{err}: {operation}: {source}"),
    }
}
