//! Error types for the REST adapters.

use thiserror::Error;

/// Failures raised while talking to Azure REST endpoints.
#[derive(Debug, Error)]
pub enum AzureError {
    /// The request never produced a response.
    #[error("azure request failed")]
    Transport {
        /// Operation being performed.
        operation: &'static str,
        /// Underlying HTTP client failure.
        #[source]
        source: reqwest::Error,
    },
    /// The service answered with a non-success status.
    #[error("azure service rejected the request")]
    Status {
        /// Operation being performed.
        operation: &'static str,
        /// HTTP status code.
        status: u16,
        /// Service-provided error code, when present.
        code: Option<String>,
        /// Service-provided message, or the raw body.
        message: String,
    },
    /// The response body did not have the expected shape.
    #[error("azure response could not be decoded")]
    Decode {
        /// Operation being performed.
        operation: &'static str,
        /// Underlying decoding failure.
        #[source]
        source: reqwest::Error,
    },
    /// A request URL could not be built.
    #[error("azure request url is invalid")]
    Url {
        /// Offending base or path.
        value: String,
        /// Underlying parse failure.
        #[source]
        source: url::ParseError,
    },
    /// A credential setting was absent from the environment.
    #[error("azure credential setting missing")]
    MissingCredential {
        /// Environment variable that was expected.
        variable: &'static str,
    },
    /// The resource kind is not managed by this adapter.
    #[error("resource kind not supported by this adapter")]
    Unsupported {
        /// Resource kind label.
        kind: &'static str,
    },
    /// Building the HTTP client failed.
    #[error("failed to build azure http client")]
    Client {
        /// Underlying HTTP client failure.
        #[source]
        source: reqwest::Error,
    },
}

impl AzureError {
    /// HTTP status returned by the service, if the failure carried one.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Single-line description including the operation and service message.
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::Transport { operation, source } | Self::Decode { operation, source } => {
                format!("{self}: {operation}: {source}")
            }
            Self::Status {
                operation,
                status,
                code,
                message,
            } => match code {
                Some(code) => format!("{self}: {operation} returned {status} ({code}): {message}"),
                None => format!("{self}: {operation} returned {status}: {message}"),
            },
            Self::Url { value, source } => format!("{self}: `{value}`: {source}"),
            Self::MissingCredential { variable } => format!("{self}: {variable}"),
            Self::Unsupported { kind } => format!("{self}: {kind}"),
            Self::Client { source } => format!("{self}: {source}"),
        }
    }
}

/// Convenience alias for adapter results.
pub type AzureResult<T> = Result<T, AzureError>;
