//! # Design
//!
//! - Separate local validation failures from collaborator faults.
//! - Carry the operation and resource name as fields; collaborator errors stay as sources.
//! - Run failures are outcomes, not errors, and never appear here.

use std::error::Error;
use std::fmt::{self, Display, Formatter};

use thiserror::Error;

use crate::model::{EndpointRole, ResourceKind};

/// Convenience alias for transfer lifecycle results.
pub type TransferResult<T> = Result<T, TransferError>;

/// Why a property failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationReason {
    /// Required property was absent.
    Missing,
    /// Property was present but broke a format rule.
    Malformed(&'static str),
    /// Property is not part of the recognised set.
    Unexpected,
}

/// Local, synchronous validation failure naming the offending property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Offending property key.
    pub property: String,
    /// Failure reason.
    pub reason: ValidationReason,
}

impl ValidationError {
    /// Required property was absent.
    #[must_use]
    pub fn missing(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            reason: ValidationReason::Missing,
        }
    }

    /// Property broke a format rule.
    #[must_use]
    pub fn malformed(property: impl Into<String>, rule: &'static str) -> Self {
        Self {
            property: property.into(),
            reason: ValidationReason::Malformed(rule),
        }
    }

    /// Property is not recognised.
    #[must_use]
    pub fn unexpected(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            reason: ValidationReason::Unexpected,
        }
    }
}

impl Display for ValidationError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self.reason {
            ValidationReason::Missing => write!(formatter, "missing property `{}`", self.property),
            ValidationReason::Malformed(rule) => {
                write!(formatter, "invalid property `{}`: {rule}", self.property)
            }
            ValidationReason::Unexpected => {
                write!(formatter, "unexpected property `{}`", self.property)
            }
        }
    }
}

impl Error for ValidationError {}

/// Errors raised by the transfer lifecycle.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Request failed local validation.
    #[error("transfer request failed validation")]
    Validation(#[from] ValidationError),
    /// An endpoint lacked a property required to provision it.
    #[error("endpoint cannot be provisioned")]
    InvalidEndpoint {
        /// Endpoint role.
        role: EndpointRole,
        /// Missing or unusable property.
        property: &'static str,
    },
    /// Creating an ephemeral resource failed.
    #[error("resource provisioning failed")]
    Provisioning {
        /// Kind of resource being created.
        kind: ResourceKind,
        /// Name of the resource being created.
        name: String,
        /// Underlying collaborator failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// Triggering the pipeline run failed.
    #[error("pipeline submission failed")]
    Submission {
        /// Pipeline name.
        pipeline: String,
        /// Underlying collaborator failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// Querying run status kept failing.
    #[error("pipeline run status query failed")]
    StatusQuery {
        /// Run identifier.
        run_id: String,
        /// Consecutive failed attempts.
        attempts: u32,
        /// Last collaborator failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The transfer was cancelled before an outcome was reached.
    #[error("transfer cancelled")]
    Cancelled {
        /// Request identifier.
        request_id: String,
    },
}

impl TransferError {
    /// Wrap a collaborator failure raised while creating a resource.
    #[must_use]
    pub fn provisioning(kind: ResourceKind, name: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Provisioning {
            kind,
            name: name.into(),
            source: source.into(),
        }
    }

    /// Wrap a collaborator failure raised while triggering a run.
    #[must_use]
    pub fn submission(pipeline: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Submission {
            pipeline: pipeline.into(),
            source: source.into(),
        }
    }

    /// Whether retrying the whole transfer may succeed without changed input.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Provisioning { .. }
            | Self::Submission { .. }
            | Self::StatusQuery { .. }
            | Self::Cancelled { .. } => true,
            Self::Validation(_) | Self::InvalidEndpoint { .. } => false,
        }
    }

    /// Single-line description including context fields and the source chain head.
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::Validation(inner) => inner.to_string(),
            Self::InvalidEndpoint { role, property } => {
                format!("{self}: {role} endpoint requires `{property}`")
            }
            Self::Provisioning { kind, name, source } => {
                format!("{self}: {} `{name}`: {source}", kind.as_str())
            }
            Self::Submission { pipeline, source } => {
                format!("{self}: pipeline `{pipeline}`: {source}")
            }
            Self::StatusQuery {
                run_id,
                attempts,
                source,
            } => format!("{self}: run `{run_id}` after {attempts} attempts: {source}"),
            Self::Cancelled { request_id } => format!("{self}: request `{request_id}`"),
        }
    }
}
