//! Transfer request DTOs and the descriptors exchanged with the pipeline service.

use std::collections::BTreeMap;
use std::fmt::{self, Debug, Display, Formatter};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Endpoint type handled by the blob-to-blob copy service.
pub const BLOB_STORAGE_TYPE: &str = "AzureStorage";

/// Property keys recognised on blob storage endpoints.
pub mod schema {
    /// Discriminator key some callers repeat inside the property bag.
    pub const TYPE: &str = "type";
    /// Storage account name.
    pub const ACCOUNT_NAME: &str = "accountName";
    /// Container within the storage account.
    pub const CONTAINER_NAME: &str = "containerName";
    /// Optional object (blob) name within the container.
    pub const OBJECT_NAME: &str = "objectName";
    /// Shared account key used to reach the storage account.
    pub const SHARED_KEY: &str = "sharedKey";
}

const REDACTED: &str = "<redacted>";

/// One side of a copy: a typed, keyed bag of location and credential properties.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Endpoint type discriminator (e.g. [`BLOB_STORAGE_TYPE`]).
    #[serde(rename = "type")]
    pub kind: String,
    /// Addressing and credential properties.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl Endpoint {
    /// Construct an endpoint of the given type with no properties.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Construct a blob storage endpoint.
    #[must_use]
    pub fn blob() -> Self {
        Self::new(BLOB_STORAGE_TYPE)
    }

    /// Builder-style helper for attaching a property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Look up a property value.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Whether this endpoint is addressed with the blob storage scheme.
    #[must_use]
    pub fn is_blob_storage(&self) -> bool {
        self.kind == BLOB_STORAGE_TYPE
    }
}

impl Debug for Endpoint {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        let properties: BTreeMap<&str, &str> = self
            .properties
            .iter()
            .map(|(key, value)| {
                let shown = if key == schema::SHARED_KEY {
                    REDACTED
                } else {
                    value.as_str()
                };
                (key.as_str(), shown)
            })
            .collect();
        formatter
            .debug_struct("Endpoint")
            .field("kind", &self.kind)
            .field("properties", &properties)
            .finish()
    }
}

/// Which side of the copy an endpoint plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointRole {
    /// Data is read from this endpoint.
    Source,
    /// Data is written to this endpoint.
    Destination,
}

impl EndpointRole {
    /// Stable label used in logs and events.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Destination => "destination",
        }
    }

    /// Suffix appended to the request-scoped base name for this role's resources.
    #[must_use]
    pub const fn name_suffix(self) -> &'static str {
        match self {
            Self::Source => "src",
            Self::Destination => "dst",
        }
    }
}

impl Display for EndpointRole {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// A single bulk copy job handed to a transfer service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    /// Identifier of this request.
    pub id: String,
    /// Identifier of the enclosing transfer process.
    pub process_id: String,
    /// Where the bytes are read from.
    pub source: Endpoint,
    /// Where the bytes are written to.
    pub destination: Endpoint,
}

impl TransferRequest {
    /// Construct a request from its parts.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        process_id: impl Into<String>,
        source: Endpoint,
        destination: Endpoint,
    ) -> Self {
        Self {
            id: id.into(),
            process_id: process_id.into(),
            source,
            destination,
        }
    }

    /// Endpoint playing the given role.
    #[must_use]
    pub const fn endpoint(&self, role: EndpointRole) -> &Endpoint {
        match role {
            EndpointRole::Source => &self.source,
            EndpointRole::Destination => &self.destination,
        }
    }
}

/// Final result of one `transfer` invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOutcome {
    /// Whether the bytes were copied.
    pub succeeded: bool,
    /// Whether the caller may safely attempt the whole transfer again.
    pub retryable: bool,
    /// Human-readable detail, usually reported by the pipeline service.
    pub message: Option<String>,
}

impl TransferOutcome {
    /// Successful copy.
    #[must_use]
    pub const fn success() -> Self {
        Self {
            succeeded: true,
            retryable: false,
            message: None,
        }
    }

    /// Failed copy that may succeed when retried.
    #[must_use]
    pub fn retryable_failure(message: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            retryable: true,
            message: Some(message.into()),
        }
    }

    /// Failed copy that will not succeed without changed input.
    #[must_use]
    pub fn fatal_failure(message: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            retryable: false,
            message: Some(message.into()),
        }
    }

    /// Convert an error raised by the transfer lifecycle into outcome data.
    #[must_use]
    pub fn from_error(error: &crate::TransferError) -> Self {
        let message = error.detail();
        if error.is_retryable() {
            Self::retryable_failure(message)
        } else {
            Self::fatal_failure(message)
        }
    }
}

/// Pipeline run lifecycle as reported by the pipeline service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunStatus {
    /// Accepted, waiting for capacity.
    Queued,
    /// Copy is executing.
    InProgress,
    /// Copy completed.
    Succeeded,
    /// Copy failed.
    Failed,
    /// Cancellation requested; treated as terminal.
    Canceling,
    /// Run was cancelled.
    Cancelled,
    /// A status string outside the known vocabulary.
    Unrecognized(String),
}

impl RunStatus {
    /// Map a raw status string onto the closed vocabulary. Never fails.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "Queued" => Self::Queued,
            "InProgress" => Self::InProgress,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            "Canceling" => Self::Canceling,
            "Cancelled" => Self::Cancelled,
            other => Self::Unrecognized(other.to_string()),
        }
    }

    /// Wire representation of the status.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Queued => "Queued",
            Self::InProgress => "InProgress",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Canceling => "Canceling",
            Self::Cancelled => "Cancelled",
            Self::Unrecognized(raw) => raw,
        }
    }

    /// Bounded label for metrics; every unrecognised status shares `unrecognized`.
    #[must_use]
    pub const fn metric_label(&self) -> &'static str {
        match self {
            Self::Queued => "Queued",
            Self::InProgress => "InProgress",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Canceling => "Canceling",
            Self::Cancelled => "Cancelled",
            Self::Unrecognized(_) => "unrecognized",
        }
    }

    /// Whether the run has stopped changing.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Canceling | Self::Cancelled
        )
    }
}

impl Display for RunStatus {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Raw status observation returned by the pipeline service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSnapshot {
    /// Status string as reported.
    pub status: String,
    /// Optional service-reported message.
    pub message: Option<String>,
}

impl RunSnapshot {
    /// Construct a snapshot from a status string and optional message.
    #[must_use]
    pub fn new(status: impl Into<String>, message: Option<String>) -> Self {
        Self {
            status: status.into(),
            message,
        }
    }

    /// Parsed status.
    #[must_use]
    pub fn run_status(&self) -> RunStatus {
        RunStatus::parse(&self.status)
    }
}

/// Handle to a triggered pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Identifier assigned by the pipeline service.
    pub run_id: String,
    /// Last observed status.
    pub status: RunStatus,
}

/// Reference to a secret stored in the secret store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretHandle {
    /// Name the secret is stored under.
    pub name: String,
}

/// Kinds of ephemeral resource created for a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Credential registered in the secret store.
    Secret,
    /// Linked endpoint descriptor in the pipeline service.
    LinkedService,
    /// Dataset descriptor in the pipeline service.
    Dataset,
    /// Pipeline definition in the pipeline service.
    Pipeline,
}

impl ResourceKind {
    /// Stable label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Secret => "secret",
            Self::LinkedService => "linked_service",
            Self::Dataset => "dataset",
            Self::Pipeline => "pipeline",
        }
    }
}

/// Named resource held by a collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    /// Resource kind.
    pub kind: ResourceKind,
    /// Resource name.
    pub name: String,
}

impl ResourceRef {
    /// Construct a reference.
    #[must_use]
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

/// Linked endpoint descriptor: a storage account plus an indirect credential reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedServiceDefinition {
    /// Descriptor name.
    pub name: String,
    /// Storage account reached through this descriptor.
    pub account_name: String,
    /// Secret holding the account key.
    pub secret_name: String,
    /// Pre-existing linked service used to dereference the secret.
    pub secret_store_linked_service: String,
}

impl LinkedServiceDefinition {
    /// Connection string carrying no credential material.
    #[must_use]
    pub fn connection_string(&self) -> String {
        format!(
            "DefaultEndpointsProtocol=https;AccountName={};",
            self.account_name
        )
    }
}

/// Dataset descriptor: a container/object reached through a linked endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetDefinition {
    /// Descriptor name.
    pub name: String,
    /// Linked endpoint descriptor the dataset reads through.
    pub linked_service: String,
    /// Container name.
    pub container: String,
    /// Object name; `None` addresses the container root.
    pub object_name: Option<String>,
}

/// A single copy step between two datasets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyActivity {
    /// Step name.
    pub name: String,
    /// Dataset read from.
    pub input_dataset: String,
    /// Dataset written to.
    pub output_dataset: String,
    /// Whether the service verifies copied data.
    pub validate_data_consistency: bool,
    /// Parallelism hint for the copy.
    pub data_integration_units: u32,
}

/// Pipeline definition submitted to the pipeline service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    /// Pipeline name.
    pub name: String,
    /// Steps executed by the pipeline.
    pub activities: Vec<CopyActivity>,
    /// Elapsed-time threshold after which the service flags the run.
    pub elapsed_time_metric: Duration,
}

/// Ephemeral resources created to let the pipeline service reach one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionedEndpoint {
    /// Role the endpoint plays in the copy.
    pub role: EndpointRole,
    /// Registered credential.
    pub secret: SecretHandle,
    /// Linked endpoint descriptor.
    pub linked_service: ResourceRef,
    /// Dataset descriptor.
    pub dataset: ResourceRef,
}
