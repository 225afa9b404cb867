#![forbid(unsafe_code)]
#![warn(
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Service-agnostic transfer interfaces and DTOs.
//!
//! Layout: `model` (requests, endpoints, run status, descriptors), `service` (inbound
//! [`TransferService`] contract and the [`SecretStore`] / [`PipelineService`] collaborators),
//! `error` (validation and lifecycle errors).

pub mod error;
pub mod model;
pub mod service;

pub use error::{TransferError, TransferResult, ValidationError, ValidationReason};
pub use model::{
    BLOB_STORAGE_TYPE, CopyActivity, DatasetDefinition, Endpoint, EndpointRole,
    LinkedServiceDefinition, PipelineDefinition, PipelineRun, ProvisionedEndpoint, ResourceKind,
    ResourceRef, RunSnapshot, RunStatus, SecretHandle, TransferOutcome, TransferRequest, schema,
};
pub use service::{PipelineService, SecretStore, TransferService};
