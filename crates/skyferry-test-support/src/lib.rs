#![forbid(unsafe_code)]
#![warn(
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]

//! Shared test helpers used across skyferry test suites.
//! Layout: fixtures.rs (request builders), mocks.rs (in-memory collaborators).

pub mod fixtures;
pub mod mocks;

pub use fixtures::{blob_endpoint, sample_request};
pub use mocks::{MemorySecretStore, PipelineOperation, ScriptedPipelineService};
