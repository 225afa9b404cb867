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

//! Blob-to-blob transfers executed as ephemeral Data Factory pipelines.
//!
//! Layout: `validator` (destination property rules), `naming` (per-request resource names),
//! `provisioner` (secret, linked service and dataset per endpoint), `pipeline` (copy pipeline
//! and run trigger), `poller` (run status backoff loop), `cleanup` (resource ledger),
//! `service` (the [`DataFactoryTransferService`] facade).

pub mod cleanup;
pub mod naming;
pub mod pipeline;
pub mod poller;
pub mod provisioner;
pub mod service;
pub mod validator;

pub use cleanup::{CleanupReport, ResourceLedger};
pub use naming::NameScope;
pub use pipeline::{COPY_ACTIVITY_NAME, PipelineOrchestrator};
pub use poller::{PollPolicy, RunPoller, terminal_outcome};
pub use provisioner::ResourceProvisioner;
pub use service::{DataFactoryTransferService, SERVICE_NAME, ServiceConfig, TransferHandle};
pub use validator::validate_destination;
