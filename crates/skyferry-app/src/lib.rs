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

//! Application wiring for the `skyferry` binary: settings, Azure adapters, the service registry
//! and the command line.

pub mod bootstrap;
pub mod cli;
pub mod error;
pub mod registry;

pub use bootstrap::{AppContext, Collaborators, build_context, load_settings};
pub use cli::{Cli, Command, run, run_with};
pub use error::{AppError, AppResult};
pub use registry::TransferServiceRegistry;
