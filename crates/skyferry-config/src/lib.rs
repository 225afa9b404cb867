#![forbid(unsafe_code)]
#![warn(
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]

//! Settings for the blob copy service: which factory and vault to use, how resources are named,
//! and how runs are polled and cleaned up.
//!
//! Layout: `model.rs` (typed settings), `loader.rs` (environment + JSON overlay),
//! `resource_id.rs` (ARM identifier parsing), `error.rs`.

mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod resource_id;

pub use error::{ConfigError, ConfigResult};
pub use loader::{SettingsLoader, keys};
pub use model::{CleanupPolicy, CopySettings, FactorySettings, KeyVaultSettings, PollSettings};
pub use resource_id::{DATA_FACTORY_PROVIDER, KEY_VAULT_PROVIDER, ResourceId, ResourceIdError};
