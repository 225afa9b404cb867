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

//! REST adapters that let the transfer service reach Azure.
//!
//! Layout: `auth` (bearer token sources), `keyvault` (secret store), `arm` (Data Factory
//! pipeline service), `http` (request plumbing), `error`.

pub mod arm;
pub mod auth;
pub mod error;
mod http;
pub mod keyvault;

pub use arm::{ArmPipelineClient, DATA_FACTORY_API_VERSION};
pub use auth::{ClientSecretCredential, StaticToken, TokenSource};
pub use error::{AzureError, AzureResult};
pub use keyvault::{KEY_VAULT_API_VERSION, KEY_VAULT_SCOPE, KeyVaultSecretClient};

/// Convert an adapter error for the collaborator traits, keeping the detail in the message and
/// the typed error in the chain.
pub(crate) fn into_anyhow(err: AzureError) -> anyhow::Error {
    let detail = err.detail();
    anyhow::Error::new(err).context(detail)
}
