//! Key Vault secrets client implementing [`SecretStore`].
//!
//! Setting a secret that already exists adds a new version. Deleting a secret soft-deletes it and
//! then purges it, so a retried transfer can register the same name again.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::json;
use skyferry_core::{SecretHandle, SecretStore};
use tracing::{debug, warn};

use crate::auth::TokenSource;
use crate::error::AzureResult;
use crate::{http, into_anyhow};

/// API version of the Key Vault data plane.
pub const KEY_VAULT_API_VERSION: &str = "7.4";

/// Token scope for the Key Vault data plane.
pub const KEY_VAULT_SCOPE: &str = "https://vault.azure.net/.default";

const PURGE_ATTEMPTS: u32 = 5;
const PURGE_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Secret store backed by one vault.
pub struct KeyVaultSecretClient {
    http: Client,
    vault_uri: String,
    tokens: Arc<dyn TokenSource>,
    purge_on_delete: bool,
}

#[derive(Deserialize)]
struct SecretBundle {
    id: String,
}

impl KeyVaultSecretClient {
    /// Client for the vault at `vault_uri` (for example `https://myvault.vault.azure.net`).
    #[must_use]
    pub fn new(http: Client, vault_uri: impl Into<String>, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            http,
            vault_uri: vault_uri.into(),
            tokens,
            purge_on_delete: true,
        }
    }

    /// Whether deleted secrets are also purged. Purging needs the `purge` permission.
    #[must_use]
    pub const fn with_purge(mut self, purge_on_delete: bool) -> Self {
        self.purge_on_delete = purge_on_delete;
        self
    }

    async fn request(&self, method: Method, path: &str) -> AzureResult<RequestBuilder> {
        let url = http::join(&self.vault_uri, path)?;
        let token = self.tokens.bearer(KEY_VAULT_SCOPE).await?;
        Ok(self
            .http
            .request(method, url)
            .bearer_auth(token)
            .query(&[("api-version", KEY_VAULT_API_VERSION)]))
    }

    async fn put_secret(&self, name: &str, value: &str) -> AzureResult<SecretHandle> {
        let request = self
            .request(Method::PUT, &format!("/secrets/{name}"))
            .await?
            .json(&json!({ "value": value }));
        let response = http::execute(request, "set secret").await?;
        let bundle: SecretBundle = http::decode(response, "set secret").await?;
        debug!(secret = name, version = bundle.id.rsplit('/').next().unwrap_or_default(), "secret stored");
        Ok(SecretHandle {
            name: name.to_string(),
        })
    }

    async fn remove_secret(&self, name: &str) -> AzureResult<()> {
        let request = self
            .request(Method::DELETE, &format!("/secrets/{name}"))
            .await?;
        if http::execute_allow_missing(request, "delete secret")
            .await?
            .is_none()
        {
            debug!(secret = name, "secret already absent");
            return Ok(());
        }
        if self.purge_on_delete {
            self.purge(name).await;
        }
        Ok(())
    }

    /// Purge a soft-deleted secret. The vault reports a conflict while deletion is still in
    /// progress, so conflicts are retried a few times. Failure leaves the secret recoverable.
    async fn purge(&self, name: &str) {
        for attempt in 1..=PURGE_ATTEMPTS {
            let result = match self
                .request(Method::DELETE, &format!("/deletedsecrets/{name}"))
                .await
            {
                Ok(request) => http::execute_allow_missing(request, "purge secret").await,
                Err(err) => Err(err),
            };
            match result {
                Ok(_) => {
                    debug!(secret = name, "deleted secret purged");
                    return;
                }
                Err(err)
                    if err.status() == Some(StatusCode::CONFLICT.as_u16())
                        && attempt < PURGE_ATTEMPTS =>
                {
                    tokio::time::sleep(PURGE_RETRY_DELAY).await;
                }
                Err(err) => {
                    warn!(error = %err, detail = %err.detail(), secret = name, "failed to purge deleted secret");
                    return;
                }
            }
        }
    }
}

#[async_trait]
impl SecretStore for KeyVaultSecretClient {
    async fn set_secret(&self, name: &str, value: &str) -> anyhow::Result<SecretHandle> {
        self.put_secret(name, value).await.map_err(into_anyhow)
    }

    async fn delete_secret(&self, name: &str) -> anyhow::Result<()> {
        self.remove_secret(name).await.map_err(into_anyhow)
    }
}
