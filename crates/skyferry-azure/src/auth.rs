//! Bearer token sources for the management and Key Vault APIs.
//!
//! # Design
//! - Adapters ask a [`TokenSource`] for a token per request and never cache on their own.
//! - [`ClientSecretCredential`] caches one token per scope and refreshes it ahead of expiry.
//! - Secrets and tokens never appear in `Debug` output or logs.

use std::collections::HashMap;
use std::fmt::{self, Debug, Formatter};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{AzureError, AzureResult};
use crate::http;

/// Default identity platform host.
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Environment variable naming the directory tenant.
pub const ENV_TENANT_ID: &str = "AZURE_TENANT_ID";
/// Environment variable naming the application (client) id.
pub const ENV_CLIENT_ID: &str = "AZURE_CLIENT_ID";
/// Environment variable holding the client secret.
pub const ENV_CLIENT_SECRET: &str = "AZURE_CLIENT_SECRET";
/// Optional environment variable overriding the identity platform host.
pub const ENV_AUTHORITY_HOST: &str = "AZURE_AUTHORITY_HOST";

const REFRESH_SKEW: Duration = Duration::from_secs(300);

/// Supplies bearer tokens for a scope such as `https://management.azure.com/.default`.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Token valid for `scope`, without the `Bearer ` prefix.
    async fn bearer(&self, scope: &str) -> AzureResult<String>;
}

/// Fixed token, for pre-authenticated sessions and tests.
#[derive(Clone)]
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    /// Wrap an already issued token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl Debug for StaticToken {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("StaticToken")
            .field("token", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn bearer(&self, _scope: &str) -> AzureResult<String> {
        Ok(self.token.clone())
    }
}

/// Client-credentials flow against the identity platform.
pub struct ClientSecretCredential {
    http: Client,
    authority_host: String,
    tenant_id: String,
    client_id: String,
    client_secret: String,
    cache: Mutex<HashMap<String, CachedToken>>,
}

struct CachedToken {
    token: String,
    refresh_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

impl ClientSecretCredential {
    /// Credential for an application registration.
    #[must_use]
    pub fn new(
        http: Client,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            http,
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Use a different identity platform host (sovereign clouds, tests).
    #[must_use]
    pub fn with_authority_host(mut self, host: impl Into<String>) -> Self {
        self.authority_host = host.into();
        self
    }

    /// Read the `AZURE_*` variables through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`AzureError::MissingCredential`] naming the first absent or blank variable.
    pub fn from_lookup<F>(http: Client, lookup: F) -> AzureResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |variable: &'static str| {
            lookup(variable)
                .filter(|value| !value.trim().is_empty())
                .ok_or(AzureError::MissingCredential { variable })
        };
        let credential = Self::new(
            http,
            read(ENV_TENANT_ID)?,
            read(ENV_CLIENT_ID)?,
            read(ENV_CLIENT_SECRET)?,
        );
        Ok(match read(ENV_AUTHORITY_HOST) {
            Ok(host) => credential.with_authority_host(host),
            Err(_) => credential,
        })
    }

    /// Read the `AZURE_*` variables from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`AzureError::MissingCredential`] naming the first absent or blank variable.
    pub fn from_env(http: Client) -> AzureResult<Self> {
        Self::from_lookup(http, |key| std::env::var(key).ok())
    }

    async fn request_token(&self, scope: &str) -> AzureResult<TokenResponse> {
        let url = http::join(
            &self.authority_host,
            &format!("/{}/oauth2/v2.0/token", self.tenant_id),
        )?;
        let request = self.http.post(url).form(&[
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", scope),
        ]);
        let response = http::execute(request, "acquire token").await?;
        http::decode(response, "acquire token").await
    }
}

impl Debug for ClientSecretCredential {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ClientSecretCredential")
            .field("authority_host", &self.authority_host)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenSource for ClientSecretCredential {
    async fn bearer(&self, scope: &str) -> AzureResult<String> {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.get(scope)
            && Instant::now() < cached.refresh_at
        {
            return Ok(cached.token.clone());
        }

        let issued = self.request_token(scope).await?;
        let lifetime = Duration::from_secs(issued.expires_in).saturating_sub(REFRESH_SKEW);
        debug!(scope, lifetime_secs = lifetime.as_secs(), "access token acquired");
        cache.insert(
            scope.to_string(),
            CachedToken {
                token: issued.access_token.clone(),
                refresh_at: Instant::now() + lifetime,
            },
        );
        Ok(issued.access_token)
    }
}
