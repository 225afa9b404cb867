//! Wiring from settings to a ready transfer-service registry.
//!
//! # Design
//! - One HTTP client and one token source are built at startup and shared by both adapters.
//! - Missing credentials do not stop bootstrap; the adapters fail on first use instead, so
//!   local-only commands such as `validate` still work.
//! - Collaborators are injectable so tests can run the full wiring against fakes.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use skyferry_azure::{
    ArmPipelineClient, AzureError, AzureResult, ClientSecretCredential, KeyVaultSecretClient,
    TokenSource,
};
use skyferry_config::{FactorySettings, SettingsLoader};
use skyferry_core::{PipelineService, SecretStore};
use skyferry_events::EventBus;
use skyferry_factory::{DataFactoryTransferService, ServiceConfig};
use skyferry_telemetry::Metrics;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::registry::TransferServiceRegistry;

const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// External collaborators the transfer service talks to.
#[derive(Clone)]
pub struct Collaborators {
    /// Secret store for endpoint credentials.
    pub secrets: Arc<dyn SecretStore>,
    /// Pipeline-execution service.
    pub pipelines: Arc<dyn PipelineService>,
}

/// Everything a command needs after bootstrap.
pub struct AppContext {
    settings: FactorySettings,
    registry: TransferServiceRegistry,
    factory: DataFactoryTransferService,
    events: EventBus,
    metrics: Metrics,
}

impl AppContext {
    /// Loaded settings.
    #[must_use]
    pub const fn settings(&self) -> &FactorySettings {
        &self.settings
    }

    /// Registry used to pick a service per request.
    #[must_use]
    pub const fn registry(&self) -> &TransferServiceRegistry {
        &self.registry
    }

    /// The blob copy service.
    #[must_use]
    pub const fn factory(&self) -> &DataFactoryTransferService {
        &self.factory
    }

    /// Shared event bus.
    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// Shared metrics registry.
    #[must_use]
    pub const fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Cancel in-flight transfers; each still releases its resources.
    pub fn shutdown(&self) {
        self.factory.shutdown();
    }
}

/// Load settings through `loader`, layering the overlay file underneath when given.
///
/// # Errors
///
/// Returns [`AppError::Config`] for unreadable overlays and missing or invalid settings.
pub fn load_settings(loader: SettingsLoader, overlay: Option<&Path>) -> AppResult<FactorySettings> {
    let loader = match overlay {
        Some(path) => loader
            .with_overlay_file(path)
            .map_err(|err| AppError::config("settings.overlay", err))?,
        None => loader,
    };
    loader
        .load()
        .map_err(|err| AppError::config("settings.load", err))
}

/// Assemble the registry around injected collaborators.
///
/// # Errors
///
/// Returns [`AppError::Telemetry`] when the metrics registry cannot be built.
pub fn build_context(
    settings: FactorySettings,
    collaborators: Collaborators,
) -> AppResult<AppContext> {
    let events = EventBus::new();
    let metrics = Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;
    let factory = DataFactoryTransferService::new(
        ServiceConfig::from_settings(&settings),
        collaborators.secrets,
        collaborators.pipelines,
        events.clone(),
        metrics.clone(),
    );

    let mut registry = TransferServiceRegistry::new();
    registry.register(Arc::new(factory.clone()));
    info!(
        factory = %settings.factory.name,
        vault = %settings.key_vault.resource_id.name,
        max_concurrent_transfers = settings.max_concurrent_transfers,
        "transfer services ready"
    );

    Ok(AppContext {
        settings,
        registry,
        factory,
        events,
        metrics,
    })
}

/// REST collaborators for the configured factory and vault.
#[must_use]
pub fn azure_collaborators(
    settings: &FactorySettings,
    http: &Client,
    tokens: &Arc<dyn TokenSource>,
) -> Collaborators {
    Collaborators {
        secrets: Arc::new(KeyVaultSecretClient::new(
            http.clone(),
            settings.key_vault.uri.clone(),
            Arc::clone(tokens),
        )),
        pipelines: Arc::new(ArmPipelineClient::new(
            http.clone(),
            settings.arm_endpoint.clone(),
            settings.factory.clone(),
            Arc::clone(tokens),
        )),
    }
}

/// Token source from the `AZURE_*` variables, or one that fails on use when they are absent.
#[must_use]
pub fn token_source_from_env(http: &Client) -> Arc<dyn TokenSource> {
    match ClientSecretCredential::from_env(http.clone()) {
        Ok(credential) => Arc::new(credential),
        Err(AzureError::MissingCredential { variable }) => {
            warn!(variable, "azure credentials not configured; remote calls will fail");
            Arc::new(Unconfigured { variable })
        }
        Err(err) => {
            warn!(error = %err, detail = %err.detail(), "azure credentials unusable; remote calls will fail");
            Arc::new(Unconfigured {
                variable: skyferry_azure::auth::ENV_CLIENT_ID,
            })
        }
    }
}

/// Production bootstrap: settings from the environment, REST collaborators, env credentials.
///
/// # Errors
///
/// Returns an error if settings are invalid or the HTTP client cannot be built.
pub fn from_env(overlay: Option<&Path>) -> AppResult<AppContext> {
    let settings = load_settings(SettingsLoader::from_env(), overlay)?;
    let http = Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|source| AppError::azure("http.client", AzureError::Client { source }))?;
    let tokens = token_source_from_env(&http);
    let collaborators = azure_collaborators(&settings, &http, &tokens);
    build_context(settings, collaborators)
}

struct Unconfigured {
    variable: &'static str,
}

#[async_trait]
impl TokenSource for Unconfigured {
    async fn bearer(&self, _scope: &str) -> AzureResult<String> {
        Err(AzureError::MissingCredential {
            variable: self.variable,
        })
    }
}
