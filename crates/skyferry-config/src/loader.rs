//! Settings loader: environment (or any key lookup) over an optional JSON overlay.
//!
//! # Design
//! - Keys are the `SKYFERRY_*` environment names; overlay documents use the same names lowercased
//!   without the prefix (`resource_prefix`, `poll_initial_ms`, ...).
//! - The lookup wins over the overlay; blank lookup values count as absent.
//! - Every rejected value is reported as [`ConfigError::InvalidField`] naming the key.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::defaults;
use crate::error::{ConfigError, ConfigResult};
use crate::model::{CleanupPolicy, CopySettings, FactorySettings, KeyVaultSettings, PollSettings};
use crate::resource_id::{DATA_FACTORY_PROVIDER, KEY_VAULT_PROVIDER, ResourceId};

/// Environment variable names recognised by the loader.
pub mod keys {
    /// ARM id of the Data Factory instance. Required.
    pub const DATAFACTORY_RESOURCE_ID: &str = "SKYFERRY_DATAFACTORY_RESOURCE_ID";
    /// ARM id of the Key Vault. Required.
    pub const KEYVAULT_RESOURCE_ID: &str = "SKYFERRY_KEYVAULT_RESOURCE_ID";
    /// Overrides the vault URI derived from its resource id.
    pub const KEYVAULT_URI: &str = "SKYFERRY_KEYVAULT_URI";
    /// Linked service used to dereference vault secrets.
    pub const KEYVAULT_LINKED_SERVICE: &str = "SKYFERRY_KEYVAULT_LINKED_SERVICE";
    /// Prefix for ephemeral resource names.
    pub const RESOURCE_PREFIX: &str = "SKYFERRY_RESOURCE_PREFIX";
    /// Concurrency cap for transfers.
    pub const MAX_CONCURRENT_TRANSFERS: &str = "SKYFERRY_MAX_CONCURRENT_TRANSFERS";
    /// First poll delay in milliseconds.
    pub const POLL_INITIAL_MS: &str = "SKYFERRY_POLL_INITIAL_MS";
    /// Poll delay cap in milliseconds.
    pub const POLL_MAX_MS: &str = "SKYFERRY_POLL_MAX_MS";
    /// Poll delay multiplier.
    pub const POLL_BACKOFF: &str = "SKYFERRY_POLL_BACKOFF";
    /// Overall run wait ceiling in seconds.
    pub const RUN_TIMEOUT_SECS: &str = "SKYFERRY_RUN_TIMEOUT_SECS";
    /// Consecutive status query failures tolerated.
    pub const STATUS_ERROR_LIMIT: &str = "SKYFERRY_STATUS_ERROR_LIMIT";
    /// Copy parallelism hint.
    pub const DATA_INTEGRATION_UNITS: &str = "SKYFERRY_DATA_INTEGRATION_UNITS";
    /// Pipeline elapsed-time alert in seconds.
    pub const PIPELINE_ELAPSED_ALERT_SECS: &str = "SKYFERRY_PIPELINE_ELAPSED_ALERT_SECS";
    /// Delete ephemeral resources after failures.
    pub const CLEANUP_ON_FAILURE: &str = "SKYFERRY_CLEANUP_ON_FAILURE";
    /// Delete ephemeral resources after successes.
    pub const CLEANUP_ON_SUCCESS: &str = "SKYFERRY_CLEANUP_ON_SUCCESS";
    /// Resource Manager endpoint.
    pub const ARM_ENDPOINT: &str = "SKYFERRY_ARM_ENDPOINT";

    pub(crate) const ALL: [&str; 16] = [
        DATAFACTORY_RESOURCE_ID,
        KEYVAULT_RESOURCE_ID,
        KEYVAULT_URI,
        KEYVAULT_LINKED_SERVICE,
        RESOURCE_PREFIX,
        MAX_CONCURRENT_TRANSFERS,
        POLL_INITIAL_MS,
        POLL_MAX_MS,
        POLL_BACKOFF,
        RUN_TIMEOUT_SECS,
        STATUS_ERROR_LIMIT,
        DATA_INTEGRATION_UNITS,
        PIPELINE_ELAPSED_ALERT_SECS,
        CLEANUP_ON_FAILURE,
        CLEANUP_ON_SUCCESS,
        ARM_ENDPOINT,
    ];
}

const KEY_PREFIX: &str = "SKYFERRY_";
const MAX_PREFIX_LEN: usize = 32;

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Builds [`FactorySettings`] from a key lookup plus an optional overlay document.
pub struct SettingsLoader {
    lookup: Lookup,
    overlay: BTreeMap<&'static str, String>,
}

impl fmt::Debug for SettingsLoader {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SettingsLoader")
            .field("overlay_keys", &self.overlay.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl SettingsLoader {
    /// Loader reading the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loader reading from an arbitrary lookup function.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        Self {
            lookup: Box::new(lookup),
            overlay: BTreeMap::new(),
        }
    }

    /// Loader reading from fixed key/value pairs.
    #[must_use]
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let values: BTreeMap<String, String> = pairs
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        Self::from_lookup(move |key| values.get(key).cloned())
    }

    /// Layer a JSON object of settings underneath the lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownField`] for unrecognised keys and
    /// [`ConfigError::InvalidField`] for non-object documents or non-scalar values.
    pub fn with_overlay(mut self, document: &Value) -> ConfigResult<Self> {
        let map = document
            .as_object()
            .ok_or_else(|| ConfigError::invalid("overlay", "<root>", None, "must be a JSON object"))?;

        for (name, value) in map {
            let key = overlay_key(name).ok_or_else(|| ConfigError::UnknownField {
                section: "overlay",
                field: name.clone(),
            })?;
            let rendered = match value {
                Value::String(text) => text.clone(),
                Value::Number(number) => number.to_string(),
                Value::Bool(flag) => flag.to_string(),
                Value::Null => continue,
                Value::Array(_) | Value::Object(_) => {
                    return Err(ConfigError::invalid(
                        "overlay",
                        name.as_str(),
                        None,
                        "must be a string, number or boolean",
                    ));
                }
            };
            self.overlay.insert(key, rendered);
        }
        Ok(self)
    }

    /// Read and layer a JSON overlay file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] or [`ConfigError::Json`] when the file cannot be read or
    /// decoded, plus any error from [`Self::with_overlay`].
    pub fn with_overlay_file(self, path: &Path) -> ConfigResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            operation: "settings.overlay.read",
            source,
        })?;
        let document: Value = serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
            operation: "settings.overlay.parse",
            source,
        })?;
        self.with_overlay(&document)
    }

    /// Resolve and validate every setting.
    ///
    /// # Errors
    ///
    /// Returns the first missing or invalid setting.
    pub fn load(&self) -> ConfigResult<FactorySettings> {
        let factory = self.resource_id(
            "datafactory",
            keys::DATAFACTORY_RESOURCE_ID,
            DATA_FACTORY_PROVIDER,
        )?;
        let key_vault = self.key_vault()?;
        let resource_prefix = self.resource_prefix()?;

        let max_concurrent_transfers = self.number::<usize>(
            "concurrency",
            keys::MAX_CONCURRENT_TRANSFERS,
            defaults::MAX_CONCURRENT_TRANSFERS,
        )?;
        if max_concurrent_transfers == 0 {
            return Err(self.reject("concurrency", keys::MAX_CONCURRENT_TRANSFERS, "must be at least 1"));
        }

        let polling = self.polling()?;
        let copy = self.copy()?;
        let cleanup = CleanupPolicy {
            on_failure: self.flag("cleanup", keys::CLEANUP_ON_FAILURE, true)?,
            on_success: self.flag("cleanup", keys::CLEANUP_ON_SUCCESS, false)?,
        };
        let arm_endpoint = match self.value(keys::ARM_ENDPOINT) {
            Some(raw) => normalise_url("arm", keys::ARM_ENDPOINT, &raw)?,
            None => defaults::ARM_ENDPOINT.to_string(),
        };

        debug!(
            factory = %factory.name,
            vault = %key_vault.resource_id.name,
            prefix = %resource_prefix,
            max_concurrent_transfers,
            "factory settings loaded"
        );

        Ok(FactorySettings {
            factory,
            key_vault,
            resource_prefix,
            max_concurrent_transfers,
            polling,
            copy,
            cleanup,
            arm_endpoint,
        })
    }

    fn key_vault(&self) -> ConfigResult<KeyVaultSettings> {
        let resource_id =
            self.resource_id("keyvault", keys::KEYVAULT_RESOURCE_ID, KEY_VAULT_PROVIDER)?;
        let uri = match self.value(keys::KEYVAULT_URI) {
            Some(raw) => normalise_url("keyvault", keys::KEYVAULT_URI, &raw)?,
            None => format!(
                "https://{}.{}",
                resource_id.name.to_ascii_lowercase(),
                defaults::KEYVAULT_HOST_SUFFIX
            ),
        };
        let linked_service = self
            .value(keys::KEYVAULT_LINKED_SERVICE)
            .unwrap_or_else(|| defaults::KEYVAULT_LINKED_SERVICE.to_string());
        Ok(KeyVaultSettings {
            resource_id,
            uri,
            linked_service,
        })
    }

    fn resource_prefix(&self) -> ConfigResult<String> {
        let Some(prefix) = self.value(keys::RESOURCE_PREFIX) else {
            return Ok(defaults::RESOURCE_PREFIX.to_string());
        };
        let starts_with_letter = prefix.starts_with(|c: char| c.is_ascii_alphabetic());
        let allowed = prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !starts_with_letter || !allowed || prefix.ends_with('-') || prefix.len() > MAX_PREFIX_LEN {
            return Err(ConfigError::invalid(
                "naming",
                keys::RESOURCE_PREFIX,
                Some(&prefix),
                "must be at most 32 letters, digits or hyphens, starting with a letter and not ending with a hyphen",
            ));
        }
        Ok(prefix)
    }

    fn polling(&self) -> ConfigResult<PollSettings> {
        let initial_ms = self.number::<u64>("polling", keys::POLL_INITIAL_MS, defaults::POLL_INITIAL_MS)?;
        if initial_ms == 0 {
            return Err(self.reject("polling", keys::POLL_INITIAL_MS, "must be positive"));
        }
        let max_ms = self.number::<u64>("polling", keys::POLL_MAX_MS, defaults::POLL_MAX_MS)?;
        if max_ms < initial_ms {
            return Err(self.reject(
                "polling",
                keys::POLL_MAX_MS,
                "must be at least the initial poll interval",
            ));
        }
        let backoff_factor = self.number::<f64>("polling", keys::POLL_BACKOFF, defaults::POLL_BACKOFF)?;
        if !backoff_factor.is_finite() || backoff_factor < 1.0 {
            return Err(self.reject("polling", keys::POLL_BACKOFF, "must be a finite number >= 1.0"));
        }
        let timeout_secs =
            self.number::<u64>("polling", keys::RUN_TIMEOUT_SECS, defaults::RUN_TIMEOUT_SECS)?;
        if timeout_secs == 0 {
            return Err(self.reject("polling", keys::RUN_TIMEOUT_SECS, "must be positive"));
        }
        let status_error_limit =
            self.number::<u32>("polling", keys::STATUS_ERROR_LIMIT, defaults::STATUS_ERROR_LIMIT)?;
        if status_error_limit == 0 {
            return Err(self.reject("polling", keys::STATUS_ERROR_LIMIT, "must be at least 1"));
        }

        Ok(PollSettings {
            initial_interval: Duration::from_millis(initial_ms),
            max_interval: Duration::from_millis(max_ms),
            backoff_factor,
            run_timeout: Duration::from_secs(timeout_secs),
            status_error_limit,
        })
    }

    fn copy(&self) -> ConfigResult<CopySettings> {
        let data_integration_units = self.number::<u32>(
            "copy",
            keys::DATA_INTEGRATION_UNITS,
            defaults::DATA_INTEGRATION_UNITS,
        )?;
        if !(2..=256).contains(&data_integration_units) {
            return Err(self.reject("copy", keys::DATA_INTEGRATION_UNITS, "must be between 2 and 256"));
        }
        let alert_secs = self.number::<u64>(
            "copy",
            keys::PIPELINE_ELAPSED_ALERT_SECS,
            defaults::ELAPSED_ALERT_SECS,
        )?;
        if alert_secs == 0 {
            return Err(self.reject("copy", keys::PIPELINE_ELAPSED_ALERT_SECS, "must be positive"));
        }
        Ok(CopySettings {
            data_integration_units,
            elapsed_time_alert: Duration::from_secs(alert_secs),
        })
    }

    fn value(&self, key: &'static str) -> Option<String> {
        (self.lookup)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .or_else(|| {
                self.overlay
                    .get(key)
                    .map(|value| value.trim().to_string())
                    .filter(|value| !value.is_empty())
            })
    }

    fn reject(&self, section: &'static str, key: &'static str, reason: &'static str) -> ConfigError {
        ConfigError::invalid(section, key, self.value(key).as_deref(), reason)
    }

    fn resource_id(
        &self,
        section: &'static str,
        key: &'static str,
        provider: (&str, &str),
    ) -> ConfigResult<ResourceId> {
        let raw = self.value(key).ok_or(ConfigError::MissingField {
            section,
            field: key,
        })?;
        ResourceId::parse_for(&raw, provider)
            .map_err(|err| ConfigError::invalid(section, key, Some(&raw), err.reason()))
    }

    fn number<T: std::str::FromStr>(
        &self,
        section: &'static str,
        key: &'static str,
        default: T,
    ) -> ConfigResult<T> {
        match self.value(key) {
            None => Ok(default),
            Some(raw) => raw
                .parse::<T>()
                .map_err(|_| ConfigError::invalid(section, key, Some(&raw), "must be a number")),
        }
    }

    fn flag(&self, section: &'static str, key: &'static str, default: bool) -> ConfigResult<bool> {
        let Some(raw) = self.value(key) else {
            return Ok(default);
        };
        match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::invalid(
                section,
                key,
                Some(&raw),
                "must be one of true/false/yes/no/on/off/1/0",
            )),
        }
    }
}

fn overlay_key(name: &str) -> Option<&'static str> {
    keys::ALL.into_iter().find(|key| {
        key.strip_prefix(KEY_PREFIX)
            .is_some_and(|suffix| suffix.eq_ignore_ascii_case(name))
    })
}

fn normalise_url(section: &'static str, key: &'static str, raw: &str) -> ConfigResult<String> {
    let parsed = Url::parse(raw)
        .map_err(|_| ConfigError::invalid(section, key, Some(raw), "must be an absolute URL"))?;
    if !matches!(parsed.scheme(), "https" | "http") || parsed.host_str().is_none() {
        return Err(ConfigError::invalid(
            section,
            key,
            Some(raw),
            "must be an http(s) URL with a host",
        ));
    }
    Ok(parsed.as_str().trim_end_matches('/').to_string())
}
