//! Typed settings consumed by the transfer service and its adapters.
//!
//! # Design
//! - Pure data carriers; parsing and validation live in `loader.rs`.
//! - Durations are stored as [`Duration`] so callers never re-derive units.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resource_id::ResourceId;

/// Everything bootstrap needs to construct the blob copy service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorySettings {
    /// Target pipeline-service instance.
    pub factory: ResourceId,
    /// Secret store holding per-transfer credentials.
    pub key_vault: KeyVaultSettings,
    /// Prefix for every ephemeral resource name.
    pub resource_prefix: String,
    /// Upper bound on transfers running against the factory at once.
    pub max_concurrent_transfers: usize,
    /// Run polling schedule.
    pub polling: PollSettings,
    /// Copy step tuning.
    pub copy: CopySettings,
    /// Compensating cleanup policy.
    pub cleanup: CleanupPolicy,
    /// Resource Manager endpoint used to reach the factory.
    pub arm_endpoint: String,
}

/// Key Vault addressing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyVaultSettings {
    /// ARM identifier of the vault.
    pub resource_id: ResourceId,
    /// Data-plane URI of the vault, without a trailing slash.
    pub uri: String,
    /// Name of the pre-existing linked service that dereferences vault secrets.
    pub linked_service: String,
}

/// Backoff schedule and limits for run status polling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollSettings {
    /// Delay before the second status query.
    pub initial_interval: Duration,
    /// Cap on the delay between queries.
    pub max_interval: Duration,
    /// Multiplier applied to the delay after each non-terminal observation.
    pub backoff_factor: f64,
    /// Ceiling on the total wait for a terminal status.
    pub run_timeout: Duration,
    /// Consecutive status query failures tolerated before giving up.
    pub status_error_limit: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(crate::defaults::POLL_INITIAL_MS),
            max_interval: Duration::from_millis(crate::defaults::POLL_MAX_MS),
            backoff_factor: crate::defaults::POLL_BACKOFF,
            run_timeout: Duration::from_secs(crate::defaults::RUN_TIMEOUT_SECS),
            status_error_limit: crate::defaults::STATUS_ERROR_LIMIT,
        }
    }
}

/// Copy step tuning forwarded into pipeline definitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopySettings {
    /// Parallelism hint for the copy step.
    pub data_integration_units: u32,
    /// Elapsed time after which the service flags a run.
    pub elapsed_time_alert: Duration,
}

impl Default for CopySettings {
    fn default() -> Self {
        Self {
            data_integration_units: crate::defaults::DATA_INTEGRATION_UNITS,
            elapsed_time_alert: Duration::from_secs(crate::defaults::ELAPSED_ALERT_SECS),
        }
    }
}

/// When ephemeral resources are deleted after an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupPolicy {
    /// Delete after errors, failed runs and timeouts.
    pub on_failure: bool,
    /// Delete after a successful copy.
    pub on_success: bool,
}

impl CleanupPolicy {
    /// Whether cleanup applies to an attempt that ended with the given success flag.
    #[must_use]
    pub const fn applies(self, succeeded: bool) -> bool {
        if succeeded {
            self.on_success
        } else {
            self.on_failure
        }
    }
}

impl Default for CleanupPolicy {
    fn default() -> Self {
        Self {
            on_failure: true,
            on_success: false,
        }
    }
}
