//! Default values applied when a setting is absent.

pub(crate) const KEYVAULT_LINKED_SERVICE: &str = "AzureKeyVault";
pub(crate) const RESOURCE_PREFIX: &str = "skyferry";
pub(crate) const MAX_CONCURRENT_TRANSFERS: usize = 8;
pub(crate) const POLL_INITIAL_MS: u64 = 1_000;
pub(crate) const POLL_MAX_MS: u64 = 15_000;
pub(crate) const POLL_BACKOFF: f64 = 2.0;
pub(crate) const RUN_TIMEOUT_SECS: u64 = 3_600;
pub(crate) const STATUS_ERROR_LIMIT: u32 = 3;
pub(crate) const DATA_INTEGRATION_UNITS: u32 = 32;
/// Ten minutes, matching the service's default elapsed-time metric.
pub(crate) const ELAPSED_ALERT_SECS: u64 = 600;
pub(crate) const ARM_ENDPOINT: &str = "https://management.azure.com";
/// Data-plane host suffix for vaults in the public cloud.
pub(crate) const KEYVAULT_HOST_SUFFIX: &str = "vault.azure.net";
