//! Per-attempt ledger of created resources and their compensating deletion.

use skyferry_core::{PipelineService, ResourceKind, ResourceRef, SecretStore};
use tracing::{debug, warn};

/// Resources created by one transfer attempt, in creation order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResourceLedger {
    entries: Vec<ResourceRef>,
}

/// Result of releasing a ledger.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    /// Resources deleted.
    pub removed: Vec<ResourceRef>,
    /// Resources whose deletion failed, with the collaborator's message.
    pub failed: Vec<(ResourceRef, String)>,
}

impl ResourceLedger {
    /// Empty ledger.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Record a resource that now exists.
    pub fn record(&mut self, resource: ResourceRef) {
        self.entries.push(resource);
    }

    /// Recorded resources, oldest first.
    #[must_use]
    pub fn entries(&self) -> &[ResourceRef] {
        &self.entries
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Delete every recorded resource, newest first.
    ///
    /// Each deletion is independent: a failure is logged and reported, and the remaining
    /// deletions still run.
    pub async fn release(
        self,
        secrets: &dyn SecretStore,
        pipelines: &dyn PipelineService,
    ) -> CleanupReport {
        let mut report = CleanupReport::default();
        for resource in self.entries.into_iter().rev() {
            let result = match resource.kind {
                ResourceKind::Secret => secrets.delete_secret(&resource.name).await,
                ResourceKind::LinkedService | ResourceKind::Dataset | ResourceKind::Pipeline => {
                    pipelines.delete_resource(&resource).await
                }
            };
            match result {
                Ok(()) => {
                    debug!(
                        resource = %resource.name,
                        kind = resource.kind.as_str(),
                        "ephemeral resource deleted"
                    );
                    report.removed.push(resource);
                }
                Err(err) => {
                    warn!(
                        error = %err,
                        resource = %resource.name,
                        kind = resource.kind.as_str(),
                        "failed to delete ephemeral resource"
                    );
                    report.failed.push((resource, err.to_string()));
                }
            }
        }
        report
    }
}
