//! Inbound transfer-service contract and the collaborator traits it depends on.

use crate::error::{TransferResult, ValidationError};
use crate::model::{
    DatasetDefinition, LinkedServiceDefinition, PipelineDefinition, ResourceRef, RunSnapshot,
    SecretHandle, TransferOutcome, TransferRequest,
};
use anyhow::bail;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Contract exposed to the dispatch layer that selects transfer services by capability.
#[async_trait]
pub trait TransferService: Send + Sync {
    /// Stable service name used in logs and registry listings.
    fn name(&self) -> &'static str;

    /// Whether this service can move data between the request's endpoint types. Pure.
    fn can_handle(&self, request: &TransferRequest) -> bool;

    /// Check the request's addressing and credential properties without side effects.
    ///
    /// # Errors
    ///
    /// Returns the first failing property check.
    fn validate(&self, request: &TransferRequest) -> Result<(), ValidationError>;

    /// Run the full transfer lifecycle once and resolve its outcome.
    ///
    /// Run failures are reported as an unsuccessful [`TransferOutcome`]; errors are reserved for
    /// collaborator faults and cancellation.
    async fn transfer(&self, request: TransferRequest) -> TransferResult<TransferOutcome>;
}

/// Secret store used to register endpoint credentials.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Store `value` under `name`, overwriting or versioning any existing secret of that name.
    async fn set_secret(&self, name: &str, value: &str) -> anyhow::Result<SecretHandle>;

    /// Remove a secret; default implementation reports lack of support.
    async fn delete_secret(&self, name: &str) -> anyhow::Result<()> {
        let _ = name;
        bail!("secret deletion not supported by this store");
    }
}

/// External pipeline-execution service.
#[async_trait]
pub trait PipelineService: Send + Sync {
    /// Create (or replace) a linked endpoint descriptor.
    async fn create_linked_service(
        &self,
        definition: &LinkedServiceDefinition,
    ) -> anyhow::Result<ResourceRef>;

    /// Create (or replace) a dataset descriptor.
    async fn create_dataset(&self, definition: &DatasetDefinition) -> anyhow::Result<ResourceRef>;

    /// Create (or replace) a pipeline definition.
    async fn create_pipeline(&self, definition: &PipelineDefinition)
    -> anyhow::Result<ResourceRef>;

    /// Trigger one run of a pipeline and return its run identifier.
    async fn trigger_run(
        &self,
        pipeline: &ResourceRef,
        parameters: Option<&Map<String, Value>>,
    ) -> anyhow::Result<String>;

    /// Fetch the current status of a run.
    async fn run_status(&self, run_id: &str) -> anyhow::Result<RunSnapshot>;

    /// Delete a descriptor or pipeline; default implementation reports lack of support.
    async fn delete_resource(&self, resource: &ResourceRef) -> anyhow::Result<()> {
        let _ = resource;
        bail!("resource deletion not supported by this pipeline service");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResourceKind;

    struct StubStore;

    #[async_trait]
    impl SecretStore for StubStore {
        async fn set_secret(&self, name: &str, _value: &str) -> anyhow::Result<SecretHandle> {
            Ok(SecretHandle {
                name: name.to_string(),
            })
        }
    }

    struct StubPipelines;

    #[async_trait]
    impl PipelineService for StubPipelines {
        async fn create_linked_service(
            &self,
            definition: &LinkedServiceDefinition,
        ) -> anyhow::Result<ResourceRef> {
            Ok(ResourceRef::new(ResourceKind::LinkedService, &definition.name))
        }

        async fn create_dataset(
            &self,
            definition: &DatasetDefinition,
        ) -> anyhow::Result<ResourceRef> {
            Ok(ResourceRef::new(ResourceKind::Dataset, &definition.name))
        }

        async fn create_pipeline(
            &self,
            definition: &PipelineDefinition,
        ) -> anyhow::Result<ResourceRef> {
            Ok(ResourceRef::new(ResourceKind::Pipeline, &definition.name))
        }

        async fn trigger_run(
            &self,
            _pipeline: &ResourceRef,
            _parameters: Option<&Map<String, Value>>,
        ) -> anyhow::Result<String> {
            Ok("run-1".to_string())
        }

        async fn run_status(&self, _run_id: &str) -> anyhow::Result<RunSnapshot> {
            Ok(RunSnapshot::new("Succeeded", None))
        }
    }

    #[tokio::test]
    async fn default_deletions_report_lack_of_support() {
        let store = StubStore;
        assert!(
            store
                .delete_secret("name")
                .await
                .expect_err("deletion should error")
                .to_string()
                .contains("not supported")
        );

        let pipelines = StubPipelines;
        let resource = ResourceRef::new(ResourceKind::Dataset, "ds");
        assert!(pipelines.delete_resource(&resource).await.is_err());
        assert_eq!(pipelines.trigger_run(&resource, None).await.ok().as_deref(), Some("run-1"));
    }
}
