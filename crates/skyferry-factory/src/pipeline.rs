//! Builds the single-copy pipeline and triggers its one run.

use std::sync::Arc;

use skyferry_config::CopySettings;
use skyferry_core::{
    CopyActivity, PipelineDefinition, PipelineRun, PipelineService, ProvisionedEndpoint,
    ResourceKind, RunStatus, TransferError, TransferResult,
};
use tracing::{debug, info};

use crate::cleanup::ResourceLedger;
use crate::naming::NameScope;

/// Name of the single copy step.
pub const COPY_ACTIVITY_NAME: &str = "CopyActivity";

/// Composes and submits pipeline definitions.
pub struct PipelineOrchestrator {
    pipelines: Arc<dyn PipelineService>,
    copy: CopySettings,
}

impl PipelineOrchestrator {
    /// Orchestrator applying `copy` tuning to every definition.
    #[must_use]
    pub fn new(pipelines: Arc<dyn PipelineService>, copy: CopySettings) -> Self {
        Self { pipelines, copy }
    }

    /// One copy step from the source dataset to the destination dataset.
    #[must_use]
    pub fn definition(
        &self,
        name: &str,
        source: &ProvisionedEndpoint,
        destination: &ProvisionedEndpoint,
    ) -> PipelineDefinition {
        PipelineDefinition {
            name: name.to_string(),
            activities: vec![CopyActivity {
                name: COPY_ACTIVITY_NAME.to_string(),
                input_dataset: source.dataset.name.clone(),
                output_dataset: destination.dataset.name.clone(),
                validate_data_consistency: true,
                data_integration_units: self.copy.data_integration_units,
            }],
            elapsed_time_metric: self.copy.elapsed_time_alert,
        }
    }

    /// Create the pipeline and trigger exactly one run. Nothing is retried here.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Provisioning`] when the pipeline cannot be created and
    /// [`TransferError::Submission`] when the run cannot be triggered.
    pub async fn submit(
        &self,
        names: &NameScope,
        source: &ProvisionedEndpoint,
        destination: &ProvisionedEndpoint,
        ledger: &mut ResourceLedger,
    ) -> TransferResult<PipelineRun> {
        let definition = self.definition(names.pipeline(), source, destination);
        let pipeline = self
            .pipelines
            .create_pipeline(&definition)
            .await
            .map_err(|err| TransferError::provisioning(ResourceKind::Pipeline, &definition.name, err))?;
        ledger.record(pipeline.clone());
        debug!(pipeline = %pipeline.name, "pipeline created");

        let run_id = self
            .pipelines
            .trigger_run(&pipeline, None)
            .await
            .map_err(|err| TransferError::submission(&pipeline.name, err))?;
        info!(pipeline = %pipeline.name, run_id = %run_id, "pipeline run triggered");

        Ok(PipelineRun {
            run_id,
            status: RunStatus::Queued,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyferry_core::{EndpointRole, ResourceRef, SecretHandle};
    use skyferry_test_support::{PipelineOperation, ScriptedPipelineService};
    use std::time::Duration;

    fn provisioned(role: EndpointRole, dataset: &str) -> ProvisionedEndpoint {
        ProvisionedEndpoint {
            role,
            secret: SecretHandle {
                name: dataset.to_string(),
            },
            linked_service: ResourceRef::new(ResourceKind::LinkedService, dataset),
            dataset: ResourceRef::new(ResourceKind::Dataset, dataset),
        }
    }

    #[test]
    fn definition_has_one_copy_step() {
        let orchestrator = PipelineOrchestrator::new(
            Arc::new(ScriptedPipelineService::new()),
            CopySettings::default(),
        );
        let definition = orchestrator.definition(
            "p",
            &provisioned(EndpointRole::Source, "ds-src"),
            &provisioned(EndpointRole::Destination, "ds-dst"),
        );
        assert_eq!(definition.activities.len(), 1);
        let step = &definition.activities[0];
        assert_eq!(step.name, COPY_ACTIVITY_NAME);
        assert_eq!(step.input_dataset, "ds-src");
        assert_eq!(step.output_dataset, "ds-dst");
        assert!(step.validate_data_consistency);
        assert_eq!(step.data_integration_units, 32);
        assert_eq!(definition.elapsed_time_metric, Duration::from_secs(600));
    }

    #[tokio::test]
    async fn submit_triggers_exactly_one_run() -> TransferResult<()> {
        let pipelines = Arc::new(ScriptedPipelineService::new());
        let orchestrator = PipelineOrchestrator::new(pipelines.clone(), CopySettings::default());
        let names = NameScope::for_request("skyferry", "req-1");
        let mut ledger = ResourceLedger::new();
        let run = orchestrator
            .submit(
                &names,
                &provisioned(EndpointRole::Source, "a"),
                &provisioned(EndpointRole::Destination, "b"),
                &mut ledger,
            )
            .await?;
        assert_eq!(run.status, RunStatus::Queued);
        assert_eq!(pipelines.triggered_runs(), vec![names.pipeline().to_string()]);
        assert_eq!(ledger.entries().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn trigger_failure_is_a_submission_error() {
        let pipelines = Arc::new(
            ScriptedPipelineService::new().failing(PipelineOperation::TriggerRun, "quota"),
        );
        let orchestrator = PipelineOrchestrator::new(pipelines.clone(), CopySettings::default());
        let names = NameScope::for_request("skyferry", "req-1");
        let mut ledger = ResourceLedger::new();
        let err = orchestrator
            .submit(
                &names,
                &provisioned(EndpointRole::Source, "a"),
                &provisioned(EndpointRole::Destination, "b"),
                &mut ledger,
            )
            .await
            .expect_err("trigger fails");
        assert!(matches!(err, TransferError::Submission { .. }));
        assert_eq!(pipelines.pipelines().len(), 1);
        assert_eq!(ledger.entries().len(), 1);
    }
}
