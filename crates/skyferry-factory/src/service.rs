//! Blob-to-blob transfer service composing validation, provisioning, submission and polling.
//!
//! # Design
//! - One `transfer` call runs the lifecycle once: provision source, provision destination,
//!   submit, poll. Nothing is retried across stages; retry is the caller's decision.
//! - A semaphore caps concurrent transfers against the shared factory.
//! - Every created resource is recorded and released according to the cleanup policy, after the
//!   outcome is known and without changing it.
//! - Events and metrics are best-effort side channels.

use std::sync::Arc;

use async_trait::async_trait;
use skyferry_config::{CleanupPolicy, CopySettings, FactorySettings, PollSettings};
use skyferry_core::{
    EndpointRole, PipelineService, ProvisionedEndpoint, SecretStore, TransferError,
    TransferOutcome, TransferRequest, TransferResult, TransferService, ValidationError,
};
use skyferry_events::{EventBus, TransferEvent};
use skyferry_telemetry::{Metrics, outcome};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span, warn};

use crate::cleanup::{CleanupReport, ResourceLedger};
use crate::naming::NameScope;
use crate::pipeline::PipelineOrchestrator;
use crate::poller::{PollPolicy, RunPoller};
use crate::provisioner::ResourceProvisioner;
use crate::validator;

/// Registry name of the service.
pub const SERVICE_NAME: &str = "azure-data-factory";

/// Construction parameters for [`DataFactoryTransferService`].
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Prefix for ephemeral resource names.
    pub resource_prefix: String,
    /// Pre-existing linked service used to dereference stored secrets.
    pub secret_store_linked_service: String,
    /// Upper bound on concurrent transfers.
    pub max_concurrent_transfers: usize,
    /// Poll schedule.
    pub polling: PollSettings,
    /// Copy step tuning.
    pub copy: CopySettings,
    /// When ephemeral resources are deleted.
    pub cleanup: CleanupPolicy,
}

impl ServiceConfig {
    /// Extract the service parameters from loaded settings.
    #[must_use]
    pub fn from_settings(settings: &FactorySettings) -> Self {
        Self {
            resource_prefix: settings.resource_prefix.clone(),
            secret_store_linked_service: settings.key_vault.linked_service.clone(),
            max_concurrent_transfers: settings.max_concurrent_transfers,
            polling: settings.polling.clone(),
            copy: settings.copy.clone(),
            cleanup: settings.cleanup,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            resource_prefix: "skyferry".to_string(),
            secret_store_linked_service: "AzureKeyVault".to_string(),
            max_concurrent_transfers: 8,
            polling: PollSettings::default(),
            copy: CopySettings::default(),
            cleanup: CleanupPolicy::default(),
        }
    }
}

/// Transfer service that copies blobs by running a Data Factory pipeline per request.
#[derive(Clone)]
pub struct DataFactoryTransferService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    secrets: Arc<dyn SecretStore>,
    pipelines: Arc<dyn PipelineService>,
    provisioner: ResourceProvisioner,
    orchestrator: PipelineOrchestrator,
    poller: RunPoller,
    resource_prefix: String,
    cleanup: CleanupPolicy,
    permits: Arc<Semaphore>,
    shutdown: CancellationToken,
    events: EventBus,
    metrics: Metrics,
}

/// Handle to a transfer running on its own task.
pub struct TransferHandle {
    request_id: String,
    cancel: CancellationToken,
    join: JoinHandle<TransferResult<TransferOutcome>>,
}

impl TransferHandle {
    /// Request cancellation; polling stops and cleanup runs before the handle resolves.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Identifier of the request being transferred.
    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Wait for the transfer to resolve.
    ///
    /// # Errors
    ///
    /// Returns the transfer's error, or [`TransferError::Cancelled`] if the task was aborted.
    pub async fn outcome(self) -> TransferResult<TransferOutcome> {
        match self.join.await {
            Ok(result) => result,
            Err(err) => {
                warn!(error = %err, request_id = %self.request_id, "transfer task ended abnormally");
                Err(TransferError::Cancelled {
                    request_id: self.request_id,
                })
            }
        }
    }
}

impl DataFactoryTransferService {
    /// Assemble the service around its collaborators.
    #[must_use]
    pub fn new(
        config: ServiceConfig,
        secrets: Arc<dyn SecretStore>,
        pipelines: Arc<dyn PipelineService>,
        events: EventBus,
        metrics: Metrics,
    ) -> Self {
        let provisioner = ResourceProvisioner::new(
            Arc::clone(&secrets),
            Arc::clone(&pipelines),
            config.secret_store_linked_service,
        );
        let orchestrator = PipelineOrchestrator::new(Arc::clone(&pipelines), config.copy);
        let poller = RunPoller::new(Arc::clone(&pipelines), PollPolicy::from(&config.polling));
        Self {
            inner: Arc::new(ServiceInner {
                secrets,
                pipelines,
                provisioner,
                orchestrator,
                poller,
                resource_prefix: config.resource_prefix,
                cleanup: config.cleanup,
                permits: Arc::new(Semaphore::new(config.max_concurrent_transfers.max(1))),
                shutdown: CancellationToken::new(),
                events,
                metrics,
            }),
        }
    }

    /// Event bus the service publishes lifecycle events to.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    /// Metrics the service records into.
    #[must_use]
    pub fn metrics(&self) -> &Metrics {
        &self.inner.metrics
    }

    /// Concurrency slots currently free.
    #[must_use]
    pub fn available_slots(&self) -> usize {
        self.inner.permits.available_permits()
    }

    /// Run a transfer on its own task and return a cancellable handle.
    #[must_use]
    pub fn spawn_transfer(&self, request: TransferRequest) -> TransferHandle {
        let cancel = self.inner.shutdown.child_token();
        let request_id = request.id.clone();
        let service = self.clone();
        let token = cancel.clone();
        let join = tokio::spawn(async move { service.run(request, token).await });
        TransferHandle {
            request_id,
            cancel,
            join,
        }
    }

    /// Cancel every in-flight transfer. Each still releases its resources before resolving.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    async fn run(
        &self,
        request: TransferRequest,
        cancel: CancellationToken,
    ) -> TransferResult<TransferOutcome> {
        let span = info_span!(
            "transfer",
            request_id = %request.id,
            process_id = %request.process_id
        );
        self.run_inner(request, cancel).instrument(span).await
    }

    async fn run_inner(
        &self,
        request: TransferRequest,
        cancel: CancellationToken,
    ) -> TransferResult<TransferOutcome> {
        let inner = &self.inner;
        let _permit = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                inner.metrics.inc_transfer(outcome::CANCELLED);
                return Err(TransferError::Cancelled { request_id: request.id.clone() });
            }
            permit = Arc::clone(&inner.permits).acquire_owned() => {
                permit.map_err(|_| TransferError::Cancelled { request_id: request.id.clone() })?
            }
        };

        inner.metrics.transfer_started();
        info!("transfer started");
        self.publish(TransferEvent::TransferStarted {
            request_id: request.id.clone(),
            process_id: request.process_id.clone(),
        });

        let names = NameScope::for_request(&inner.resource_prefix, &request.id);
        let mut ledger = ResourceLedger::new();
        let result = self.execute(&request, &names, &mut ledger, &cancel).await;

        for resource in ledger.entries() {
            inner.metrics.inc_provisioned(resource.kind.as_str());
        }
        let succeeded = matches!(&result, Ok(transfer) if transfer.succeeded);
        if inner.cleanup.applies(succeeded) && !ledger.is_empty() {
            let report = ledger
                .release(inner.secrets.as_ref(), inner.pipelines.as_ref())
                .await;
            self.record_cleanup(&request.id, &report);
        }

        self.record_result(&request.id, &result);
        inner.metrics.transfer_finished();
        result
    }

    async fn execute(
        &self,
        request: &TransferRequest,
        names: &NameScope,
        ledger: &mut ResourceLedger,
        cancel: &CancellationToken,
    ) -> TransferResult<TransferOutcome> {
        let inner = &self.inner;
        let ensure_live = || {
            if cancel.is_cancelled() {
                Err(TransferError::Cancelled {
                    request_id: request.id.clone(),
                })
            } else {
                Ok(())
            }
        };

        ensure_live()?;
        let source = self
            .provision(request, EndpointRole::Source, names, ledger)
            .await?;
        ensure_live()?;
        let destination = self
            .provision(request, EndpointRole::Destination, names, ledger)
            .await?;

        ensure_live()?;
        let run = inner
            .orchestrator
            .submit(names, &source, &destination, ledger)
            .await?;
        self.publish(TransferEvent::PipelineSubmitted {
            request_id: request.id.clone(),
            pipeline: names.pipeline().to_string(),
            run_id: run.run_id.clone(),
        });

        let events = &inner.events;
        let metrics = &inner.metrics;
        inner
            .poller
            .await_terminal(&request.id, &run, cancel, |snapshot| {
                metrics.inc_status_poll(snapshot.run_status().metric_label());
                events.publish(TransferEvent::RunStatusObserved {
                    request_id: request.id.clone(),
                    run_id: run.run_id.clone(),
                    status: snapshot.status.clone(),
                });
            })
            .await
    }

    async fn provision(
        &self,
        request: &TransferRequest,
        role: EndpointRole,
        names: &NameScope,
        ledger: &mut ResourceLedger,
    ) -> TransferResult<ProvisionedEndpoint> {
        let endpoint = self
            .inner
            .provisioner
            .provision(request.endpoint(role), role, names, ledger)
            .await?;
        self.publish(TransferEvent::EndpointProvisioned {
            request_id: request.id.clone(),
            role: role.as_str().to_string(),
            dataset: endpoint.dataset.name.clone(),
        });
        Ok(endpoint)
    }

    fn record_result(&self, request_id: &str, result: &TransferResult<TransferOutcome>) {
        let metrics = &self.inner.metrics;
        match result {
            Ok(transfer) => {
                if transfer.succeeded {
                    metrics.inc_transfer(outcome::SUCCEEDED);
                    info!("transfer succeeded");
                } else {
                    metrics.inc_transfer(outcome::RETRYABLE_FAILURE);
                    warn!(
                        reason = transfer.message.as_deref().unwrap_or_default(),
                        "transfer failed; caller may retry"
                    );
                }
                self.publish(TransferEvent::TransferCompleted {
                    request_id: request_id.to_string(),
                    succeeded: transfer.succeeded,
                    retryable: transfer.retryable,
                    message: transfer.message.clone(),
                });
            }
            Err(err) => {
                let label = if matches!(err, TransferError::Cancelled { .. }) {
                    outcome::CANCELLED
                } else {
                    outcome::ERROR
                };
                metrics.inc_transfer(label);
                warn!(error = %err, detail = %err.detail(), retryable = err.is_retryable(), "transfer aborted");
                self.publish(TransferEvent::TransferFailed {
                    request_id: request_id.to_string(),
                    message: err.detail(),
                });
            }
        }
    }

    fn record_cleanup(&self, request_id: &str, report: &CleanupReport) {
        for (resource, _) in &report.failed {
            self.inner
                .metrics
                .inc_cleanup_failure(resource.kind.as_str());
        }
        info!(
            removed = report.removed.len(),
            failed = report.failed.len(),
            "ephemeral resources released"
        );
        self.publish(TransferEvent::CleanupCompleted {
            request_id: request_id.to_string(),
            removed: report.removed.len(),
            failed: report.failed.len(),
        });
    }

    fn publish(&self, event: TransferEvent) {
        self.inner.events.publish(event);
    }
}

#[async_trait]
impl TransferService for DataFactoryTransferService {
    fn name(&self) -> &'static str {
        SERVICE_NAME
    }

    fn can_handle(&self, request: &TransferRequest) -> bool {
        request.source.is_blob_storage() && request.destination.is_blob_storage()
    }

    fn validate(&self, request: &TransferRequest) -> Result<(), ValidationError> {
        validator::validate_destination(&request.destination)
    }

    /// Runs on its own task; dropping the returned future cancels the transfer, which still
    /// releases its resources and settles its metrics.
    async fn transfer(&self, request: TransferRequest) -> TransferResult<TransferOutcome> {
        let handle = self.spawn_transfer(request);
        let _cancel_on_drop = handle.cancel.clone().drop_guard();
        handle.outcome().await
    }
}
