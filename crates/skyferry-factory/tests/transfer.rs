use std::sync::Arc;
use std::time::Duration;

use skyferry_config::{CleanupPolicy, PollSettings};
use skyferry_core::{
    Endpoint, EndpointRole, ResourceKind, TransferError, TransferOutcome, TransferRequest, TransferResult,
    TransferService, ValidationReason, schema,
};
use skyferry_events::{EventBus, TransferEvent};
use skyferry_factory::{DataFactoryTransferService, NameScope, SERVICE_NAME, ServiceConfig};
use skyferry_telemetry::Metrics;
use skyferry_test_support::{
    MemorySecretStore, PipelineOperation, ScriptedPipelineService, blob_endpoint, sample_request,
};
use tokio::time::sleep;

struct Harness {
    service: DataFactoryTransferService,
    secrets: Arc<MemorySecretStore>,
    pipelines: Arc<ScriptedPipelineService>,
}

fn fast_polling() -> PollSettings {
    PollSettings {
        initial_interval: Duration::from_secs(1),
        max_interval: Duration::from_secs(4),
        backoff_factor: 2.0,
        run_timeout: Duration::from_secs(30),
        status_error_limit: 3,
    }
}

fn config() -> ServiceConfig {
    ServiceConfig {
        polling: fast_polling(),
        ..ServiceConfig::default()
    }
}

fn harness_with(pipelines: ScriptedPipelineService, config: ServiceConfig) -> Harness {
    let secrets = Arc::new(MemorySecretStore::new());
    let pipelines = Arc::new(pipelines);
    let service = DataFactoryTransferService::new(
        config,
        secrets.clone(),
        pipelines.clone(),
        EventBus::with_capacity(64),
        Metrics::new().expect("metrics registry"),
    );
    Harness {
        service,
        secrets,
        pipelines,
    }
}

fn harness(pipelines: ScriptedPipelineService) -> Harness {
    harness_with(pipelines, config())
}

fn pipeline_name(request_id: &str) -> String {
    NameScope::for_request("skyferry", request_id).pipeline().to_string()
}

fn secret_name(request_id: &str, role: EndpointRole) -> String {
    NameScope::for_request("skyferry", request_id).endpoint(role)
}

fn drain(events: &EventBus) -> Vec<TransferEvent> {
    let mut stream = events.subscribe(Some(0));
    let mut seen = Vec::new();
    while let Some(envelope) = stream.try_next() {
        seen.push(envelope.event);
    }
    seen
}

#[test]
fn service_is_named_for_registry_listing() {
    let harness = harness(ScriptedPipelineService::new());
    assert_eq!(harness.service.name(), SERVICE_NAME);
}

#[test]
fn can_handle_requires_blob_storage_on_both_sides() {
    let harness = harness(ScriptedPipelineService::new());
    let service = &harness.service;
    assert!(service.can_handle(&sample_request("req-1")));

    let mut source_mismatch = sample_request("req-2");
    source_mismatch.source = Endpoint::new("Sftp");
    assert!(!service.can_handle(&source_mismatch));

    let mut destination_mismatch = sample_request("req-3");
    destination_mismatch.destination = Endpoint::new("AmazonS3");
    assert!(!service.can_handle(&destination_mismatch));
}

#[test]
fn validate_names_the_offending_destination_property() {
    let harness = harness(ScriptedPipelineService::new());
    let service = &harness.service;

    for property in [schema::ACCOUNT_NAME, schema::CONTAINER_NAME, schema::SHARED_KEY] {
        let mut request = sample_request("req-1");
        request.destination.properties.remove(property);
        let err = service.validate(&request).expect_err("missing property");
        assert_eq!(err.reason, ValidationReason::Missing);
        assert!(err.to_string().contains(property), "{err}");
    }

    let mut extra = sample_request("req-1");
    extra.destination = extra.destination.with_property("foo", "bar");
    let err = service.validate(&extra).expect_err("unexpected property");
    assert_eq!(err.to_string(), "unexpected property `foo`");

    assert!(service.validate(&sample_request("req-1")).is_ok());
}

#[test]
fn validate_ignores_source_properties() {
    let harness = harness(ScriptedPipelineService::new());
    let mut request = sample_request("req-1");
    request.source = Endpoint::blob();
    assert!(harness.service.validate(&request).is_ok());
}

#[tokio::test(start_paused = true)]
async fn every_run_status_maps_to_its_outcome() -> TransferResult<()> {
    let cases: [(&str, Option<&str>, TransferOutcome); 4] = [
        ("Succeeded", None, TransferOutcome::success()),
        (
            "Failed",
            Some("boom"),
            TransferOutcome::retryable_failure("boom"),
        ),
        (
            "Canceling",
            Some("stopping"),
            TransferOutcome::retryable_failure("stopping"),
        ),
        (
            "Cancelled",
            Some("user cancelled"),
            TransferOutcome::retryable_failure("user cancelled"),
        ),
    ];
    for (status, message, expected) in cases {
        let pipelines = ScriptedPipelineService::new();
        pipelines.push_status(status, message);
        let harness = harness(pipelines);
        let outcome = harness.service.transfer(sample_request("req-1")).await?;
        assert_eq!(outcome, expected, "status {status}");
    }

    for status in ["Queued", "InProgress"] {
        let harness = harness(ScriptedPipelineService::with_statuses([status]));
        let outcome = harness.service.transfer(sample_request("req-1")).await?;
        assert!(!outcome.succeeded, "status {status}");
        assert!(outcome.retryable, "status {status}");
        assert!(
            outcome
                .message
                .as_deref()
                .is_some_and(|message| message.contains("did not reach a terminal status")),
            "status {status}"
        );
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn blob_copy_end_to_end() -> TransferResult<()> {
    let harness = harness(ScriptedPipelineService::with_statuses([
        "Queued",
        "Succeeded",
    ]));
    let request = TransferRequest::new(
        "req-e2e",
        "process-1",
        blob_endpoint("acctA", "src", Some("f.bin"), "K1"),
        blob_endpoint("acctB", "dst", None, "K2"),
    );

    let outcome = harness.service.transfer(request).await?;
    assert_eq!(outcome, TransferOutcome::success());

    let pipelines = &harness.pipelines;
    let linked = pipelines.linked_services();
    assert_eq!(linked.len(), 2);
    assert_eq!(linked[0].account_name, "acctA");
    assert_eq!(linked[1].account_name, "acctB");
    let datasets = pipelines.datasets();
    assert_eq!(datasets.len(), 2);
    assert_eq!(datasets[0].container, "src");
    assert_eq!(datasets[0].object_name.as_deref(), Some("f.bin"));
    assert_eq!(datasets[1].container, "dst");
    assert_eq!(datasets[1].object_name, None);

    let definitions = pipelines.pipelines();
    assert_eq!(definitions.len(), 1);
    assert_eq!(definitions[0].activities.len(), 1);
    assert_eq!(definitions[0].activities[0].input_dataset, datasets[0].name);
    assert_eq!(definitions[0].activities[0].output_dataset, datasets[1].name);
    assert_eq!(pipelines.triggered_runs().len(), 1);
    assert_eq!(pipelines.status_queries(), 2);

    assert_eq!(
        harness.secrets.current(&secret_name("req-e2e", EndpointRole::Source)).as_deref(),
        Some("K1")
    );
    assert_eq!(
        harness.secrets.current(&secret_name("req-e2e", EndpointRole::Destination)).as_deref(),
        Some("K2")
    );
    assert!(pipelines.deleted().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn retrying_a_request_reuses_its_resource_names() -> TransferResult<()> {
    let pipelines = ScriptedPipelineService::new();
    pipelines.push_status("Failed", Some("throttled"));
    let harness = harness_with(
        pipelines,
        ServiceConfig {
            cleanup: CleanupPolicy {
                on_failure: false,
                on_success: false,
            },
            ..config()
        },
    );

    for _ in 0..2 {
        let outcome = harness.service.transfer(sample_request("req-1")).await?;
        assert!(outcome.retryable);
    }

    assert_eq!(
        harness.secrets.names(),
        vec![
            secret_name("req-1", EndpointRole::Destination),
            secret_name("req-1", EndpointRole::Source),
        ]
    );
    assert_eq!(harness.secrets.version_count(&secret_name("req-1", EndpointRole::Source)), 2);
    let pipelines = harness.pipelines.triggered_runs();
    assert_eq!(pipelines, vec![pipeline_name("req-1"), pipeline_name("req-1")]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failed_run_releases_resources_newest_first() -> TransferResult<()> {
    let pipelines = ScriptedPipelineService::new();
    pipelines.push_status("Failed", Some("boom"));
    let harness = harness(pipelines);

    let outcome = harness.service.transfer(sample_request("req-1")).await?;
    assert_eq!(outcome, TransferOutcome::retryable_failure("boom"));

    let kinds: Vec<ResourceKind> = harness
        .pipelines
        .deleted()
        .into_iter()
        .map(|resource| resource.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            ResourceKind::Pipeline,
            ResourceKind::Dataset,
            ResourceKind::LinkedService,
            ResourceKind::Dataset,
            ResourceKind::LinkedService,
        ]
    );
    assert_eq!(
        harness.secrets.deleted(),
        vec![
            secret_name("req-1", EndpointRole::Destination),
            secret_name("req-1", EndpointRole::Source),
        ]
    );

    let cleanup = drain(harness.service.events())
        .into_iter()
        .find_map(|event| match event {
            TransferEvent::CleanupCompleted {
                removed, failed, ..
            } => Some((removed, failed)),
            _ => None,
        });
    assert_eq!(cleanup, Some((7, 0)));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn successful_run_keeps_resources_unless_configured() -> TransferResult<()> {
    let harness = harness_with(
        ScriptedPipelineService::with_statuses(["Succeeded"]),
        ServiceConfig {
            cleanup: CleanupPolicy {
                on_failure: true,
                on_success: true,
            },
            ..config()
        },
    );
    let outcome = harness.service.transfer(sample_request("req-1")).await?;
    assert!(outcome.succeeded);
    assert_eq!(harness.pipelines.deleted().len(), 5);
    assert_eq!(harness.secrets.deleted().len(), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn cleanup_failures_do_not_change_the_outcome() -> TransferResult<()> {
    let pipelines = ScriptedPipelineService::new()
        .failing(PipelineOperation::DeleteResource, "forbidden");
    pipelines.push_status("Failed", Some("boom"));
    let harness = harness(pipelines);

    let outcome = harness.service.transfer(sample_request("req-1")).await?;
    assert_eq!(outcome, TransferOutcome::retryable_failure("boom"));
    assert_eq!(harness.secrets.deleted().len(), 2);
    assert_eq!(harness.service.metrics().snapshot().cleanup_failures, 5);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn provisioning_failure_propagates_and_cleans_up() {
    let harness = harness(
        ScriptedPipelineService::new().failing(PipelineOperation::CreateDataset, "rejected"),
    );

    let err = harness
        .service
        .transfer(sample_request("req-1"))
        .await
        .expect_err("dataset creation fails");
    assert!(matches!(
        err,
        TransferError::Provisioning {
            kind: ResourceKind::Dataset,
            ..
        }
    ));
    assert!(harness.pipelines.triggered_runs().is_empty());
    assert_eq!(
        harness.secrets.deleted(),
        vec![secret_name("req-1", EndpointRole::Source)]
    );
    assert_eq!(harness.pipelines.deleted().len(), 1);

    let snapshot = harness.service.metrics().snapshot();
    assert_eq!(snapshot.transfers_errored, 1);
    assert_eq!(snapshot.provisioned_resources, 2);
    assert_eq!(snapshot.active_transfers, 0);

    let events = drain(harness.service.events());
    assert!(matches!(
        events.last(),
        Some(TransferEvent::TransferFailed { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn missing_source_key_is_not_retryable() {
    let harness = harness(ScriptedPipelineService::new());
    let mut request = sample_request("req-1");
    request.source.properties.remove(schema::SHARED_KEY);

    let err = harness
        .service
        .transfer(request)
        .await
        .expect_err("source lacks key");
    assert!(matches!(err, TransferError::InvalidEndpoint { .. }));
    assert!(!err.is_retryable());
    assert!(harness.secrets.names().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancelling_a_spawned_transfer_stops_polling() {
    let harness = harness(ScriptedPipelineService::with_statuses(["InProgress"]));
    let handle = harness.service.spawn_transfer(sample_request("req-1"));
    assert_eq!(handle.request_id(), "req-1");

    sleep(Duration::from_secs(3)).await;
    handle.cancel();
    let err = handle.outcome().await.expect_err("cancelled");
    assert!(matches!(err, TransferError::Cancelled { .. }));

    let queries = harness.pipelines.status_queries();
    assert!(queries >= 1);
    sleep(Duration::from_secs(60)).await;
    assert_eq!(harness.pipelines.status_queries(), queries);
    assert_eq!(harness.secrets.deleted().len(), 2);

    let snapshot = harness.service.metrics().snapshot();
    assert_eq!(snapshot.transfers_cancelled, 1);
    assert_eq!(snapshot.active_transfers, 0);
}

#[tokio::test(start_paused = true)]
async fn dropping_a_transfer_future_cancels_and_releases() {
    let harness = harness(ScriptedPipelineService::with_statuses(["InProgress"]));
    let abandoned = tokio::time::timeout(
        Duration::from_secs(10),
        harness.service.transfer(sample_request("req-1")),
    )
    .await;
    assert!(abandoned.is_err());

    sleep(Duration::from_secs(1)).await;
    let snapshot = harness.service.metrics().snapshot();
    assert_eq!(snapshot.active_transfers, 0);
    assert_eq!(snapshot.transfers_cancelled, 1);
    assert_eq!(
        harness.secrets.deleted(),
        vec![
            secret_name("req-1", EndpointRole::Destination),
            secret_name("req-1", EndpointRole::Source),
        ]
    );

    let queries = harness.pipelines.status_queries();
    sleep(Duration::from_secs(60)).await;
    assert_eq!(harness.pipelines.status_queries(), queries);
}

#[tokio::test(start_paused = true)]
async fn similar_request_ids_do_not_share_resources() {
    let harness = harness_with(
        ScriptedPipelineService::with_statuses(["InProgress"]),
        ServiceConfig {
            polling: PollSettings {
                run_timeout: Duration::from_secs(3_600),
                ..fast_polling()
            },
            ..config()
        },
    );
    let first = harness.service.spawn_transfer(sample_request("Job.1"));
    let second = harness.service.spawn_transfer(sample_request("job-1"));
    sleep(Duration::from_secs(3)).await;
    assert_eq!(harness.secrets.names().len(), 4);

    first.cancel();
    assert!(first.outcome().await.is_err());
    assert_eq!(
        harness.secrets.deleted(),
        vec![
            secret_name("Job.1", EndpointRole::Destination),
            secret_name("Job.1", EndpointRole::Source),
        ]
    );
    for role in [EndpointRole::Source, EndpointRole::Destination] {
        assert!(harness.secrets.current(&secret_name("job-1", role)).is_some());
    }

    second.cancel();
    assert!(second.outcome().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn concurrency_cap_queues_excess_transfers() {
    let harness = harness_with(
        ScriptedPipelineService::with_statuses(["InProgress"]),
        ServiceConfig {
            max_concurrent_transfers: 1,
            polling: PollSettings {
                run_timeout: Duration::from_secs(3_600),
                ..fast_polling()
            },
            ..ServiceConfig::default()
        },
    );

    let first = harness.service.spawn_transfer(sample_request("req-a"));
    sleep(Duration::from_secs(1)).await;
    let second = harness.service.spawn_transfer(sample_request("req-b"));
    sleep(Duration::from_secs(10)).await;

    assert_eq!(harness.pipelines.triggered_runs(), vec![pipeline_name("req-a")]);
    assert_eq!(harness.service.available_slots(), 0);

    first.cancel();
    assert!(first.outcome().await.is_err());
    sleep(Duration::from_secs(1)).await;
    assert_eq!(
        harness.pipelines.triggered_runs(),
        vec![pipeline_name("req-a"), pipeline_name("req-b")]
    );

    second.cancel();
    assert!(second.outcome().await.is_err());
    assert_eq!(harness.service.available_slots(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_in_flight_transfers() {
    let harness = harness(ScriptedPipelineService::with_statuses(["InProgress"]));
    let handles = [
        harness.service.spawn_transfer(sample_request("req-a")),
        harness.service.spawn_transfer(sample_request("req-b")),
    ];
    sleep(Duration::from_secs(2)).await;
    harness.service.shutdown();
    for handle in handles {
        let err = handle.outcome().await.expect_err("shut down");
        assert!(matches!(err, TransferError::Cancelled { .. }));
    }
}

#[tokio::test(start_paused = true)]
async fn lifecycle_is_published_and_counted() -> TransferResult<()> {
    let harness = harness(ScriptedPipelineService::with_statuses([
        "Queued",
        "InProgress",
        "Succeeded",
    ]));
    harness.service.transfer(sample_request("req-1")).await?;

    let kinds: Vec<&str> = drain(harness.service.events())
        .iter()
        .map(TransferEvent::kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            "transfer_started",
            "endpoint_provisioned",
            "endpoint_provisioned",
            "pipeline_submitted",
            "run_status_observed",
            "run_status_observed",
            "run_status_observed",
            "transfer_completed",
        ]
    );

    let snapshot = harness.service.metrics().snapshot();
    assert_eq!(snapshot.transfers_succeeded, 1);
    assert_eq!(snapshot.provisioned_resources, 7);
    assert_eq!(snapshot.active_transfers, 0);
    let rendered = harness.service.metrics().render().expect("render metrics");
    assert!(rendered.contains("skyferry_run_status_polls_total"));
    Ok(())
}
