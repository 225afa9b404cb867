//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Label values are the stable `as_str` labels of the domain types; callers pass them in.

use std::sync::Arc;

use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Outcome labels recorded on `transfers_total`.
pub mod outcome {
    /// Copy finished successfully.
    pub const SUCCEEDED: &str = "succeeded";
    /// Run failed or timed out; caller may retry.
    pub const RETRYABLE_FAILURE: &str = "retryable_failure";
    /// Attempt ended with a lifecycle error.
    pub const ERROR: &str = "error";
    /// Attempt was cancelled.
    pub const CANCELLED: &str = "cancelled";
}

/// Labels used for the `kind` dimension of resource counters.
pub const RESOURCE_KIND_LABELS: [&str; 4] = ["secret", "linked_service", "dataset", "pipeline"];

/// Prometheus-backed metrics registry shared across services.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    transfers_total: IntCounterVec,
    provisioned_resources_total: IntCounterVec,
    run_status_polls_total: IntCounterVec,
    cleanup_failures_total: IntCounterVec,
    active_transfers: IntGauge,
}

/// Snapshot of selected counters and gauges for health reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Transfers currently holding a concurrency slot.
    pub active_transfers: i64,
    /// Transfers that copied successfully.
    pub transfers_succeeded: u64,
    /// Transfers reported as retryable failures.
    pub transfers_retryable: u64,
    /// Transfers that ended with an error.
    pub transfers_errored: u64,
    /// Transfers that were cancelled.
    pub transfers_cancelled: u64,
    /// Ephemeral resources created across all kinds.
    pub provisioned_resources: u64,
    /// Cleanup deletions that failed across all kinds.
    pub cleanup_failures: u64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any collector cannot be built or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let transfers_total = counter_vec(
            "skyferry_transfers_total",
            "Transfers finished, by outcome",
            &["outcome"],
        )?;
        let provisioned_resources_total = counter_vec(
            "skyferry_provisioned_resources_total",
            "Ephemeral resources created, by kind",
            &["kind"],
        )?;
        let run_status_polls_total = counter_vec(
            "skyferry_run_status_polls_total",
            "Pipeline run status observations, by reported status",
            &["status"],
        )?;
        let cleanup_failures_total = counter_vec(
            "skyferry_cleanup_failures_total",
            "Ephemeral resource deletions that failed, by kind",
            &["kind"],
        )?;
        let active_transfers = IntGauge::with_opts(Opts::new(
            "skyferry_active_transfers",
            "Transfers currently holding a concurrency slot",
        ))
        .map_err(|source| TelemetryError::Collector {
            metric: "skyferry_active_transfers",
            source,
        })?;

        register(&registry, "skyferry_transfers_total", &transfers_total)?;
        register(
            &registry,
            "skyferry_provisioned_resources_total",
            &provisioned_resources_total,
        )?;
        register(
            &registry,
            "skyferry_run_status_polls_total",
            &run_status_polls_total,
        )?;
        register(
            &registry,
            "skyferry_cleanup_failures_total",
            &cleanup_failures_total,
        )?;
        register(&registry, "skyferry_active_transfers", &active_transfers)?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                transfers_total,
                provisioned_resources_total,
                run_status_polls_total,
                cleanup_failures_total,
                active_transfers,
            }),
        })
    }

    /// Count a finished transfer under one of the [`outcome`] labels.
    pub fn inc_transfer(&self, outcome: &str) {
        self.inner
            .transfers_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Count a created ephemeral resource.
    pub fn inc_provisioned(&self, kind: &str) {
        self.inner
            .provisioned_resources_total
            .with_label_values(&[kind])
            .inc();
    }

    /// Count one run status observation.
    pub fn inc_status_poll(&self, status: &str) {
        self.inner
            .run_status_polls_total
            .with_label_values(&[status])
            .inc();
    }

    /// Count a failed cleanup deletion.
    pub fn inc_cleanup_failure(&self, kind: &str) {
        self.inner
            .cleanup_failures_total
            .with_label_values(&[kind])
            .inc();
    }

    /// Mark a transfer as holding a concurrency slot.
    pub fn transfer_started(&self) {
        self.inner.active_transfers.inc();
    }

    /// Release a concurrency slot in the gauge.
    pub fn transfer_finished(&self) {
        self.inner.active_transfers.dec();
    }

    /// Render the registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or the output is not UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::Render { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::RenderUtf8 { source })
    }

    /// Point-in-time summary of the transfer counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let transfers = |label: &str| {
            self.inner
                .transfers_total
                .with_label_values(&[label])
                .get()
        };
        MetricsSnapshot {
            active_transfers: self.inner.active_transfers.get(),
            transfers_succeeded: transfers(outcome::SUCCEEDED),
            transfers_retryable: transfers(outcome::RETRYABLE_FAILURE),
            transfers_errored: transfers(outcome::ERROR),
            transfers_cancelled: transfers(outcome::CANCELLED),
            provisioned_resources: sum_counter(&self.inner.provisioned_resources_total),
            cleanup_failures: sum_counter(&self.inner.cleanup_failures_total),
        }
    }
}

fn counter_vec(name: &'static str, help: &str, labels: &[&str]) -> Result<IntCounterVec> {
    IntCounterVec::new(Opts::new(name, help), labels)
        .map_err(|source| TelemetryError::Collector { metric: name, source })
}

fn register<C>(registry: &Registry, name: &'static str, collector: &C) -> Result<()>
where
    C: prometheus::core::Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::Registration { metric: name, source })
}

fn sum_counter(counter: &IntCounterVec) -> u64 {
    RESOURCE_KIND_LABELS
        .iter()
        .map(|kind| counter.with_label_values(&[*kind]).get())
        .sum()
}
