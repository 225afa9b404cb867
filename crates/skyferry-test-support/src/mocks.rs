//! In-memory collaborators that record every call.
//!
//! State sits behind `std::sync::Mutex`; no lock is held across an await point.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::{Map, Value};
use skyferry_core::{
    DatasetDefinition, LinkedServiceDefinition, PipelineDefinition, PipelineService, ResourceKind,
    ResourceRef, RunSnapshot, SecretHandle, SecretStore,
};

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Secret store that versions overwrites instead of rejecting them.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    state: Mutex<SecretState>,
}

#[derive(Debug, Default)]
struct SecretState {
    versions: BTreeMap<String, Vec<String>>,
    deleted: Vec<String>,
    fail_sets: Option<String>,
    fail_deletes: Option<String>,
}

impl MemorySecretStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `set_secret` call fail with `message`.
    #[must_use]
    pub fn failing_sets(self, message: &str) -> Self {
        guard(&self.state).fail_sets = Some(message.to_string());
        self
    }

    /// Make every `delete_secret` call fail with `message`.
    #[must_use]
    pub fn failing_deletes(self, message: &str) -> Self {
        guard(&self.state).fail_deletes = Some(message.to_string());
        self
    }

    /// Latest value stored under `name`.
    #[must_use]
    pub fn current(&self, name: &str) -> Option<String> {
        guard(&self.state)
            .versions
            .get(name)
            .and_then(|versions| versions.last().cloned())
    }

    /// Number of versions written under `name`.
    #[must_use]
    pub fn version_count(&self, name: &str) -> usize {
        guard(&self.state).versions.get(name).map_or(0, Vec::len)
    }

    /// Names currently stored.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        guard(&self.state).versions.keys().cloned().collect()
    }

    /// Names removed through `delete_secret`, in call order.
    #[must_use]
    pub fn deleted(&self) -> Vec<String> {
        guard(&self.state).deleted.clone()
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn set_secret(&self, name: &str, value: &str) -> Result<SecretHandle> {
        let mut state = guard(&self.state);
        if let Some(message) = &state.fail_sets {
            return Err(anyhow!("{message}"));
        }
        state
            .versions
            .entry(name.to_string())
            .or_default()
            .push(value.to_string());
        Ok(SecretHandle {
            name: name.to_string(),
        })
    }

    async fn delete_secret(&self, name: &str) -> Result<()> {
        let mut state = guard(&self.state);
        if let Some(message) = &state.fail_deletes {
            return Err(anyhow!("{message}"));
        }
        state.versions.remove(name);
        state.deleted.push(name.to_string());
        Ok(())
    }
}

/// Pipeline-service calls that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineOperation {
    /// `create_linked_service`.
    CreateLinkedService,
    /// `create_dataset`.
    CreateDataset,
    /// `create_pipeline`.
    CreatePipeline,
    /// `trigger_run`.
    TriggerRun,
    /// `run_status`.
    RunStatus,
    /// `delete_resource`.
    DeleteResource,
}

#[derive(Debug, Clone)]
enum ScriptedStatus {
    Snapshot(RunSnapshot),
    Error(String),
    Hang,
}

/// Pipeline service that records definitions and replays a scripted status sequence.
///
/// Once the script is exhausted the last entry repeats; an empty script reports `InProgress`.
#[derive(Debug, Default)]
pub struct ScriptedPipelineService {
    state: Mutex<PipelineState>,
}

#[derive(Debug, Default)]
struct PipelineState {
    linked_services: Vec<LinkedServiceDefinition>,
    datasets: Vec<DatasetDefinition>,
    pipelines: Vec<PipelineDefinition>,
    runs: Vec<(String, Option<Map<String, Value>>)>,
    script: VecDeque<ScriptedStatus>,
    last: Option<ScriptedStatus>,
    status_queries: usize,
    deleted: Vec<ResourceRef>,
    failures: HashMap<PipelineOperation, String>,
    failing_delete_kinds: Vec<ResourceKind>,
}

impl ScriptedPipelineService {
    /// Service with an empty status script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Service that reports each status in turn, without messages.
    #[must_use]
    pub fn with_statuses<'a>(statuses: impl IntoIterator<Item = &'a str>) -> Self {
        let service = Self::new();
        for status in statuses {
            service.push_status(status, None);
        }
        service
    }

    /// Append a status observation to the script.
    pub fn push_status(&self, status: &str, message: Option<&str>) {
        guard(&self.state)
            .script
            .push_back(ScriptedStatus::Snapshot(RunSnapshot::new(
                status,
                message.map(str::to_string),
            )));
    }

    /// Append a failed status query to the script.
    pub fn push_status_error(&self, message: &str) {
        guard(&self.state)
            .script
            .push_back(ScriptedStatus::Error(message.to_string()));
    }

    /// Append a status query that never answers.
    pub fn push_status_hang(&self) {
        guard(&self.state).script.push_back(ScriptedStatus::Hang);
    }

    /// Make every call of `operation` fail with `message`.
    #[must_use]
    pub fn failing(self, operation: PipelineOperation, message: &str) -> Self {
        guard(&self.state)
            .failures
            .insert(operation, message.to_string());
        self
    }

    /// Make deletions of one resource kind fail.
    #[must_use]
    pub fn failing_deletes_of(self, kind: ResourceKind) -> Self {
        guard(&self.state).failing_delete_kinds.push(kind);
        self
    }

    /// Linked services created, in call order.
    #[must_use]
    pub fn linked_services(&self) -> Vec<LinkedServiceDefinition> {
        guard(&self.state).linked_services.clone()
    }

    /// Datasets created, in call order.
    #[must_use]
    pub fn datasets(&self) -> Vec<DatasetDefinition> {
        guard(&self.state).datasets.clone()
    }

    /// Pipelines created, in call order.
    #[must_use]
    pub fn pipelines(&self) -> Vec<PipelineDefinition> {
        guard(&self.state).pipelines.clone()
    }

    /// Pipeline names of triggered runs, in call order.
    #[must_use]
    pub fn triggered_runs(&self) -> Vec<String> {
        guard(&self.state)
            .runs
            .iter()
            .map(|(pipeline, _)| pipeline.clone())
            .collect()
    }

    /// Number of `run_status` calls observed.
    #[must_use]
    pub fn status_queries(&self) -> usize {
        guard(&self.state).status_queries
    }

    /// Resources deleted, in call order.
    #[must_use]
    pub fn deleted(&self) -> Vec<ResourceRef> {
        guard(&self.state).deleted.clone()
    }

    fn check(state: &PipelineState, operation: PipelineOperation) -> Result<()> {
        match state.failures.get(&operation) {
            Some(message) => Err(anyhow!("{message}")),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PipelineService for ScriptedPipelineService {
    async fn create_linked_service(
        &self,
        definition: &LinkedServiceDefinition,
    ) -> Result<ResourceRef> {
        let mut state = guard(&self.state);
        Self::check(&state, PipelineOperation::CreateLinkedService)?;
        state.linked_services.push(definition.clone());
        Ok(ResourceRef::new(ResourceKind::LinkedService, &definition.name))
    }

    async fn create_dataset(&self, definition: &DatasetDefinition) -> Result<ResourceRef> {
        let mut state = guard(&self.state);
        Self::check(&state, PipelineOperation::CreateDataset)?;
        state.datasets.push(definition.clone());
        Ok(ResourceRef::new(ResourceKind::Dataset, &definition.name))
    }

    async fn create_pipeline(&self, definition: &PipelineDefinition) -> Result<ResourceRef> {
        let mut state = guard(&self.state);
        Self::check(&state, PipelineOperation::CreatePipeline)?;
        state.pipelines.push(definition.clone());
        Ok(ResourceRef::new(ResourceKind::Pipeline, &definition.name))
    }

    async fn trigger_run(
        &self,
        pipeline: &ResourceRef,
        parameters: Option<&Map<String, Value>>,
    ) -> Result<String> {
        let mut state = guard(&self.state);
        Self::check(&state, PipelineOperation::TriggerRun)?;
        state.runs.push((pipeline.name.clone(), parameters.cloned()));
        Ok(format!("run-{}", state.runs.len()))
    }

    async fn run_status(&self, _run_id: &str) -> Result<RunSnapshot> {
        let next = {
            let mut state = guard(&self.state);
            state.status_queries += 1;
            Self::check(&state, PipelineOperation::RunStatus)?;
            match state.script.pop_front() {
                Some(entry) => {
                    state.last = Some(entry.clone());
                    entry
                }
                None => state.last.clone().unwrap_or_else(|| {
                    ScriptedStatus::Snapshot(RunSnapshot::new("InProgress", None))
                }),
            }
        };
        match next {
            ScriptedStatus::Snapshot(snapshot) => Ok(snapshot),
            ScriptedStatus::Error(message) => Err(anyhow!("{message}")),
            ScriptedStatus::Hang => std::future::pending().await,
        }
    }

    async fn delete_resource(&self, resource: &ResourceRef) -> Result<()> {
        let mut state = guard(&self.state);
        Self::check(&state, PipelineOperation::DeleteResource)?;
        if state.failing_delete_kinds.contains(&resource.kind) {
            return Err(anyhow!("deletion of {} refused", resource.name));
        }
        state.deleted.push(resource.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn secret_store_versions_overwrites() -> Result<()> {
        let store = MemorySecretStore::new();
        store.set_secret("name", "v1").await?;
        store.set_secret("name", "v2").await?;
        assert_eq!(store.version_count("name"), 2);
        assert_eq!(store.current("name").as_deref(), Some("v2"));
        store.delete_secret("name").await?;
        assert!(store.names().is_empty());
        assert_eq!(store.deleted(), vec!["name".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn failing_store_reports_message() {
        let store = MemorySecretStore::new().failing_sets("vault unreachable");
        let err = store.set_secret("name", "v1").await.expect_err("set fails");
        assert_eq!(err.to_string(), "vault unreachable");
    }

    #[tokio::test]
    async fn status_script_repeats_last_entry() -> Result<()> {
        let service = ScriptedPipelineService::with_statuses(["Queued", "Succeeded"]);
        assert_eq!(service.run_status("r").await?.status, "Queued");
        assert_eq!(service.run_status("r").await?.status, "Succeeded");
        assert_eq!(service.run_status("r").await?.status, "Succeeded");
        assert_eq!(service.status_queries(), 3);

        let empty = ScriptedPipelineService::new();
        assert_eq!(empty.run_status("r").await?.status, "InProgress");
        Ok(())
    }

    #[tokio::test]
    async fn injected_failures_and_deletions() -> Result<()> {
        let service = ScriptedPipelineService::new()
            .failing(PipelineOperation::TriggerRun, "quota exceeded")
            .failing_deletes_of(ResourceKind::Pipeline);
        let pipeline = ResourceRef::new(ResourceKind::Pipeline, "p");
        assert!(service.trigger_run(&pipeline, None).await.is_err());
        assert!(service.delete_resource(&pipeline).await.is_err());
        let dataset = ResourceRef::new(ResourceKind::Dataset, "d");
        service.delete_resource(&dataset).await?;
        assert_eq!(service.deleted(), vec![dataset]);
        assert!(service.triggered_runs().is_empty());
        Ok(())
    }
}
