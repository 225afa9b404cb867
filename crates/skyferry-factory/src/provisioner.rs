//! Registers an endpoint's credential and describes it to the pipeline service.

use std::sync::Arc;

use skyferry_core::{
    DatasetDefinition, Endpoint, EndpointRole, LinkedServiceDefinition, PipelineService,
    ProvisionedEndpoint, ResourceKind, ResourceRef, SecretStore, TransferError, TransferResult,
    schema,
};
use tracing::debug;

use crate::cleanup::ResourceLedger;
use crate::naming::NameScope;

/// Creates the secret, linked service and dataset that let the service reach one endpoint.
pub struct ResourceProvisioner {
    secrets: Arc<dyn SecretStore>,
    pipelines: Arc<dyn PipelineService>,
    secret_store_linked_service: String,
}

impl ResourceProvisioner {
    /// Provisioner resolving secrets through the named pre-existing linked service.
    #[must_use]
    pub fn new(
        secrets: Arc<dyn SecretStore>,
        pipelines: Arc<dyn PipelineService>,
        secret_store_linked_service: impl Into<String>,
    ) -> Self {
        Self {
            secrets,
            pipelines,
            secret_store_linked_service: secret_store_linked_service.into(),
        }
    }

    /// Provision one endpoint. Every created resource is recorded in `ledger` before the next
    /// call, so a failure part-way leaves an accurate record for cleanup.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::InvalidEndpoint`] before any external call when a required
    /// property is absent, and [`TransferError::Provisioning`] when a collaborator fails.
    pub async fn provision(
        &self,
        endpoint: &Endpoint,
        role: EndpointRole,
        names: &NameScope,
        ledger: &mut ResourceLedger,
    ) -> TransferResult<ProvisionedEndpoint> {
        let account_name = required(endpoint, role, schema::ACCOUNT_NAME)?;
        let container = required(endpoint, role, schema::CONTAINER_NAME)?;
        let shared_key = required(endpoint, role, schema::SHARED_KEY)?;
        let name = names.endpoint(role);

        let secret = self
            .secrets
            .set_secret(&name, shared_key)
            .await
            .map_err(|err| TransferError::provisioning(ResourceKind::Secret, &name, err))?;
        ledger.record(ResourceRef::new(ResourceKind::Secret, &secret.name));
        debug!(role = role.as_str(), secret = %secret.name, "credential registered");

        let linked_service = self
            .pipelines
            .create_linked_service(&LinkedServiceDefinition {
                name: name.clone(),
                account_name: account_name.to_string(),
                secret_name: secret.name.clone(),
                secret_store_linked_service: self.secret_store_linked_service.clone(),
            })
            .await
            .map_err(|err| TransferError::provisioning(ResourceKind::LinkedService, &name, err))?;
        ledger.record(linked_service.clone());
        debug!(role = role.as_str(), linked_service = %linked_service.name, "linked service created");

        let dataset = self
            .pipelines
            .create_dataset(&DatasetDefinition {
                name: name.clone(),
                linked_service: linked_service.name.clone(),
                container: container.to_string(),
                object_name: endpoint.property(schema::OBJECT_NAME).map(str::to_string),
            })
            .await
            .map_err(|err| TransferError::provisioning(ResourceKind::Dataset, &name, err))?;
        ledger.record(dataset.clone());
        debug!(role = role.as_str(), dataset = %dataset.name, "dataset created");

        Ok(ProvisionedEndpoint {
            role,
            secret,
            linked_service,
            dataset,
        })
    }
}

fn required<'a>(
    endpoint: &'a Endpoint,
    role: EndpointRole,
    property: &'static str,
) -> TransferResult<&'a str> {
    endpoint
        .property(property)
        .filter(|value| !value.trim().is_empty())
        .ok_or(TransferError::InvalidEndpoint { role, property })
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyferry_test_support::{
        MemorySecretStore, PipelineOperation, ScriptedPipelineService, blob_endpoint,
    };

    fn provisioner(
        secrets: &Arc<MemorySecretStore>,
        pipelines: &Arc<ScriptedPipelineService>,
    ) -> ResourceProvisioner {
        ResourceProvisioner::new(secrets.clone(), pipelines.clone(), "AzureKeyVault")
    }

    #[tokio::test]
    async fn provisions_secret_linked_service_and_dataset() -> TransferResult<()> {
        let secrets = Arc::new(MemorySecretStore::new());
        let pipelines = Arc::new(ScriptedPipelineService::new());
        let names = NameScope::for_request("skyferry", "req-1");
        let mut ledger = ResourceLedger::new();

        let endpoint = blob_endpoint("accta", "src", Some("f.bin"), "K1");
        let provisioned = provisioner(&secrets, &pipelines)
            .provision(&endpoint, EndpointRole::Source, &names, &mut ledger)
            .await?;

        let secret_name = names.endpoint(EndpointRole::Source);
        assert_eq!(provisioned.secret.name, secret_name);
        assert_eq!(secrets.current(&secret_name).as_deref(), Some("K1"));
        let linked = pipelines.linked_services();
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].account_name, "accta");
        assert_eq!(linked[0].secret_name, secret_name);
        assert_eq!(linked[0].secret_store_linked_service, "AzureKeyVault");
        let datasets = pipelines.datasets();
        assert_eq!(datasets[0].container, "src");
        assert_eq!(datasets[0].object_name.as_deref(), Some("f.bin"));
        assert_eq!(ledger.entries().len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn reprovisioning_same_request_overwrites_secret() -> TransferResult<()> {
        let secrets = Arc::new(MemorySecretStore::new());
        let pipelines = Arc::new(ScriptedPipelineService::new());
        let names = NameScope::for_request("skyferry", "req-1");
        let endpoint = blob_endpoint("acctb", "dst", None, "K2");
        let provisioner = provisioner(&secrets, &pipelines);

        for _ in 0..2 {
            let mut ledger = ResourceLedger::new();
            provisioner
                .provision(&endpoint, EndpointRole::Destination, &names, &mut ledger)
                .await?;
        }
        let secret_name = names.endpoint(EndpointRole::Destination);
        assert_eq!(secrets.version_count(&secret_name), 2);
        assert_eq!(secrets.names(), vec![secret_name]);
        Ok(())
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_call() {
        let secrets = Arc::new(MemorySecretStore::new());
        let pipelines = Arc::new(ScriptedPipelineService::new());
        let names = NameScope::for_request("skyferry", "req-1");
        let mut ledger = ResourceLedger::new();
        let mut endpoint = blob_endpoint("accta", "src", None, "K1");
        endpoint.properties.remove(schema::SHARED_KEY);

        let err = provisioner(&secrets, &pipelines)
            .provision(&endpoint, EndpointRole::Source, &names, &mut ledger)
            .await
            .expect_err("missing key");
        assert!(matches!(
            err,
            TransferError::InvalidEndpoint {
                role: EndpointRole::Source,
                property: schema::SHARED_KEY
            }
        ));
        assert!(!err.is_retryable());
        assert!(secrets.names().is_empty());
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn dataset_failure_keeps_partial_ledger() {
        let secrets = Arc::new(MemorySecretStore::new());
        let pipelines = Arc::new(
            ScriptedPipelineService::new().failing(PipelineOperation::CreateDataset, "rejected"),
        );
        let names = NameScope::for_request("skyferry", "req-1");
        let mut ledger = ResourceLedger::new();
        let endpoint = blob_endpoint("accta", "src", None, "K1");

        let err = provisioner(&secrets, &pipelines)
            .provision(&endpoint, EndpointRole::Source, &names, &mut ledger)
            .await
            .expect_err("dataset rejected");
        assert!(matches!(
            err,
            TransferError::Provisioning {
                kind: ResourceKind::Dataset,
                ..
            }
        ));
        assert!(err.is_retryable());
        let kinds: Vec<ResourceKind> = ledger.entries().iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![ResourceKind::Secret, ResourceKind::LinkedService]);
    }
}
