//! Data Factory management API client implementing [`PipelineService`].
//!
//! # Design
//! - Every resource is written with `PUT` (create or replace), so retries with the same names
//!   overwrite rather than conflict.
//! - Deleting a resource that is already gone succeeds.
//! - Request bodies are built as JSON values by the `*_body` functions so their shape can be
//!   checked without a server.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use skyferry_config::ResourceId;
use skyferry_core::{
    DatasetDefinition, LinkedServiceDefinition, PipelineDefinition, PipelineService, ResourceKind,
    ResourceRef, RunSnapshot,
};
use tracing::{debug, info};

use crate::auth::TokenSource;
use crate::error::{AzureError, AzureResult};
use crate::{http, into_anyhow};

/// API version of the Data Factory management endpoints.
pub const DATA_FACTORY_API_VERSION: &str = "2018-06-01";

/// Pipeline service backed by one Data Factory instance.
pub struct ArmPipelineClient {
    http: Client,
    endpoint: String,
    scope: String,
    factory: ResourceId,
    tokens: Arc<dyn TokenSource>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRunResponse {
    run_id: String,
}

#[derive(Deserialize)]
struct PipelineRunResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
}

impl ArmPipelineClient {
    /// Client for `factory`, reached through the management `endpoint`.
    #[must_use]
    pub fn new(
        http: Client,
        endpoint: impl Into<String>,
        factory: ResourceId,
        tokens: Arc<dyn TokenSource>,
    ) -> Self {
        let endpoint = endpoint.into();
        let scope = format!("{}/.default", endpoint.trim_end_matches('/'));
        Self {
            http,
            endpoint,
            scope,
            factory,
            tokens,
        }
    }

    /// Factory this client manages.
    #[must_use]
    pub const fn factory(&self) -> &ResourceId {
        &self.factory
    }

    async fn request(&self, method: Method, path: &str) -> AzureResult<RequestBuilder> {
        let url = http::join(&self.endpoint, &format!("{}{path}", self.factory))?;
        let token = self.tokens.bearer(&self.scope).await?;
        Ok(self
            .http
            .request(method, url)
            .bearer_auth(token)
            .query(&[("api-version", DATA_FACTORY_API_VERSION)]))
    }

    async fn put_resource(
        &self,
        kind: ResourceKind,
        name: &str,
        body: &Value,
        operation: &'static str,
    ) -> AzureResult<ResourceRef> {
        let path = format!("/{}/{name}", collection(kind)?);
        let request = self.request(Method::PUT, &path).await?.json(body);
        http::execute(request, operation).await?;
        debug!(kind = kind.as_str(), resource = name, "factory resource written");
        Ok(ResourceRef::new(kind, name))
    }

    async fn create_run(
        &self,
        pipeline: &str,
        parameters: Option<&Map<String, Value>>,
    ) -> AzureResult<String> {
        let body = parameters.map_or_else(|| json!({}), |map| Value::Object(map.clone()));
        let request = self
            .request(Method::POST, &format!("/pipelines/{pipeline}/createRun"))
            .await?
            .json(&body);
        let response = http::execute(request, "create pipeline run").await?;
        let created: CreateRunResponse = http::decode(response, "create pipeline run").await?;
        info!(pipeline, run_id = %created.run_id, "pipeline run created");
        Ok(created.run_id)
    }

    async fn fetch_run(&self, run_id: &str) -> AzureResult<RunSnapshot> {
        let request = self
            .request(Method::GET, &format!("/pipelineruns/{run_id}"))
            .await?;
        let response = http::execute(request, "get pipeline run").await?;
        let run: PipelineRunResponse = http::decode(response, "get pipeline run").await?;
        Ok(RunSnapshot::new(run.status, run.message))
    }

    async fn delete(&self, resource: &ResourceRef) -> AzureResult<()> {
        let path = format!("/{}/{}", collection(resource.kind)?, resource.name);
        let request = self.request(Method::DELETE, &path).await?;
        if http::execute_allow_missing(request, "delete factory resource")
            .await?
            .is_none()
        {
            debug!(resource = %resource.name, "factory resource already absent");
        }
        Ok(())
    }
}

fn collection(kind: ResourceKind) -> AzureResult<&'static str> {
    match kind {
        ResourceKind::LinkedService => Ok("linkedservices"),
        ResourceKind::Dataset => Ok("datasets"),
        ResourceKind::Pipeline => Ok("pipelines"),
        ResourceKind::Secret => Err(AzureError::Unsupported {
            kind: kind.as_str(),
        }),
    }
}

/// Blob storage linked service whose account key is read from the vault.
#[must_use]
pub fn linked_service_body(definition: &LinkedServiceDefinition) -> Value {
    json!({
        "properties": {
            "type": "AzureBlobStorage",
            "typeProperties": {
                "connectionString": definition.connection_string(),
                "accountKey": {
                    "type": "AzureKeyVaultSecret",
                    "store": {
                        "referenceName": definition.secret_store_linked_service,
                        "type": "LinkedServiceReference"
                    },
                    "secretName": definition.secret_name
                }
            }
        }
    })
}

/// Binary dataset at a blob location; the file name is omitted for container roots.
#[must_use]
pub fn dataset_body(definition: &DatasetDefinition) -> Value {
    let mut location = Map::new();
    location.insert("type".into(), json!("AzureBlobStorageLocation"));
    location.insert("container".into(), json!(definition.container));
    if let Some(object_name) = &definition.object_name {
        location.insert("fileName".into(), json!(object_name));
    }
    json!({
        "properties": {
            "type": "Binary",
            "linkedServiceName": {
                "referenceName": definition.linked_service,
                "type": "LinkedServiceReference"
            },
            "typeProperties": {
                "location": location
            }
        }
    })
}

/// Pipeline of copy activities with an elapsed-time alert policy.
#[must_use]
pub fn pipeline_body(definition: &PipelineDefinition) -> Value {
    let activities: Vec<Value> = definition
        .activities
        .iter()
        .map(|activity| {
            json!({
                "name": activity.name,
                "type": "Copy",
                "inputs": [{ "referenceName": activity.input_dataset, "type": "DatasetReference" }],
                "outputs": [{ "referenceName": activity.output_dataset, "type": "DatasetReference" }],
                "typeProperties": {
                    "source": { "type": "BinarySource" },
                    "sink": { "type": "BinarySink" },
                    "validateDataConsistency": activity.validate_data_consistency,
                    "dataIntegrationUnits": activity.data_integration_units
                }
            })
        })
        .collect();
    json!({
        "properties": {
            "activities": activities,
            "policy": {
                "elapsedTimeMetric": {
                    "duration": timespan(definition.elapsed_time_metric)
                }
            }
        }
    })
}

/// Render a duration as a `d.hh:mm:ss` timespan.
#[must_use]
pub fn timespan(duration: Duration) -> String {
    let total = duration.as_secs();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;
    format!("{days}.{hours:02}:{minutes:02}:{seconds:02}")
}

#[async_trait]
impl PipelineService for ArmPipelineClient {
    async fn create_linked_service(
        &self,
        definition: &LinkedServiceDefinition,
    ) -> anyhow::Result<ResourceRef> {
        self.put_resource(
            ResourceKind::LinkedService,
            &definition.name,
            &linked_service_body(definition),
            "create linked service",
        )
        .await
        .map_err(into_anyhow)
    }

    async fn create_dataset(&self, definition: &DatasetDefinition) -> anyhow::Result<ResourceRef> {
        self.put_resource(
            ResourceKind::Dataset,
            &definition.name,
            &dataset_body(definition),
            "create dataset",
        )
        .await
        .map_err(into_anyhow)
    }

    async fn create_pipeline(
        &self,
        definition: &PipelineDefinition,
    ) -> anyhow::Result<ResourceRef> {
        self.put_resource(
            ResourceKind::Pipeline,
            &definition.name,
            &pipeline_body(definition),
            "create pipeline",
        )
        .await
        .map_err(into_anyhow)
    }

    async fn trigger_run(
        &self,
        pipeline: &ResourceRef,
        parameters: Option<&Map<String, Value>>,
    ) -> anyhow::Result<String> {
        self.create_run(&pipeline.name, parameters)
            .await
            .map_err(into_anyhow)
    }

    async fn run_status(&self, run_id: &str) -> anyhow::Result<RunSnapshot> {
        self.fetch_run(run_id).await.map_err(into_anyhow)
    }

    async fn delete_resource(&self, resource: &ResourceRef) -> anyhow::Result<()> {
        self.delete(resource).await.map_err(into_anyhow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyferry_core::CopyActivity;

    #[test]
    fn secrets_have_no_factory_collection() {
        let err = collection(ResourceKind::Secret).expect_err("not a factory resource");
        assert!(matches!(err, AzureError::Unsupported { kind: "secret" }));
    }

    #[test]
    fn timespan_formats_days_and_padding() {
        assert_eq!(timespan(Duration::from_secs(600)), "0.00:10:00");
        assert_eq!(timespan(Duration::from_secs(90_061)), "1.01:01:01");
    }

    #[test]
    fn linked_service_references_vault_secret() {
        let body = linked_service_body(&LinkedServiceDefinition {
            name: "ls".into(),
            account_name: "accta".into(),
            secret_name: "skyferry-req-1-src".into(),
            secret_store_linked_service: "AzureKeyVault".into(),
        });
        let props = &body["properties"]["typeProperties"];
        assert_eq!(
            props["connectionString"],
            "DefaultEndpointsProtocol=https;AccountName=accta;"
        );
        assert_eq!(props["accountKey"]["secretName"], "skyferry-req-1-src");
        assert_eq!(props["accountKey"]["store"]["referenceName"], "AzureKeyVault");
    }

    #[test]
    fn dataset_omits_file_name_for_container_root() {
        let mut definition = DatasetDefinition {
            name: "ds".into(),
            linked_service: "ls".into(),
            container: "dst".into(),
            object_name: None,
        };
        let location = dataset_body(&definition)["properties"]["typeProperties"]["location"].clone();
        assert_eq!(location["container"], "dst");
        assert!(location.get("fileName").is_none());

        definition.object_name = Some("f.bin".into());
        let location = dataset_body(&definition)["properties"]["typeProperties"]["location"].clone();
        assert_eq!(location["fileName"], "f.bin");
    }

    #[test]
    fn pipeline_carries_copy_tuning_and_policy() {
        let body = pipeline_body(&PipelineDefinition {
            name: "p".into(),
            activities: vec![CopyActivity {
                name: "CopyActivity".into(),
                input_dataset: "src".into(),
                output_dataset: "dst".into(),
                validate_data_consistency: true,
                data_integration_units: 32,
            }],
            elapsed_time_metric: Duration::from_secs(600),
        });
        let activity = &body["properties"]["activities"][0];
        assert_eq!(activity["type"], "Copy");
        assert_eq!(activity["inputs"][0]["referenceName"], "src");
        assert_eq!(activity["outputs"][0]["referenceName"], "dst");
        assert_eq!(activity["typeProperties"]["validateDataConsistency"], true);
        assert_eq!(activity["typeProperties"]["dataIntegrationUnits"], 32);
        assert_eq!(
            body["properties"]["policy"]["elapsedTimeMetric"]["duration"],
            "0.00:10:00"
        );
    }
}
