use std::sync::Arc;

use anyhow::Result;
use httpmock::prelude::*;
use reqwest::Client;
use serde_json::json;
use skyferry_app::bootstrap::azure_collaborators;
use skyferry_app::{build_context, load_settings};
use skyferry_azure::{StaticToken, TokenSource};
use skyferry_config::{SettingsLoader, keys};
use skyferry_factory::NameScope;
use skyferry_test_support::sample_request;

const FACTORY_ID: &str =
    "/subscriptions/sub-1/resourceGroups/rg-1/providers/Microsoft.DataFactory/factories/adf-1";
const VAULT_ID: &str =
    "/subscriptions/sub-1/resourceGroups/rg-1/providers/Microsoft.KeyVault/vaults/vault-1";

#[tokio::test]
async fn transfer_drives_vault_and_factory_endpoints() -> Result<()> {
    let server = MockServer::start_async().await;
    let names = NameScope::for_request("skyferry", "req-1");
    let pipeline_name = names.pipeline().to_string();
    let secrets = server.mock(|when, then| {
        when.method(PUT)
            .path_includes(format!("/secrets/{pipeline_name}-"))
            .header("authorization", "Bearer token");
        then.status(200)
            .json_body(json!({ "id": "https://vault/secrets/skyferry/1" }));
    });
    let linked_services = server.mock(|when, then| {
        when.method(PUT)
            .path_includes(format!("{FACTORY_ID}/linkedservices/{pipeline_name}-"));
        then.status(200).json_body(json!({}));
    });
    let datasets = server.mock(|when, then| {
        when.method(PUT)
            .path_includes(format!("{FACTORY_ID}/datasets/{pipeline_name}-"));
        then.status(200).json_body(json!({}));
    });
    let pipeline = server.mock(|when, then| {
        when.method(PUT)
            .path(format!("{FACTORY_ID}/pipelines/{pipeline_name}"));
        then.status(200).json_body(json!({}));
    });
    let create_run = server.mock(|when, then| {
        when.method(POST)
            .path(format!("{FACTORY_ID}/pipelines/{pipeline_name}/createRun"));
        then.status(200).json_body(json!({ "runId": "run-1" }));
    });
    let run_status = server.mock(|when, then| {
        when.method(GET).path(format!("{FACTORY_ID}/pipelineruns/run-1"));
        then.status(200)
            .json_body(json!({ "runId": "run-1", "status": "Succeeded" }));
    });

    let loader = SettingsLoader::from_pairs([
        (keys::DATAFACTORY_RESOURCE_ID, FACTORY_ID.to_string()),
        (keys::KEYVAULT_RESOURCE_ID, VAULT_ID.to_string()),
        (keys::KEYVAULT_URI, server.base_url()),
        (keys::ARM_ENDPOINT, server.base_url()),
    ]);
    let settings = load_settings(loader, None)?;
    let tokens: Arc<dyn TokenSource> = Arc::new(StaticToken::new("token"));
    let collaborators = azure_collaborators(&settings, &Client::new(), &tokens);
    let context = build_context(settings, collaborators)?;

    let request = sample_request("req-1");
    let service = context.registry().resolve(&request).expect("service");
    let outcome = service.transfer(request).await?;

    assert!(outcome.succeeded, "{outcome:?}");
    secrets.assert_hits(2);
    linked_services.assert_hits(2);
    datasets.assert_hits(2);
    pipeline.assert();
    create_run.assert();
    run_status.assert();
    Ok(())
}
