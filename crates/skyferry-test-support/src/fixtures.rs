//! Request builders for blob copy scenarios.

use skyferry_core::{Endpoint, TransferRequest, schema};

/// Blob storage endpoint with the given addressing and key.
#[must_use]
pub fn blob_endpoint(account: &str, container: &str, object: Option<&str>, key: &str) -> Endpoint {
    let endpoint = Endpoint::blob()
        .with_property(schema::ACCOUNT_NAME, account)
        .with_property(schema::CONTAINER_NAME, container)
        .with_property(schema::SHARED_KEY, key);
    match object {
        Some(name) => endpoint.with_property(schema::OBJECT_NAME, name),
        None => endpoint,
    }
}

/// Copy of `f.bin` from `acctA/src` to the root of `acctB/dst`.
#[must_use]
pub fn sample_request(id: &str) -> TransferRequest {
    TransferRequest::new(
        id,
        format!("process-{id}"),
        blob_endpoint("accta", "src", Some("f.bin"), "K1"),
        blob_endpoint("acctb", "dst", None, "K2"),
    )
}
