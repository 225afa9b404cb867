//! Request plumbing shared by the adapters: URL building, status checks, error bodies.

use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::{AzureError, AzureResult};

/// Join a base endpoint and an absolute path into a URL.
pub(crate) fn join(base: &str, path: &str) -> AzureResult<Url> {
    let raw = format!("{}{path}", base.trim_end_matches('/'));
    Url::parse(&raw).map_err(|source| AzureError::Url { value: raw, source })
}

/// Send a request and turn any non-success status into [`AzureError::Status`].
pub(crate) async fn execute(request: RequestBuilder, operation: &'static str) -> AzureResult<Response> {
    let response = request
        .send()
        .await
        .map_err(|source| AzureError::Transport { operation, source })?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let bytes = response.bytes().await.unwrap_or_default();
    let (code, message) = error_body(status, &bytes);
    Err(AzureError::Status {
        operation,
        status: status.as_u16(),
        code,
        message,
    })
}

/// Like [`execute`], but a 404 resolves to `None`.
pub(crate) async fn execute_allow_missing(
    request: RequestBuilder,
    operation: &'static str,
) -> AzureResult<Option<Response>> {
    match execute(request, operation).await {
        Ok(response) => Ok(Some(response)),
        Err(err) if err.status() == Some(StatusCode::NOT_FOUND.as_u16()) => Ok(None),
        Err(err) => Err(err),
    }
}

/// Decode a JSON response body.
pub(crate) async fn decode<T: DeserializeOwned>(
    response: Response,
    operation: &'static str,
) -> AzureResult<T> {
    response
        .json::<T>()
        .await
        .map_err(|source| AzureError::Decode { operation, source })
}

#[derive(Deserialize)]
struct ManagementError {
    error: ManagementErrorBody,
}

#[derive(Deserialize)]
struct ManagementErrorBody {
    code: Option<String>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct IdentityError {
    error: String,
    error_description: Option<String>,
}

/// Extract `(code, message)` from an error body.
///
/// Management and Key Vault APIs nest `{code, message}` under `error`; the identity platform uses
/// `error` plus `error_description`. Anything else falls back to the raw text.
fn error_body(status: StatusCode, bytes: &[u8]) -> (Option<String>, String) {
    if let Ok(parsed) = serde_json::from_slice::<ManagementError>(bytes) {
        let message = parsed
            .error
            .message
            .unwrap_or_else(|| format!("request failed with status {status}"));
        return (parsed.error.code, message);
    }
    if let Ok(parsed) = serde_json::from_slice::<IdentityError>(bytes) {
        let message = parsed
            .error_description
            .unwrap_or_else(|| format!("request failed with status {status}"));
        return (Some(parsed.error), message);
    }
    let text = String::from_utf8_lossy(bytes).trim().to_string();
    if text.is_empty() {
        (None, format!("request failed with status {status}"))
    } else {
        (None, text)
    }
}
