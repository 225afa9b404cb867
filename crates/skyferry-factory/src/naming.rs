//! Request-scoped names for ephemeral resources.
//!
//! Names derive only from the prefix and the request id, so a retried request reuses the same
//! names and overwrites its own leftovers instead of colliding with another request.
//!
//! A base is `<prefix>-<readable id>-<digest>`. The readable part is lossy (case folding,
//! punctuation collapsing, truncation); the digest is a name-based UUID over the raw id, so two
//! distinct ids never share a base.

use skyferry_core::EndpointRole;
use uuid::Uuid;

/// Upper bound on the sanitised request-id portion of a name.
///
/// Keeps the longest secret name (32-char prefix, token, digest, role) under Key Vault's 127.
const MAX_TOKEN_LEN: usize = 48;

/// Namespace for request-id digests.
const REQUEST_NAMESPACE: Uuid = Uuid::from_u128(0x6b1f_3c2e_8d4a_5f07_9e21_c0d8_a4b7_1e53);

/// Base name shared by every resource of one transfer attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameScope {
    base: String,
}

impl NameScope {
    /// Derive the scope for a request.
    #[must_use]
    pub fn for_request(prefix: &str, request_id: &str) -> Self {
        let digest = Uuid::new_v5(&REQUEST_NAMESPACE, request_id.as_bytes()).simple();
        let token = sanitise(request_id);
        let base = if token.is_empty() {
            format!("{prefix}-{digest}")
        } else {
            format!("{prefix}-{token}-{digest}")
        };
        Self { base }
    }

    /// Name shared by the pipeline of this attempt.
    #[must_use]
    pub fn pipeline(&self) -> &str {
        &self.base
    }

    /// Name for the secret, linked service and dataset of one endpoint.
    #[must_use]
    pub fn endpoint(&self, role: EndpointRole) -> String {
        format!("{}-{}", self.base, role.name_suffix())
    }
}

/// Lowercase alphanumerics joined by single hyphens, truncated to [`MAX_TOKEN_LEN`].
fn sanitise(raw: &str) -> String {
    let mut token = String::with_capacity(raw.len().min(MAX_TOKEN_LEN));
    let mut pending_hyphen = false;
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_hyphen && !token.is_empty() {
                token.push('-');
            }
            pending_hyphen = false;
            token.push(ch.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
        if token.len() >= MAX_TOKEN_LEN {
            break;
        }
    }
    token.truncate(MAX_TOKEN_LEN);
    token.trim_end_matches('-').to_string()
}
