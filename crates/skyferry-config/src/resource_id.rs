//! Parsing of Azure Resource Manager identifiers.
//!
//! Identifiers have the shape
//! `/subscriptions/{sub}/resourceGroups/{group}/providers/{namespace}/{type}/{name}`. Segment keys
//! and the provider namespace compare case-insensitively, as ARM itself does.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Provider namespace and resource type of a Data Factory instance.
pub const DATA_FACTORY_PROVIDER: (&str, &str) = ("Microsoft.DataFactory", "factories");
/// Provider namespace and resource type of a Key Vault instance.
pub const KEY_VAULT_PROVIDER: (&str, &str) = ("Microsoft.KeyVault", "vaults");

/// A parsed ARM resource identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceId {
    /// Subscription identifier.
    pub subscription_id: String,
    /// Resource group name.
    pub resource_group: String,
    /// Provider namespace, e.g. `Microsoft.DataFactory`.
    pub provider: String,
    /// Resource type within the provider, e.g. `factories`.
    pub resource_type: String,
    /// Resource name.
    pub name: String,
}

/// Why an identifier was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceIdError {
    /// Identifier did not follow the segment layout.
    Malformed,
    /// Identifier names a different provider or resource type.
    WrongProvider,
}

impl ResourceIdError {
    /// Machine-readable reason.
    #[must_use]
    pub const fn reason(self) -> &'static str {
        match self {
            Self::Malformed => {
                "must look like /subscriptions/{id}/resourceGroups/{group}/providers/{namespace}/{type}/{name}"
            }
            Self::WrongProvider => "names an unexpected provider or resource type",
        }
    }
}

impl ResourceId {
    /// Parse an identifier without checking its provider.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceIdError::Malformed`] when segments are missing, empty or out of order.
    pub fn parse(raw: &str) -> Result<Self, ResourceIdError> {
        let trimmed = raw.trim().trim_end_matches('/');
        let mut segments = trimmed.strip_prefix('/').ok_or(ResourceIdError::Malformed)?.split('/');
        let mut next = || {
            segments
                .next()
                .filter(|segment| !segment.is_empty())
                .ok_or(ResourceIdError::Malformed)
        };

        expect_key(next()?, "subscriptions")?;
        let subscription_id = next()?.to_string();
        expect_key(next()?, "resourceGroups")?;
        let resource_group = next()?.to_string();
        expect_key(next()?, "providers")?;
        let provider = next()?.to_string();
        let resource_type = next()?.to_string();
        let name = next()?.to_string();

        if segments.next().is_some() {
            return Err(ResourceIdError::Malformed);
        }

        Ok(Self {
            subscription_id,
            resource_group,
            provider,
            resource_type,
            name,
        })
    }

    /// Parse an identifier and require a specific provider and resource type.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceIdError`] when the layout or the provider does not match.
    pub fn parse_for(raw: &str, expected: (&str, &str)) -> Result<Self, ResourceIdError> {
        let parsed = Self::parse(raw)?;
        let (namespace, resource_type) = expected;
        if parsed.provider.eq_ignore_ascii_case(namespace)
            && parsed.resource_type.eq_ignore_ascii_case(resource_type)
        {
            Ok(parsed)
        } else {
            Err(ResourceIdError::WrongProvider)
        }
    }
}

impl Display for ResourceId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "/subscriptions/{}/resourceGroups/{}/providers/{}/{}/{}",
            self.subscription_id, self.resource_group, self.provider, self.resource_type, self.name
        )
    }
}

fn expect_key(segment: &str, key: &str) -> Result<(), ResourceIdError> {
    if segment.eq_ignore_ascii_case(key) {
        Ok(())
    } else {
        Err(ResourceIdError::Malformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FACTORY: &str = "/subscriptions/0000-1111/resourceGroups/rg-data/providers/Microsoft.DataFactory/factories/adf-main";

    #[test]
    fn parses_factory_identifier() {
        let parsed = ResourceId::parse_for(FACTORY, DATA_FACTORY_PROVIDER).expect("valid id");
        assert_eq!(parsed.subscription_id, "0000-1111");
        assert_eq!(parsed.resource_group, "rg-data");
        assert_eq!(parsed.name, "adf-main");
        assert_eq!(parsed.to_string(), FACTORY);
    }

    #[test]
    fn segment_keys_are_case_insensitive() {
        let lowered = FACTORY.to_ascii_lowercase();
        let parsed = ResourceId::parse_for(&lowered, DATA_FACTORY_PROVIDER).expect("valid id");
        assert_eq!(parsed.name, "adf-main");
    }

    #[test]
    fn rejects_wrong_provider_and_bad_layout() {
        assert_eq!(
            ResourceId::parse_for(FACTORY, KEY_VAULT_PROVIDER),
            Err(ResourceIdError::WrongProvider)
        );
        for raw in [
            "",
            "subscriptions/x/resourceGroups/y/providers/a/b/c",
            "/subscriptions/x/resourceGroups/y/providers/a/b",
            "/subscriptions//resourceGroups/y/providers/a/b/c",
            "/subscriptions/x/groups/y/providers/a/b/c",
            "/subscriptions/x/resourceGroups/y/providers/a/b/c/extra",
        ] {
            assert_eq!(ResourceId::parse(raw), Err(ResourceIdError::Malformed), "{raw}");
        }
    }
}
