//! Blob storage property rules.
//!
//! Rules follow the storage service's naming constraints: account names are 3-24 lowercase
//! letters or digits; container names are `$root` or 3-63 lowercase letters, digits and single
//! hyphens that start and end alphanumeric.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use skyferry_core::{Endpoint, ValidationError, schema};

const ROOT_CONTAINER: &str = "$root";
const MAX_OBJECT_NAME_LEN: usize = 1_024;

static ACCOUNT_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]{3,24}$").ok());
static CONTAINER_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9](?:[a-z0-9]|-[a-z0-9])*$").ok());

fn matches(pattern: &LazyLock<Option<Regex>>, value: &str) -> bool {
    pattern.as_ref().is_some_and(|regex| regex.is_match(value))
}

/// Check a storage account name.
///
/// # Errors
///
/// Returns a missing or malformed [`ValidationError`] for `accountName`.
pub fn validate_account_name(value: Option<&str>) -> Result<(), ValidationError> {
    let value = value.ok_or_else(|| ValidationError::missing(schema::ACCOUNT_NAME))?;
    if matches(&ACCOUNT_NAME, value) {
        Ok(())
    } else {
        Err(ValidationError::malformed(
            schema::ACCOUNT_NAME,
            "must be 3-24 lowercase letters or digits",
        ))
    }
}

/// Check a container name.
///
/// # Errors
///
/// Returns a missing or malformed [`ValidationError`] for `containerName`.
pub fn validate_container_name(value: Option<&str>) -> Result<(), ValidationError> {
    let value = value.ok_or_else(|| ValidationError::missing(schema::CONTAINER_NAME))?;
    if value == ROOT_CONTAINER
        || ((3..=63).contains(&value.len()) && matches(&CONTAINER_NAME, value))
    {
        Ok(())
    } else {
        Err(ValidationError::malformed(
            schema::CONTAINER_NAME,
            "must be $root or 3-63 lowercase letters, digits and single hyphens, starting and ending with a letter or digit",
        ))
    }
}

/// Check a shared account key. The value itself never appears in the error.
///
/// # Errors
///
/// Returns a missing or malformed [`ValidationError`] for `sharedKey`.
pub fn validate_shared_key(value: Option<&str>) -> Result<(), ValidationError> {
    let value = value.ok_or_else(|| ValidationError::missing(schema::SHARED_KEY))?;
    if value.trim().is_empty() {
        Err(ValidationError::malformed(schema::SHARED_KEY, "must not be blank"))
    } else {
        Ok(())
    }
}

/// Check an optional object name.
///
/// # Errors
///
/// Returns a malformed [`ValidationError`] for `objectName` when present but empty or too long.
pub fn validate_object_name(value: Option<&str>) -> Result<(), ValidationError> {
    match value {
        None => Ok(()),
        Some(name) if (1..=MAX_OBJECT_NAME_LEN).contains(&name.chars().count()) => Ok(()),
        Some(_) => Err(ValidationError::malformed(
            schema::OBJECT_NAME,
            "must be 1-1024 characters",
        )),
    }
}

/// Validate a destination endpoint: account, container and key in that order, then reject any
/// property outside the recognised set. Does not modify the endpoint.
///
/// Besides the three required properties and `type`, the optional `objectName` is accepted
/// (and checked for length) so a caller can rename the copied blob. A strict three-property
/// validator would reject it as unexpected.
///
/// # Errors
///
/// Returns the first failing check.
pub fn validate_destination(endpoint: &Endpoint) -> Result<(), ValidationError> {
    let mut remaining: BTreeMap<&str, &str> = endpoint
        .properties
        .iter()
        .map(|(key, value)| (key.as_str(), value.as_str()))
        .collect();

    validate_account_name(remaining.remove(schema::ACCOUNT_NAME))?;
    validate_container_name(remaining.remove(schema::CONTAINER_NAME))?;
    validate_shared_key(remaining.remove(schema::SHARED_KEY))?;
    validate_object_name(remaining.remove(schema::OBJECT_NAME))?;

    match remaining.keys().find(|key| **key != schema::TYPE) {
        Some(unexpected) => Err(ValidationError::unexpected(*unexpected)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyferry_core::ValidationReason;

    fn destination() -> Endpoint {
        Endpoint::blob()
            .with_property(schema::ACCOUNT_NAME, "acctb")
            .with_property(schema::CONTAINER_NAME, "dst")
            .with_property(schema::SHARED_KEY, "K2")
    }

    fn without(key: &str) -> Endpoint {
        let mut endpoint = destination();
        endpoint.properties.remove(key);
        endpoint
    }

    #[test]
    fn well_formed_destination_passes() {
        assert_eq!(validate_destination(&destination()), Ok(()));
        let with_type = destination().with_property(schema::TYPE, "AzureStorage");
        assert_eq!(validate_destination(&with_type), Ok(()));
        let with_object = destination().with_property(schema::OBJECT_NAME, "out/f.bin");
        assert_eq!(validate_destination(&with_object), Ok(()));
    }

    #[test]
    fn object_name_is_the_only_optional_property() {
        let err = validate_destination(&destination().with_property(schema::OBJECT_NAME, ""))
            .expect_err("empty object name");
        assert_eq!(err.property, schema::OBJECT_NAME);
        assert!(matches!(err.reason, ValidationReason::Malformed(_)));

        let err = validate_destination(&destination().with_property("objectPath", "out/f.bin"))
            .expect_err("near miss");
        assert_eq!(err.to_string(), "unexpected property `objectPath`");
    }

    #[test]
    fn missing_properties_are_named() {
        for key in [schema::ACCOUNT_NAME, schema::CONTAINER_NAME, schema::SHARED_KEY] {
            let err = validate_destination(&without(key)).expect_err(key);
            assert_eq!(err.reason, ValidationReason::Missing);
            assert!(err.to_string().contains(key), "{err}");
        }
    }

    #[test]
    fn unexpected_property_is_named() {
        let err = validate_destination(&destination().with_property("foo", "bar"))
            .expect_err("extra key");
        assert_eq!(err.to_string(), "unexpected property `foo`");
    }

    #[test]
    fn checks_run_in_order() {
        let endpoint = Endpoint::blob().with_property("foo", "bar");
        let err = validate_destination(&endpoint).expect_err("missing account");
        assert_eq!(err.property, schema::ACCOUNT_NAME);
    }

    #[test]
    fn validation_does_not_mutate_request() {
        let endpoint = destination().with_property("foo", "bar");
        let before = endpoint.clone();
        let _ = validate_destination(&endpoint);
        assert_eq!(endpoint, before);
    }

    #[test]
    fn account_name_rules() {
        assert!(validate_account_name(Some("abc")).is_ok());
        assert!(validate_account_name(Some("a1b2c3d4e5f6g7h8i9j0k1l2")).is_ok());
        for bad in ["ab", "Upper", "has-hyphen", "a1b2c3d4e5f6g7h8i9j0k1l2m"] {
            assert!(validate_account_name(Some(bad)).is_err(), "{bad}");
        }
    }

    #[test]
    fn container_name_rules() {
        for good in ["$root", "abc", "a-b-c", "logs2024"] {
            assert!(validate_container_name(Some(good)).is_ok(), "{good}");
        }
        let too_long = "a".repeat(64);
        for bad in ["ab", "-abc", "abc-", "a--b", "ABC", "a_b", too_long.as_str()] {
            assert!(validate_container_name(Some(bad)).is_err(), "{bad}");
        }
    }

    #[test]
    fn shared_key_and_object_rules() {
        let err = validate_shared_key(Some("   ")).expect_err("blank");
        assert_eq!(err.to_string(), "invalid property `sharedKey`: must not be blank");
        assert!(validate_object_name(None).is_ok());
        assert!(validate_object_name(Some("")).is_err());
        assert!(validate_object_name(Some(&"x".repeat(1_025))).is_err());
    }
}
