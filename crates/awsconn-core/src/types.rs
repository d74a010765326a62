//! Value types shared by the connection state machine and its collaborators.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// AWS Account ID (12-digit string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    /// Create a new account ID from a string.
    ///
    /// # Errors
    /// Returns an error if the account ID is not a 12-digit numeric string.
    pub fn new(id: impl Into<String>) -> Result<Self, crate::ConnectionError> {
        let id = id.into();
        if id.len() != 12 || !id.chars().all(|c| c.is_ascii_digit()) {
            return Err(crate::ConnectionError::InvalidAccountId(id));
        }
        Ok(Self(id))
    }

    /// Get the account ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The concrete source kind behind a [`CredentialIdentifier`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CredentialKind {
    /// A profile from the shared credentials/config files.
    SharedProfile,
    /// A profile from the SDK credential store.
    SdkProfile,
    /// Any other source, named by its factory.
    Custom(String),
}

impl CredentialKind {
    /// Factory id of the shared profile source.
    pub const SHARED_PROFILE_FACTORY: &str = "SharedProfile";
    /// Factory id of the SDK profile source.
    pub const SDK_PROFILE_FACTORY: &str = "SdkProfile";

    /// The id of the factory producing identifiers of this kind.
    #[must_use]
    pub fn factory_id(&self) -> &str {
        match self {
            Self::SharedProfile => Self::SHARED_PROFILE_FACTORY,
            Self::SdkProfile => Self::SDK_PROFILE_FACTORY,
            Self::Custom(factory) => factory,
        }
    }
}

/// Immutable handle to a configured credential source.
///
/// Two identifiers are equal when both their `id` and their [`CredentialKind`]
/// match. Display names do not take part in equality.
///
/// # Examples
///
/// ```
/// use awsconn_core::CredentialIdentifier;
///
/// let shared = CredentialIdentifier::shared_profile("default");
/// assert_eq!(shared.id(), "profile:default");
/// assert_eq!(shared.factory_id(), "SharedProfile");
/// assert_ne!(shared, CredentialIdentifier::sdk_profile("default"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialIdentifier {
    kind: CredentialKind,
    id: String,
    display_name: String,
    short_name: String,
}

impl CredentialIdentifier {
    /// Create an identifier with an explicit kind and id.
    #[must_use]
    pub fn new(
        kind: CredentialKind,
        id: impl Into<String>,
        display_name: impl Into<String>,
        short_name: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            id: id.into(),
            display_name: display_name.into(),
            short_name: short_name.into(),
        }
    }

    /// Identifier for a named profile in the shared credentials file.
    #[must_use]
    pub fn shared_profile(name: &str) -> Self {
        Self::new(
            CredentialKind::SharedProfile,
            format!("profile:{name}"),
            format!("Shared Credentials File: {name}"),
            name,
        )
    }

    /// Identifier for a named profile in the SDK credential store.
    #[must_use]
    pub fn sdk_profile(name: &str) -> Self {
        Self::new(
            CredentialKind::SdkProfile,
            format!("sdk:{name}"),
            format!("SDK Credential Store: {name}"),
            name,
        )
    }

    /// Session-unique id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Human readable name shown in selection lists.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Short name (usually the bare profile name).
    #[must_use]
    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    /// The id of the factory that produced this identifier.
    #[must_use]
    pub fn factory_id(&self) -> &str {
        self.kind.factory_id()
    }

    /// The concrete source kind.
    #[must_use]
    pub fn kind(&self) -> &CredentialKind {
        &self.kind
    }
}

impl PartialEq for CredentialIdentifier {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.id == other.id
    }
}

impl Eq for CredentialIdentifier {}

impl Hash for CredentialIdentifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.id.hash(state);
    }
}

impl fmt::Display for CredentialIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// AWS region descriptor as resolved by a [`crate::RegionProvider`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolkitRegion {
    /// Region id, e.g. `us-east-1`.
    pub id: String,
    /// Partition the region belongs to, e.g. `aws`.
    pub partition_id: String,
    /// Human readable name.
    pub display_name: String,
}

impl ToolkitRegion {
    /// Create a new region descriptor.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        partition_id: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            partition_id: partition_id.into(),
            display_name: display_name.into(),
        }
    }
}

impl fmt::Display for ToolkitRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// A candidate `(identifier, region)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSettings {
    /// The credential source.
    pub identifier: CredentialIdentifier,
    /// The target region.
    pub region: ToolkitRegion,
}

impl ConnectionSettings {
    /// Pair an identifier with a region.
    #[must_use]
    pub fn new(identifier: CredentialIdentifier, region: ToolkitRegion) -> Self {
        Self { identifier, region }
    }
}

impl fmt::Display for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.identifier, self.region)
    }
}

/// Identity established by a successful validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CallerIdentity {
    /// Account resolved from AWS signing credentials.
    Account(AccountId),
    /// Session identity resolved from a bearer token.
    AwsId(String),
    /// Local pseudo-region; no identity lookup was made.
    Local,
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_should_create_valid_account_id() {
        let id = AccountId::new("123456789012").unwrap();
        assert_eq!(id.as_str(), "123456789012");
    }

    #[test]
    fn test_should_reject_invalid_account_id() {
        assert!(AccountId::new("12345").is_err());
        assert!(AccountId::new("abcdefghijkl").is_err());
        assert!(AccountId::new("1234567890123").is_err());
    }

    #[test]
    fn test_should_compare_identifiers_by_kind_and_id() {
        let a = CredentialIdentifier::shared_profile("dev");
        let renamed = CredentialIdentifier::new(
            CredentialKind::SharedProfile,
            "profile:dev",
            "something else",
            "dev2",
        );
        let other_kind = CredentialIdentifier::new(
            CredentialKind::SdkProfile,
            "profile:dev",
            "dev",
            "dev",
        );

        assert_eq!(a, renamed);
        assert_ne!(a, other_kind);
    }

    #[test]
    fn test_should_hash_consistently_with_equality() {
        let mut set = HashSet::new();
        set.insert(CredentialIdentifier::shared_profile("dev"));
        set.insert(CredentialIdentifier::new(
            CredentialKind::SharedProfile,
            "profile:dev",
            "renamed",
            "dev",
        ));
        set.insert(CredentialIdentifier::sdk_profile("dev"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_should_report_factory_id_for_custom_kind() {
        let id = CredentialIdentifier::new(
            CredentialKind::Custom("Sso".to_owned()),
            "sso:work",
            "work",
            "work",
        );
        assert_eq!(id.factory_id(), "Sso");
    }

    #[test]
    fn test_should_display_settings() {
        let settings = ConnectionSettings::new(
            CredentialIdentifier::sdk_profile("default"),
            ToolkitRegion::new("eu-west-1", "aws", "Europe (Ireland)"),
        );
        assert_eq!(settings.to_string(), "sdk:default@eu-west-1");
    }
}
