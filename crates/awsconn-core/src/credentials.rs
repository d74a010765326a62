//! Credential registry traits and an in-memory registry.
//!
//! The connection state machine never reads credential files itself. It talks
//! to a [`CredentialManager`] for identifiers and resolved credentials, and
//! listens to every [`CredentialProviderFactory`] for add/remove/modify events.
//! [`StaticCredentialManager`] keeps everything in memory and is what the
//! binary and the tests use.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::{ConnectionError, ConnectionResult};
use crate::types::{CredentialIdentifier, ToolkitRegion};

/// AWS signing credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct AwsCredentials {
    /// Access key id.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
    /// Session token for temporary credentials.
    pub session_token: Option<String>,
}

impl AwsCredentials {
    /// Create long-term credentials.
    #[must_use]
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    /// Attach a session token.
    #[must_use]
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &self.session_token.as_ref().map(|_| "** redacted **"))
            .finish()
    }
}

/// Source of bearer tokens.
pub trait TokenProvider: Send + Sync + fmt::Debug {
    /// Return a currently valid bearer token.
    fn token(&self) -> ConnectionResult<String>;
}

/// A [`TokenProvider`] that always hands out the same token.
#[derive(Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    /// Wrap a fixed token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl fmt::Debug for StaticTokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticTokenProvider").finish_non_exhaustive()
    }
}

impl TokenProvider for StaticTokenProvider {
    fn token(&self) -> ConnectionResult<String> {
        Ok(self.token.clone())
    }
}

/// Resolved capability bundle for an identifier.
///
/// Holds AWS signing credentials, a bearer token provider, or both.
#[derive(Debug, Clone, Default)]
pub struct ToolkitCredentials {
    aws: Option<AwsCredentials>,
    token: Option<Arc<dyn TokenProvider>>,
}

impl ToolkitCredentials {
    /// Credentials backed by AWS signing keys.
    #[must_use]
    pub fn from_aws(credentials: AwsCredentials) -> Self {
        Self {
            aws: Some(credentials),
            token: None,
        }
    }

    /// Credentials backed by a bearer token provider.
    #[must_use]
    pub fn from_token(provider: Arc<dyn TokenProvider>) -> Self {
        Self {
            aws: None,
            token: Some(provider),
        }
    }

    /// Add a bearer token provider to these credentials.
    #[must_use]
    pub fn with_token(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.token = Some(provider);
        self
    }

    /// The AWS signing credentials, if supported.
    #[must_use]
    pub fn aws_credentials(&self) -> Option<&AwsCredentials> {
        self.aws.as_ref()
    }

    /// The bearer token provider, if supported.
    #[must_use]
    pub fn token_provider(&self) -> Option<&Arc<dyn TokenProvider>> {
        self.token.as_ref()
    }
}

/// Change notification raised by a credential source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialsChanged {
    /// Identifiers that appeared.
    pub added: Vec<CredentialIdentifier>,
    /// Identifiers that disappeared.
    pub removed: Vec<CredentialIdentifier>,
    /// Identifiers whose underlying credentials changed.
    pub modified: Vec<CredentialIdentifier>,
}

impl CredentialsChanged {
    /// Whether the identifier with `id` was removed.
    #[must_use]
    pub fn removes(&self, id: &str) -> bool {
        self.removed.iter().any(|i| i.id() == id)
    }

    /// Whether the identifier with `id` was modified.
    #[must_use]
    pub fn modifies(&self, id: &str) -> bool {
        self.modified.iter().any(|i| i.id() == id)
    }
}

/// Registry of available credential identifiers.
pub trait CredentialManager: Send + Sync + fmt::Debug {
    /// All identifiers currently available.
    fn credential_identifiers(&self) -> Vec<CredentialIdentifier>;

    /// Look up an identifier by id.
    fn credential_identifier_by_id(&self, id: &str) -> Option<CredentialIdentifier>;

    /// Resolve usable credentials for `identifier` in `region`'s partition.
    fn toolkit_credentials(
        &self,
        identifier: &CredentialIdentifier,
        region: &ToolkitRegion,
    ) -> ConnectionResult<ToolkitCredentials>;

    /// Whether the identifier needs an interactive login before use.
    fn is_login_required(&self, identifier: &CredentialIdentifier) -> ConnectionResult<bool>;

    /// Region configured on the identifier's profile, if any.
    fn default_region(&self, _identifier: &CredentialIdentifier) -> Option<String> {
        None
    }
}

/// A credential source that raises [`CredentialsChanged`] events.
pub trait CredentialProviderFactory: Send + Sync + fmt::Debug {
    /// Id that identifiers produced by this factory carry.
    fn factory_id(&self) -> &str;

    /// Subscribe to this source's change events.
    fn subscribe(&self) -> broadcast::Receiver<CredentialsChanged>;
}

/// A profile registered with [`StaticCredentialManager`].
#[derive(Debug, Clone)]
pub struct StaticProfile {
    identifier: CredentialIdentifier,
    credentials: ToolkitCredentials,
    default_region: Option<String>,
    login_required: bool,
}

impl StaticProfile {
    /// Create a profile resolving to `credentials`.
    #[must_use]
    pub fn new(identifier: CredentialIdentifier, credentials: ToolkitCredentials) -> Self {
        Self {
            identifier,
            credentials,
            default_region: None,
            login_required: false,
        }
    }

    /// Set the region configured on the profile.
    #[must_use]
    pub fn with_default_region(mut self, region: impl Into<String>) -> Self {
        self.default_region = Some(region.into());
        self
    }

    /// Mark the profile as requiring an interactive login.
    #[must_use]
    pub fn with_login_required(mut self, required: bool) -> Self {
        self.login_required = required;
        self
    }

    /// The profile's identifier.
    #[must_use]
    pub fn identifier(&self) -> &CredentialIdentifier {
        &self.identifier
    }
}

/// Event source for one factory id of a [`StaticCredentialManager`].
#[derive(Debug)]
pub struct StaticCredentialFactory {
    factory_id: String,
    sender: broadcast::Sender<CredentialsChanged>,
}

impl StaticCredentialFactory {
    fn new(factory_id: &str) -> Self {
        let (sender, _) = broadcast::channel(16);
        Self {
            factory_id: factory_id.to_owned(),
            sender,
        }
    }

    fn raise(&self, event: CredentialsChanged) {
        // No receivers simply means nobody is listening yet.
        let _ = self.sender.send(event);
    }
}

impl CredentialProviderFactory for StaticCredentialFactory {
    fn factory_id(&self) -> &str {
        &self.factory_id
    }

    fn subscribe(&self) -> broadcast::Receiver<CredentialsChanged> {
        self.sender.subscribe()
    }
}

/// In-memory [`CredentialManager`].
///
/// Credentials are cached per identifier and partition, so resolving the same
/// identifier in two regions of one partition yields the same bundle until the
/// profile is modified.
///
/// # Examples
///
/// ```
/// use awsconn_core::{
///     AwsCredentials, CredentialIdentifier, CredentialManager, StaticCredentialManager,
///     StaticProfile, ToolkitCredentials,
/// };
///
/// let manager = StaticCredentialManager::new();
/// manager.insert(StaticProfile::new(
///     CredentialIdentifier::shared_profile("default"),
///     ToolkitCredentials::from_aws(AwsCredentials::new("AKID", "secret")),
/// ));
/// assert_eq!(manager.credential_identifiers().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct StaticCredentialManager {
    profiles: DashMap<String, StaticProfile>,
    partition_cache: DashMap<(String, String), ToolkitCredentials>,
    factories: DashMap<String, Arc<StaticCredentialFactory>>,
}

impl StaticCredentialManager {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry pre-populated with `profiles` without raising events.
    #[must_use]
    pub fn with_profiles(profiles: impl IntoIterator<Item = StaticProfile>) -> Self {
        let manager = Self::new();
        for profile in profiles {
            manager.factory(profile.identifier.factory_id());
            manager
                .profiles
                .insert(profile.identifier.id().to_owned(), profile);
        }
        manager
    }

    /// The event source for `factory_id`, created on first use.
    #[must_use]
    pub fn factory(&self, factory_id: &str) -> Arc<StaticCredentialFactory> {
        self.factories
            .entry(factory_id.to_owned())
            .or_insert_with(|| Arc::new(StaticCredentialFactory::new(factory_id)))
            .clone()
    }

    /// All event sources, for handing to the state machine's `initialize`.
    #[must_use]
    pub fn factories(&self) -> Vec<Arc<dyn CredentialProviderFactory>> {
        self.factories
            .iter()
            .map(|entry| Arc::clone(entry.value()) as Arc<dyn CredentialProviderFactory>)
            .collect()
    }

    /// Add a profile and raise an `added` event.
    pub fn insert(&self, profile: StaticProfile) {
        let identifier = profile.identifier.clone();
        let factory = self.factory(identifier.factory_id());
        self.profiles.insert(identifier.id().to_owned(), profile);
        debug!(identifier = %identifier, "credential profile added");
        factory.raise(CredentialsChanged {
            added: vec![identifier],
            ..CredentialsChanged::default()
        });
    }

    /// Replace an existing profile and raise a `modified` event.
    ///
    /// # Errors
    /// Returns [`ConnectionError::CredentialNotFound`] if the profile is unknown.
    pub fn modify(&self, profile: StaticProfile) -> ConnectionResult<()> {
        let identifier = profile.identifier.clone();
        let Some(mut existing) = self.profiles.get_mut(identifier.id()) else {
            return Err(ConnectionError::CredentialNotFound(identifier.id().to_owned()));
        };
        *existing = profile;
        drop(existing);

        self.evict(identifier.id());
        debug!(identifier = %identifier, "credential profile modified");
        self.factory(identifier.factory_id())
            .raise(CredentialsChanged {
                modified: vec![identifier],
                ..CredentialsChanged::default()
            });
        Ok(())
    }

    /// Remove a profile and raise a `removed` event.
    ///
    /// Returns the removed profile, if it existed.
    pub fn remove(&self, id: &str) -> Option<StaticProfile> {
        let (_, profile) = self.profiles.remove(id)?;
        self.evict(id);
        debug!(identifier = %profile.identifier, "credential profile removed");
        self.factory(profile.identifier.factory_id())
            .raise(CredentialsChanged {
                removed: vec![profile.identifier.clone()],
                ..CredentialsChanged::default()
            });
        Some(profile)
    }

    fn evict(&self, id: &str) {
        self.partition_cache.retain(|(cached_id, _), _| cached_id != id);
    }
}

impl CredentialManager for StaticCredentialManager {
    fn credential_identifiers(&self) -> Vec<CredentialIdentifier> {
        let mut identifiers: Vec<_> = self
            .profiles
            .iter()
            .map(|entry| entry.identifier.clone())
            .collect();
        identifiers.sort_by_key(|i| i.display_name().to_lowercase());
        identifiers
    }

    fn credential_identifier_by_id(&self, id: &str) -> Option<CredentialIdentifier> {
        self.profiles.get(id).map(|entry| entry.identifier.clone())
    }

    fn toolkit_credentials(
        &self,
        identifier: &CredentialIdentifier,
        region: &ToolkitRegion,
    ) -> ConnectionResult<ToolkitCredentials> {
        let Some(profile) = self.profiles.get(identifier.id()) else {
            return Err(ConnectionError::CredentialNotFound(identifier.id().to_owned()));
        };

        let credentials = self
            .partition_cache
            .entry((identifier.id().to_owned(), region.partition_id.clone()))
            .or_insert_with(|| profile.credentials.clone())
            .clone();
        Ok(credentials)
    }

    fn is_login_required(&self, identifier: &CredentialIdentifier) -> ConnectionResult<bool> {
        if !self.factories.contains_key(identifier.factory_id()) {
            return Err(ConnectionError::UnknownFactory(
                identifier.factory_id().to_owned(),
            ));
        }
        Ok(self
            .profiles
            .get(identifier.id())
            .is_some_and(|profile| profile.login_required))
    }

    fn default_region(&self, identifier: &CredentialIdentifier) -> Option<String> {
        self.profiles
            .get(identifier.id())
            .and_then(|profile| profile.default_region.clone())
    }
}
