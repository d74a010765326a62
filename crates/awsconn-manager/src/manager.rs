//! The connection state machine.
//!
//! [`ConnectionManager`] owns the active `(identifier, region)` pair. Every
//! change request bumps a generation counter, commits
//! [`ConnectionState::ValidatingConnection`] right away, and validates the new
//! settings on the tokio runtime. A validation result is committed only if its
//! generation is still the latest one when it completes; otherwise it is
//! dropped without touching state or notifying anyone.
//!
//! All commits, recency updates, and generation checks happen under one
//! mutex, and the notification for a commit is sent before that mutex is
//! released, so subscribers observe commits in order and never see a
//! half-applied transition. The mutex is never held across an `.await`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use awsconn_core::{
    CallerIdentity, ConnectionConfig, ConnectionError, ConnectionResult, ConnectionSettings,
    CredentialIdentifier, CredentialKind, CredentialManager, CredentialProviderFactory,
    CredentialsChanged, RegionProvider, SettingsRepository, ToolkitCredentials, ToolkitRegion,
};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::bridge::{CredentialChangeBridge, SourceSignal};
use crate::cancel::{CancellationSignal, CancellationSource};
use crate::identity::{IdentityResolver, resolve_identity};
use crate::mru::RecencyList;
use crate::state::{ConnectionSettingsChanged, ConnectionState};

/// Message carried by [`ConnectionState::UserAction`] for login-gated identifiers.
pub const LOGIN_REQUIRED_MESSAGE: &str = "AWS login needed";

/// Collaborators injected into a [`ConnectionManager`].
#[derive(Debug, Clone)]
pub struct ConnectionDependencies {
    /// Lists identifiers and resolves them to credentials.
    pub credential_manager: Arc<dyn CredentialManager>,
    /// Maps region ids to regions.
    pub region_provider: Arc<dyn RegionProvider>,
    /// Last-used selection, read by `initialize`.
    pub settings: Arc<dyn SettingsRepository>,
    /// Proves that credentials work.
    pub identity_resolver: Arc<dyn IdentityResolver>,
}

/// Tracks, validates, and broadcasts the active connection.
///
/// Cloning is cheap; all clones drive the same state machine. When the last
/// clone is dropped, in-flight validations are cancelled and the credential
/// event listeners stop.
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    deps: ConnectionDependencies,
    config: ConnectionConfig,
    runtime: Handle,
    inner: Mutex<Inner>,
    state_tx: broadcast::Sender<ConnectionState>,
    settings_tx: broadcast::Sender<ConnectionSettingsChanged>,
    initialized: AtomicBool,
    bridge: Mutex<Option<CredentialChangeBridge>>,
}

#[derive(Debug)]
struct Inner {
    state: ConnectionState,
    generation: u64,
    identifier: Option<CredentialIdentifier>,
    region: Option<ToolkitRegion>,
    cancel: Option<CancellationSource>,
    credentials: Option<ToolkitCredentials>,
    recent_identifiers: RecencyList<CredentialIdentifier>,
    recent_regions: RecencyList<ToolkitRegion>,
}

/// A change to the candidate settings.
#[derive(Debug)]
enum Change {
    Settings(Option<CredentialIdentifier>, Option<ToolkitRegion>),
    Identifier(CredentialIdentifier),
    Region(ToolkitRegion),
    Refresh,
    Removed(String),
    Modified(String),
}

/// A validation run accepted under a given generation.
#[derive(Debug)]
struct Ticket {
    generation: u64,
    settings: ConnectionSettings,
    cancel: CancellationSignal,
}

#[derive(Debug)]
enum Outcome {
    LoginRequired,
    Valid {
        identity: CallerIdentity,
        credentials: ToolkitCredentials,
    },
    Invalid(ConnectionError),
}

impl ConnectionManager {
    /// Create a manager running validations on the current tokio runtime.
    ///
    /// # Errors
    /// Returns [`ConnectionError::NoRuntime`] outside of a tokio runtime, or
    /// [`ConnectionError::Config`] for an unusable `config`.
    pub fn new(deps: ConnectionDependencies, config: ConnectionConfig) -> ConnectionResult<Self> {
        let runtime = Handle::try_current().map_err(|_| ConnectionError::NoRuntime)?;
        Self::with_runtime(deps, config, runtime)
    }

    /// Create a manager running validations on `runtime`.
    ///
    /// The change operations may then be called from any thread.
    ///
    /// # Errors
    /// Returns [`ConnectionError::Config`] for an unusable `config`.
    pub fn with_runtime(
        deps: ConnectionDependencies,
        config: ConnectionConfig,
        runtime: Handle,
    ) -> ConnectionResult<Self> {
        config.validate()?;
        let capacity = config.event_capacity.max(1);
        let (state_tx, _) = broadcast::channel(capacity);
        let (settings_tx, _) = broadcast::channel(capacity);
        let inner = Inner {
            state: ConnectionState::IncompleteConfiguration,
            generation: 0,
            identifier: None,
            region: None,
            cancel: None,
            credentials: None,
            recent_identifiers: RecencyList::new(config.mru_limit),
            recent_regions: RecencyList::new(config.mru_limit),
        };

        Ok(Self {
            shared: Arc::new(Shared {
                deps,
                config,
                runtime,
                inner: Mutex::new(inner),
                state_tx,
                settings_tx,
                initialized: AtomicBool::new(false),
                bridge: Mutex::new(None),
            }),
        })
    }

    /// Select the initial settings, start listening to `factories`, and
    /// validate.
    ///
    /// The identifier is the last-selected one if it still exists, otherwise
    /// `sdk:default`, `profile:default`, the first SDK profile, the first
    /// shared profile, or the first identifier listed. The region is the first
    /// that resolves of the last-selected region, the identifier's profile
    /// region, and the configured default region. When either is missing,
    /// [`ConnectionState::IncompleteConfiguration`] is committed before this
    /// returns.
    ///
    /// # Errors
    /// Returns [`ConnectionError::AlreadyInitialized`] on a second call; the
    /// first call's subscriptions are left untouched.
    pub fn initialize(&self, factories: Vec<Arc<dyn CredentialProviderFactory>>) -> ConnectionResult<()> {
        if self.shared.initialized.swap(true, Ordering::SeqCst) {
            warn!("connection manager initialized twice, ignoring");
            return Err(ConnectionError::AlreadyInitialized);
        }

        let weak = Arc::downgrade(&self.shared);
        let bridge = CredentialChangeBridge::spawn(&self.shared.runtime, &factories, move |signal| {
            forward_signal(&weak, &signal)
        });
        debug!(listeners = bridge.len(), "subscribed to credential factories");
        *self.shared.bridge.lock() = Some(bridge);

        let identifier = self.shared.initial_identifier();
        let region = self.shared.initial_region(identifier.as_ref());
        info!(
            identifier = identifier.as_ref().map(CredentialIdentifier::id),
            region = region.as_ref().map(|r| r.id.as_str()),
            "initializing connection"
        );
        self.request(Change::Settings(identifier, region));
        Ok(())
    }

    /// Switch to `identifier` in `region` and validate.
    pub fn change_connection_settings(&self, identifier: CredentialIdentifier, region: ToolkitRegion) {
        self.request(Change::Settings(Some(identifier), Some(region)));
    }

    /// Switch to `identifier`, keeping the most recently requested region.
    pub fn change_credential_provider(&self, identifier: CredentialIdentifier) {
        self.request(Change::Identifier(identifier));
    }

    /// Switch to `region`, keeping the most recently requested identifier.
    pub fn change_region(&self, region: ToolkitRegion) {
        self.request(Change::Region(region));
    }

    /// Re-validate the current settings.
    pub fn refresh_connection_state(&self) {
        self.request(Change::Refresh);
    }

    /// Switch to `identifier` in `region` and wait for the outcome.
    ///
    /// Returns the first terminal state committed after this request: its own
    /// result, or the result of a later request that superseded it. The
    /// validation runs on the runtime, so dropping the returned future does
    /// not stop it from committing.
    pub async fn change_connection_settings_async(
        &self,
        identifier: CredentialIdentifier,
        region: ToolkitRegion,
    ) -> ConnectionState {
        // Subscribe under the same lock as the commit so the receiver starts
        // exactly at this request's transition.
        let (ticket, mut states) = {
            let mut inner = self.shared.inner.lock();
            let states = self.shared.state_tx.subscribe();
            let change = Change::Settings(Some(identifier), Some(region));
            (self.shared.begin_locked(&mut inner, change), states)
        };
        let Some(ticket) = ticket else {
            return self.connection_state();
        };
        self.spawn_validation(ticket);

        loop {
            match states.recv().await {
                Ok(state) if state.is_terminal() => return state,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "state receiver lagged while awaiting validation");
                    let current = self.connection_state();
                    if current.is_terminal() {
                        return current;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return self.connection_state(),
            }
        }
    }

    /// React to a credential source change.
    ///
    /// Removal of the active identifier clears it and commits
    /// [`ConnectionState::IncompleteConfiguration`] immediately; modification
    /// re-validates the unchanged settings. Other events are ignored.
    pub fn handle_credentials_changed(&self, event: &CredentialsChanged) {
        let active = self.shared.inner.lock().identifier.clone();
        let Some(active) = active else {
            return;
        };

        if event.removes(active.id()) {
            self.request(Change::Removed(active.id().to_owned()));
        } else if event.modifies(active.id()) {
            self.request(Change::Modified(active.id().to_owned()));
        }
    }

    /// Subscribe to committed states, one message per transition.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Subscribe to changes of the candidate identifier or region.
    #[must_use]
    pub fn subscribe_settings(&self) -> broadcast::Receiver<ConnectionSettingsChanged> {
        self.shared.settings_tx.subscribe()
    }

    /// The current state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.shared.inner.lock().state.clone()
    }

    /// Whether the current state is [`ConnectionState::ValidConnection`].
    #[must_use]
    pub fn is_valid_connection_settings(&self) -> bool {
        self.shared.inner.lock().state.is_valid()
    }

    /// Identifier of the current state's settings.
    #[must_use]
    pub fn active_credential_identifier(&self) -> Option<CredentialIdentifier> {
        self.shared.inner.lock().state.identifier().cloned()
    }

    /// Region of the current state's settings.
    #[must_use]
    pub fn active_region(&self) -> Option<ToolkitRegion> {
        self.shared.inner.lock().state.region().cloned()
    }

    /// Account id of a valid connection backed by AWS credentials.
    #[must_use]
    pub fn active_account_id(&self) -> Option<String> {
        match self.shared.inner.lock().state.identity() {
            Some(CallerIdentity::Account(account)) => Some(account.to_string()),
            _ => None,
        }
    }

    /// Session identity of a valid connection backed by a bearer token.
    #[must_use]
    pub fn active_aws_id(&self) -> Option<String> {
        match self.shared.inner.lock().state.identity() {
            Some(CallerIdentity::AwsId(id)) => Some(id.clone()),
            _ => None,
        }
    }

    /// Credentials of the current valid connection.
    #[must_use]
    pub fn active_credentials(&self) -> Option<ToolkitCredentials> {
        self.shared.inner.lock().credentials.clone()
    }

    /// Recently validated identifiers still known to the registry, most
    /// recent first.
    #[must_use]
    pub fn recent_credential_identifiers(&self) -> Vec<CredentialIdentifier> {
        let recent = self.shared.inner.lock().recent_identifiers.to_vec();
        let registry = &self.shared.deps.credential_manager;
        recent
            .iter()
            .filter_map(|identifier| registry.credential_identifier_by_id(identifier.id()))
            .collect()
    }

    /// Recently validated regions still known to the region provider, most
    /// recent first.
    #[must_use]
    pub fn recent_regions(&self) -> Vec<ToolkitRegion> {
        let recent = self.shared.inner.lock().recent_regions.to_vec();
        let regions = &self.shared.deps.region_provider;
        recent.iter().filter_map(|region| regions.region(&region.id)).collect()
    }

    /// Cancel in-flight validation and stop listening to credential sources.
    ///
    /// Results of validations already running are discarded. Change requests
    /// issued afterwards are still processed.
    pub fn shutdown(&self) {
        self.shared.shutdown();
    }

    fn request(&self, change: Change) {
        if let Some(ticket) = self.shared.begin(change) {
            self.spawn_validation(ticket);
        }
    }

    fn spawn_validation(&self, ticket: Ticket) {
        let shared = Arc::clone(&self.shared);
        self.shared.runtime.spawn(async move {
            shared.validate(ticket).await;
        });
    }
}

fn forward_signal(weak: &Weak<Shared>, signal: &SourceSignal<'_>) -> bool {
    let Some(shared) = weak.upgrade() else {
        return false;
    };
    let manager = ConnectionManager { shared };
    match signal {
        SourceSignal::Changed(event) => manager.handle_credentials_changed(event),
        // Missed events may have touched the active identifier.
        SourceSignal::Lagged(_) => manager.refresh_connection_state(),
    }
    true
}

impl Shared {
    /// Apply `change` to the candidate settings under the lock.
    ///
    /// Returns a ticket when validation must run. Returns `None` when the
    /// change was ignored or committed a state that needs no validation.
    fn begin(&self, change: Change) -> Option<Ticket> {
        let mut inner = self.inner.lock();
        self.begin_locked(&mut inner, change)
    }

    fn begin_locked(&self, inner: &mut Inner, change: Change) -> Option<Ticket> {
        let (identifier, region) = match change {
            Change::Settings(identifier, region) => (identifier, region),
            Change::Identifier(identifier) => (Some(identifier), inner.region.clone()),
            Change::Region(region) => (inner.identifier.clone(), Some(region)),
            Change::Refresh => (inner.identifier.clone(), inner.region.clone()),
            Change::Removed(id) => {
                if inner.identifier.as_ref().is_none_or(|active| active.id() != id) {
                    return None;
                }
                info!(identifier = %id, "active credentials removed by their source");
                (None, inner.region.clone())
            }
            Change::Modified(id) => {
                if inner.identifier.as_ref().is_none_or(|active| active.id() != id) {
                    return None;
                }
                debug!(identifier = %id, "active credentials modified, revalidating");
                (inner.identifier.clone(), inner.region.clone())
            }
        };

        inner.generation += 1;
        let generation = inner.generation;
        if let Some(previous) = inner.cancel.take() {
            previous.cancel();
        }

        let identifier_changed = inner.identifier.as_ref().map(CredentialIdentifier::id)
            != identifier.as_ref().map(CredentialIdentifier::id);
        let region_changed =
            inner.region.as_ref().map(|r| r.id.as_str()) != region.as_ref().map(|r| r.id.as_str());
        inner.identifier.clone_from(&identifier);
        inner.region.clone_from(&region);
        if identifier_changed || region_changed {
            let _ = self.settings_tx.send(ConnectionSettingsChanged {
                identifier: identifier.clone(),
                region: region.clone(),
            });
        }

        let (Some(identifier), Some(region)) = (identifier, region) else {
            debug!(generation, "connection settings incomplete");
            self.commit(inner, ConnectionState::IncompleteConfiguration);
            return None;
        };

        let settings = ConnectionSettings::new(identifier, region);
        let source = CancellationSource::new();
        let cancel = source.signal();
        inner.cancel = Some(source);
        debug!(generation, settings = %settings, "validating connection");
        self.commit(
            inner,
            ConnectionState::ValidatingConnection {
                settings: settings.clone(),
            },
        );

        Some(Ticket {
            generation,
            settings,
            cancel,
        })
    }

    /// Run a validation and commit its result if still current.
    async fn validate(&self, ticket: Ticket) -> Option<ConnectionState> {
        if let Some(delay) = self.config.validation_debounce() {
            tokio::select! {
                () = ticket.cancel.cancelled() => {
                    debug!(generation = ticket.generation, "validation superseded while debouncing");
                    return None;
                }
                () = tokio::time::sleep(delay) => {}
            }
        }

        let outcome = self.resolve(&ticket).await;
        self.complete(ticket, outcome)
    }

    async fn resolve(&self, ticket: &Ticket) -> Outcome {
        let settings = &ticket.settings;
        let registry = &self.deps.credential_manager;

        match registry.is_login_required(&settings.identifier) {
            Ok(true) => return Outcome::LoginRequired,
            Ok(false) => {}
            Err(e) => return Outcome::Invalid(e),
        }

        let credentials = match registry.toolkit_credentials(&settings.identifier, &settings.region) {
            Ok(credentials) => credentials,
            Err(e) => return Outcome::Invalid(e),
        };

        if self.deps.region_provider.is_region_local(&settings.region.id) {
            return Outcome::Valid {
                identity: CallerIdentity::Local,
                credentials,
            };
        }

        let lookup = async {
            let resolve = resolve_identity(
                self.deps.identity_resolver.as_ref(),
                settings,
                &credentials,
                &ticket.cancel,
            );
            match self.config.validation_timeout() {
                Some(limit) => tokio::time::timeout(limit, resolve)
                    .await
                    .unwrap_or_else(|_| Err(ConnectionError::Timeout(self.config.validation_timeout_ms))),
                None => resolve.await,
            }
        };

        let result = tokio::select! {
            () = ticket.cancel.cancelled() => Err(ConnectionError::Cancelled),
            result = lookup => result,
        };

        match result {
            Ok(identity) => Outcome::Valid {
                identity,
                credentials,
            },
            Err(e) => Outcome::Invalid(e),
        }
    }

    fn complete(&self, ticket: Ticket, outcome: Outcome) -> Option<ConnectionState> {
        let mut inner = self.inner.lock();
        if inner.generation != ticket.generation {
            debug!(
                generation = ticket.generation,
                latest = inner.generation,
                settings = %ticket.settings,
                "discarding stale validation result"
            );
            return None;
        }
        inner.cancel = None;

        let settings = ticket.settings;
        let state = match outcome {
            Outcome::LoginRequired => {
                info!(settings = %settings, "login required");
                inner.recent_identifiers.promote(settings.identifier.clone());
                ConnectionState::UserAction {
                    settings,
                    message: LOGIN_REQUIRED_MESSAGE.to_owned(),
                }
            }
            Outcome::Valid {
                identity,
                credentials,
            } => {
                info!(settings = %settings, identity = ?identity, "connection validated");
                inner.recent_identifiers.promote(settings.identifier.clone());
                inner.recent_regions.promote(settings.region.clone());
                inner.credentials = Some(credentials);
                ConnectionState::ValidConnection { settings, identity }
            }
            Outcome::Invalid(error) => {
                warn!(settings = %settings, error = %error, "connection validation failed");
                ConnectionState::InvalidConnection {
                    settings,
                    error: Arc::new(error),
                }
            }
        };

        self.commit(&mut inner, state.clone());
        Some(state)
    }

    /// Replace the current state and notify subscribers. Callers hold the lock.
    fn commit(&self, inner: &mut Inner, state: ConnectionState) {
        if !state.is_valid() {
            inner.credentials = None;
        }
        debug!(generation = inner.generation, state = state.name(), "connection state committed");
        inner.state = state.clone();
        // No subscribers is fine; the state is still readable.
        let _ = self.state_tx.send(state);
    }

    fn initial_identifier(&self) -> Option<CredentialIdentifier> {
        let registry = &self.deps.credential_manager;
        let identifiers = registry.credential_identifiers();
        if identifiers.is_empty() {
            return None;
        }

        if let Some(last) = self.deps.settings.last_selected_credential_id() {
            if let Some(identifier) = registry.credential_identifier_by_id(&last) {
                return Some(identifier);
            }
            debug!(identifier = %last, "last selected credentials no longer available");
        }

        let by_id = |id: &str| identifiers.iter().find(|i| i.id() == id);
        let by_kind = |kind: &CredentialKind| identifiers.iter().find(|i| i.kind() == kind);

        by_id(CredentialIdentifier::sdk_profile("default").id())
            .or_else(|| by_id(CredentialIdentifier::shared_profile("default").id()))
            .or_else(|| by_kind(&CredentialKind::SdkProfile))
            .or_else(|| by_kind(&CredentialKind::SharedProfile))
            .or_else(|| identifiers.first())
            .cloned()
    }

    fn initial_region(&self, identifier: Option<&CredentialIdentifier>) -> Option<ToolkitRegion> {
        let candidates = [
            self.deps.settings.last_selected_region(),
            identifier.and_then(|i| self.deps.credential_manager.default_region(i)),
            Some(self.config.default_region.clone()),
        ];
        candidates
            .into_iter()
            .flatten()
            .find_map(|id| self.deps.region_provider.region(&id))
    }

    fn shutdown(&self) {
        {
            let mut inner = self.inner.lock();
            inner.generation += 1;
            if let Some(cancel) = inner.cancel.take() {
                cancel.cancel();
            }
        }
        if let Some(bridge) = self.bridge.lock().take() {
            bridge.abort();
            debug!("stopped credential change listeners");
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.shutdown();
    }
}
