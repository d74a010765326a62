//! Scripted collaborators shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use awsconn_core::{
    AwsCredentials, ConnectionConfig, ConnectionError, ConnectionResult, CredentialIdentifier,
    InMemorySettingsRepository, StaticCredentialManager, StaticProfile, StaticRegionProvider,
    TokenProvider, ToolkitCredentials, ToolkitRegion,
};
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::cancel::CancellationSignal;
use crate::identity::IdentityResolver;
use crate::manager::{ConnectionDependencies, ConnectionManager};
use crate::state::ConnectionState;

/// Resolver with per-region delays and per-access-key failures.
#[derive(Debug)]
pub(crate) struct ScriptedResolver {
    account: String,
    account_calls: AtomicUsize,
    session_calls: AtomicUsize,
    delays: Mutex<HashMap<String, Duration>>,
    failing_keys: Mutex<HashSet<String>>,
}

impl ScriptedResolver {
    pub(crate) const ACCOUNT: &str = "123456789012";
    pub(crate) const AWS_ID: &str = "aws-id-0001";

    pub(crate) fn new() -> Self {
        Self {
            account: Self::ACCOUNT.to_owned(),
            account_calls: AtomicUsize::new(0),
            session_calls: AtomicUsize::new(0),
            delays: Mutex::new(HashMap::new()),
            failing_keys: Mutex::new(HashSet::new()),
        }
    }

    pub(crate) fn with_account(mut self, account: &str) -> Self {
        account.clone_into(&mut self.account);
        self
    }

    pub(crate) fn delay_region(&self, region: &str, delay: Duration) {
        self.delays.lock().insert(region.to_owned(), delay);
    }

    pub(crate) fn fail_access_key(&self, key: &str) {
        self.failing_keys.lock().insert(key.to_owned());
    }

    pub(crate) fn account_calls(&self) -> usize {
        self.account_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn session_calls(&self) -> usize {
        self.session_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityResolver for ScriptedResolver {
    async fn resolve_account_id(
        &self,
        credentials: &AwsCredentials,
        region: &ToolkitRegion,
        _cancel: &CancellationSignal,
    ) -> ConnectionResult<String> {
        self.account_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delays.lock().get(&region.id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_keys.lock().contains(&credentials.access_key_id) {
            return Err(ConnectionError::IdentityResolution(
                "ExpiredToken: the security token included in the request is expired".to_owned(),
            ));
        }
        Ok(self.account.clone())
    }

    async fn resolve_session_identity(
        &self,
        _token_provider: &dyn TokenProvider,
        _cancel: &CancellationSignal,
    ) -> ConnectionResult<String> {
        self.session_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::AWS_ID.to_owned())
    }
}

pub(crate) const LOCAL_REGION: &str = "toolkit-local-aws";

pub(crate) fn region(id: &str) -> ToolkitRegion {
    ToolkitRegion::new(id, "aws", id.to_uppercase())
}

pub(crate) fn region_provider() -> StaticRegionProvider {
    StaticRegionProvider::new(
        ["us-east-1", "us-west-2", "eu-west-1", "eu-central-1", "ap-south-1"].map(region),
    )
    .with_local_region("aws")
}

pub(crate) fn aws_profile(name: &str) -> StaticProfile {
    StaticProfile::new(
        CredentialIdentifier::shared_profile(name),
        ToolkitCredentials::from_aws(AwsCredentials::new(format!("AKID-{name}"), "secret")),
    )
}

/// A manager wired to in-memory collaborators the test can still reach.
pub(crate) struct Fixture {
    pub(crate) manager: ConnectionManager,
    pub(crate) credentials: Arc<StaticCredentialManager>,
    pub(crate) resolver: Arc<ScriptedResolver>,
    pub(crate) settings: Arc<InMemorySettingsRepository>,
}

impl Fixture {
    pub(crate) fn new(profiles: impl IntoIterator<Item = StaticProfile>) -> Self {
        Self::with_config(profiles, ConnectionConfig::default())
    }

    pub(crate) fn with_config(
        profiles: impl IntoIterator<Item = StaticProfile>,
        config: ConnectionConfig,
    ) -> Self {
        let credentials = Arc::new(StaticCredentialManager::with_profiles(profiles));
        let resolver = Arc::new(ScriptedResolver::new());
        let settings = Arc::new(InMemorySettingsRepository::new());
        let deps = ConnectionDependencies {
            credential_manager: credentials.clone(),
            region_provider: Arc::new(region_provider()),
            settings: settings.clone(),
            identity_resolver: resolver.clone(),
        };
        let manager = ConnectionManager::new(deps, config).expect("test runtime");
        Self {
            manager,
            credentials,
            resolver,
            settings,
        }
    }

    /// Initialize with the registry's factories and wait for the first
    /// terminal state.
    pub(crate) async fn initialize(&self) -> ConnectionState {
        let mut rx = self.manager.subscribe();
        self.manager
            .initialize(self.credentials.factories())
            .expect("first initialize");
        if self.manager.connection_state().is_terminal() {
            return self.manager.connection_state();
        }
        next_terminal(&mut rx).await
    }
}

/// Receive states until a terminal one arrives.
pub(crate) async fn next_terminal(rx: &mut broadcast::Receiver<ConnectionState>) -> ConnectionState {
    collect_until_terminal(rx)
        .await
        .pop()
        .expect("at least one state")
}

/// Receive states up to and including the next terminal one.
pub(crate) async fn collect_until_terminal(
    rx: &mut broadcast::Receiver<ConnectionState>,
) -> Vec<ConnectionState> {
    let mut states = Vec::new();
    loop {
        let state = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("state change within timeout")
            .expect("state channel open");
        let terminal = state.is_terminal();
        states.push(state);
        if terminal {
            return states;
        }
    }
}

/// Assert that no further state is committed within `window`.
pub(crate) async fn assert_quiet(rx: &mut broadcast::Receiver<ConnectionState>, window: Duration) {
    if let Ok(Ok(state)) = tokio::time::timeout(window, rx.recv()).await {
        panic!("unexpected state change: {state}");
    }
}
