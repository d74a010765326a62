//! Integration tests for awsconn against an STS-compatible endpoint.
//!
//! These tests require a server answering `sts:GetCallerIdentity` at
//! `localhost:4566` (override with `STS_ENDPOINT_URL`). They are marked
//! `#[ignore]` so they don't run during normal `cargo test`.
//!
//! Run them with:
//! ```text
//! cargo test -p awsconn-integration -- --ignored
//! ```

use std::sync::{Arc, Once};
use std::time::Duration;

use awsconn_core::{
    AwsCredentials, ConnectionConfig, CredentialIdentifier, InMemorySettingsRepository,
    StaticCredentialManager, StaticProfile, StaticRegionProvider, ToolkitCredentials, ToolkitRegion,
};
use awsconn_manager::{
    ConnectionDependencies, ConnectionManager, ConnectionState, StsIdentityResolver,
};
use tokio::sync::broadcast;

static INIT: Once = Once::new();

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// Endpoint URL for the server.
fn endpoint_url() -> String {
    std::env::var("STS_ENDPOINT_URL").unwrap_or_else(|_| "http://localhost:4566".to_owned())
}

/// Create an STS-backed resolver pointing at the local server.
#[must_use]
pub fn sts_resolver() -> StsIdentityResolver {
    init_tracing();
    StsIdentityResolver::with_endpoint_url(endpoint_url())
}

/// Credentials the local server accepts.
#[must_use]
pub fn test_credentials() -> AwsCredentials {
    AwsCredentials::new("test", "test")
}

/// A region of the `aws` partition.
#[must_use]
pub fn region(id: &str) -> ToolkitRegion {
    ToolkitRegion::new(id, "aws", id)
}

/// A manager wired to the local server.
#[derive(Debug)]
pub struct TestConnection {
    /// The state machine under test.
    pub manager: ConnectionManager,
    /// Registry the manager resolves identifiers from.
    pub credentials: Arc<StaticCredentialManager>,
}

impl TestConnection {
    /// Build a manager knowing one `default` shared profile.
    #[must_use]
    pub fn new() -> Self {
        let credentials = Arc::new(StaticCredentialManager::with_profiles([StaticProfile::new(
            CredentialIdentifier::shared_profile("default"),
            ToolkitCredentials::from_aws(test_credentials()),
        )]));
        let regions = StaticRegionProvider::new(
            ["us-east-1", "us-west-2", "eu-west-1"].map(region),
        )
        .with_local_region("aws");
        let deps = ConnectionDependencies {
            credential_manager: credentials.clone(),
            region_provider: Arc::new(regions),
            settings: Arc::new(InMemorySettingsRepository::new()),
            identity_resolver: Arc::new(sts_resolver()),
        };
        let config = ConnectionConfig::builder().validation_timeout_ms(10_000).build();
        let manager = ConnectionManager::new(deps, config)
            .unwrap_or_else(|e| panic!("failed to create manager: {e}"));
        Self {
            manager,
            credentials,
        }
    }
}

impl Default for TestConnection {
    fn default() -> Self {
        Self::new()
    }
}

/// Receive states until a terminal one arrives.
pub async fn next_terminal(rx: &mut broadcast::Receiver<ConnectionState>) -> ConnectionState {
    loop {
        let state = tokio::time::timeout(Duration::from_secs(15), rx.recv())
            .await
            .unwrap_or_else(|_| panic!("no terminal state within timeout"))
            .unwrap_or_else(|e| panic!("state channel failed: {e}"));
        if state.is_terminal() {
            tracing::info!(state = state.name(), "connection reached terminal state");
            return state;
        }
    }
}

mod test_connection;
mod test_identity;
