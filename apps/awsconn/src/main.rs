//! awsconn - validate the AWS connection described by the environment.
//!
//! Registers the credentials found in the environment as a profile, runs the
//! connection state machine until it reaches a terminal state, and reports the
//! result. Exits with status 0 only for a valid connection.
//!
//! # Usage
//!
//! ```text
//! AWS_ACCESS_KEY_ID=... AWS_SECRET_ACCESS_KEY=... AWS_REGION=eu-west-1 awsconn
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `AWS_ACCESS_KEY_ID` | *(unset)* | Access key of the profile to validate |
//! | `AWS_SECRET_ACCESS_KEY` | *(unset)* | Secret key of the profile to validate |
//! | `AWS_SESSION_TOKEN` | *(unset)* | Session token for temporary credentials |
//! | `AWS_PROFILE` | `default` | Name the credentials are registered under |
//! | `AWS_REGION` | *(unset)* | Region to connect to |
//! | `STS_ENDPOINT_URL` | *(unset)* | Send identity lookups to this endpoint |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |
//!
//! The state machine settings (`DEFAULT_REGION`, `MRU_LIMIT`, ...) are read by
//! `ConnectionConfig::from_env`.

use std::sync::Arc;

use anyhow::{Context, Result};
use awsconn_core::{
    AwsCredentials, ConnectionConfig, CredentialIdentifier, InMemorySettingsRepository,
    StaticCredentialManager, StaticProfile, StaticRegionProvider, ToolkitCredentials, ToolkitRegion,
};
use awsconn_manager::{ConnectionDependencies, ConnectionManager, ConnectionState, StsIdentityResolver};
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const PARTITION: &str = "aws";

/// Commercial regions offered to the state machine.
const REGIONS: &[(&str, &str)] = &[
    ("us-east-1", "US East (N. Virginia)"),
    ("us-east-2", "US East (Ohio)"),
    ("us-west-1", "US West (N. California)"),
    ("us-west-2", "US West (Oregon)"),
    ("ca-central-1", "Canada (Central)"),
    ("eu-west-1", "Europe (Ireland)"),
    ("eu-west-2", "Europe (London)"),
    ("eu-central-1", "Europe (Frankfurt)"),
    ("eu-north-1", "Europe (Stockholm)"),
    ("ap-south-1", "Asia Pacific (Mumbai)"),
    ("ap-northeast-1", "Asia Pacific (Tokyo)"),
    ("ap-southeast-1", "Asia Pacific (Singapore)"),
    ("ap-southeast-2", "Asia Pacific (Sydney)"),
    ("sa-east-1", "South America (Sao Paulo)"),
];

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `LOG_LEVEL` config value.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    Ok(())
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn profile_identifier() -> CredentialIdentifier {
    let name = env_non_empty("AWS_PROFILE").unwrap_or_else(|| "default".to_owned());
    CredentialIdentifier::shared_profile(&name)
}

/// Register the environment credentials, if any, under `AWS_PROFILE`.
fn build_credential_manager(identifier: &CredentialIdentifier) -> StaticCredentialManager {
    let (Some(access_key), Some(secret_key)) = (
        env_non_empty("AWS_ACCESS_KEY_ID"),
        env_non_empty("AWS_SECRET_ACCESS_KEY"),
    ) else {
        warn!("AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY not set, no credentials available");
        return StaticCredentialManager::new();
    };

    let mut credentials = AwsCredentials::new(access_key, secret_key);
    if let Some(token) = env_non_empty("AWS_SESSION_TOKEN") {
        credentials = credentials.with_session_token(token);
    }

    let mut profile = StaticProfile::new(identifier.clone(), ToolkitCredentials::from_aws(credentials));
    if let Some(region) = env_non_empty("AWS_REGION") {
        profile = profile.with_default_region(region);
    }
    StaticCredentialManager::with_profiles([profile])
}

fn build_region_provider(config: &ConnectionConfig) -> StaticRegionProvider {
    StaticRegionProvider::new(
        REGIONS
            .iter()
            .map(|(id, name)| ToolkitRegion::new(*id, PARTITION, *name)),
    )
    .with_local_prefix(config.local_region_prefix.clone())
    .with_local_region(PARTITION)
}

fn build_identity_resolver() -> StsIdentityResolver {
    match env_non_empty("STS_ENDPOINT_URL") {
        Some(url) => {
            info!(endpoint = %url, "using custom STS endpoint");
            StsIdentityResolver::with_endpoint_url(url)
        }
        None => StsIdentityResolver::new(),
    }
}

/// Wait for the first terminal state, or `None` on Ctrl-C.
async fn wait_for_terminal(
    manager: &ConnectionManager,
    states: &mut broadcast::Receiver<ConnectionState>,
) -> Result<Option<ConnectionState>> {
    let current = manager.connection_state();
    if current.is_terminal() {
        return Ok(Some(current));
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("received interrupt, abandoning validation");
                return Ok(None);
            }
            received = states.recv() => {
                let state = match received {
                    Ok(state) => state,
                    // Fell behind; the latest commit is authoritative.
                    Err(broadcast::error::RecvError::Lagged(_)) => manager.connection_state(),
                    Err(e) => return Err(e).context("connection state stream closed"),
                };
                info!(state = state.name(), "connection state changed");
                if state.is_terminal() {
                    return Ok(Some(state));
                }
            }
        }
    }
}

fn report(manager: &ConnectionManager, state: &ConnectionState) {
    println!("{state}");
    if let Some(account) = manager.active_account_id() {
        println!("account: {account}");
    }
    let recent = manager.recent_regions();
    if !recent.is_empty() {
        let ids: Vec<&str> = recent.iter().map(|r| r.id.as_str()).collect();
        println!("recent regions: {}", ids.join(", "));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = ConnectionConfig::from_env();
    init_tracing(&config.log_level)?;

    let identifier = profile_identifier();
    let credentials = Arc::new(build_credential_manager(&identifier));
    let settings = Arc::new(InMemorySettingsRepository::with_selection(
        Some(identifier.id().to_owned()),
        env_non_empty("AWS_REGION"),
    ));
    let deps = ConnectionDependencies {
        credential_manager: credentials.clone(),
        region_provider: Arc::new(build_region_provider(&config)),
        settings,
        identity_resolver: Arc::new(build_identity_resolver()),
    };

    let manager =
        ConnectionManager::new(deps, config).context("failed to create connection manager")?;
    let mut states = manager.subscribe();
    manager
        .initialize(credentials.factories())
        .context("failed to initialize connection manager")?;

    let outcome = wait_for_terminal(&manager, &mut states).await?;
    manager.shutdown();

    let Some(state) = outcome else {
        std::process::exit(130);
    };
    report(&manager, &state);
    std::process::exit(i32::from(!state.is_valid()));
}
