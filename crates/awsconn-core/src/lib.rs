//! Core types, configuration, and collaborator traits for awsconn.
//!
//! This crate holds everything the connection state machine consumes but does
//! not own: identifier and region value types, the credential registry, region
//! and settings lookups, plus in-memory implementations of each for tests and
//! simple hosts.

mod config;
mod credentials;
mod error;
mod region;
mod settings;
mod types;

pub use config::ConnectionConfig;
pub use credentials::{
    AwsCredentials, CredentialManager, CredentialProviderFactory, CredentialsChanged,
    StaticCredentialFactory, StaticCredentialManager, StaticProfile, StaticTokenProvider,
    TokenProvider, ToolkitCredentials,
};
pub use error::{ConnectionError, ConnectionResult};
pub use region::{RegionProvider, StaticRegionProvider};
pub use settings::{InMemorySettingsRepository, SettingsRepository};
pub use types::{
    AccountId, CallerIdentity, ConnectionSettings, CredentialIdentifier, CredentialKind,
    ToolkitRegion,
};
