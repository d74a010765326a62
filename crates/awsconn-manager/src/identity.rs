//! Identity resolution adapter.
//!
//! The state machine proves that a credential/region pair works by asking an
//! [`IdentityResolver`] who the credentials belong to. Which resolver call is
//! made depends on the capability the resolved [`ToolkitCredentials`] expose:
//! AWS signing credentials resolve an account id, a bearer token resolves a
//! session identity. Exactly one call is made per validation attempt.

use std::fmt;

use async_trait::async_trait;
use awsconn_core::{
    AccountId, AwsCredentials, CallerIdentity, ConnectionError, ConnectionResult,
    ConnectionSettings, TokenProvider, ToolkitCredentials, ToolkitRegion,
};
use tracing::debug;

use crate::cancel::CancellationSignal;

/// Looks up the identity behind a set of credentials.
///
/// Implementations should stop early when `cancel` fires; the state machine
/// discards superseded results either way.
#[async_trait]
pub trait IdentityResolver: Send + Sync + fmt::Debug {
    /// Resolve the AWS account owning `credentials`.
    async fn resolve_account_id(
        &self,
        credentials: &AwsCredentials,
        region: &ToolkitRegion,
        cancel: &CancellationSignal,
    ) -> ConnectionResult<String>;

    /// Resolve the session identity behind a bearer token.
    async fn resolve_session_identity(
        &self,
        token_provider: &dyn TokenProvider,
        cancel: &CancellationSignal,
    ) -> ConnectionResult<String>;
}

/// Resolve the [`CallerIdentity`] of `credentials`, preferring AWS signing
/// credentials over a bearer token.
pub(crate) async fn resolve_identity(
    resolver: &dyn IdentityResolver,
    settings: &ConnectionSettings,
    credentials: &ToolkitCredentials,
    cancel: &CancellationSignal,
) -> ConnectionResult<CallerIdentity> {
    if let Some(aws) = credentials.aws_credentials() {
        debug!(identifier = %settings.identifier, region = %settings.region, "resolving account id");
        let account = resolver
            .resolve_account_id(aws, &settings.region, cancel)
            .await?;
        return Ok(CallerIdentity::Account(AccountId::new(account)?));
    }

    if let Some(token) = credentials.token_provider() {
        debug!(identifier = %settings.identifier, "resolving session identity");
        let aws_id = resolver
            .resolve_session_identity(token.as_ref(), cancel)
            .await?;
        return Ok(CallerIdentity::AwsId(aws_id));
    }

    Err(ConnectionError::UnsupportedCredentials(
        settings.identifier.id().to_owned(),
    ))
}
