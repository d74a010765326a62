//! [`IdentityResolver`] backed by STS `GetCallerIdentity`.

use async_trait::async_trait;
use aws_sdk_sts::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_sts::error::DisplayErrorContext;
use awsconn_core::{AwsCredentials, ConnectionError, ConnectionResult, TokenProvider, ToolkitRegion};
use tracing::debug;

use crate::cancel::CancellationSignal;
use crate::identity::IdentityResolver;

const FALLBACK_REGION: &str = "us-east-1";

/// Resolves account ids by calling STS with the credentials under test.
///
/// Session identities are not resolved; bearer-token credentials fail with
/// [`ConnectionError::IdentityResolution`].
#[derive(Debug, Clone, Default)]
pub struct StsIdentityResolver {
    endpoint_url: Option<String>,
}

impl StsIdentityResolver {
    /// Resolver using the regional STS endpoints.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver sending every request to `endpoint_url`.
    #[must_use]
    pub fn with_endpoint_url(endpoint_url: impl Into<String>) -> Self {
        Self {
            endpoint_url: Some(endpoint_url.into()),
        }
    }

    fn client(&self, credentials: &AwsCredentials, region: &ToolkitRegion) -> aws_sdk_sts::Client {
        let creds = Credentials::new(
            credentials.access_key_id.clone(),
            credentials.secret_access_key.clone(),
            credentials.session_token.clone(),
            None,
            "awsconn",
        );
        let region_id = if region.id.is_empty() {
            FALLBACK_REGION.to_owned()
        } else {
            region.id.clone()
        };

        let mut builder = aws_sdk_sts::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region_id))
            .credentials_provider(creds);
        if let Some(url) = &self.endpoint_url {
            builder = builder.endpoint_url(url);
        }

        aws_sdk_sts::Client::from_conf(builder.build())
    }
}

#[async_trait]
impl IdentityResolver for StsIdentityResolver {
    async fn resolve_account_id(
        &self,
        credentials: &AwsCredentials,
        region: &ToolkitRegion,
        cancel: &CancellationSignal,
    ) -> ConnectionResult<String> {
        let client = self.client(credentials, region);
        debug!(region = %region.id, "calling sts:GetCallerIdentity");

        let result = tokio::select! {
            () = cancel.cancelled() => return Err(ConnectionError::Cancelled),
            result = client.get_caller_identity().send() => result,
        };
        let output = result
            .map_err(|e| ConnectionError::IdentityResolution(DisplayErrorContext(&e).to_string()))?;

        output.account().map(str::to_owned).ok_or_else(|| {
            ConnectionError::IdentityResolution("GetCallerIdentity returned no account".to_owned())
        })
    }

    async fn resolve_session_identity(
        &self,
        _token_provider: &dyn TokenProvider,
        _cancel: &CancellationSignal,
    ) -> ConnectionResult<String> {
        Err(ConnectionError::IdentityResolution(
            "bearer-token sessions cannot be resolved through STS".to_owned(),
        ))
    }
}
