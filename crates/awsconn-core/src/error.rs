//! Error types for awsconn.

/// Errors raised while resolving or validating a connection.
///
/// None of these escape the fire-and-forget change operations of the state
/// machine; they are captured in `ConnectionState::InvalidConnection`.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The identifier is not (or no longer) known to the credential registry.
    #[error("credential identifier {0} was not found, can't resolve credentials")]
    CredentialNotFound(String),

    /// No factory is registered for the identifier's factory id.
    #[error("unrecognized credential provider factory: {0}")]
    UnknownFactory(String),

    /// The resolved credentials expose no capability the resolver can use.
    #[error("credentials for {0} support neither AWS signing nor bearer tokens")]
    UnsupportedCredentials(String),

    /// The identity service rejected the credentials or could not be reached.
    #[error("identity resolution failed: {0}")]
    IdentityResolution(String),

    /// Identity resolution did not complete within the configured timeout.
    #[error("identity resolution timed out after {0} ms")]
    Timeout(u64),

    /// The request was superseded before it completed.
    #[error("new connection settings chosen")]
    Cancelled,

    /// `initialize` was called more than once.
    #[error("connection manager is already initialized")]
    AlreadyInitialized,

    /// The manager was constructed outside of a tokio runtime.
    #[error("no tokio runtime available to run validations")]
    NoRuntime,

    /// Invalid AWS account ID format.
    #[error("invalid AWS account ID: {0} (must be 12-digit numeric string)")]
    InvalidAccountId(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Convenience result type for awsconn operations.
pub type ConnectionResult<T> = Result<T, ConnectionError>;
