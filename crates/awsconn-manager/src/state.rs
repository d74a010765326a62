//! Connection states and change notifications.

use std::fmt;
use std::sync::Arc;

use awsconn_core::{
    CallerIdentity, ConnectionError, ConnectionSettings, CredentialIdentifier, ToolkitRegion,
};

/// The state of the active connection. Exactly one is current at any time.
#[derive(Debug, Clone)]
pub enum ConnectionState {
    /// No usable identifier or region is selected.
    IncompleteConfiguration,
    /// Validation of `settings` is in flight.
    ValidatingConnection {
        /// Settings being validated.
        settings: ConnectionSettings,
    },
    /// `settings` resolved to `identity`.
    ValidConnection {
        /// Validated settings.
        settings: ConnectionSettings,
        /// Account or session identity behind the credentials.
        identity: CallerIdentity,
    },
    /// The identifier needs an interactive login before it can be used.
    UserAction {
        /// Settings awaiting the login.
        settings: ConnectionSettings,
        /// What the user has to do.
        message: String,
    },
    /// Validation of `settings` failed.
    InvalidConnection {
        /// Settings that failed.
        settings: ConnectionSettings,
        /// Why they failed.
        error: Arc<ConnectionError>,
    },
}

impl ConnectionState {
    /// The settings carried by this state, if any.
    #[must_use]
    pub fn settings(&self) -> Option<&ConnectionSettings> {
        match self {
            Self::IncompleteConfiguration => None,
            Self::ValidatingConnection { settings }
            | Self::ValidConnection { settings, .. }
            | Self::UserAction { settings, .. }
            | Self::InvalidConnection { settings, .. } => Some(settings),
        }
    }

    /// Identifier of the carried settings.
    #[must_use]
    pub fn identifier(&self) -> Option<&CredentialIdentifier> {
        self.settings().map(|s| &s.identifier)
    }

    /// Region of the carried settings.
    #[must_use]
    pub fn region(&self) -> Option<&ToolkitRegion> {
        self.settings().map(|s| &s.region)
    }

    /// Identity established by a valid connection.
    #[must_use]
    pub fn identity(&self) -> Option<&CallerIdentity> {
        match self {
            Self::ValidConnection { identity, .. } => Some(identity),
            _ => None,
        }
    }

    /// Whether this is [`ConnectionState::ValidConnection`].
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::ValidConnection { .. })
    }

    /// Whether the state stays put until a new request or event arrives.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::ValidatingConnection { .. })
    }

    /// Short name of the variant, for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::IncompleteConfiguration => "IncompleteConfiguration",
            Self::ValidatingConnection { .. } => "ValidatingConnection",
            Self::ValidConnection { .. } => "ValidConnection",
            Self::UserAction { .. } => "UserAction",
            Self::InvalidConnection { .. } => "InvalidConnection",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IncompleteConfiguration => f.write_str("incomplete configuration"),
            Self::ValidatingConnection { settings } => write!(f, "validating {settings}"),
            Self::ValidConnection { settings, .. } => write!(f, "connected with {settings}"),
            Self::UserAction { settings, message } => write!(f, "{settings}: {message}"),
            Self::InvalidConnection { settings, error } => {
                write!(f, "unable to connect with {settings}: {error}")
            }
        }
    }
}

/// Raised when a request changes the candidate identifier or region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettingsChanged {
    /// The new candidate identifier.
    pub identifier: Option<CredentialIdentifier>,
    /// The new candidate region.
    pub region: Option<ToolkitRegion>,
}

#[cfg(test)]
mod tests {
    use awsconn_core::AccountId;

    use super::*;

    fn settings() -> ConnectionSettings {
        ConnectionSettings::new(
            CredentialIdentifier::shared_profile("default"),
            ToolkitRegion::new("us-east-1", "aws", "US East (N. Virginia)"),
        )
    }

    #[test]
    fn test_should_project_settings_from_every_configured_state() {
        let states = [
            ConnectionState::ValidatingConnection {
                settings: settings(),
            },
            ConnectionState::UserAction {
                settings: settings(),
                message: "login".to_owned(),
            },
            ConnectionState::InvalidConnection {
                settings: settings(),
                error: Arc::new(ConnectionError::Cancelled),
            },
        ];
        for state in &states {
            assert_eq!(state.identifier().unwrap().id(), "profile:default");
            assert_eq!(state.region().unwrap().id, "us-east-1");
            assert!(!state.is_valid());
            assert!(state.identity().is_none());
        }
        assert!(ConnectionState::IncompleteConfiguration.settings().is_none());
    }

    #[test]
    fn test_should_only_treat_validating_as_non_terminal() {
        assert!(ConnectionState::IncompleteConfiguration.is_terminal());
        assert!(
            !ConnectionState::ValidatingConnection {
                settings: settings()
            }
            .is_terminal()
        );
    }

    #[test]
    fn test_should_expose_identity_of_valid_connection() {
        let state = ConnectionState::ValidConnection {
            settings: settings(),
            identity: CallerIdentity::Account(AccountId::new("123456789012").unwrap()),
        };
        assert!(state.is_valid());
        assert_eq!(state.name(), "ValidConnection");
        assert_eq!(state.to_string(), "connected with profile:default@us-east-1");
    }
}
