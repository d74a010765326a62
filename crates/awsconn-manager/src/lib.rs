//! Connection state machine for the active AWS credential identifier and region.
//!
//! [`ConnectionManager`] tracks which credential identifier and region are in
//! use, validates every change by resolving the caller identity, and broadcasts
//! each committed [`ConnectionState`]. Overlapping change requests are
//! resolved by a generation check: only the most recent request ever commits
//! a terminal state.
//!
//! # Feature flags
//!
//! - `sts`: enables [`StsIdentityResolver`], backed by `aws-sdk-sts`.

mod bridge;
pub mod cancel;
pub mod identity;
pub mod manager;
pub mod mru;
pub mod state;
#[cfg(feature = "sts")]
pub mod sts;
#[cfg(test)]
mod testing;

pub use cancel::{CancellationSignal, CancellationSource};
pub use identity::IdentityResolver;
pub use manager::{ConnectionDependencies, ConnectionManager, LOGIN_REQUIRED_MESSAGE};
pub use mru::RecencyList;
pub use state::{ConnectionSettingsChanged, ConnectionState};
#[cfg(feature = "sts")]
pub use sts::StsIdentityResolver;
