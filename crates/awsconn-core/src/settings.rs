//! Last-used selection persisted by the host application.

use std::fmt;

use parking_lot::RwLock;

/// Read access to the previously selected identifier and region.
pub trait SettingsRepository: Send + Sync + fmt::Debug {
    /// Id of the credential identifier selected in the last session.
    fn last_selected_credential_id(&self) -> Option<String>;

    /// Id of the region selected in the last session.
    fn last_selected_region(&self) -> Option<String>;
}

/// In-memory [`SettingsRepository`].
#[derive(Debug, Default)]
pub struct InMemorySettingsRepository {
    credential_id: RwLock<Option<String>>,
    region: RwLock<Option<String>>,
}

impl InMemorySettingsRepository {
    /// Create a repository with nothing selected.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a repository seeded with a previous selection.
    #[must_use]
    pub fn with_selection(credential_id: Option<String>, region: Option<String>) -> Self {
        Self {
            credential_id: RwLock::new(credential_id),
            region: RwLock::new(region),
        }
    }

    /// Record the selected identifier id.
    pub fn set_last_selected_credential_id(&self, id: Option<String>) {
        *self.credential_id.write() = id;
    }

    /// Record the selected region id.
    pub fn set_last_selected_region(&self, id: Option<String>) {
        *self.region.write() = id;
    }
}

impl SettingsRepository for InMemorySettingsRepository {
    fn last_selected_credential_id(&self) -> Option<String> {
        self.credential_id
            .read()
            .clone()
            .filter(|id| !id.trim().is_empty())
    }

    fn last_selected_region(&self) -> Option<String> {
        self.region.read().clone().filter(|id| !id.trim().is_empty())
    }
}
