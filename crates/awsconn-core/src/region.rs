//! Region resolution.

use std::collections::HashMap;
use std::fmt;

use crate::types::ToolkitRegion;

/// Maps region ids to region descriptors.
pub trait RegionProvider: Send + Sync + fmt::Debug {
    /// Look up a region by id.
    fn region(&self, id: &str) -> Option<ToolkitRegion>;

    /// Whether `id` names a local (non-AWS) pseudo-region.
    fn is_region_local(&self, id: &str) -> bool;
}

/// A [`RegionProvider`] over a fixed set of regions.
///
/// Local regions are recognized by id prefix, `toolkit-local-` by default.
///
/// # Examples
///
/// ```
/// use awsconn_core::{RegionProvider, StaticRegionProvider, ToolkitRegion};
///
/// let provider = StaticRegionProvider::new([ToolkitRegion::new("us-east-1", "aws", "US East")])
///     .with_local_region("aws");
/// assert!(provider.region("us-east-1").is_some());
/// assert!(provider.is_region_local("toolkit-local-aws"));
/// ```
#[derive(Debug, Clone)]
pub struct StaticRegionProvider {
    regions: HashMap<String, ToolkitRegion>,
    local_prefix: String,
}

impl StaticRegionProvider {
    /// Default prefix of local region ids.
    pub const LOCAL_PREFIX: &str = "toolkit-local-";

    /// Create a provider knowing `regions`.
    #[must_use]
    pub fn new(regions: impl IntoIterator<Item = ToolkitRegion>) -> Self {
        Self {
            regions: regions.into_iter().map(|r| (r.id.clone(), r)).collect(),
            local_prefix: Self::LOCAL_PREFIX.to_owned(),
        }
    }

    /// Use a different local region prefix.
    #[must_use]
    pub fn with_local_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.local_prefix = prefix.into();
        self
    }

    /// Register the local pseudo-region of `partition_id`.
    #[must_use]
    pub fn with_local_region(mut self, partition_id: &str) -> Self {
        let region = ToolkitRegion::new(
            format!("{}{partition_id}", self.local_prefix),
            partition_id,
            "Local",
        );
        self.regions.insert(region.id.clone(), region);
        self
    }
}

impl RegionProvider for StaticRegionProvider {
    fn region(&self, id: &str) -> Option<ToolkitRegion> {
        self.regions.get(id).cloned()
    }

    fn is_region_local(&self, id: &str) -> bool {
        id.starts_with(&self.local_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_resolve_known_regions_only() {
        let provider = StaticRegionProvider::new([ToolkitRegion::new("eu-west-1", "aws", "Ireland")]);
        assert_eq!(provider.region("eu-west-1").unwrap().display_name, "Ireland");
        assert!(provider.region("").is_none());
        assert!(provider.region("mars-north-1").is_none());
    }

    #[test]
    fn test_should_honour_custom_local_prefix() {
        let provider = StaticRegionProvider::new([])
            .with_local_prefix("local-")
            .with_local_region("aws-cn");
        assert!(provider.region("local-aws-cn").is_some());
        assert!(provider.is_region_local("local-aws-cn"));
        assert!(!provider.is_region_local("toolkit-local-aws"));
    }
}
