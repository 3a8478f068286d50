//! Access to the cluster copy of watched resources

use crate::error::Result;
use crate::resource::{ResourceKey, ResourceStatus, StoredResource};
use async_trait::async_trait;

/// Result of a conditional status write
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusWrite {
    Updated,
    /// The object changed since `resource_version` was read
    Conflict,
}

/// ResourceStore reads resources and writes their status subresource
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fetch the current copy, `None` once the resource is gone
    async fn get(&self, key: &ResourceKey) -> Result<Option<StoredResource>>;

    /// Replace the status, only if the object is still at `resource_version`
    async fn update_status(
        &self,
        key: &ResourceKey,
        resource_version: &str,
        status: &ResourceStatus,
    ) -> Result<StatusWrite>;
}
