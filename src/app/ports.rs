use async_trait::async_trait;

use crate::app::payload::{TargetEntry, TargetPayload};
use crate::error::Result;

/// Destination content system
#[async_trait]
pub trait TargetCmsPort: Send + Sync {
    /// Create the entry under the payload's entry id, or merge the payload's
    /// fields and tags into the existing entry.
    async fn upsert_entry(&self, payload: &TargetPayload) -> Result<TargetEntry>;

    async fn publish(&self, entry: &TargetEntry) -> Result<TargetEntry>;
}
