use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::app::payload::{TargetEntry, TargetPayload};
use crate::app::ports::TargetCmsPort;
use crate::error::{MigratorError, Result};

/// Target system kept in process memory; entries keyed by (content type, entry id)
#[derive(Clone, Default)]
pub struct InMemoryCms {
    entries: Arc<Mutex<HashMap<(String, String), TargetEntry>>>,
}

impl InMemoryCms {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entry(&self, content_type_id: &str, entry_id: &str) -> Option<TargetEntry> {
        self.entries
            .lock()
            .await
            .get(&(content_type_id.to_string(), entry_id.to_string()))
            .cloned()
    }
}

#[async_trait]
impl TargetCmsPort for InMemoryCms {
    async fn upsert_entry(&self, payload: &TargetPayload) -> Result<TargetEntry> {
        let key = (payload.content_type_id.clone(), payload.entry_id.clone());
        let mut entries = self.entries.lock().await;
        let entry = match entries.get_mut(&key) {
            Some(existing) => {
                debug!("Updating entry '{}'", payload.entry_id);
                existing.apply(payload);
                existing.clone()
            }
            None => {
                debug!("Creating entry '{}'", payload.entry_id);
                let created = TargetEntry::from_payload(payload);
                entries.insert(key, created.clone());
                created
            }
        };
        Ok(entry)
    }

    async fn publish(&self, entry: &TargetEntry) -> Result<TargetEntry> {
        let key = (entry.content_type_id.clone(), entry.id.clone());
        let mut entries = self.entries.lock().await;
        let stored = entries
            .get_mut(&key)
            .ok_or_else(|| MigratorError::Target {
                message: format!("cannot publish unknown entry '{}'", entry.id),
            })?;
        stored.publish();
        Ok(stored.clone())
    }
}
