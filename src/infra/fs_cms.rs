use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::app::payload::{TargetEntry, TargetPayload};
use crate::app::ports::TargetCmsPort;
use crate::error::{MigratorError, Result};

/// Target system backed by a directory of JSON files,
/// one per entry at `<root>/<content type>/<entry id>.json`
pub struct FsCms {
    root: PathBuf,
}

impl FsCms {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn entry_path(&self, content_type_id: &str, entry_id: &str) -> Result<PathBuf> {
        for part in [content_type_id, entry_id] {
            if part.is_empty() || part == "." || part == ".." || part.contains(['/', '\\']) {
                return Err(MigratorError::Target {
                    message: format!("'{part}' cannot be used as a file name"),
                });
            }
        }
        Ok(self.root.join(content_type_id).join(format!("{entry_id}.json")))
    }

    pub async fn read_entry(&self, content_type_id: &str, entry_id: &str) -> Result<Option<TargetEntry>> {
        let path = self.entry_path(content_type_id, entry_id)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_entry(&self, entry: &TargetEntry) -> Result<()> {
        let path = self.entry_path(&entry.content_type_id, &entry.id)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, serde_json::to_string_pretty(entry)?).await?;
        debug!("Wrote entry to {}", path.display());
        Ok(())
    }
}

#[async_trait]
impl TargetCmsPort for FsCms {
    async fn upsert_entry(&self, payload: &TargetPayload) -> Result<TargetEntry> {
        let entry = match self.read_entry(&payload.content_type_id, &payload.entry_id).await? {
            Some(mut existing) => {
                existing.apply(payload);
                existing
            }
            None => TargetEntry::from_payload(payload),
        };
        self.write_entry(&entry).await?;
        Ok(entry)
    }

    async fn publish(&self, entry: &TargetEntry) -> Result<TargetEntry> {
        let mut stored = self
            .read_entry(&entry.content_type_id, &entry.id)
            .await?
            .ok_or_else(|| MigratorError::Target {
                message: format!("cannot publish unknown entry '{}'", entry.id),
            })?;
        stored.publish();
        self.write_entry(&stored).await?;
        info!("Published {} '{}' v{}", stored.content_type_id, stored.id, stored.version);
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::payload::{EntryMetadata, TagLink};
    use crate::types::{LocalePair, TargetFieldMap};
    use serde_json::json;
    use tempfile::TempDir;

    fn payload(fields: serde_json::Value, tag: &str) -> TargetPayload {
        TargetPayload {
            content_type_id: "iconMap".into(),
            entry_id: "al-al-icons".into(),
            locales: LocalePair::default(),
            fields: fields.as_object().cloned().unwrap_or_else(TargetFieldMap::new),
            metadata: EntryMetadata {
                tags: vec![TagLink::tag(tag)],
            },
        }
    }

    #[tokio::test]
    async fn upsert_merges_into_existing_file() {
        let dir = TempDir::new().unwrap();
        let cms = FsCms::new(dir.path());

        let created = cms
            .upsert_entry(&payload(json!({"title": {"en-US": "Icons"}, "alt": {"en-US": "x"}}), "al"))
            .await
            .unwrap();
        assert_eq!(created.version, 1);
        let published = cms.publish(&created).await.unwrap();
        assert!(published.is_published());

        let updated = cms
            .upsert_entry(&payload(json!({"title": {"en-US": "Icon map"}}), "al"))
            .await
            .unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.fields["title"], json!({"en-US": "Icon map"}));
        assert_eq!(updated.fields["alt"], json!({"en-US": "x"}));
        assert_eq!(updated.metadata.tags.len(), 1);

        let on_disk = cms.read_entry("iconMap", "al-al-icons").await.unwrap().unwrap();
        assert_eq!(on_disk, updated);
        assert!(dir.path().join("iconMap").join("al-al-icons.json").exists());
    }

    #[tokio::test]
    async fn rejects_path_like_ids() {
        let dir = TempDir::new().unwrap();
        let cms = FsCms::new(dir.path());
        assert!(cms.entry_path("iconMap", "../escape").is_err());
        assert!(cms.entry_path("..", "x").is_err());
        assert!(cms.read_entry("iconMap", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn publishing_unknown_entry_fails() {
        let dir = TempDir::new().unwrap();
        let cms = FsCms::new(dir.path());
        let entry = TargetEntry::from_payload(&payload(json!({}), "al"));
        assert!(matches!(cms.publish(&entry).await, Err(MigratorError::Target { .. })));
    }
}
