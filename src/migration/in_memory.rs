use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{MigratorError, Result};
use crate::migration::record::{ListFilter, ListPage, MigrationRecord};
use crate::migration::store::MigrationStore;

/// Process-local store, used in tests and dry runs
#[derive(Clone, Default)]
pub struct InMemoryMigrationStore {
    records: Arc<Mutex<Vec<MigrationRecord>>>,
}

impl InMemoryMigrationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<MigrationRecord>>> {
        self.records
            .lock()
            .map_err(|_| MigratorError::Storage("in-memory migration store lock poisoned".into()))
    }
}

#[async_trait]
impl MigrationStore for InMemoryMigrationStore {
    async fn find_by_source_ids(&self, source_system: &str, ids: &[String]) -> Result<Vec<MigrationRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let records = self.lock()?;
        let mut found: Vec<MigrationRecord> = records
            .iter()
            .filter(|r| r.source_system == source_system)
            .filter(|r| ids.iter().any(|id| r.matches_source_id(id)))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(found)
    }

    async fn find_by_trace(&self, trace_id: &str) -> Result<Vec<MigrationRecord>> {
        let mut found: Vec<MigrationRecord> = self
            .lock()?
            .iter()
            .filter(|r| r.trace_id.as_deref() == Some(trace_id))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(found)
    }

    async fn get(&self, id: &str) -> Result<MigrationRecord> {
        self.lock()?
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| MigratorError::NotFound(id.to_string()))
    }

    async fn insert(&self, record: &MigrationRecord) -> Result<()> {
        self.lock()?.push(record.clone());
        Ok(())
    }

    async fn update(&self, record: &MigrationRecord) -> Result<()> {
        let mut records = self.lock()?;
        let slot = records
            .iter_mut()
            .find(|r| r.id == record.id)
            .ok_or_else(|| MigratorError::NotFound(record.id.clone()))?;
        *slot = record.clone();
        Ok(())
    }

    async fn list(&self, filter: &ListFilter, limit: usize, offset: usize) -> Result<ListPage> {
        let records = self.lock()?;
        let mut matching: Vec<&MigrationRecord> = records.iter().filter(|r| filter.matches(r)).collect();
        matching.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(ListPage {
            total_count: matching.len(),
            rows: matching.into_iter().skip(offset).take(limit).cloned().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::record::{is_migrated, LogStartArgs, MigrationStatus, SuccessOutcome};
    use serde_json::json;

    fn args(id: &str, secondary: Option<&str>) -> LogStartArgs {
        LogStartArgs {
            source_system: "aem".into(),
            source_id: id.into(),
            source_id_secondary: secondary.map(str::to_string),
            entity_type: "microcopy".into(),
            operation: "create".into(),
            target_system: Some("contentful".into()),
            payload: Some(json!({"action": "create"})),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn log_start_reuses_record_for_same_source() {
        let store = InMemoryMigrationStore::new();
        let first = store.log_start(args("source-aaaa", None)).await.unwrap();
        store.mark_failure(&first.id, "timeout").await.unwrap();

        let second = store.log_start(args("source-aaaa", Some("source-bbbb"))).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.status, MigrationStatus::Started);
        assert_eq!(second.error_message, None);

        let page = store.list(&ListFilter::default(), 10, 0).await.unwrap();
        assert_eq!(page.total_count, 1);
    }

    #[tokio::test]
    async fn lookup_matches_secondary_id_column() {
        let store = InMemoryMigrationStore::new();
        let rec = store.log_start(args("primary-1111", Some("secondary-2222"))).await.unwrap();
        store
            .mark_success(
                &rec.id,
                SuccessOutcome {
                    target_id: Some("entry-1".into()),
                    payload: None,
                },
            )
            .await
            .unwrap();

        let found = store
            .find_by_source_ids("aem", &["secondary-2222".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(is_migrated(&found));
        assert_eq!(found[0].target_id.as_deref(), Some("entry-1"));
        assert_eq!(found[0].payload, Some(json!({"action": "create"})));

        assert!(store.find_by_source_ids("other", &["primary-1111".to_string()]).await.unwrap().is_empty());
        assert!(store.find_by_source_ids("aem", &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let store = InMemoryMigrationStore::new();
        assert!(matches!(store.get("nope").await, Err(MigratorError::NotFound(_))));
        assert!(matches!(
            store.mark_success("nope", SuccessOutcome::default()).await,
            Err(MigratorError::NotFound(_))
        ));
        assert!(matches!(store.mark_failure("nope", "x").await, Err(MigratorError::NotFound(_))));
    }

    #[tokio::test]
    async fn failed_only_history_is_not_migrated() {
        let store = InMemoryMigrationStore::new();
        let rec = store.log_start(args("failing-1111", None)).await.unwrap();
        let failed = store.mark_failure(&rec.id, "boom").await.unwrap();
        assert_eq!(failed.status, MigrationStatus::Failed);
        assert!(failed.duration_ms.unwrap() >= 0);
        assert!(!store.is_source_migrated("aem", "failing-1111").await.unwrap());
    }

    #[tokio::test]
    async fn list_pages_and_filters() {
        let store = InMemoryMigrationStore::new();
        for i in 0..5 {
            let rec = store.log_start(args(&format!("source-{i:04}"), None)).await.unwrap();
            if i % 2 == 0 {
                store.mark_success(&rec.id, SuccessOutcome::default()).await.unwrap();
            }
        }

        let page = store.list(&ListFilter::default(), 2, 1).await.unwrap();
        assert_eq!(page.total_count, 5);
        assert_eq!(page.rows.len(), 2);

        let succeeded = ListFilter {
            status: Some(MigrationStatus::Succeeded),
            ..Default::default()
        };
        assert_eq!(store.list(&succeeded, 10, 0).await.unwrap().total_count, 3);

        let search = ListFilter {
            search: Some("SOURCE-0003".into()),
            ..Default::default()
        };
        let page = store.list(&search, 10, 0).await.unwrap();
        assert_eq!(page.total_count, 1);
        assert_eq!(page.rows[0].source_id, "source-0003");
    }

    #[tokio::test]
    async fn trace_lookup_returns_tagged_records() {
        let store = InMemoryMigrationStore::new();
        for (id, trace) in [("source-0001", "run-a"), ("source-0002", "run-b"), ("source-0003", "run-a")] {
            let mut start = args(id, None);
            start.trace_id = Some(trace.into());
            store.log_start(start).await.unwrap();
        }

        let found = store.find_by_trace("run-a").await.unwrap();
        let ids: Vec<&str> = found.iter().map(|r| r.source_id.as_str()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"source-0001") && ids.contains(&"source-0003"));
        assert!(found[0].started_at >= found[1].started_at);
        assert!(store.find_by_trace("run-c").await.unwrap().is_empty());
    }
}
