use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use crate::error::Result;
use crate::migration::record::{
    is_migrated, ListFilter, ListPage, LogStartArgs, MigrationRecord, MigrationStatus, SuccessOutcome,
};
use crate::observability::metrics;

/// Durable migration-state store.
///
/// Implementors supply persistence primitives; the lifecycle operations
/// (`log_start`, `mark_success`, `mark_failure`) are shared.
#[async_trait]
pub trait MigrationStore: Send + Sync {
    /// Records whose primary or secondary source id is in `ids`, newest
    /// `started_at` first. An empty `ids` slice yields an empty result.
    async fn find_by_source_ids(&self, source_system: &str, ids: &[String]) -> Result<Vec<MigrationRecord>>;

    /// Records tagged with `trace_id`, newest `started_at` first
    async fn find_by_trace(&self, trace_id: &str) -> Result<Vec<MigrationRecord>>;

    /// Fails with `NotFound` for unknown ids
    async fn get(&self, id: &str) -> Result<MigrationRecord>;

    async fn insert(&self, record: &MigrationRecord) -> Result<()>;

    /// Overwrite an existing record; `NotFound` when the id is unknown
    async fn update(&self, record: &MigrationRecord) -> Result<()>;

    /// Page of records ordered by `updated_at` desc
    async fn list(&self, filter: &ListFilter, limit: usize, offset: usize) -> Result<ListPage>;

    async fn is_source_migrated(&self, source_system: &str, source_id: &str) -> Result<bool> {
        let records = self
            .find_by_source_ids(source_system, &[source_id.to_string()])
            .await?;
        Ok(is_migrated(&records))
    }

    /// Find-or-create: an existing record for the source id goes back to
    /// `started`, otherwise a new one is inserted.
    async fn log_start(&self, args: LogStartArgs) -> Result<MigrationRecord> {
        let mut lookup = vec![args.source_id.clone()];
        if let Some(secondary) = &args.source_id_secondary {
            lookup.push(secondary.clone());
        }
        let existing = self.find_by_source_ids(&args.source_system, &lookup).await?;
        metrics::migration::started(&args.entity_type, &args.operation);

        match existing.into_iter().next() {
            Some(mut record) => {
                debug!("Restarting migration {} for source '{}'", record.id, record.source_id);
                record.restart(args, Utc::now());
                self.update(&record).await?;
                Ok(record)
            }
            None => {
                let record = MigrationRecord::started(args, Utc::now());
                debug!("Logging new migration {} for source '{}'", record.id, record.source_id);
                self.insert(&record).await?;
                Ok(record)
            }
        }
    }

    async fn mark_success(&self, id: &str, outcome: SuccessOutcome) -> Result<MigrationRecord> {
        let mut record = self.get(id).await?;
        record.finish(MigrationStatus::Succeeded, Utc::now());
        record.target_id = outcome.target_id.or(record.target_id.take());
        if outcome.payload.is_some() {
            record.payload = outcome.payload;
        }
        record.error_message = None;
        self.update(&record).await?;

        let duration = record.duration_ms.unwrap_or_default();
        metrics::migration::succeeded(duration);
        info!(
            "Migration {} for '{}' succeeded in {}ms",
            record.id, record.source_id, duration
        );
        Ok(record)
    }

    async fn mark_failure(&self, id: &str, message: &str) -> Result<MigrationRecord> {
        let mut record = self.get(id).await?;
        record.finish(MigrationStatus::Failed, Utc::now());
        record.error_message = Some(message.to_string());
        self.update(&record).await?;

        metrics::migration::failed(record.duration_ms.unwrap_or_default());
        info!("Migration {} for '{}' failed: {}", record.id, record.source_id, message);
        Ok(record)
    }
}
