use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::app::payload::{build_payload, TargetEntry, TargetPayload};
use crate::app::ports::TargetCmsPort;
use crate::constants::{DEFAULT_SOURCE_SYSTEM, DEFAULT_TARGET_SYSTEM, SECONDARY_ID_KEY};
use crate::error::{MigratorError, Result};
use crate::migration::{LogStartArgs, MigrationRecord, MigrationStore, SuccessOutcome};
use crate::pipeline::builder::build_fields;
use crate::pipeline::references::{resolve_references, unmet_dependencies};
use crate::pipeline::schema::SchemaDescriptor;
use crate::types::{string_field, tracking_id, LocalePair, MergedRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct SendSettings {
    pub source_system: String,
    pub target_system: String,
    pub locales: LocalePair,
    /// Market code tagged onto every entry, when set
    pub market: Option<String>,
    /// Send even when referenced entities have not been migrated yet
    pub allow_unmet_dependencies: bool,
}

impl Default for SendSettings {
    fn default() -> Self {
        Self {
            source_system: DEFAULT_SOURCE_SYSTEM.to_string(),
            target_system: DEFAULT_TARGET_SYSTEM.to_string(),
            locales: LocalePair::default(),
            market: None,
            allow_unmet_dependencies: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SendReport {
    pub operation: Operation,
    pub entry: TargetEntry,
    pub migration: MigrationRecord,
}

#[derive(Debug, Default)]
pub struct BatchSummary {
    pub succeeded: Vec<SendReport>,
    /// (source id, error message) per failed record
    pub failed: Vec<(String, String)>,
}

/// Use case for pushing merged records into the target system while
/// tracking each attempt in the migration log
pub struct SendUseCase {
    schema: SchemaDescriptor,
    store: Arc<dyn MigrationStore>,
    target: Arc<dyn TargetCmsPort>,
    settings: SendSettings,
}

impl SendUseCase {
    pub fn new(
        schema: SchemaDescriptor,
        store: Arc<dyn MigrationStore>,
        target: Arc<dyn TargetCmsPort>,
        settings: SendSettings,
    ) -> Self {
        Self {
            schema,
            store,
            target,
            settings,
        }
    }

    /// Build the full target payload for a record without touching the target
    pub async fn prepare(&self, record: &MergedRecord) -> Result<TargetPayload> {
        let fields = build_fields(&self.schema, record, &self.settings.locales);
        let fields =
            resolve_references(&self.schema, fields, self.store.as_ref(), &self.settings.source_system).await?;
        build_payload(
            &self.schema,
            record,
            fields,
            &self.settings.locales,
            self.settings.market.as_deref(),
        )
    }

    #[instrument(skip_all, fields(content_type = %self.schema.target_type_name))]
    pub async fn send(&self, record: &MergedRecord) -> Result<SendReport> {
        let source_id = tracking_id(record)
            .ok_or_else(|| MigratorError::InvalidInput("record has neither _id nor id".into()))?
            .to_string();
        self.ensure_dependencies_met(&source_id, record).await?;

        // Nothing is logged until the payload is known to be buildable
        let payload = self.prepare(record).await?;
        let source_id_secondary = string_field(record, SECONDARY_ID_KEY).map(str::to_string);

        let operation = if self
            .store
            .is_source_migrated(&self.settings.source_system, &source_id)
            .await?
        {
            Operation::Update
        } else {
            Operation::Create
        };

        let migration = self
            .store
            .log_start(LogStartArgs {
                source_system: self.settings.source_system.clone(),
                source_id: source_id.clone(),
                source_id_secondary: source_id_secondary.clone(),
                entity_type: self.schema.entity_type().to_string(),
                operation: operation.as_str().to_string(),
                target_system: Some(self.settings.target_system.clone()),
                target_id: None,
                payload: Some(json!({
                    "action": operation.as_str(),
                    "itemId": source_id,
                    "itemIdSecondary": source_id_secondary,
                })),
                trace_id: Some(Uuid::new_v4().to_string()),
            })
            .await?;

        match self.push_and_record(&migration.id, &payload).await {
            Ok((entry, migration)) => {
                info!("{} of '{}' as entry '{}' done", operation, source_id, entry.id);
                Ok(SendReport {
                    operation,
                    entry,
                    migration,
                })
            }
            Err(e) => {
                if let Err(mark_err) = self.store.mark_failure(&migration.id, &e.to_string()).await {
                    warn!("Could not record failure for migration {}: {}", migration.id, mark_err);
                }
                Err(e)
            }
        }
    }

    /// Everything that runs after the `started` log row exists
    async fn push_and_record(
        &self,
        migration_id: &str,
        payload: &TargetPayload,
    ) -> Result<(TargetEntry, MigrationRecord)> {
        let entry = self.target.upsert_entry(payload).await?;
        let entry = self.target.publish(&entry).await?;
        let migration = self
            .store
            .mark_success(
                migration_id,
                SuccessOutcome {
                    target_id: Some(payload.entry_id.clone()),
                    payload: None,
                },
            )
            .await?;
        Ok((entry, migration))
    }

    async fn ensure_dependencies_met(&self, source_id: &str, record: &MergedRecord) -> Result<()> {
        let unmet = unmet_dependencies(self.store.as_ref(), &self.settings.source_system, record).await?;
        if unmet.is_empty() {
            return Ok(());
        }
        let pending: Vec<String> = unmet.into_iter().map(|dep| dep.id).collect();
        if self.settings.allow_unmet_dependencies {
            warn!("Sending '{}' with {} unmigrated dependencies", source_id, pending.len());
            return Ok(());
        }
        Err(MigratorError::UnmetDependencies {
            source_id: source_id.to_string(),
            pending,
        })
    }

    /// Send records one by one; a failure does not stop the batch
    pub async fn send_all(&self, records: &[MergedRecord]) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for record in records {
            let label = tracking_id(record).unwrap_or("<no id>").to_string();
            match self.send(record).await {
                Ok(report) => summary.succeeded.push(report),
                Err(e) => {
                    error!("Failed to send '{}': {}", label, e);
                    summary.failed.push((label, e.to_string()));
                }
            }
        }
        info!(
            "Send finished: {} succeeded, {} failed",
            summary.succeeded.len(),
            summary.failed.len()
        );
        summary
    }
}
