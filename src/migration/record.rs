use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::MigratorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationStatus {
    Started,
    Succeeded,
    Failed,
    Updated,
}

impl MigrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationStatus::Started => "started",
            MigrationStatus::Succeeded => "succeeded",
            MigrationStatus::Failed => "failed",
            MigrationStatus::Updated => "updated",
        }
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MigrationStatus {
    type Err = MigratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "started" => Ok(MigrationStatus::Started),
            "succeeded" => Ok(MigrationStatus::Succeeded),
            "failed" => Ok(MigrationStatus::Failed),
            "updated" => Ok(MigrationStatus::Updated),
            other => Err(MigratorError::InvalidInput(format!("unknown migration status '{other}'"))),
        }
    }
}

/// One tracked attempt to move a source entity into the target system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub id: String,
    pub source_system: String,
    pub source_id: String,
    pub source_id_secondary: Option<String>,
    pub target_system: Option<String>,
    pub target_id: Option<String>,
    pub entity_type: String,
    pub operation: String,
    pub status: MigrationStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub payload: Option<Value>,
    pub error_message: Option<String>,
    pub trace_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Arguments for starting (or restarting) a migration attempt
#[derive(Debug, Clone, Default)]
pub struct LogStartArgs {
    pub source_system: String,
    pub source_id: String,
    pub source_id_secondary: Option<String>,
    pub entity_type: String,
    pub operation: String,
    pub target_system: Option<String>,
    pub target_id: Option<String>,
    pub payload: Option<Value>,
    pub trace_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SuccessOutcome {
    pub target_id: Option<String>,
    pub payload: Option<Value>,
}

impl MigrationRecord {
    pub fn started(args: LogStartArgs, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_system: args.source_system,
            source_id: args.source_id,
            source_id_secondary: args.source_id_secondary,
            target_system: args.target_system,
            target_id: args.target_id,
            entity_type: args.entity_type,
            operation: args.operation,
            status: MigrationStatus::Started,
            started_at: now,
            finished_at: None,
            duration_ms: None,
            payload: args.payload,
            error_message: None,
            trace_id: args.trace_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move an existing record back to `started` for a new attempt.
    ///
    /// Source ids already on the record win; target id and system survive
    /// unless the new attempt names them.
    pub fn restart(&mut self, args: LogStartArgs, now: DateTime<Utc>) {
        if self.source_id.is_empty() {
            self.source_id = args.source_id;
        }
        if self.source_id_secondary.is_none() {
            self.source_id_secondary = args.source_id_secondary;
        }
        self.entity_type = args.entity_type;
        self.operation = args.operation;
        self.status = MigrationStatus::Started;
        self.payload = args.payload;
        self.started_at = now;
        self.finished_at = None;
        self.duration_ms = None;
        self.error_message = None;
        self.target_system = args.target_system.or(self.target_system.take());
        self.target_id = args.target_id.or(self.target_id.take());
        self.trace_id = args.trace_id;
        self.updated_at = now;
    }

    /// Conclude the attempt; duration is clamped at zero
    pub fn finish(&mut self, status: MigrationStatus, now: DateTime<Utc>) {
        self.status = status;
        self.finished_at = Some(now);
        self.duration_ms = Some((now - self.started_at).num_milliseconds().max(0));
        self.updated_at = now;
    }

    /// True when `id` is either half of this record's locale pair
    pub fn matches_source_id(&self, id: &str) -> bool {
        self.source_id == id || self.source_id_secondary.as_deref() == Some(id)
    }
}

/// True iff any record in the set has succeeded
pub fn is_migrated<'a, I>(records: I) -> bool
where
    I: IntoIterator<Item = &'a MigrationRecord>,
{
    records
        .into_iter()
        .any(|r| r.status == MigrationStatus::Succeeded)
}

/// Filters for listing migration records; `None` means unconstrained
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub status: Option<MigrationStatus>,
    pub entity_type: Option<String>,
    pub operation: Option<String>,
    pub source_system: Option<String>,
    pub target_system: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub search: Option<String>,
}

impl ListFilter {
    /// Trimmed, non-empty search term
    pub fn search_term(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn matches(&self, record: &MigrationRecord) -> bool {
        let eq = |wanted: &Option<String>, actual: Option<&str>| {
            wanted.as_deref().map_or(true, |w| actual == Some(w))
        };
        if self.status.is_some_and(|s| s != record.status) {
            return false;
        }
        if !eq(&self.entity_type, Some(&record.entity_type))
            || !eq(&self.operation, Some(&record.operation))
            || !eq(&self.source_system, Some(&record.source_system))
            || !eq(&self.target_system, record.target_system.as_deref())
        {
            return false;
        }
        if self.from.is_some_and(|from| record.started_at < from) {
            return false;
        }
        if self.to.is_some_and(|to| record.started_at > to) {
            return false;
        }
        match self.search_term() {
            Some(term) => {
                let term = term.to_lowercase();
                [
                    Some(record.source_id.as_str()),
                    record.source_id_secondary.as_deref(),
                    record.target_id.as_deref(),
                    Some(record.entity_type.as_str()),
                    Some(record.operation.as_str()),
                    Some(record.status.as_str()),
                    record.trace_id.as_deref(),
                ]
                .into_iter()
                .flatten()
                .any(|field| field.to_lowercase().contains(&term))
            }
            None => true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ListPage {
    pub rows: Vec<MigrationRecord>,
    pub total_count: usize,
}
