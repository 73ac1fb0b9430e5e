use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::error::{MigratorError, Result};
use crate::migration::record::{ListFilter, ListPage, MigrationRecord, MigrationStatus};
use crate::migration::store::MigrationStore;

const COLUMNS: &str = "id, source_system, source_id, source_id_secondary, target_system, target_id, \
     entity_type, operation, status, started_at, finished_at, duration_ms, payload, error_message, \
     trace_id, created_at, updated_at";

/// Migration log in a single SQLite table
pub struct SqliteMigrationStore {
    conn: Mutex<Connection>,
}

impl SqliteMigrationStore {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        debug!("Opened migration log at {}", db_path.display());
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS migration_mapping (
                id                  TEXT PRIMARY KEY,
                source_system       TEXT NOT NULL,
                source_id           TEXT NOT NULL,
                source_id_secondary TEXT,
                target_system       TEXT,
                target_id           TEXT,
                entity_type         TEXT NOT NULL,
                operation           TEXT NOT NULL,
                status              TEXT NOT NULL,
                started_at          TEXT NOT NULL,
                finished_at         TEXT,
                duration_ms         INTEGER,
                payload             TEXT,
                error_message       TEXT,
                trace_id            TEXT,
                created_at          TEXT NOT NULL,
                updated_at          TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_migration_source ON migration_mapping (source_system, source_id);
            CREATE INDEX IF NOT EXISTS idx_migration_source_secondary ON migration_mapping (source_system, source_id_secondary);
            CREATE INDEX IF NOT EXISTS idx_migration_updated ON migration_mapping (updated_at);
            CREATE INDEX IF NOT EXISTS idx_migration_trace ON migration_mapping (trace_id);
            "#,
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| MigratorError::Storage("migration log connection lock poisoned".into()))
    }

    fn row_to_record(row: &Row<'_>) -> rusqlite::Result<MigrationRecord> {
        let status: String = row.get(8)?;
        let payload: Option<String> = row.get(12)?;
        Ok(MigrationRecord {
            id: row.get(0)?,
            source_system: row.get(1)?,
            source_id: row.get(2)?,
            source_id_secondary: row.get(3)?,
            target_system: row.get(4)?,
            target_id: row.get(5)?,
            entity_type: row.get(6)?,
            operation: row.get(7)?,
            status: status
                .parse::<MigrationStatus>()
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(8, Type::Text, Box::new(e)))?,
            started_at: parse_timestamp(9, row.get(9)?)?,
            finished_at: row
                .get::<_, Option<String>>(10)?
                .map(|ts| parse_timestamp(10, ts))
                .transpose()?,
            duration_ms: row.get(11)?,
            payload: payload
                .map(|text| serde_json::from_str::<Value>(&text))
                .transpose()
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(12, Type::Text, Box::new(e)))?,
            error_message: row.get(13)?,
            trace_id: row.get(14)?,
            created_at: parse_timestamp(15, row.get(15)?)?,
            updated_at: parse_timestamp(16, row.get(16)?)?,
        })
    }
}

/// Fixed-width UTC text so lexical order matches time order
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, text: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&text)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 2);
    out.push('%');
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('%');
    out
}

#[async_trait]
impl MigrationStore for SqliteMigrationStore {
    async fn find_by_source_ids(&self, source_system: &str, ids: &[String]) -> Result<Vec<MigrationRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(",");
        let sql = format!(
            "SELECT {COLUMNS} FROM migration_mapping \
             WHERE source_system = ? AND (source_id IN ({placeholders}) OR source_id_secondary IN ({placeholders})) \
             ORDER BY started_at DESC"
        );
        let values = std::iter::once(source_system)
            .chain(ids.iter().map(String::as_str))
            .chain(ids.iter().map(String::as_str));

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), Self::row_to_record)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn find_by_trace(&self, trace_id: &str) -> Result<Vec<MigrationRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM migration_mapping WHERE trace_id = ?1 ORDER BY started_at DESC"
        ))?;
        let rows = stmt.query_map(params![trace_id], Self::row_to_record)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn get(&self, id: &str) -> Result<MigrationRecord> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {COLUMNS} FROM migration_mapping WHERE id = ?1"),
            params![id],
            Self::row_to_record,
        )
        .optional()?
        .ok_or_else(|| MigratorError::NotFound(id.to_string()))
    }

    async fn insert(&self, record: &MigrationRecord) -> Result<()> {
        let payload = record.payload.as_ref().map(serde_json::to_string).transpose()?;
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO migration_mapping ({COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
            ),
            params![
                record.id,
                record.source_system,
                record.source_id,
                record.source_id_secondary,
                record.target_system,
                record.target_id,
                record.entity_type,
                record.operation,
                record.status.as_str(),
                format_timestamp(&record.started_at),
                record.finished_at.as_ref().map(format_timestamp),
                record.duration_ms,
                payload,
                record.error_message,
                record.trace_id,
                format_timestamp(&record.created_at),
                format_timestamp(&record.updated_at),
            ],
        )?;
        Ok(())
    }

    async fn update(&self, record: &MigrationRecord) -> Result<()> {
        let payload = record.payload.as_ref().map(serde_json::to_string).transpose()?;
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE migration_mapping SET source_id = ?2, source_id_secondary = ?3, target_system = ?4, \
             target_id = ?5, entity_type = ?6, operation = ?7, status = ?8, started_at = ?9, \
             finished_at = ?10, duration_ms = ?11, payload = ?12, error_message = ?13, trace_id = ?14, \
             updated_at = ?15 WHERE id = ?1",
            params![
                record.id,
                record.source_id,
                record.source_id_secondary,
                record.target_system,
                record.target_id,
                record.entity_type,
                record.operation,
                record.status.as_str(),
                format_timestamp(&record.started_at),
                record.finished_at.as_ref().map(format_timestamp),
                record.duration_ms,
                payload,
                record.error_message,
                record.trace_id,
                format_timestamp(&record.updated_at),
            ],
        )?;
        if changed == 0 {
            return Err(MigratorError::NotFound(record.id.clone()));
        }
        Ok(())
    }

    async fn list(&self, filter: &ListFilter, limit: usize, offset: usize) -> Result<ListPage> {
        let mut where_parts: Vec<String> = Vec::new();
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        let exact = [
            ("status", filter.status.map(|s| s.as_str().to_string())),
            ("entity_type", filter.entity_type.clone()),
            ("operation", filter.operation.clone()),
            ("source_system", filter.source_system.clone()),
            ("target_system", filter.target_system.clone()),
        ];
        for (column, value) in exact {
            if let Some(value) = value {
                where_parts.push(format!("{column} = ?"));
                params_vec.push(Box::new(value));
            }
        }
        if let Some(from) = &filter.from {
            where_parts.push("started_at >= ?".into());
            params_vec.push(Box::new(format_timestamp(from)));
        }
        if let Some(to) = &filter.to {
            where_parts.push("started_at <= ?".into());
            params_vec.push(Box::new(format_timestamp(to)));
        }
        if let Some(term) = filter.search_term() {
            let searchable = [
                "source_id",
                "source_id_secondary",
                "target_id",
                "entity_type",
                "operation",
                "status",
                "trace_id",
            ];
            let pattern = escape_like(term);
            let ors: Vec<String> = searchable
                .iter()
                .map(|column| format!("{column} LIKE ? ESCAPE '\\'"))
                .collect();
            where_parts.push(format!("({})", ors.join(" OR ")));
            for _ in searchable {
                params_vec.push(Box::new(pattern.clone()));
            }
        }

        let where_clause = if where_parts.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", where_parts.join(" AND "))
        };

        let conn = self.conn()?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();

        let total_count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM migration_mapping {where_clause}"),
            params_refs.as_slice(),
            |row| row.get(0),
        )?;

        let sql = format!(
            "SELECT {COLUMNS} FROM migration_mapping {where_clause} \
             ORDER BY updated_at DESC LIMIT {limit} OFFSET {offset}"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_refs.as_slice(), Self::row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(ListPage {
            rows,
            total_count: usize::try_from(total_count).unwrap_or_default(),
        })
    }
}
