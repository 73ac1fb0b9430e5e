//! Migration state tracking: one record per source entity, moved through
//! `started -> succeeded | failed` by each send attempt.

pub mod in_memory;
pub mod record;
pub mod sqlite;
pub mod store;

pub use in_memory::InMemoryMigrationStore;
pub use record::{
    is_migrated, ListFilter, ListPage, LogStartArgs, MigrationRecord, MigrationStatus, SuccessOutcome,
};
pub use sqlite::SqliteMigrationStore;
pub use store::MigrationStore;
