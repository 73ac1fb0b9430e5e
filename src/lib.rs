pub mod config;
pub mod constants;
pub mod error;
pub mod types;

// Merge, map and resolve stages
pub mod pipeline;

// Per-source migration log
pub mod migration;

// Application and infrastructure boundaries
pub mod app;
pub mod infra;

pub mod observability;

pub use error::{MigratorError, Result};
