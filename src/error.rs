use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigratorError {
    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid mapping schema: {0}")]
    InvalidSchema(String),

    #[error("Migration record not found: {0}")]
    NotFound(String),

    #[error("Target system error: {message}")]
    Target { message: String },

    #[error("'{source_id}' has unmigrated dependencies: {}", pending.join(", "))]
    UnmetDependencies { source_id: String, pending: Vec<String> },
}

pub type Result<T> = std::result::Result<T, MigratorError>;
