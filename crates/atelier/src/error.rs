use std::path::PathBuf;
use thiserror::Error;

use crate::analysis::AnalysisError;

#[derive(Error, Debug)]
pub enum AtelierError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Board source error: {0}")]
    Board(#[from] crate::board::BoardSourceError),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timed out waiting for {0} job to finish")]
    Timeout(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Failed to (de)serialize record '{key}': {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Store lock poisoned")]
    LockPoisoned,

    #[error("Blocking store task failed: {0}")]
    Join(String),
}

pub type Result<T> = std::result::Result<T, AtelierError>;
