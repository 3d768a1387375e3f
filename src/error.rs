//! Error types for rawdb
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using RawDbError
pub type Result<T> = std::result::Result<T, RawDbError>;

/// Unified error type for rawdb operations
#[derive(Debug, Error)]
pub enum RawDbError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Directory Errors
    // -------------------------------------------------------------------------
    #[error("Invalid directory {path}: {reason}")]
    InvalidDirectory { path: String, reason: String },

    #[error("Directory is locked by another store: {0}")]
    Locked(String),

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Ingestion failed, store is invalid")]
    IngestFailed,

    #[error("Store already closed")]
    AlreadyClosed,

    #[error("{stage} failed: {reason}")]
    Stage { stage: &'static str, reason: String },

    // -------------------------------------------------------------------------
    // Format Errors
    // -------------------------------------------------------------------------
    #[error("Corruption: {0}")]
    Corruption(String),

    #[error("Compression error: {0}")]
    Compression(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RawDbError {
    /// Build a stage failure from any displayable cause
    pub(crate) fn stage(stage: &'static str, cause: impl std::fmt::Display) -> Self {
        RawDbError::Stage {
            stage,
            reason: cause.to_string(),
        }
    }
}
