//! Error types for the TaskBoard core
//!
//! All errors use thiserror for structured error handling.
//! These errors can be serialized to a UI layer as plain strings.

use crate::models::ColumnType;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Tab not found: {0}")]
    TabNotFound(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Row not found: {0}")]
    RowNotFound(String),

    #[error("Option '{label}' not found in column {column_id}")]
    OptionNotFound { column_id: String, label: String },

    #[error("Invalid column: {0}")]
    InvalidColumn(String),

    #[error("Column {column_id} holds {expected} values, got {actual}")]
    CellTypeMismatch {
        column_id: String,
        expected: ColumnType,
        actual: ColumnType,
    },

    #[error("Backup error: {0}")]
    Backup(String),

    #[error("Restore error: {0}")]
    Restore(String),

    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Data service has been shut down")]
    ServiceStopped,

    #[error("{0}")]
    Generic(String),
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
