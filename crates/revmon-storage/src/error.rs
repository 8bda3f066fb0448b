use revmon_common::types::InstanceStatus;

/// Errors that can occur within the storage layer.
///
/// # Examples
///
/// ```rust
/// use revmon_storage::error::StorageError;
///
/// let err = StorageError::NotFound {
///     entity: "alert_rule",
///     id: "rule-99".to_string(),
/// };
/// assert!(err.to_string().contains("alert_rule"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A required record was not found in the database.
    #[error("Storage: {entity} not found (id={id})")]
    NotFound { entity: &'static str, id: String },

    /// An insert operation did not return the newly created row, which should be
    /// unreachable under normal conditions.
    #[error("Storage: insert of {entity} succeeded but the row could not be read back")]
    InsertReadback { entity: &'static str },

    /// An underlying database error (SQLite or PostgreSQL via SeaORM).
    #[error("Storage: database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// JSON serialization or deserialization failure (params/context/actions columns).
    #[error("Storage: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Input rejected before reaching the database.
    #[error("Storage: invalid input: {0}")]
    Invalid(String),

    /// Alert instance status may only move forward.
    #[error("Storage: cannot move alert instance from {from} to {to}")]
    InvalidTransition {
        from: InstanceStatus,
        to: InstanceStatus,
    },

    /// A column held a value that does not map onto the domain type.
    #[error("Storage: unexpected value in column '{column}': {value}")]
    UnexpectedValue { column: &'static str, value: String },
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
