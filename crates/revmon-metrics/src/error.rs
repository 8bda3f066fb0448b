/// Errors raised by metrics backends.
///
/// Unsupported scopes and empty data are not errors; only I/O and decoding
/// failures end up here.
///
/// # Examples
///
/// ```rust
/// use revmon_metrics::error::MetricsError;
///
/// let err = MetricsError::Warehouse {
///     status: 404,
///     message: "Not found: Table proj:marts.mart_funnel_daily".to_string(),
/// };
/// assert!(err.is_not_found());
/// ```
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// An operational database query failed.
    #[error("Metrics: database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// The warehouse endpoint could not be reached or returned an unreadable body.
    #[error("Metrics: warehouse request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The warehouse answered with an error payload.
    #[error("Metrics: warehouse error (status {status}): {message}")]
    Warehouse { status: u16, message: String },

    /// A required backend setting is missing.
    #[error("Metrics: invalid configuration: {0}")]
    Config(String),

    /// A result row did not have the expected shape.
    #[error("Metrics: unexpected result row: {0}")]
    Decode(String),
}

impl MetricsError {
    /// True for a missing table or dataset in the warehouse.
    pub fn is_not_found(&self) -> bool {
        match self {
            MetricsError::Warehouse { status, message } => {
                *status == 404 || message.to_lowercase().contains("not found")
            }
            _ => false,
        }
    }
}

/// Convenience `Result` alias for metrics operations.
pub type Result<T> = std::result::Result<T, MetricsError>;
