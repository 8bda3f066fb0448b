use revmon_metrics::MetricsError;
use revmon_storage::StorageError;

/// Errors surfaced by rule evaluation and alert runs.
///
/// Per-rule failures are recorded in the run report; only failures that make
/// the whole run impossible (such as loading the rule list) are returned as
/// errors from [`crate::runner::AlertRunner::run`].
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    /// The metrics backend failed while evaluating a rule.
    #[error("Alert: metrics provider failed: {0}")]
    Metrics(#[from] MetricsError),

    /// Reading rules or writing alert instances failed.
    #[error("Alert: storage failed: {0}")]
    Storage(#[from] StorageError),
}

/// Convenience `Result` alias for alert operations.
pub type Result<T> = std::result::Result<T, AlertError>;
