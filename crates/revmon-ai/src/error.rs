use revmon_storage::StorageError;

/// Errors returned by insight generation. There is no fallback output: the
/// caller decides whether to retry or surface the failure.
#[derive(Debug, thiserror::Error)]
pub enum InsightError {
    #[error("Insight: alert instance {0} not found")]
    NotFound(String),

    /// No LLM client is configured and no cached insight matches.
    #[error("Insight: no LLM provider configured")]
    NotConfigured,

    #[error("Insight: invalid input: {0}")]
    InvalidInput(String),

    #[error("Insight: storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Insight: LLM request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The LLM endpoint answered with an error or an unusable body.
    #[error("Insight: LLM error: {0}")]
    Llm(String),

    /// The model output failed validation.
    #[error("Insight: invalid model output: {0}")]
    InvalidOutput(String),
}

pub type Result<T> = std::result::Result<T, InsightError>;
