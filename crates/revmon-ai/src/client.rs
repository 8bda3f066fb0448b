use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// A request for a JSON answer constrained by a JSON schema.
#[derive(Debug, Clone)]
pub struct StructuredRequest<'a> {
    pub model: &'a str,
    pub system: &'a str,
    pub user: &'a str,
    pub schema_name: &'a str,
    pub schema: &'a Value,
    pub max_output_tokens: Option<u32>,
}

/// LLM backend able to return schema-shaped JSON.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Provider name, used in logs.
    fn provider(&self) -> &str;

    /// Sends the request and returns the parsed JSON answer. The answer is
    /// not validated against the schema here.
    async fn create_structured_response(&self, request: &StructuredRequest<'_>) -> Result<Value>;
}
