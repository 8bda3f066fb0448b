use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::client::{LlmClient, StructuredRequest};
use crate::error::{InsightError, Result};
use crate::models::{InputMessage, ResponsesPayload, ResponsesRequest, TextConfig, TextFormat};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// OpenAI Responses API client.
#[derive(Clone)]
pub struct OpenAiProvider {
    api_key: String,
    base_url: String,
    client: Client,
}

impl OpenAiProvider {
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        timeout_secs: Option<u64>,
    ) -> Result<Self> {
        let api_key = api_key.trim().to_string();
        if api_key.is_empty() {
            return Err(InsightError::InvalidInput("api_key is required".into()));
        }
        let timeout = timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout))
            .build()?;

        let base_url = base_url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

fn require<'a>(value: &'a str, name: &str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(InsightError::InvalidInput(format!("{name} is required")));
    }
    Ok(trimmed)
}

#[async_trait]
impl LlmClient for OpenAiProvider {
    fn provider(&self) -> &str {
        "openai"
    }

    async fn create_structured_response(&self, request: &StructuredRequest<'_>) -> Result<Value> {
        let req = ResponsesRequest {
            model: require(request.model, "model")?.to_string(),
            input: vec![
                InputMessage {
                    role: "system".to_string(),
                    content: require(request.system, "system")?.to_string(),
                },
                InputMessage {
                    role: "user".to_string(),
                    content: require(request.user, "user")?.to_string(),
                },
            ],
            text: TextConfig {
                format: TextFormat {
                    kind: "json_schema".to_string(),
                    name: require(request.schema_name, "schema_name")?.to_string(),
                    schema: request.schema.clone(),
                    strict: true,
                },
            },
            max_output_tokens: request.max_output_tokens.filter(|n| *n > 0),
        };

        tracing::debug!(
            model = %req.model,
            prompt_length = request.user.len(),
            "Calling OpenAI Responses API"
        );

        let resp = self
            .client
            .post(format!("{}/responses", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&req)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        let payload: Option<ResponsesPayload> = serde_json::from_str(&body).ok();

        if !status.is_success() {
            let message = payload
                .as_ref()
                .and_then(|p| p.error.as_ref())
                .and_then(|e| e.message.clone())
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| status.as_u16().to_string());
            tracing::error!(status = %status, error = %message, "OpenAI request failed");
            return Err(InsightError::Llm(format!("OpenAI error: {message}")));
        }

        let payload = payload
            .ok_or_else(|| InsightError::Llm("OpenAI response was not valid JSON".into()))?;
        tracing::debug!(usage = ?payload.usage, "OpenAI response received");

        let text = payload.output_text();
        if text.is_empty() {
            return Err(InsightError::Llm(
                "OpenAI response did not include output_text".into(),
            ));
        }
        serde_json::from_str(&text)
            .map_err(|_| InsightError::Llm("OpenAI output_text was not valid JSON".into()))
    }
}
