use std::sync::Arc;

use revmon_common::types::AlertAiInsight;
use revmon_storage::{NewAlertInsight, RuleStore};
use serde::Serialize;

use crate::client::{LlmClient, StructuredRequest};
use crate::error::{InsightError, Result};
use crate::prompt::{build_prompt, SCHEMA_NAME};
use crate::schema::{insight_schema, render_markdown, validate_payload};

pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 1_400;

/// A stored insight and whether it was served from cache.
#[derive(Debug, Clone, Serialize)]
pub struct InsightOutcome {
    pub cached: bool,
    pub insight: AlertAiInsight,
}

/// Generates, validates and caches insights for alert instances.
#[derive(Clone)]
pub struct InsightGenerator {
    store: Arc<dyn RuleStore>,
    llm: Option<Arc<dyn LlmClient>>,
    model: String,
    max_output_tokens: u32,
}

impl InsightGenerator {
    pub fn new(store: Arc<dyn RuleStore>, llm: Option<Arc<dyn LlmClient>>, model: String) -> Self {
        let model = model.trim();
        Self {
            store,
            llm,
            model: if model.is_empty() {
                DEFAULT_MODEL.to_string()
            } else {
                model.to_string()
            },
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
        }
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn is_configured(&self) -> bool {
        self.llm.is_some()
    }

    /// Returns the stored insight of an instance without generating one.
    pub async fn get(&self, instance_id: &str) -> Result<Option<AlertAiInsight>> {
        if self.store.get_instance_with_rule(instance_id).await?.is_none() {
            return Err(InsightError::NotFound(instance_id.to_string()));
        }
        Ok(self.store.get_insight(instance_id).await?)
    }

    /// Returns the cached insight when its prompt hash still matches and
    /// `force` is off; otherwise asks the LLM and replaces the stored one.
    pub async fn generate(&self, instance_id: &str, force: bool) -> Result<InsightOutcome> {
        let record = self
            .store
            .get_instance_with_rule(instance_id)
            .await?
            .ok_or_else(|| InsightError::NotFound(instance_id.to_string()))?;

        let prompt = build_prompt(&record, &self.model)?;
        let existing = self.store.get_insight(instance_id).await?;

        if let Some(insight) = existing.as_ref() {
            if insight.prompt_hash == prompt.prompt_hash && !force {
                tracing::debug!(alert_instance_id = %instance_id, "Insight cache hit");
                return Ok(InsightOutcome {
                    cached: true,
                    insight: insight.clone(),
                });
            }
        }

        let llm = self.llm.as_ref().ok_or(InsightError::NotConfigured)?;

        tracing::info!(
            alert_instance_id = %instance_id,
            provider = llm.provider(),
            model = %self.model,
            force,
            "Generating alert insight"
        );

        let schema = insight_schema();
        let raw = llm
            .create_structured_response(&StructuredRequest {
                model: &self.model,
                system: &prompt.system,
                user: &prompt.user,
                schema_name: SCHEMA_NAME,
                schema: &schema,
                max_output_tokens: Some(self.max_output_tokens),
            })
            .await?;

        let payload = validate_payload(&raw).inspect_err(|e| {
            tracing::warn!(alert_instance_id = %instance_id, error = %e, "Rejected insight output");
        })?;

        let actions_json = serde_json::to_value(&payload)
            .map_err(|e| InsightError::InvalidOutput(e.to_string()))?;
        let insight = self
            .store
            .upsert_insight(&NewAlertInsight {
                alert_instance_id: instance_id.to_string(),
                model: self.model.clone(),
                prompt_hash: prompt.prompt_hash,
                insight_md: render_markdown(&payload),
                actions_json,
            })
            .await?;

        tracing::info!(
            alert_instance_id = %instance_id,
            regenerated = existing.is_some(),
            "Alert insight stored"
        );
        Ok(InsightOutcome {
            cached: false,
            insight,
        })
    }
}
