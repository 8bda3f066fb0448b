//! AI-generated explanations for fired alerts.
//!
//! The [`InsightGenerator`] turns a stored alert instance into a sanitized
//! prompt, asks an [`LlmClient`] for a structured answer, validates it
//! against the `alert_insight_v1` shape and stores the result. Insights are
//! cached per instance and keyed on the prompt hash, so an unchanged prompt
//! is never sent twice unless regeneration is forced.

pub mod client;
pub mod error;
pub mod insight;
pub mod models;
pub mod prompt;
pub mod providers;
pub mod sanitize;
pub mod schema;


pub use client::{LlmClient, StructuredRequest};
pub use error::{InsightError, Result};
pub use insight::{InsightGenerator, InsightOutcome, DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_MODEL};
pub use prompt::{build_prompt, InsightPrompt, SCHEMA_NAME};
pub use providers::openai::OpenAiProvider;
pub use schema::{render_markdown, validate_payload, InsightAction, InsightPayload, RiskLevel};
