use anyhow::{Context, Result};
use chrono::Utc;
use revmon_ai::{InsightGenerator, LlmClient, OpenAiProvider};
use revmon_alert::{AlertRunner, RuleEngine};
use revmon_metrics::bigquery::BigQueryMetricsProvider;
use revmon_metrics::content_db::ContentDbMetricsProvider;
use revmon_metrics::mock::MockMetricsProvider;
use revmon_metrics::{MetricsProvider, ProviderMode};
use revmon_storage::{AlertStore, RuleStore};
use std::sync::Arc;

use crate::config::ServerConfig;
use crate::state::AppState;

/// Configures the id generator for this process.
pub fn init_ids(config: &ServerConfig) -> Result<()> {
    revmon_common::id::init(config.ids.machine_id, config.ids.node_id)
        .map_err(|e| anyhow::anyhow!("Invalid [ids] settings: {e}"))
}

/// Opens the alert store and runs migrations.
pub async fn open_store(config: &ServerConfig) -> Result<AlertStore> {
    AlertStore::new(&config.database.url)
        .await
        .with_context(|| {
            format!(
                "Failed to open alert store at {}",
                config.database.redacted_url()
            )
        })
}

/// Builds the configured metrics backend. The `content_db` backend shares
/// the store's connection when both point at the same database.
pub async fn build_metrics_provider(
    config: &ServerConfig,
    store: &AlertStore,
) -> Result<Arc<dyn MetricsProvider>> {
    let provider: Arc<dyn MetricsProvider> = match config.metrics.provider {
        ProviderMode::Mock => {
            tracing::warn!("Metrics provider is 'mock': rules will evaluate against empty data");
            Arc::new(MockMetricsProvider)
        }
        ProviderMode::ContentDb => {
            let url = config.content_db_url();
            if url == config.database.url {
                Arc::new(ContentDbMetricsProvider::new(store.connection().clone()))
            } else {
                Arc::new(
                    ContentDbMetricsProvider::connect(url)
                        .await
                        .context("Failed to connect content-db metrics provider")?,
                )
            }
        }
        ProviderMode::BigQuery => Arc::new(
            BigQueryMetricsProvider::new(&config.metrics.bigquery.to_settings())
                .context("Invalid [metrics.bigquery] settings")?,
        ),
    };
    tracing::info!(provider = %config.metrics.provider, "Metrics provider ready");
    Ok(provider)
}

/// The OpenAI client, or `None` when no API key is configured.
pub fn build_llm_client(config: &ServerConfig) -> Result<Option<Arc<dyn LlmClient>>> {
    let Some(api_key) = config.insight_api_key() else {
        tracing::info!("No OpenAI API key configured, insight generation disabled");
        return Ok(None);
    };
    let client = OpenAiProvider::new(
        api_key,
        config.insight.base_url.clone(),
        Some(config.insight.timeout_secs),
    )
    .context("Failed to build OpenAI client")?;
    Ok(Some(Arc::new(client)))
}

/// Wires store, runner and insight generator into the shared HTTP state.
pub fn build_state(
    config: ServerConfig,
    store: Arc<dyn RuleStore>,
    provider: Arc<dyn MetricsProvider>,
    llm: Option<Arc<dyn LlmClient>>,
) -> AppState {
    let runner = AlertRunner::new(store.clone(), RuleEngine::new(provider));
    let insights = InsightGenerator::new(store.clone(), llm, config.insight.model.clone())
        .with_max_output_tokens(config.insight.max_output_tokens);
    AppState {
        store,
        runner,
        insights,
        start_time: Utc::now(),
        config: Arc::new(config),
    }
}
