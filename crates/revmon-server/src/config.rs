use revmon_ai::{DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_MODEL};
use revmon_common::types::non_empty;
use revmon_metrics::bigquery::{BigQuerySettings, DEFAULT_BASE_URL, DEFAULT_MARTS_DATASET};
use revmon_metrics::ProviderMode;
use revmon_storage::AlertRuleInput;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Shared secret for `POST /v1/internal/alerts/run`. The endpoint
    /// rejects every call while this is unset.
    #[serde(default)]
    pub runner_secret: Option<String>,

    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub insight: InsightConfig,
    #[serde(default)]
    pub ids: IdConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            runner_secret: None,
            database: DatabaseConfig::default(),
            metrics: MetricsConfig::default(),
            scheduler: SchedulerConfig::default(),
            insight: InsightConfig::default(),
            ids: IdConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SeaORM connection URL for the alert tables (`sqlite://...` or `postgres://...`).
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

impl DatabaseConfig {
    /// Connection URL with any password replaced, safe for logs.
    pub fn redacted_url(&self) -> String {
        redact_url_password(&self.url)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub provider: ProviderMode,
    /// Operational database for the `content_db` provider. Falls back to
    /// `[database].url` when unset.
    #[serde(default)]
    pub content_db_url: Option<String>,
    #[serde(default)]
    pub bigquery: BigQueryConfig,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            provider: ProviderMode::Mock,
            content_db_url: None,
            bigquery: BigQueryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BigQueryConfig {
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub stripe_dataset: String,
    #[serde(default = "default_marts_dataset")]
    pub marts_dataset: String,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_bigquery_base_url")]
    pub base_url: String,
    #[serde(default = "default_bigquery_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BigQueryConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            stripe_dataset: String::new(),
            marts_dataset: default_marts_dataset(),
            access_token: None,
            base_url: default_bigquery_base_url(),
            timeout_secs: default_bigquery_timeout_secs(),
        }
    }
}

impl BigQueryConfig {
    pub fn to_settings(&self) -> BigQuerySettings {
        BigQuerySettings {
            project_id: self.project_id.clone(),
            stripe_dataset: self.stripe_dataset.clone(),
            marts_dataset: self.marts_dataset.clone(),
            access_token: self.access_token.clone(),
            base_url: self.base_url.clone(),
            timeout_secs: self.timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Whether to run all enabled rules periodically (default: false)
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_scheduler_interval_secs")]
    pub interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_scheduler_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightConfig {
    /// OpenAI API key. Insight generation answers 409 while unset.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_insight_model")]
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_insight_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_insight_model(),
            base_url: None,
            timeout_secs: default_insight_timeout_secs(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

/// Snowflake node of this process. Each server or CLI process writing to
/// the same database needs a distinct pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdConfig {
    #[serde(default = "default_id_part")]
    pub machine_id: i32,
    #[serde(default = "default_id_part")]
    pub node_id: i32,
}

impl Default for IdConfig {
    fn default() -> Self {
        Self {
            machine_id: default_id_part(),
            node_id: default_id_part(),
        }
    }
}

// ---- Rules seed file types (used by `init-rules` CLI subcommand) ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesSeedFile {
    #[serde(default)]
    pub rules: Vec<AlertRuleInput>,
}

fn default_http_port() -> u16 {
    8080
}

fn default_id_part() -> i32 {
    1
}

fn default_database_url() -> String {
    "sqlite://data/revmon.db?mode=rwc".to_string()
}

fn default_marts_dataset() -> String {
    DEFAULT_MARTS_DATASET.to_string()
}

fn default_bigquery_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_bigquery_timeout_secs() -> u64 {
    30
}

fn default_scheduler_interval_secs() -> u64 {
    3600
}

fn default_insight_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_insight_timeout_secs() -> u64 {
    15
}

fn default_max_output_tokens() -> u32 {
    DEFAULT_MAX_OUTPUT_TOKENS
}

fn redact_url_password(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let Some((userinfo, host)) = rest.split_once('@') else {
        return url.to_string();
    };
    match userinfo.split_once(':') {
        Some((user, _)) => format!("{scheme}://{user}:***@{host}"),
        None => url.to_string(),
    }
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Secrets may come from the environment instead of the file. A set,
    /// non-blank variable wins over the file value.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let env = |key: &str| non_empty(lookup(key).as_deref());
        if let Some(key) = env("OPENAI_API_KEY") {
            self.insight.api_key = Some(key);
        }
        if let Some(token) = env("BIGQUERY_ACCESS_TOKEN") {
            self.metrics.bigquery.access_token = Some(token);
        }
        if let Some(secret) = env("ALERTS_RUNNER_SECRET") {
            self.runner_secret = Some(secret);
        }
    }

    pub fn runner_secret(&self) -> Option<String> {
        non_empty(self.runner_secret.as_deref())
    }

    pub fn insight_api_key(&self) -> Option<String> {
        non_empty(self.insight.api_key.as_deref())
    }

    pub fn content_db_url(&self) -> &str {
        self.metrics
            .content_db_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.database.url)
    }
}
