use chrono::{DateTime, Utc};
use revmon_ai::InsightGenerator;
use revmon_alert::AlertRunner;
use revmon_storage::RuleStore;
use std::sync::Arc;

use crate::config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RuleStore>,
    pub runner: AlertRunner,
    pub insights: InsightGenerator,
    pub start_time: DateTime<Utc>,
    pub config: Arc<ServerConfig>,
}
