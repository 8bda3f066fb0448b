use anyhow::{Context, Result};
use revmon_storage::{RuleFilter, RuleStore};
use std::collections::HashSet;

use crate::config::RulesSeedFile;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub created: u32,
    pub skipped: u32,
    pub failed: u32,
}

pub fn load_seed_file(path: &str) -> Result<RulesSeedFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read seed file '{path}'"))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse seed file '{path}'"))
}

/// Creates every seed rule whose name is not taken yet. Names are compared
/// after trimming. A rule the store rejects is logged and counted as failed.
pub async fn seed_rules(store: &dyn RuleStore, seed: &RulesSeedFile) -> Result<SeedSummary> {
    let existing = store
        .list_rules(&RuleFilter::default())
        .await
        .context("Failed to list existing alert rules")?;
    let mut names: HashSet<String> = existing.iter().map(|r| r.name.trim().to_string()).collect();

    let mut summary = SeedSummary::default();
    for rule in &seed.rules {
        let name = rule.name.trim();
        if names.contains(name) {
            tracing::warn!(name = %name, "Alert rule already exists, skipping");
            summary.skipped += 1;
            continue;
        }

        match store.create_rule(rule).await {
            Ok(created) => {
                tracing::info!(name = %created.name, id = %created.id, "Alert rule created");
                names.insert(created.name.trim().to_string());
                summary.created += 1;
            }
            Err(e) => {
                tracing::error!(name = %name, error = %e, "Failed to create alert rule");
                summary.failed += 1;
            }
        }
    }

    tracing::info!(
        created = summary.created,
        skipped = summary.skipped,
        failed = summary.failed,
        "init-rules completed"
    );
    Ok(summary)
}
