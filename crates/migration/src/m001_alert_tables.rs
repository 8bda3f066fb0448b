use sea_orm_migration::prelude::*;

use crate::render_ddl;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m001_alert_tables"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 按依赖顺序建表：规则 -> 实例 -> AI 解读
        let sql = render_ddl(UP_SQL, manager.get_database_backend());
        manager.get_connection().execute_unprepared(&sql).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(DOWN_SQL)
            .await?;
        Ok(())
    }
}

const UP_SQL: &str = "
CREATE TABLE IF NOT EXISTS alert_rules (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    enabled BOOLEAN NOT NULL DEFAULT TRUE,
    rule_type TEXT NOT NULL,
    tenant_id TEXT,
    content_type TEXT,
    content_key TEXT,
    params_json TEXT NOT NULL DEFAULT '{}',
    created_at {ts} NOT NULL,
    updated_at {ts} NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_alert_rules_enabled ON alert_rules(enabled);
CREATE INDEX IF NOT EXISTS idx_alert_rules_rule_type ON alert_rules(rule_type);

CREATE TABLE IF NOT EXISTS alert_instances (
    id TEXT PRIMARY KEY NOT NULL,
    rule_id TEXT NOT NULL REFERENCES alert_rules(id) ON DELETE CASCADE,
    status TEXT NOT NULL DEFAULT 'open',
    severity TEXT NOT NULL,
    fired_at {ts} NOT NULL,
    context_json TEXT NOT NULL DEFAULT '{}',
    fingerprint TEXT NOT NULL UNIQUE,
    tenant_id TEXT,
    created_at {ts} NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_alert_instances_rule_id ON alert_instances(rule_id);
CREATE INDEX IF NOT EXISTS idx_alert_instances_status ON alert_instances(status);
CREATE INDEX IF NOT EXISTS idx_alert_instances_fired_at ON alert_instances(fired_at DESC);
CREATE INDEX IF NOT EXISTS idx_alert_instances_tenant_id ON alert_instances(tenant_id);

CREATE TABLE IF NOT EXISTS alert_ai_insights (
    id TEXT PRIMARY KEY NOT NULL,
    alert_instance_id TEXT NOT NULL UNIQUE REFERENCES alert_instances(id) ON DELETE CASCADE,
    model TEXT NOT NULL,
    prompt_hash TEXT NOT NULL,
    insight_md TEXT NOT NULL,
    actions_json TEXT NOT NULL,
    created_at {ts} NOT NULL,
    updated_at {ts} NOT NULL
);
";

const DOWN_SQL: &str = "
DROP TABLE IF EXISTS alert_ai_insights;
DROP TABLE IF EXISTS alert_instances;
DROP TABLE IF EXISTS alert_rules;
";
