use sea_orm_migration::prelude::*;

use crate::render_ddl;

/// Operational tables read by the content-db metrics backend. In production
/// they are filled by the ingestion pipeline; creating them here lets a fresh
/// database answer metric queries with empty series.
pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m002_source_tables"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
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
CREATE TABLE IF NOT EXISTS analytics_events (
    event_id TEXT PRIMARY KEY NOT NULL,
    tenant_id TEXT NOT NULL,
    test_id TEXT,
    session_id TEXT,
    event_name TEXT NOT NULL,
    occurred_at {ts} NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_analytics_events_scope ON analytics_events(tenant_id, test_id);
CREATE INDEX IF NOT EXISTS idx_analytics_events_occurred_at ON analytics_events(occurred_at);

CREATE TABLE IF NOT EXISTS stripe_purchases (
    purchase_id TEXT PRIMARY KEY NOT NULL,
    tenant_id TEXT NOT NULL,
    test_id TEXT,
    amount_eur DOUBLE PRECISION,
    created_utc {ts} NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_stripe_purchases_scope ON stripe_purchases(tenant_id, test_id);
CREATE INDEX IF NOT EXISTS idx_stripe_purchases_created ON stripe_purchases(created_utc);

CREATE TABLE IF NOT EXISTS stripe_refunds (
    refund_id TEXT PRIMARY KEY NOT NULL,
    purchase_id TEXT NOT NULL,
    amount_eur DOUBLE PRECISION,
    created_utc {ts} NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_stripe_refunds_purchase ON stripe_refunds(purchase_id);

CREATE TABLE IF NOT EXISTS stripe_disputes (
    dispute_id TEXT PRIMARY KEY NOT NULL,
    purchase_id TEXT NOT NULL,
    amount_eur DOUBLE PRECISION,
    created_utc {ts} NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_stripe_disputes_purchase ON stripe_disputes(purchase_id);

CREATE TABLE IF NOT EXISTS stripe_fees (
    fee_id TEXT PRIMARY KEY NOT NULL,
    purchase_id TEXT NOT NULL,
    fee_eur DOUBLE PRECISION,
    created_utc {ts} NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_stripe_fees_purchase ON stripe_fees(purchase_id);
";

const DOWN_SQL: &str = "
DROP TABLE IF EXISTS stripe_fees;
DROP TABLE IF EXISTS stripe_disputes;
DROP TABLE IF EXISTS stripe_refunds;
DROP TABLE IF EXISTS stripe_purchases;
DROP TABLE IF EXISTS analytics_events;
";
