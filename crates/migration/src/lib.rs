pub use sea_orm_migration::prelude::*;

mod m001_alert_tables;
mod m002_source_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m001_alert_tables::Migration),
            Box::new(m002_source_tables::Migration),
        ]
    }
}

/// Fills the `{ts}` placeholder of a DDL script with the timestamp column
/// type of the connected backend.
pub(crate) fn render_ddl(sql: &str, backend: sea_orm_migration::sea_orm::DbBackend) -> String {
    use sea_orm_migration::sea_orm::DbBackend;

    let ts = match backend {
        DbBackend::Postgres => "TIMESTAMPTZ",
        DbBackend::MySql => "DATETIME",
        DbBackend::Sqlite => "TEXT",
    };
    sql.replace("{ts}", ts)
}
