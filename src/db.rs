use std::time::Duration;

use anyhow::Context as _;
use sea_orm::sea_query::TableCreateStatement;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};

use crate::entities::{email_verification, setting, user_identity};
use crate::error::AppError;
use crate::invites::{tenant_tables, Tenant};

pub async fn connect(url: &str) -> Result<DatabaseConnection, AppError> {
    let mut opts = ConnectOptions::new(url);
    opts.max_connections(10)
        .connect_timeout(Duration::from_secs(10))
        .sqlx_logging(false);

    let db = Database::connect(opts)
        .await
        .context("failed to connect to database")?;
    tracing::info!(backend = ?db.get_database_backend(), "Database connected");

    init_schema(&db).await?;
    Ok(db)
}

fn entity_table<E: EntityTrait>(schema: &Schema, entity: E) -> TableCreateStatement {
    let mut table = schema.create_table_from_entity(entity);
    table.if_not_exists();
    table
}

/// Create every table the server needs. Safe to run on each start.
pub async fn init_schema(db: &DatabaseConnection) -> Result<(), AppError> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let mut tables = vec![
        entity_table(&schema, user_identity::Entity),
        entity_table(&schema, email_verification::Entity),
        entity_table(&schema, setting::Entity),
    ];
    tables.extend(Tenant::ALL.into_iter().flat_map(tenant_tables));

    for table in &tables {
        db.execute(backend.build(table))
            .await
            .context("failed to create table")?;
    }

    tracing::info!(tables = tables.len(), "Database schema ready");
    Ok(())
}
