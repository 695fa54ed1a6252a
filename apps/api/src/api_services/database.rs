use praetor_core::{AppError, AppResult};
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;

static MIGRATOR: Migrator = sqlx::migrate!("../../crates/infrastructure/migrations");

const MAX_CONNECTIONS: u32 = 10;

pub async fn connect(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

/// Applies pending rbac schema migrations.
pub async fn run_migrations(pool: &PgPool) -> AppResult<()> {
    MIGRATOR
        .run(pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;

    tracing::info!(
        migrations = MIGRATOR.iter().count(),
        "rbac schema is up to date"
    );
    Ok(())
}
