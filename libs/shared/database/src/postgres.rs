use anyhow::{anyhow, Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, info};

use shared_config::AppConfig;

/// Open the shared connection pool. Every cell borrows connections from this
/// one pool; nothing else in the process opens its own.
pub async fn connect(config: &AppConfig) -> Result<PgPool> {
    if config.database_url.is_empty() {
        return Err(anyhow!("DATABASE_URL is not configured"));
    }

    debug!(
        "Connecting to PostgreSQL with up to {} connections",
        config.database_max_connections
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    info!("PostgreSQL pool ready");
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("Failed to run database migrations")?;

    info!("Database migrations applied");
    Ok(())
}
