//! Database initialization and migration runner.
//!
//! SYSTEM CONTEXT
//! ==============
//! The coordination core only reads the product schema (users, sessions,
//! spaces, pictures) during the handshake; startup creates the shared
//! pool and enforces migrations before the websocket endpoint accepts
//! traffic.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::debug;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Initialize the `PostgreSQL` connection pool and run migrations.
/// Pool sizing follows `DB_MAX_CONNECTIONS` when set.
///
/// # Errors
///
/// Returns an error if the connection or a migration fails.
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let max_connections = std::env::var("DB_MAX_CONNECTIONS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_MAX_CONNECTIONS);

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    sqlx::migrate!("src/db/migrations").run(&pool).await?;
    debug!(max_connections, "database pool ready, migrations applied");

    Ok(pool)
}
