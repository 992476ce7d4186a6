//! Database layer for recall.
//!
//! Provides SQLite connection pooling and the query modules for memories
//! and memory clusters. Every query is scoped by `user_id`.

mod clusters;
mod memories;
pub mod pool;
pub mod vector;

pub use clusters::*;
pub use memories::*;
pub use pool::{create_pool_with_config, health_check, PoolConfig};

use crate::Result;
use tracing::info;

/// Type alias for the SQLite connection pool.
pub type DbPool = sqlx::SqlitePool;

/// Initialize the database connection pool.
///
/// `:memory:` gets the single-connection test configuration; anything else is
/// treated as a file path and opened in WAL mode.
pub async fn init_pool(path: &str) -> Result<DbPool> {
    let config = if path == ":memory:" {
        PoolConfig::test()
    } else {
        PoolConfig::default()
    };

    let pool = create_pool_with_config(path, config).await?;

    info!("Database pool initialized: {}", path);

    Ok(pool)
}

/// Initialize the database schema.
///
/// Applies schema.sql statement by statement. Every statement uses
/// IF NOT EXISTS so it's safe to run multiple times.
pub async fn initialize_schema(pool: &DbPool) -> Result<()> {
    let schema = include_str!("../../schema.sql");

    info!("Initializing database schema");

    for statement in schema.split(';') {
        let clean_stmt: String = statement
            .lines()
            .filter(|line| !line.trim().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n");
        let clean_stmt = clean_stmt.trim();
        if clean_stmt.is_empty() {
            continue;
        }
        sqlx::query(clean_stmt).execute(pool).await?;
    }

    info!("Database schema initialized successfully");

    Ok(())
}
