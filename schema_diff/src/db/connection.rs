//! Database connection handling
//!
//! This module provides functionality to establish and manage the MySQL pool.
//! The configured URL names the server; databases are addressed explicitly by
//! every caller.

use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::Executor;
use std::time::Duration;

use crate::config::DatabaseConfig;
use crate::error::Result;

/// Pooled connection to one MySQL server
#[derive(Debug, Clone)]
pub struct DatabaseConnection {
    pool: MySqlPool,
}

impl DatabaseConnection {
    /// Create a new database connection from configuration
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool_size = config.pool_size.unwrap_or(5);
        let timeout_seconds = config.timeout_seconds.unwrap_or(30);

        let pool = MySqlPoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(Duration::from_secs(timeout_seconds))
            .connect(&config.url)
            .await?;

        tracing::debug!(pool_size, timeout_seconds, "Connected to MySQL");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Execute a single statement over the text protocol
    pub async fn execute(&self, sql: &str) -> Result<()> {
        self.pool.execute(sql).await?;
        Ok(())
    }
}
