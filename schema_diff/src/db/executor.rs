//! DDL executor
//!
//! Statements are applied strictly in order on a single connection. MySQL
//! commits each DDL statement on its own, so a failure leaves the statements
//! before it applied; there is no rollback and no retry.

use async_trait::async_trait;
use sqlx::Executor;

use crate::db::connection::DatabaseConnection;
use crate::error::{Error, Result};
use crate::utils::naming::quote_identifier;

/// Applies an ordered DDL sequence to a database
#[async_trait]
pub trait DdlExecutor: Send + Sync {
    /// Run `statements` against `database`, stopping at the first failure
    async fn execute(&self, database: &str, statements: &[String]) -> Result<()>;
}

/// SQL executor for running DDL
#[derive(Debug, Clone)]
pub struct SqlExecutor {
    connection: DatabaseConnection,
}

impl SqlExecutor {
    /// Create a new SQL executor
    pub fn new(connection: DatabaseConnection) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl DdlExecutor for SqlExecutor {
    async fn execute(&self, database: &str, statements: &[String]) -> Result<()> {
        let mut conn = self.connection.pool().acquire().await?;

        let use_database = format!("USE {}", quote_identifier(database));
        (&mut *conn).execute(use_database.as_str()).await?;

        for (i, statement) in statements.iter().enumerate() {
            tracing::debug!(database, step = i + 1, statement = %statement, "Executing DDL");

            if let Err(source) = (&mut *conn).execute(statement.as_str()).await {
                tracing::error!(database, step = i + 1, statement = %statement, error = %source, "DDL statement failed");
                return Err(Error::ExecutionFailure {
                    statement: statement.clone(),
                    source,
                });
            }
        }

        tracing::info!(database, statements = statements.len(), "Applied DDL");
        Ok(())
    }
}
