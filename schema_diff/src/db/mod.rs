//! Database module for schema_diff
//!
//! This module handles the MySQL connection, DDL execution and scratch databases.

pub mod connection;
pub mod executor;
pub mod scratch;

// Re-export key types
pub use connection::DatabaseConnection;
pub use executor::{DdlExecutor, SqlExecutor};
