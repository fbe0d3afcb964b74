//! Schema module for schema_diff
//!
//! This module handles schema introspection, comparison, DDL synthesis and
//! checksums.

pub mod analyzer;
pub mod checksum;
pub mod ddl;
pub mod diff;
pub mod generator;
pub mod types;

// Re-export key types
pub use analyzer::{MySqlAnalyzer, SchemaSnapshotProvider};
pub use checksum::SchemaChecksum;
pub use ddl::{AlterClause, DdlStatement};
pub use diff::{diff_columns, diff_foreign_keys, diff_indexes, diff_table, TableDiff};
pub use generator::{Migration, MigrationGenerator, SkippedTable};
pub use types::{
    ColumnDef, ColumnDefault, DatabaseSchema, ForeignKeyDef, IndexColumn, IndexDef, IndexKind,
    TableSchema,
};
