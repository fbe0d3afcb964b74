//! schema_diff: structural MySQL schema diff with ordered DDL synthesis
//!
//! Two schema snapshots go in, the minimal ordered DDL that turns the first
//! into the second comes out. A line-sorted SHA-1 checksum over the schema dump
//! verifies that applying the DDL actually converged.

pub mod config;
pub mod db;
pub mod error;
pub mod schema;
pub mod utils;

use serde::Serialize;
use std::path::{Path, PathBuf};

// Re-export main types for easier access
pub use config::Config;
pub use db::connection::DatabaseConnection;
pub use db::executor::{DdlExecutor, SqlExecutor};
pub use error::{Error, Result};
pub use schema::analyzer::{MySqlAnalyzer, SchemaSnapshotProvider};
pub use schema::checksum::SchemaChecksum;
pub use schema::generator::{Migration, MigrationGenerator, SkippedTable};
pub use schema::types::DatabaseSchema;

use db::scratch;
use schema::generator::write_dml_file;
use utils::naming::scratch_database_name;

/// Initialize schema_diff with the specified configuration file
pub async fn init(config_path: &str) -> Result<SchemaDiffClient> {
    let config = config::load_from_file(config_path)?;
    SchemaDiffClient::new(config).await
}

/// Options for a diff run
#[derive(Debug, Clone, Default)]
pub struct DiffOptions {
    /// Apply the DDL to the `from` side and verify the checksums converge
    pub validate: bool,
    /// Where to write the DDL as a replayable file
    pub dml_file: Option<PathBuf>,
    /// Stamp the DML file with the generation time
    pub dml_timestamp: bool,
}

/// Outcome of one diff run
#[derive(Debug, Clone, Serialize)]
pub struct DiffReport {
    pub from: String,
    pub to: String,
    pub from_checksum: String,
    pub to_checksum: String,
    /// The two schemas already had the same checksum; nothing was diffed
    pub identical: bool,
    pub statements: Vec<String>,
    pub skipped: Vec<SkippedTable>,
    /// Checksum verification ran and passed
    pub validated: bool,
}

impl DiffReport {
    fn identical(from: &str, to: &str, checksum: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            from_checksum: checksum.to_string(),
            to_checksum: checksum.to_string(),
            identical: true,
            statements: Vec::new(),
            skipped: Vec::new(),
            validated: false,
        }
    }

    /// Write the report as pretty JSON
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// The main client for interacting with schema_diff
pub struct SchemaDiffClient {
    config: Config,
    connection: DatabaseConnection,
    analyzer: MySqlAnalyzer,
    executor: SqlExecutor,
    generator: MigrationGenerator,
}

impl SchemaDiffClient {
    /// Create a new schema_diff client from configuration
    pub async fn new(config: Config) -> Result<Self> {
        let connection = DatabaseConnection::connect(&config.database).await?;
        let analyzer = MySqlAnalyzer::new(connection.pool().clone());
        let executor = SqlExecutor::new(connection.clone());
        let generator = MigrationGenerator::new(&config.diff);

        Ok(Self {
            config,
            connection,
            analyzer,
            executor,
            generator,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Introspect one database
    pub async fn fetch_schema(&self, database: &str) -> Result<DatabaseSchema> {
        self.analyzer.fetch_schema(database).await
    }

    /// Dump and checksum one database, writing the artifacts when configured
    pub async fn checksum_database(&self, database: &str) -> Result<SchemaChecksum> {
        let dump = self.analyzer.dump_schema(database).await?;
        let checksum = SchemaChecksum::compute(dump);
        self.write_artifacts(&checksum, database)?;

        tracing::info!(database, checksum = %checksum.checksum, "Computed schema checksum");
        Ok(checksum)
    }

    /// Apply statements to a database in order
    pub async fn apply(&self, database: &str, statements: &[String]) -> Result<()> {
        self.executor.execute(database, statements).await
    }

    /// Fail with [`Error::ChecksumMismatch`] unless both databases checksum equal
    pub async fn verify(&self, from: &str, to: &str) -> Result<()> {
        let from_checksum = self.checksum_database(from).await?;
        let to_checksum = self.checksum_database(to).await?;

        if from_checksum.checksum != to_checksum.checksum {
            tracing::error!(
                from,
                to,
                from_checksum = %from_checksum.checksum,
                to_checksum = %to_checksum.checksum,
                "Schemas still differ after migration"
            );
            return Err(Error::ChecksumMismatch {
                from: from.to_string(),
                to: to.to_string(),
                from_checksum: from_checksum.checksum,
                to_checksum: to_checksum.checksum,
            });
        }

        tracing::info!(from, to, checksum = %from_checksum.checksum, "Schemas converged");
        Ok(())
    }

    /// Diff two existing databases
    pub async fn diff_databases(&self, from: &str, to: &str, options: &DiffOptions) -> Result<DiffReport> {
        let from_checksum = SchemaChecksum::compute(self.analyzer.dump_schema(from).await?);
        let to_checksum = SchemaChecksum::compute(self.analyzer.dump_schema(to).await?);

        if from_checksum.checksum == to_checksum.checksum {
            tracing::info!(from, to, "Schemas are identical, nothing to do");
            return Ok(DiffReport::identical(from, to, &from_checksum.checksum));
        }

        self.diff_and_validate(from, to, from, options, from_checksum, to_checksum)
            .await
    }

    /// Diff two schema dumps by loading them into scratch databases
    ///
    /// The scratch databases are dropped afterwards, also when the run fails.
    pub async fn diff_schema_texts(
        &self,
        from_label: &str,
        from_sql: &str,
        to_label: &str,
        to_sql: &str,
        options: &DiffOptions,
    ) -> Result<DiffReport> {
        let from_checksum = SchemaChecksum::compute(from_sql);
        let to_checksum = SchemaChecksum::compute(to_sql);

        if from_checksum.checksum == to_checksum.checksum {
            tracing::info!(from = from_label, to = to_label, "Schemas are identical, nothing to do");
            return Ok(DiffReport::identical(from_label, to_label, &from_checksum.checksum));
        }

        let prefix = &self.config.diff.scratch_prefix;
        let from_db = scratch_database_name(prefix, from_label);
        let to_db = scratch_database_name(prefix, to_label);

        let result = async {
            scratch::create_scratch_database(&self.connection, &from_db, from_sql).await?;
            scratch::create_scratch_database(&self.connection, &to_db, to_sql).await?;

            let mut report = self
                .diff_and_validate(&from_db, &to_db, from_label, options, from_checksum, to_checksum)
                .await?;
            report.from = from_label.to_string();
            report.to = to_label.to_string();
            Ok::<_, Error>(report)
        }
        .await;

        for database in [&from_db, &to_db] {
            if let Err(e) = scratch::drop_scratch_database(&self.connection, database).await {
                tracing::warn!(database = %database, error = %e, "Failed to drop scratch database");
            }
        }

        result
    }

    async fn diff_and_validate(
        &self,
        from: &str,
        to: &str,
        dml_target: &str,
        options: &DiffOptions,
        from_checksum: SchemaChecksum,
        to_checksum: SchemaChecksum,
    ) -> Result<DiffReport> {
        let from_schema = self.analyzer.fetch_schema(from).await?;
        let to_schema = self.analyzer.fetch_schema(to).await?;

        let migration = self.generator.generate_parallel(&from_schema, &to_schema).await?;
        let statements = migration.to_sql(self.generator.pretty());

        if let Some(path) = &options.dml_file {
            let generated_at = options.dml_timestamp.then(chrono::Utc::now);
            write_dml_file(path, dml_target, &statements, generated_at)?;
        }

        if options.validate {
            self.apply(from, &statements).await?;
            self.verify(from, to).await?;
        }

        Ok(DiffReport {
            from: from.to_string(),
            to: to.to_string(),
            from_checksum: from_checksum.checksum,
            to_checksum: to_checksum.checksum,
            identical: false,
            statements,
            skipped: migration.skipped,
            validated: options.validate,
        })
    }

    fn write_artifacts(&self, checksum: &SchemaChecksum, name: &str) -> Result<()> {
        if let Some(output) = &self.config.output {
            if output.write_artifacts {
                checksum.write_artifacts(Path::new(&output.directory), name)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_report_has_no_statements() {
        let report = DiffReport::identical("a", "b", "abc");
        assert!(report.identical);
        assert!(report.statements.is_empty());
        assert_eq!(report.from_checksum, report.to_checksum);
    }

    #[test]
    fn report_serializes_to_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let mut report = DiffReport::identical("v1", "v2", "abc");
        report.identical = false;
        report.statements = vec!["DROP TABLE t;".to_string()];
        report.skipped = vec![SkippedTable {
            table: "posts".into(),
            reason: "FULLTEXT index ft_body".into(),
        }];

        report.write_json(&path).unwrap();

        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["statements"][0], "DROP TABLE t;");
        assert_eq!(value["skipped"][0]["table"], "posts");
        assert_eq!(value["identical"], false);
    }
}
