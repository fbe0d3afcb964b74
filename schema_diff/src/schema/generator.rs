//! Migration generator
//!
//! Turns table diffs into ordered DDL. Per table, all drop clauses go into one
//! ALTER TABLE statement that precedes a second one carrying the adds,
//! modifications and the engine change. Across tables the order is: drops,
//! creations, alterations, each by table name.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::config::DiffConfig;
use crate::error::Result;
use crate::schema::ddl::{render_statements, AlterClause, AlterTable, DdlStatement, Phase};
use crate::schema::diff::{diff_table, TableDiff};
use crate::schema::types::{DatabaseSchema, IndexDef, TableSchema};
use crate::utils::naming::escape_identifier;

/// A table left out of the migration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedTable {
    pub table: String,
    pub reason: String,
}

/// The ordered statements that transform one schema into another
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Migration {
    pub statements: Vec<DdlStatement>,
    pub skipped: Vec<SkippedTable>,
}

impl Migration {
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Statement text, one entry per statement
    pub fn to_sql(&self, pretty: bool) -> Vec<String> {
        render_statements(&self.statements, pretty)
    }
}

/// Migration SQL generator
#[derive(Debug, Clone)]
pub struct MigrationGenerator {
    pretty: bool,
    workers: usize,
}

impl Default for MigrationGenerator {
    fn default() -> Self {
        Self {
            pretty: false,
            workers: 1,
        }
    }
}

impl MigrationGenerator {
    /// Create a new migration generator
    pub fn new(config: &DiffConfig) -> Self {
        Self {
            pretty: config.pretty_print,
            workers: config.workers.max(1),
        }
    }

    pub fn pretty(&self) -> bool {
        self.pretty
    }

    /// Ordered ALTER TABLE statements for one table diff
    pub fn table_statements(diff: &TableDiff) -> Vec<DdlStatement> {
        let mut drops = Vec::new();
        let mut adds = Vec::new();

        for name in diff.columns.drop.iter().flatten() {
            drops.push(AlterClause::DropColumn(name.clone()));
        }

        let mut index_drops = diff.indexes.drops();
        index_drops.sort_by_key(|i| index_order(i));
        drops.extend(index_drops.into_iter().map(AlterClause::drop_index));

        let mut fk_drops = diff.foreign_keys.drops();
        fk_drops.sort_by(|a, b| a.name.cmp(&b.name));
        drops.extend(fk_drops.into_iter().map(|fk| AlterClause::DropForeignKey(fk.name.clone())));

        for column in diff.columns.add.iter().flatten() {
            adds.push(AlterClause::AddColumn(column.clone()));
        }

        let mut index_adds = diff.indexes.adds();
        index_adds.sort_by_key(|i| index_order(i));
        adds.extend(index_adds.into_iter().cloned().map(AlterClause::AddIndex));

        let mut fk_adds = diff.foreign_keys.adds();
        fk_adds.sort_by(|a, b| a.name.cmp(&b.name));
        adds.extend(fk_adds.into_iter().cloned().map(AlterClause::AddForeignKey));

        for column in diff.columns.modify.iter().flatten() {
            adds.push(AlterClause::ModifyColumn(column.clone()));
        }

        if let Some(engine) = &diff.engine {
            adds.push(AlterClause::Engine(engine.clone()));
        }

        [(Phase::Drop, drops), (Phase::Add, adds)]
            .into_iter()
            .filter(|(_, clauses)| !clauses.is_empty())
            .map(|(phase, clauses)| {
                DdlStatement::AlterTable(AlterTable {
                    table: diff.table.clone(),
                    phase,
                    clauses,
                })
            })
            .collect()
    }

    /// Generate the migration between two schemas on the calling thread
    pub fn generate(&self, from: &DatabaseSchema, to: &DatabaseSchema) -> Result<Migration> {
        let diffs = common_tables(from, to)
            .into_iter()
            .map(|(current, target)| (target.name.clone(), diff_table(current, target)))
            .collect();

        self.assemble(from, to, diffs)
    }

    /// Generate the migration, diffing common tables on a bounded worker pool
    ///
    /// The output is identical to [`MigrationGenerator::generate`].
    pub async fn generate_parallel(
        &self,
        from: &DatabaseSchema,
        to: &DatabaseSchema,
    ) -> Result<Migration> {
        if self.workers <= 1 {
            return self.generate(from, to);
        }

        let pairs: Vec<(TableSchema, TableSchema)> = common_tables(from, to)
            .into_iter()
            .map(|(current, target)| (current.clone(), target.clone()))
            .collect();

        tracing::debug!(tables = pairs.len(), workers = self.workers, "Diffing tables in parallel");

        let joined = stream::iter(pairs.into_iter().map(|(current, target)| {
            tokio::task::spawn_blocking(move || (target.name.clone(), diff_table(&current, &target)))
        }))
        .buffered(self.workers)
        .collect::<Vec<_>>()
        .await;

        let mut diffs = Vec::with_capacity(joined.len());
        for result in joined {
            diffs.push(result?);
        }

        self.assemble(from, to, diffs)
    }

    fn assemble(
        &self,
        from: &DatabaseSchema,
        to: &DatabaseSchema,
        diffs: Vec<(String, Result<TableDiff>)>,
    ) -> Result<Migration> {
        let mut migration = Migration::default();

        for name in from.tables.keys().filter(|name| !to.tables.contains_key(*name)) {
            migration.statements.push(DdlStatement::DropTable(name.clone()));
        }

        for table in to.tables.values().filter(|t| !from.tables.contains_key(&t.name)) {
            if table.definition.is_none() && !table.unsupported.is_empty() {
                tracing::warn!(table = %table.name, construct = %table.unsupported.join(", "), "Cannot synthesize table, skipping");
                migration.skipped.push(SkippedTable {
                    table: table.name.clone(),
                    reason: table.unsupported.join(", "),
                });
                continue;
            }
            migration.statements.push(DdlStatement::CreateTable(table.clone()));
        }

        for (name, result) in diffs {
            match result {
                Ok(diff) if diff.is_empty() => {}
                Ok(diff) => {
                    let statements = Self::table_statements(&diff);
                    tracing::debug!(table = %name, statements = statements.len(), "Table differs");
                    migration.statements.extend(statements);
                }
                Err(e) if e.is_table_local() => {
                    tracing::warn!(table = %name, error = %e, "Skipping table");
                    migration.skipped.push(SkippedTable {
                        table: name,
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            from = %from.name,
            to = %to.name,
            statements = migration.statements.len(),
            skipped = migration.skipped.len(),
            "Generated migration"
        );

        Ok(migration)
    }
}

fn index_order(index: &IndexDef) -> (u8, String) {
    (index.kind.emit_rank(), index.name.clone())
}

/// Tables present in both schemas, paired and ordered by name
fn common_tables<'a>(
    from: &'a DatabaseSchema,
    to: &'a DatabaseSchema,
) -> Vec<(&'a TableSchema, &'a TableSchema)> {
    from.tables
        .iter()
        .filter_map(|(name, current)| to.tables.get(name).map(|target| (current, target)))
        .collect()
}

/// Write the statements to a DML file that can be replayed against `database`
///
/// The file is byte-identical for identical diffs unless `generated_at` stamps it.
pub fn write_dml_file(
    path: &Path,
    database: &str,
    statements: &[String],
    generated_at: Option<DateTime<Utc>>,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut contents = match generated_at {
        Some(at) => format!("-- schema_diff migration generated {}\n", at.format("%Y-%m-%d %H:%M:%S UTC")),
        None => "-- schema_diff migration\n".to_string(),
    };
    contents.push_str(&format!("USE {};\n", escape_identifier(database)));
    for statement in statements {
        contents.push_str(statement);
        contents.push('\n');
    }

    fs::write(path, contents)?;
    tracing::info!(path = %path.display(), statements = statements.len(), "Wrote DML file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::{ColumnDef, ForeignKeyDef};
    use pretty_assertions::assert_eq;

    fn deleted_object() -> TableSchema {
        TableSchema::new("deletedObject")
            .with_column(ColumnDef::new("objectType", "int(11)"))
            .unwrap()
            .with_column(ColumnDef::new("objectId", "bigint(20)"))
            .unwrap()
            .with_column(
                ColumnDef::new("deleteDate", "timestamp")
                    .default_raw("CURRENT_TIMESTAMP")
                    .extra("on update CURRENT_TIMESTAMP"),
            )
            .unwrap()
            .with_engine("InnoDB")
    }

    fn schema(name: &str, tables: Vec<TableSchema>) -> DatabaseSchema {
        tables
            .into_iter()
            .fold(DatabaseSchema::new(name), |db, t| db.with_table(t).unwrap())
    }

    fn sql(from: Vec<TableSchema>, to: Vec<TableSchema>) -> Vec<String> {
        MigrationGenerator::default()
            .generate(&schema("a", from), &schema("b", to))
            .unwrap()
            .to_sql(false)
    }

    #[test]
    fn identical_schemas_need_nothing() {
        assert!(sql(vec![deleted_object()], vec![deleted_object()]).is_empty());
    }

    #[test]
    fn dropped_column() {
        let mut to = deleted_object();
        to.columns.shift_remove("objectId");

        assert_eq!(
            sql(vec![deleted_object()], vec![to]),
            vec!["ALTER TABLE deletedObject DROP COLUMN objectId;"]
        );
    }

    #[test]
    fn modified_column() {
        let mut to = deleted_object();
        to.columns.insert("objectType".into(), ColumnDef::new("objectType", "smallint(6)"));

        assert_eq!(
            sql(vec![deleted_object()], vec![to]),
            vec!["ALTER TABLE deletedObject MODIFY COLUMN objectType smallint(6) NOT NULL;"]
        );
    }

    #[test]
    fn drops_precede_adds_in_separate_statements() {
        let from = TableSchema::new("t")
            .with_column(ColumnDef::new("a", "int(11)"))
            .unwrap()
            .with_index(IndexDef::primary(&["a"]))
            .unwrap();
        let to = TableSchema::new("t")
            .with_column(ColumnDef::new("b", "int(11)"))
            .unwrap()
            .with_index(IndexDef::primary(&["b"]))
            .unwrap()
            .with_index(IndexDef::plain("k_b", &["b"]))
            .unwrap();

        assert_eq!(
            sql(vec![from], vec![to]),
            vec![
                "ALTER TABLE t DROP COLUMN a, DROP PRIMARY KEY;",
                "ALTER TABLE t ADD COLUMN b int(11) NOT NULL, ADD KEY k_b(b), ADD PRIMARY KEY (b);",
            ]
        );
    }

    #[test]
    fn add_phase_clause_order() {
        let from = TableSchema::new("t")
            .with_column(ColumnDef::new("id", "int(11)"))
            .unwrap()
            .with_column(ColumnDef::new("v", "int(11)"))
            .unwrap()
            .with_engine("MyISAM");
        let to = TableSchema::new("t")
            .with_column(ColumnDef::new("id", "int(11)"))
            .unwrap()
            .with_column(ColumnDef::new("v", "bigint(20)"))
            .unwrap()
            .with_column(ColumnDef::new("user_id", "int(11)"))
            .unwrap()
            .with_index(IndexDef::plain("k_user", &["user_id"]))
            .unwrap()
            .with_foreign_key(ForeignKeyDef::new("fk_user", &["user_id"], "users", &["id"]))
            .unwrap()
            .with_engine("InnoDB");

        assert_eq!(
            sql(vec![from], vec![to]),
            vec![
                "ALTER TABLE t ADD COLUMN user_id int(11) NOT NULL, ADD KEY k_user(user_id), \
                 ADD CONSTRAINT fk_user FOREIGN KEY (user_id) REFERENCES users(id), \
                 MODIFY COLUMN v bigint(20) NOT NULL, ENGINE = InnoDB;"
            ]
        );
    }

    #[test]
    fn table_level_order_is_drops_creates_alters() {
        let keep_from = TableSchema::new("b_keep")
            .with_column(ColumnDef::new("a", "int(11)"))
            .unwrap();
        let keep_to = TableSchema::new("b_keep")
            .with_column(ColumnDef::new("a", "bigint(20)"))
            .unwrap();
        let created = TableSchema::new("a_new")
            .with_column(ColumnDef::new("id", "int(11)"))
            .unwrap();

        assert_eq!(
            sql(
                vec![keep_from, TableSchema::new("z_old"), TableSchema::new("c_old")],
                vec![keep_to, created]
            ),
            vec![
                "DROP TABLE c_old;",
                "DROP TABLE z_old;",
                "CREATE TABLE a_new (\n  id int(11) NOT NULL\n);",
                "ALTER TABLE b_keep MODIFY COLUMN a bigint(20) NOT NULL;",
            ]
        );
    }

    #[test]
    fn unsupported_tables_are_skipped_not_fatal() {
        let mut from = deleted_object();
        from.mark_unsupported("FULLTEXT index ft_body");
        let mut to = deleted_object();
        to.columns.shift_remove("objectId");

        let other_from = TableSchema::new("other").with_column(ColumnDef::new("a", "int(11)")).unwrap();
        let other_to = TableSchema::new("other").with_column(ColumnDef::new("b", "int(11)")).unwrap();

        let migration = MigrationGenerator::default()
            .generate(&schema("a", vec![from, other_from]), &schema("b", vec![to, other_to]))
            .unwrap();

        assert_eq!(migration.skipped.len(), 1);
        assert_eq!(migration.skipped[0].table, "deletedObject");
        assert_eq!(
            migration.to_sql(false),
            vec!["ALTER TABLE other DROP COLUMN a;", "ALTER TABLE other ADD COLUMN b int(11) NOT NULL;"]
        );
    }

    #[tokio::test]
    async fn parallel_generation_matches_sequential() {
        let from: Vec<TableSchema> = (0..20)
            .map(|i| {
                TableSchema::new(&format!("t{i:02}"))
                    .with_column(ColumnDef::new("a", "int(11)"))
                    .unwrap()
            })
            .collect();
        let to: Vec<TableSchema> = (0..20)
            .map(|i| {
                TableSchema::new(&format!("t{i:02}"))
                    .with_column(ColumnDef::new("a", if i % 2 == 0 { "bigint(20)" } else { "int(11)" }))
                    .unwrap()
            })
            .collect();
        let (from, to) = (schema("a", from), schema("b", to));

        let config = DiffConfig {
            workers: 4,
            ..DiffConfig::default()
        };
        let parallel = MigrationGenerator::new(&config).generate_parallel(&from, &to).await.unwrap();
        let sequential = MigrationGenerator::default().generate(&from, &to).unwrap();

        assert_eq!(parallel, sequential);
        assert_eq!(parallel.statements.len(), 10);
    }

    #[test]
    fn dml_file_starts_with_use() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("migration.sql");

        write_dml_file(&path, "shop", &["DROP TABLE t;".to_string()], None).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "-- schema_diff migration\nUSE shop;\nDROP TABLE t;\n");
    }

    #[test]
    fn dml_file_is_stable_across_runs_unless_stamped() {
        let dir = tempfile::tempdir().unwrap();
        let statements = vec!["ALTER TABLE t DROP COLUMN a;".to_string()];
        let first = dir.path().join("first.sql");
        let second = dir.path().join("second.sql");
        let stamped = dir.path().join("stamped.sql");

        write_dml_file(&first, "shop", &statements, None).unwrap();
        write_dml_file(&second, "shop", &statements, None).unwrap();
        let at = DateTime::parse_from_rfc3339("2024-05-01T12:30:00Z").unwrap().with_timezone(&Utc);
        write_dml_file(&stamped, "shop", &statements, Some(at)).unwrap();

        assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
        let stamped = fs::read_to_string(&stamped).unwrap();
        assert!(stamped.starts_with("-- schema_diff migration generated 2024-05-01 12:30:00 UTC\nUSE shop;\n"));
    }
}
