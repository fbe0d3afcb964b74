//! Database schema analyzer
//!
//! This module builds typed schema snapshots from MySQL's `information_schema`.
//! Every query binds the schema name as a parameter; only `SHOW CREATE TABLE`
//! needs an identifier spliced in, and it is backtick-quoted.
//!
//! Text columns are cast to `CHAR` because MySQL 8 reports several
//! `information_schema` columns with binary collations.

use async_trait::async_trait;
use indexmap::IndexMap;
use sqlx::{FromRow, MySqlPool, Row};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::schema::types::{
    ColumnDef, ColumnDefault, DatabaseSchema, ForeignKeyDef, IndexColumn, IndexDef, IndexKind,
    TableSchema, PRIMARY_KEY_NAME,
};
use crate::utils::naming::quote_identifier;

/// Source of schema snapshots
#[async_trait]
pub trait SchemaSnapshotProvider: Send + Sync {
    /// Fully materialized snapshot of one database
    async fn fetch_schema(&self, database: &str) -> Result<DatabaseSchema>;

    /// Raw schema dump of one database, as fed to the checksummer
    async fn dump_schema(&self, database: &str) -> Result<String>;
}

#[derive(FromRow)]
struct TableRow {
    table_name: String,
    engine: Option<String>,
}

#[derive(FromRow)]
struct ColumnRow {
    table_name: String,
    column_name: String,
    column_type: String,
    is_nullable: String,
    column_default: Option<String>,
    extra: String,
    column_comment: String,
}

#[derive(FromRow)]
struct IndexRow {
    table_name: String,
    index_name: String,
    non_unique: i64,
    column_name: Option<String>,
    sub_part: Option<i64>,
    index_type: String,
    collation: Option<String>,
}

#[derive(FromRow)]
struct ForeignKeyRow {
    table_name: String,
    constraint_name: String,
    column_name: String,
    referenced_table_schema: String,
    referenced_table_name: String,
    referenced_column_name: String,
    update_rule: String,
    delete_rule: String,
}

/// Schema analyzer for MySQL databases
#[derive(Debug, Clone)]
pub struct MySqlAnalyzer {
    pool: MySqlPool,
}

impl MySqlAnalyzer {
    /// Create a new schema analyzer
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn ensure_exists(&self, database: &str) -> Result<()> {
        let sql = r#"
            SELECT CAST(schema_name AS CHAR) AS schema_name
            FROM information_schema.schemata
            WHERE schema_name = ?
        "#;

        let found = sqlx::query(sql)
            .bind(database)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| unavailable(database, e))?;

        match found {
            Some(_) => Ok(()),
            None => Err(Error::MetadataUnavailable {
                schema: database.to_string(),
                reason: "schema does not exist".to_string(),
            }),
        }
    }

    async fn table_rows(&self, database: &str) -> Result<Vec<TableRow>> {
        let sql = r#"
            SELECT CAST(table_name AS CHAR) AS table_name,
                   CAST(engine AS CHAR) AS engine
            FROM information_schema.tables
            WHERE table_schema = ?
              AND table_type = 'BASE TABLE'
            ORDER BY table_name
        "#;

        sqlx::query_as::<_, TableRow>(sql)
            .bind(database)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| unavailable(database, e))
    }

    async fn column_rows(&self, database: &str) -> Result<Vec<ColumnRow>> {
        let sql = r#"
            SELECT CAST(table_name AS CHAR) AS table_name,
                   CAST(column_name AS CHAR) AS column_name,
                   CAST(column_type AS CHAR) AS column_type,
                   CAST(is_nullable AS CHAR) AS is_nullable,
                   CAST(column_default AS CHAR) AS column_default,
                   CAST(extra AS CHAR) AS extra,
                   CAST(column_comment AS CHAR) AS column_comment
            FROM information_schema.columns
            WHERE table_schema = ?
            ORDER BY table_name, ordinal_position
        "#;

        sqlx::query_as::<_, ColumnRow>(sql)
            .bind(database)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| unavailable(database, e))
    }

    async fn index_rows(&self, database: &str) -> Result<Vec<IndexRow>> {
        let sql = r#"
            SELECT CAST(table_name AS CHAR) AS table_name,
                   CAST(index_name AS CHAR) AS index_name,
                   CAST(non_unique AS SIGNED) AS non_unique,
                   CAST(column_name AS CHAR) AS column_name,
                   CAST(sub_part AS SIGNED) AS sub_part,
                   CAST(index_type AS CHAR) AS index_type,
                   CAST(collation AS CHAR) AS collation
            FROM information_schema.statistics
            WHERE table_schema = ?
            ORDER BY table_name, index_name, seq_in_index
        "#;

        sqlx::query_as::<_, IndexRow>(sql)
            .bind(database)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| unavailable(database, e))
    }

    async fn foreign_key_rows(&self, database: &str) -> Result<Vec<ForeignKeyRow>> {
        let sql = r#"
            SELECT CAST(kcu.table_name AS CHAR) AS table_name,
                   CAST(kcu.constraint_name AS CHAR) AS constraint_name,
                   CAST(kcu.column_name AS CHAR) AS column_name,
                   CAST(kcu.referenced_table_schema AS CHAR) AS referenced_table_schema,
                   CAST(kcu.referenced_table_name AS CHAR) AS referenced_table_name,
                   CAST(kcu.referenced_column_name AS CHAR) AS referenced_column_name,
                   CAST(rc.update_rule AS CHAR) AS update_rule,
                   CAST(rc.delete_rule AS CHAR) AS delete_rule
            FROM information_schema.key_column_usage kcu
            JOIN information_schema.referential_constraints rc
              ON rc.constraint_schema = kcu.constraint_schema
             AND rc.constraint_name = kcu.constraint_name
             AND rc.table_name = kcu.table_name
            WHERE kcu.table_schema = ?
              AND kcu.referenced_table_name IS NOT NULL
            ORDER BY kcu.table_name, kcu.constraint_name, kcu.ordinal_position
        "#;

        sqlx::query_as::<_, ForeignKeyRow>(sql)
            .bind(database)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| unavailable(database, e))
    }

    /// Verbatim `SHOW CREATE TABLE` output for one table
    pub async fn show_create_table(&self, database: &str, table: &str) -> Result<String> {
        let sql = format!(
            "SHOW CREATE TABLE {}.{}",
            quote_identifier(database),
            quote_identifier(table)
        );

        let row = sqlx::query(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| unavailable(database, e))?;

        row.try_get::<String, _>(1).map_err(|e| unavailable(database, e))
    }
}

#[async_trait]
impl SchemaSnapshotProvider for MySqlAnalyzer {
    async fn fetch_schema(&self, database: &str) -> Result<DatabaseSchema> {
        self.ensure_exists(database).await?;

        let table_rows = self.table_rows(database).await?;
        let mut tables: BTreeMap<String, TableSchema> = BTreeMap::new();
        for row in table_rows {
            let mut table = TableSchema::new(&row.table_name);
            table.engine = row.engine;
            table.definition = Some(self.show_create_table(database, &row.table_name).await?);
            tables.insert(row.table_name, table);
        }

        add_columns(&mut tables, self.column_rows(database).await?)?;
        add_indexes(&mut tables, self.index_rows(database).await?)?;
        add_foreign_keys(&mut tables, database, self.foreign_key_rows(database).await?)?;

        let mut schema = DatabaseSchema::new(database);
        for table in tables.into_values() {
            schema.add_table(table)?;
        }

        tracing::debug!(schema = database, tables = schema.tables.len(), "Fetched schema snapshot");
        Ok(schema)
    }

    async fn dump_schema(&self, database: &str) -> Result<String> {
        self.ensure_exists(database).await?;

        let mut dump = String::new();
        for row in self.table_rows(database).await? {
            dump.push_str(&self.show_create_table(database, &row.table_name).await?);
            dump.push_str(";\n\n");
        }
        Ok(dump)
    }
}

fn unavailable(database: &str, error: sqlx::Error) -> Error {
    Error::MetadataUnavailable {
        schema: database.to_string(),
        reason: error.to_string(),
    }
}

fn add_columns(tables: &mut BTreeMap<String, TableSchema>, rows: Vec<ColumnRow>) -> Result<()> {
    for row in rows {
        let Some(table) = tables.get_mut(&row.table_name) else {
            continue;
        };

        let generated_default = has_generated_default(&row.extra);
        let extra = normalize_extra(&row.extra);
        if extra.to_lowercase().contains("generated") {
            table.mark_unsupported(format!("generated column {}", row.column_name));
        }

        let column = ColumnDef {
            default: row
                .column_default
                .as_deref()
                .map(|raw| {
                    if generated_default {
                        ColumnDefault::from_generated(raw, &row.column_type)
                    } else {
                        ColumnDefault::from_raw(raw, &row.column_type)
                    }
                }),
            name: row.column_name,
            column_type: row.column_type,
            nullable: row.is_nullable == "YES",
            extra,
            comment: (!row.column_comment.is_empty()).then_some(row.column_comment),
        };
        table.add_column(column)?;
    }
    Ok(())
}

const DEFAULT_GENERATED: &str = "DEFAULT_GENERATED";

/// MySQL 8 flags expression defaults with `DEFAULT_GENERATED`; it is not a column modifier
fn normalize_extra(extra: &str) -> String {
    extra
        .split_whitespace()
        .filter(|token| !token.eq_ignore_ascii_case(DEFAULT_GENERATED))
        .collect::<Vec<_>>()
        .join(" ")
}

fn has_generated_default(extra: &str) -> bool {
    extra
        .split_whitespace()
        .any(|token| token.eq_ignore_ascii_case(DEFAULT_GENERATED))
}

fn add_indexes(tables: &mut BTreeMap<String, TableSchema>, rows: Vec<IndexRow>) -> Result<()> {
    let mut grouped: IndexMap<(String, String), (IndexKind, Vec<IndexColumn>)> = IndexMap::new();

    for row in rows {
        let Some(table) = tables.get_mut(&row.table_name) else {
            continue;
        };

        let index_type = row.index_type.to_uppercase();
        if index_type == "FULLTEXT" || index_type == "SPATIAL" {
            table.mark_unsupported(format!("{} index {}", index_type, row.index_name));
            continue;
        }
        if row.collation.as_deref() == Some("D") {
            table.mark_unsupported(format!("descending index {}", row.index_name));
            continue;
        }
        let Some(column_name) = row.column_name else {
            table.mark_unsupported(format!("functional index {}", row.index_name));
            continue;
        };

        let kind = if row.index_name == PRIMARY_KEY_NAME {
            IndexKind::Primary
        } else if row.non_unique == 0 {
            IndexKind::Unique
        } else {
            IndexKind::Plain
        };

        let column = match row.sub_part {
            Some(prefix) if prefix > 0 => IndexColumn::with_prefix(&column_name, prefix as u32),
            _ => IndexColumn::new(&column_name),
        };

        grouped
            .entry((row.table_name, row.index_name))
            .or_insert_with(|| (kind, Vec::new()))
            .1
            .push(column);
    }

    for ((table_name, index_name), (kind, columns)) in grouped {
        if let Some(table) = tables.get_mut(&table_name) {
            table.add_index(IndexDef::new(&index_name, kind, columns))?;
        }
    }
    Ok(())
}

fn add_foreign_keys(
    tables: &mut BTreeMap<String, TableSchema>,
    database: &str,
    rows: Vec<ForeignKeyRow>,
) -> Result<()> {
    let mut grouped: IndexMap<(String, String), ForeignKeyDef> = IndexMap::new();

    for row in rows {
        let Some(table) = tables.get_mut(&row.table_name) else {
            continue;
        };

        if row.referenced_table_schema != database {
            table.mark_unsupported(format!(
                "cross-schema foreign key {} to {}",
                row.constraint_name, row.referenced_table_schema
            ));
            continue;
        }
        for (action, rule) in [("ON UPDATE", &row.update_rule), ("ON DELETE", &row.delete_rule)] {
            if !is_default_rule(rule) {
                table.mark_unsupported(format!("foreign key {} {} {}", row.constraint_name, action, rule));
            }
        }

        let fk = grouped
            .entry((row.table_name.clone(), row.constraint_name.clone()))
            .or_insert_with(|| ForeignKeyDef::new(&row.constraint_name, &[], &row.referenced_table_name, &[]));
        fk.columns.push(row.column_name);
        fk.referenced_columns.push(row.referenced_column_name);
    }

    for ((table_name, _), fk) in grouped {
        if let Some(table) = tables.get_mut(&table_name) {
            table.add_foreign_key(fk)?;
        }
    }
    Ok(())
}

fn is_default_rule(rule: &str) -> bool {
    rule.eq_ignore_ascii_case("RESTRICT") || rule.eq_ignore_ascii_case("NO ACTION")
}
