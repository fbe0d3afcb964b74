//! DDL clause builder
//!
//! Statements are assembled from typed clauses and only turned into text at the
//! edge. The text produced here is the compatibility surface consumers parse and
//! replay, so keyword spellings and spacing must stay stable.

use std::fmt;

use crate::schema::types::{
    ColumnDef, ColumnDefault, ForeignKeyDef, IndexColumn, IndexDef, IndexKind, TableSchema,
};
use crate::utils::naming::escape_identifier;

/// Types whose literal defaults must be quoted
const QUOTED_TYPES: &[&str] = &[
    "char", "varchar", "binary", "varbinary", "tinytext", "text", "mediumtext", "longtext",
    "tinyblob", "blob", "mediumblob", "longblob", "enum", "set",
];

/// The phase an ALTER TABLE clause belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Drop,
    Add,
}

/// One clause of an ALTER TABLE statement
#[derive(Debug, Clone, PartialEq)]
pub enum AlterClause {
    DropColumn(String),
    DropIndex(String),
    DropPrimaryKey,
    DropForeignKey(String),
    AddColumn(ColumnDef),
    AddIndex(IndexDef),
    AddForeignKey(ForeignKeyDef),
    ModifyColumn(ColumnDef),
    Engine(String),
}

impl AlterClause {
    /// The drop clause for an index; the primary key is dropped without a name
    pub fn drop_index(index: &IndexDef) -> Self {
        if index.is_primary() {
            AlterClause::DropPrimaryKey
        } else {
            AlterClause::DropIndex(index.name.clone())
        }
    }

    pub fn phase(&self) -> Phase {
        match self {
            AlterClause::DropColumn(_)
            | AlterClause::DropIndex(_)
            | AlterClause::DropPrimaryKey
            | AlterClause::DropForeignKey(_) => Phase::Drop,
            AlterClause::AddColumn(_)
            | AlterClause::AddIndex(_)
            | AlterClause::AddForeignKey(_)
            | AlterClause::ModifyColumn(_)
            | AlterClause::Engine(_) => Phase::Add,
        }
    }
}

impl fmt::Display for AlterClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlterClause::DropColumn(name) => write!(f, "DROP COLUMN {}", escape_identifier(name)),
            AlterClause::DropIndex(name) => write!(f, "DROP INDEX {}", escape_identifier(name)),
            AlterClause::DropPrimaryKey => write!(f, "DROP PRIMARY KEY"),
            AlterClause::DropForeignKey(name) => {
                write!(f, "DROP FOREIGN KEY {}", escape_identifier(name))
            }
            AlterClause::AddColumn(column) => write!(f, "ADD COLUMN {}", column_definition(column)),
            AlterClause::AddIndex(index) => match index.kind {
                IndexKind::Primary => {
                    write!(f, "ADD PRIMARY KEY ({})", index_column_list(&index.columns))
                }
                IndexKind::Unique | IndexKind::Plain => write!(
                    f,
                    "ADD {} {}({})",
                    index.kind,
                    escape_identifier(&index.name),
                    index_column_list(&index.columns)
                ),
            },
            AlterClause::AddForeignKey(fk) => write!(
                f,
                "ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {}({})",
                escape_identifier(&fk.name),
                identifier_list(&fk.columns),
                escape_identifier(&fk.referenced_table),
                identifier_list(&fk.referenced_columns)
            ),
            AlterClause::ModifyColumn(column) => {
                write!(f, "MODIFY COLUMN {}", column_definition(column))
            }
            AlterClause::Engine(engine) => write!(f, "ENGINE = {}", engine),
        }
    }
}

/// A single ALTER TABLE statement holding clauses of one phase
#[derive(Debug, Clone, PartialEq)]
pub struct AlterTable {
    pub table: String,
    pub phase: Phase,
    pub clauses: Vec<AlterClause>,
}

/// A DDL statement produced by the diff
#[derive(Debug, Clone, PartialEq)]
pub enum DdlStatement {
    DropTable(String),
    CreateTable(TableSchema),
    AlterTable(AlterTable),
}

impl DdlStatement {
    /// Name of the table the statement touches
    pub fn table(&self) -> &str {
        match self {
            DdlStatement::DropTable(name) => name,
            DdlStatement::CreateTable(table) => &table.name,
            DdlStatement::AlterTable(alter) => &alter.table,
        }
    }

    /// Render the statement, optionally with one clause per line
    pub fn render(&self, pretty: bool) -> String {
        match self {
            DdlStatement::AlterTable(alter) if pretty => {
                let clauses: Vec<String> = alter.clauses.iter().map(|c| c.to_string()).collect();
                format!(
                    "ALTER TABLE {}\n\t{}\n\t;",
                    escape_identifier(&alter.table),
                    clauses.join(",\n\t")
                )
            }
            _ => self.to_string(),
        }
    }
}

impl fmt::Display for DdlStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DdlStatement::DropTable(name) => write!(f, "DROP TABLE {};", escape_identifier(name)),
            DdlStatement::CreateTable(table) => match &table.definition {
                Some(definition) => write!(f, "{};", definition.trim_end().trim_end_matches(';')),
                None => write!(f, "{};", create_table_sql(table)),
            },
            DdlStatement::AlterTable(alter) => {
                let clauses: Vec<String> = alter.clauses.iter().map(|c| c.to_string()).collect();
                write!(
                    f,
                    "ALTER TABLE {} {};",
                    escape_identifier(&alter.table),
                    clauses.join(", ")
                )
            }
        }
    }
}

/// Render a list of statements as SQL text
pub fn render_statements(statements: &[DdlStatement], pretty: bool) -> Vec<String> {
    statements.iter().map(|s| s.render(pretty)).collect()
}

/// Full column definition as used by ADD COLUMN, MODIFY COLUMN and CREATE TABLE
pub fn column_definition(column: &ColumnDef) -> String {
    let mut sql = format!("{} {}", escape_identifier(&column.name), column.column_type);

    if !column.nullable {
        sql.push_str(" NOT NULL");
    } else if column.base_type() == "timestamp" {
        // Without an explicit NULL older servers silently make timestamps NOT NULL
        sql.push_str(" NULL");
    }

    if let Some(default) = &column.default {
        sql.push_str(" DEFAULT ");
        sql.push_str(&default_value(column, default));
    }

    if !column.extra.is_empty() {
        sql.push(' ');
        sql.push_str(&column.extra);
    }

    if let Some(comment) = &column.comment {
        sql.push_str(" COMMENT ");
        sql.push_str(&quote_literal(comment));
    }

    sql
}

fn default_value(column: &ColumnDef, default: &ColumnDefault) -> String {
    match default {
        ColumnDefault::CurrentTimestamp { precision: None } => "CURRENT_TIMESTAMP".to_string(),
        ColumnDefault::CurrentTimestamp { precision: Some(p) } => format!("CURRENT_TIMESTAMP({})", p),
        ColumnDefault::Expression(expr) => format!("({})", expr),
        ColumnDefault::Literal(value) => {
            let base = column.base_type();
            if value.is_empty() || column.is_temporal() || QUOTED_TYPES.contains(&base.as_str()) {
                quote_literal(value)
            } else {
                value.clone()
            }
        }
    }
}

/// Quote a string literal, escaping quotes and backslashes
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}

fn index_column_list(columns: &[IndexColumn]) -> String {
    columns
        .iter()
        .map(|c| match c.prefix {
            Some(prefix) => format!("{}({})", escape_identifier(&c.name), prefix),
            None => escape_identifier(&c.name),
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn identifier_list(names: &[String]) -> String {
    names
        .iter()
        .map(|n| escape_identifier(n))
        .collect::<Vec<_>>()
        .join(",")
}

/// Synthesize a CREATE TABLE statement (without the trailing semicolon)
pub fn create_table_sql(table: &TableSchema) -> String {
    let mut parts: Vec<String> = table
        .columns
        .values()
        .map(|c| format!("  {}", column_definition(c)))
        .collect();

    for index in table.indexes.values() {
        let columns = index_column_list(&index.columns);
        parts.push(match index.kind {
            IndexKind::Primary => format!("  PRIMARY KEY ({})", columns),
            IndexKind::Unique | IndexKind::Plain => format!(
                "  {} {} ({})",
                index.kind,
                escape_identifier(&index.name),
                columns
            ),
        });
    }

    for fk in table.foreign_keys.values() {
        parts.push(format!(
            "  CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            escape_identifier(&fk.name),
            identifier_list(&fk.columns),
            escape_identifier(&fk.referenced_table),
            identifier_list(&fk.referenced_columns)
        ));
    }

    let mut sql = format!("CREATE TABLE {} (\n{}\n)", escape_identifier(&table.name), parts.join(",\n"));
    if let Some(engine) = &table.engine {
        sql.push_str(&format!(" ENGINE={}", engine));
    }
    sql
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn column_definitions() {
        let col = ColumnDef::new("objectType", "smallint(6)");
        assert_eq!(column_definition(&col), "objectType smallint(6) NOT NULL");

        let col = ColumnDef::new("objectId", "bigint(20)").nullable(true);
        assert_eq!(column_definition(&col), "objectId bigint(20)");

        let col = ColumnDef::new("deleteDate", "timestamp")
            .default_raw("CURRENT_TIMESTAMP")
            .extra("on update CURRENT_TIMESTAMP");
        assert_eq!(
            column_definition(&col),
            "deleteDate timestamp NOT NULL DEFAULT CURRENT_TIMESTAMP on update CURRENT_TIMESTAMP"
        );

        let col = ColumnDef::new("created", "datetime").default_raw("2000-01-01 00:00:00");
        assert_eq!(column_definition(&col), "created datetime NOT NULL DEFAULT '2000-01-01 00:00:00'");

        let col = ColumnDef::new("counter", "int(11)").default_raw("0");
        assert_eq!(column_definition(&col), "counter int(11) NOT NULL DEFAULT 0");

        let col = ColumnDef::new("title", "varchar(64)").default_raw("");
        assert_eq!(column_definition(&col), "title varchar(64) NOT NULL DEFAULT ''");

        let col = ColumnDef::new("note", "varchar(64)")
            .nullable(true)
            .comment("it's a \\note");
        assert_eq!(column_definition(&col), "note varchar(64) COMMENT 'it''s a \\\\note'");

        let col = ColumnDef::new("seen", "timestamp").nullable(true);
        assert_eq!(column_definition(&col), "seen timestamp NULL");
    }

    #[test]
    fn clause_spellings() {
        let cases = vec![
            (AlterClause::DropColumn("objectId".into()), "DROP COLUMN objectId"),
            (AlterClause::drop_index(&IndexDef::plain("key_add", &["c"])), "DROP INDEX key_add"),
            (AlterClause::drop_index(&IndexDef::primary(&["id"])), "DROP PRIMARY KEY"),
            (AlterClause::DropForeignKey("fk_user".into()), "DROP FOREIGN KEY fk_user"),
            (
                AlterClause::AddIndex(IndexDef::plain("key_add", &["column2", "column3"])),
                "ADD KEY key_add(column2,column3)",
            ),
            (
                AlterClause::AddIndex(IndexDef::unique("uq_email", &["email"])),
                "ADD UNIQUE KEY uq_email(email)",
            ),
            (
                AlterClause::AddIndex(IndexDef::primary(&["column1", "column2"])),
                "ADD PRIMARY KEY (column1,column2)",
            ),
            (
                AlterClause::AddIndex(IndexDef::new(
                    "k_name",
                    IndexKind::Plain,
                    vec![IndexColumn::with_prefix("name", 10), IndexColumn::new("id")],
                )),
                "ADD KEY k_name(name(10),id)",
            ),
            (
                AlterClause::AddForeignKey(ForeignKeyDef::new("fk_order_user", &["user_id", "tenant_id"], "users", &["id", "tenant_id"])),
                "ADD CONSTRAINT fk_order_user FOREIGN KEY (user_id,tenant_id) REFERENCES users(id,tenant_id)",
            ),
            (AlterClause::Engine("MyISAM".into()), "ENGINE = MyISAM"),
        ];

        for (clause, expected) in cases {
            assert_eq!(clause.to_string(), expected);
        }
    }

    #[test]
    fn alter_table_rendering() {
        let statement = DdlStatement::AlterTable(AlterTable {
            table: "mytable".into(),
            phase: Phase::Drop,
            clauses: vec![
                AlterClause::DropColumn("a".into()),
                AlterClause::DropIndex("k".into()),
            ],
        });

        assert_eq!(statement.to_string(), "ALTER TABLE mytable DROP COLUMN a, DROP INDEX k;");
        assert_eq!(
            statement.render(true),
            "ALTER TABLE mytable\n\tDROP COLUMN a,\n\tDROP INDEX k\n\t;"
        );
    }

    #[test]
    fn reserved_names_are_quoted() {
        let clause = AlterClause::DropColumn("order".into());
        assert_eq!(clause.to_string(), "DROP COLUMN `order`");
    }

    #[test]
    fn create_table_prefers_verbatim_definition() {
        let mut table = TableSchema::new("t")
            .with_column(ColumnDef::new("id", "int(11)"))
            .unwrap()
            .with_index(IndexDef::primary(&["id"]))
            .unwrap()
            .with_engine("InnoDB");

        assert_eq!(
            DdlStatement::CreateTable(table.clone()).to_string(),
            "CREATE TABLE t (\n  id int(11) NOT NULL,\n  PRIMARY KEY (id)\n) ENGINE=InnoDB;"
        );

        table.definition = Some("CREATE TABLE `t` (\n  `id` int(11) NOT NULL\n) ENGINE=InnoDB".into());
        assert_eq!(
            DdlStatement::CreateTable(table).to_string(),
            "CREATE TABLE `t` (\n  `id` int(11) NOT NULL\n) ENGINE=InnoDB;"
        );
    }

    #[test]
    fn drop_table() {
        assert_eq!(DdlStatement::DropTable("old_stuff".into()).to_string(), "DROP TABLE old_stuff;");
    }
}
