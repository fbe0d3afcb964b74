//! Type definitions for database schema objects
//!
//! Snapshots are built once at the provider boundary and never mutated by the
//! diff core. Columns, indexes and foreign keys are kept in insertion order so
//! that rendering and diff output follow the order the provider reported them.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};

/// Name MySQL reserves for the primary key index
pub const PRIMARY_KEY_NAME: &str = "PRIMARY";

const TEMPORAL_TYPES: &[&str] = &["timestamp", "datetime", "date", "time"];

/// Represents a complete database schema
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseSchema {
    pub name: String,
    pub tables: BTreeMap<String, TableSchema>,
}

impl DatabaseSchema {
    /// Create a new empty database schema
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tables: BTreeMap::new(),
        }
    }

    /// Add a table to the schema
    pub fn add_table(&mut self, table: TableSchema) -> Result<()> {
        if self.tables.contains_key(&table.name) {
            return Err(Error::AmbiguousIdentity {
                table: table.name.clone(),
                kind: "table",
                name: table.name,
            });
        }
        self.tables.insert(table.name.clone(), table);
        Ok(())
    }

    /// Builder-style variant of [`DatabaseSchema::add_table`]
    pub fn with_table(mut self, table: TableSchema) -> Result<Self> {
        self.add_table(table)?;
        Ok(self)
    }
}

/// Represents a database table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableSchema {
    pub name: String,
    pub columns: IndexMap<String, ColumnDef>,
    pub indexes: IndexMap<String, IndexDef>,
    pub foreign_keys: IndexMap<String, ForeignKeyDef>,
    pub engine: Option<String>,
    /// Verbatim `SHOW CREATE TABLE` output, when the provider captured it
    pub definition: Option<String>,
    /// Constructs the diff cannot express, e.g. `FULLTEXT index ft_body`
    pub unsupported: Vec<String>,
}

impl TableSchema {
    /// Create a new table with the given name
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            columns: IndexMap::new(),
            indexes: IndexMap::new(),
            foreign_keys: IndexMap::new(),
            engine: None,
            definition: None,
            unsupported: Vec::new(),
        }
    }

    /// Add a column to the table
    pub fn add_column(&mut self, column: ColumnDef) -> Result<()> {
        if self.columns.contains_key(&column.name) {
            return Err(self.duplicate("column", &column.name));
        }
        self.columns.insert(column.name.clone(), column);
        Ok(())
    }

    /// Add an index to the table
    pub fn add_index(&mut self, index: IndexDef) -> Result<()> {
        if self.indexes.contains_key(&index.name) {
            return Err(self.duplicate("index", &index.name));
        }
        self.indexes.insert(index.name.clone(), index);
        Ok(())
    }

    /// Add a foreign key to the table
    pub fn add_foreign_key(&mut self, fk: ForeignKeyDef) -> Result<()> {
        if self.foreign_keys.contains_key(&fk.name) {
            return Err(self.duplicate("foreign key", &fk.name));
        }
        self.foreign_keys.insert(fk.name.clone(), fk);
        Ok(())
    }

    /// Record a construct outside the modelled subset
    pub fn mark_unsupported(&mut self, construct: impl Into<String>) {
        let construct = construct.into();
        if !self.unsupported.contains(&construct) {
            self.unsupported.push(construct);
        }
    }

    pub fn with_column(mut self, column: ColumnDef) -> Result<Self> {
        self.add_column(column)?;
        Ok(self)
    }

    pub fn with_index(mut self, index: IndexDef) -> Result<Self> {
        self.add_index(index)?;
        Ok(self)
    }

    pub fn with_foreign_key(mut self, fk: ForeignKeyDef) -> Result<Self> {
        self.add_foreign_key(fk)?;
        Ok(self)
    }

    pub fn with_engine(mut self, engine: &str) -> Self {
        self.engine = Some(engine.to_string());
        self
    }

    /// Get the primary key index, if the table has one
    pub fn primary_key(&self) -> Option<&IndexDef> {
        self.indexes.get(PRIMARY_KEY_NAME)
    }

    fn duplicate(&self, kind: &'static str, name: &str) -> Error {
        Error::AmbiguousIdentity {
            table: self.name.clone(),
            kind,
            name: name.to_string(),
        }
    }
}

/// Represents a database column
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    /// Engine-native type, e.g. `bigint(20)` or `smallint(6) unsigned`
    pub column_type: String,
    pub nullable: bool,
    pub default: Option<ColumnDefault>,
    /// Engine-native modifiers such as `auto_increment`
    pub extra: String,
    pub comment: Option<String>,
}

impl ColumnDef {
    /// Create a new `NOT NULL` column with the given name and type
    pub fn new(name: &str, column_type: &str) -> Self {
        Self {
            name: name.to_string(),
            column_type: column_type.to_string(),
            nullable: false,
            default: None,
            extra: String::new(),
            comment: None,
        }
    }

    /// Set whether the column is nullable
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Set a default value for the column
    pub fn default(mut self, default: ColumnDefault) -> Self {
        self.default = Some(default);
        self
    }

    /// Set a default from its raw metadata spelling
    pub fn default_raw(self, raw: &str) -> Self {
        let default = ColumnDefault::from_raw(raw, &self.column_type);
        self.default(default)
    }

    pub fn extra(mut self, extra: &str) -> Self {
        self.extra = extra.to_string();
        self
    }

    pub fn comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.to_string());
        self
    }

    /// Lower-cased type name without length, precision or modifiers
    pub fn base_type(&self) -> String {
        base_type(&self.column_type)
    }

    pub fn is_temporal(&self) -> bool {
        TEMPORAL_TYPES.contains(&self.base_type().as_str())
    }
}

/// Lower-cased type name of an engine-native type string
pub fn base_type(column_type: &str) -> String {
    column_type
        .split(|c: char| c == '(' || c.is_whitespace())
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

/// A column default
///
/// "No default" is `Option::None` on the column; an empty string literal is a
/// real default and stays distinct from it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ColumnDefault {
    Literal(String),
    /// The current-timestamp function on a temporal column, compared symbolically
    CurrentTimestamp { precision: Option<u8> },
    /// Any other expression default (MySQL 8 `DEFAULT_GENERATED`), kept verbatim
    Expression(String),
}

impl ColumnDefault {
    pub fn literal(value: &str) -> Self {
        ColumnDefault::Literal(value.to_string())
    }

    /// Interpret a raw `COLUMN_DEFAULT` value for a column of `column_type`
    pub fn from_raw(raw: &str, column_type: &str) -> Self {
        if TEMPORAL_TYPES.contains(&base_type(column_type).as_str()) {
            if let Some(precision) = parse_current_timestamp(raw) {
                return ColumnDefault::CurrentTimestamp { precision };
            }
        }
        ColumnDefault::Literal(raw.to_string())
    }

    /// Interpret a raw default the server flagged as an expression
    ///
    /// `information_schema` backslash-escapes quotes inside expressions.
    pub fn from_generated(raw: &str, column_type: &str) -> Self {
        match Self::from_raw(raw, column_type) {
            ColumnDefault::Literal(_) => ColumnDefault::Expression(raw.replace("\\'", "'")),
            symbolic => symbolic,
        }
    }
}

/// Recognises `CURRENT_TIMESTAMP`, `current_timestamp()`, `now(3)` and friends.
/// Returns the optional fractional-seconds precision.
fn parse_current_timestamp(raw: &str) -> Option<Option<u8>> {
    let lowered = raw.trim().to_lowercase();
    let (function, args) = match lowered.find('(') {
        Some(open) if lowered.ends_with(')') => {
            (&lowered[..open], &lowered[open + 1..lowered.len() - 1])
        }
        Some(_) => return None,
        None => (lowered.as_str(), ""),
    };

    match function.trim() {
        "current_timestamp" | "now" | "localtimestamp" | "localtime" => {}
        _ => return None,
    }

    let args = args.trim();
    if args.is_empty() {
        Some(None)
    } else {
        args.parse::<u8>().ok().map(|p| if p == 0 { None } else { Some(p) })
    }
}

/// Kind of an index
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexKind {
    Primary,
    Unique,
    Plain,
}

impl IndexKind {
    /// Plain indexes are emitted before unique and primary-key indexes
    pub(crate) fn emit_rank(self) -> u8 {
        match self {
            IndexKind::Plain => 0,
            IndexKind::Unique | IndexKind::Primary => 1,
        }
    }
}

/// One column of an index, optionally with a prefix length
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexColumn {
    pub name: String,
    pub prefix: Option<u32>,
}

impl IndexColumn {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            prefix: None,
        }
    }

    pub fn with_prefix(name: &str, prefix: u32) -> Self {
        Self {
            name: name.to_string(),
            prefix: Some(prefix),
        }
    }
}

/// Represents an index; column order is significant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexDef {
    pub name: String,
    pub kind: IndexKind,
    pub columns: Vec<IndexColumn>,
}

impl IndexDef {
    pub fn new(name: &str, kind: IndexKind, columns: Vec<IndexColumn>) -> Self {
        let name = if kind == IndexKind::Primary {
            PRIMARY_KEY_NAME
        } else {
            name
        };
        Self {
            name: name.to_string(),
            kind,
            columns,
        }
    }

    pub fn primary(columns: &[&str]) -> Self {
        Self::new(PRIMARY_KEY_NAME, IndexKind::Primary, plain_columns(columns))
    }

    pub fn unique(name: &str, columns: &[&str]) -> Self {
        Self::new(name, IndexKind::Unique, plain_columns(columns))
    }

    pub fn plain(name: &str, columns: &[&str]) -> Self {
        Self::new(name, IndexKind::Plain, plain_columns(columns))
    }

    pub fn is_primary(&self) -> bool {
        self.kind == IndexKind::Primary
    }

    pub fn references_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c.name == column)
    }
}

fn plain_columns(columns: &[&str]) -> Vec<IndexColumn> {
    columns.iter().map(|c| IndexColumn::new(c)).collect()
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKind::Primary => write!(f, "PRIMARY KEY"),
            IndexKind::Unique => write!(f, "UNIQUE KEY"),
            IndexKind::Plain => write!(f, "KEY"),
        }
    }
}

/// Represents a foreign key constraint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForeignKeyDef {
    pub name: String,
    pub columns: Vec<String>,
    pub referenced_table: String,
    /// Positionally paired with `columns`
    pub referenced_columns: Vec<String>,
}

impl ForeignKeyDef {
    pub fn new(name: &str, columns: &[&str], referenced_table: &str, referenced_columns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            referenced_table: referenced_table.to_string(),
            referenced_columns: referenced_columns.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn references_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_timestamp_is_symbolic_on_temporal_columns() {
        let spellings = ["CURRENT_TIMESTAMP", "current_timestamp()", "now()", "CURRENT_TIMESTAMP(0)"];
        for raw in spellings {
            assert_eq!(
                ColumnDefault::from_raw(raw, "timestamp"),
                ColumnDefault::CurrentTimestamp { precision: None },
                "{raw}"
            );
        }
        assert_eq!(
            ColumnDefault::from_raw("CURRENT_TIMESTAMP(6)", "datetime(6)"),
            ColumnDefault::CurrentTimestamp { precision: Some(6) }
        );
    }

    #[test]
    fn current_timestamp_stays_literal_on_other_types() {
        assert_eq!(
            ColumnDefault::from_raw("CURRENT_TIMESTAMP", "varchar(32)"),
            ColumnDefault::literal("CURRENT_TIMESTAMP")
        );
        assert_eq!(
            ColumnDefault::from_raw("0000-00-00 00:00:00", "datetime"),
            ColumnDefault::literal("0000-00-00 00:00:00")
        );
    }

    #[test]
    fn empty_string_default_is_not_no_default() {
        let with_empty = ColumnDef::new("title", "varchar(64)").default_raw("");
        let without = ColumnDef::new("title", "varchar(64)");
        assert_ne!(with_empty, without);
        assert_eq!(with_empty.default, Some(ColumnDefault::literal("")));
    }

    #[test]
    fn duplicate_column_is_ambiguous() {
        let mut table = TableSchema::new("users");
        table.add_column(ColumnDef::new("id", "int(11)")).unwrap();
        let err = table.add_column(ColumnDef::new("id", "bigint(20)")).unwrap_err();
        match err {
            Error::AmbiguousIdentity { table, kind, name } => {
                assert_eq!(table, "users");
                assert_eq!(kind, "column");
                assert_eq!(name, "id");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn primary_index_is_always_named_primary() {
        let pk = IndexDef::new("pk_users", IndexKind::Primary, vec![IndexColumn::new("id")]);
        assert_eq!(pk.name, PRIMARY_KEY_NAME);
        assert!(pk.is_primary());
    }

    #[test]
    fn base_type_strips_length_and_modifiers() {
        assert_eq!(base_type("smallint(6) unsigned"), "smallint");
        assert_eq!(base_type("DATETIME"), "datetime");
        assert_eq!(base_type("enum('a','b')"), "enum");
    }
}
