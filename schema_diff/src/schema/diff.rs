//! Schema difference calculator
//!
//! This module compares two table snapshots and calculates the differences.
//! Every category is optional: `None` means both sides agree, and a category is
//! never `Some(vec![])`, so DDL synthesis only ever sees actionable work.

use indexmap::IndexMap;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::schema::types::{ColumnDef, ForeignKeyDef, IndexDef, TableSchema};

/// Column changes for one table
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ColumnDiff {
    /// Names present only in `from`, in `from` order
    pub drop: Option<Vec<String>>,
    /// Definitions present only in `to`, in `to` order
    pub add: Option<Vec<ColumnDef>>,
    /// Full new definitions of columns whose attributes differ
    pub modify: Option<Vec<ColumnDef>>,
}

impl ColumnDiff {
    pub fn is_empty(&self) -> bool {
        self.drop.is_none() && self.add.is_none() && self.modify.is_none()
    }

    /// Names of dropped columns
    pub fn dropped(&self) -> &[String] {
        self.drop.as_deref().unwrap_or_default()
    }
}

/// A keyed object present on both sides with different definitions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Change<T> {
    pub from: T,
    pub to: T,
}

/// Drop/add/change sets for indexes or foreign keys of one table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyedDiff<T> {
    pub drop: Option<Vec<T>>,
    pub add: Option<Vec<T>>,
    pub change: Option<Vec<Change<T>>>,
}

impl<T> Default for KeyedDiff<T> {
    fn default() -> Self {
        Self {
            drop: None,
            add: None,
            change: None,
        }
    }
}

impl<T> KeyedDiff<T> {
    pub fn is_empty(&self) -> bool {
        self.drop.is_none() && self.add.is_none() && self.change.is_none()
    }

    /// Everything that needs a drop clause: plain drops and the old side of changes
    pub fn drops(&self) -> Vec<&T> {
        let dropped = self.drop.iter().flatten();
        let changed = self.change.iter().flatten().map(|c| &c.from);
        dropped.chain(changed).collect()
    }

    /// Everything that needs an add clause: plain adds and the new side of changes
    pub fn adds(&self) -> Vec<&T> {
        let added = self.add.iter().flatten();
        let changed = self.change.iter().flatten().map(|c| &c.to);
        added.chain(changed).collect()
    }
}

/// All differences for one table present in both schemas
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableDiff {
    pub table: String,
    pub columns: ColumnDiff,
    pub indexes: KeyedDiff<IndexDef>,
    pub foreign_keys: KeyedDiff<ForeignKeyDef>,
    /// The target engine, when it differs
    pub engine: Option<String>,
}

impl TableDiff {
    /// Check if the diff is empty (no changes needed)
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
            && self.indexes.is_empty()
            && self.foreign_keys.is_empty()
            && self.engine.is_none()
    }
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

/// Compute column drop/add/modify sets
pub fn diff_columns(
    from: &IndexMap<String, ColumnDef>,
    to: &IndexMap<String, ColumnDef>,
) -> ColumnDiff {
    let drop = from
        .keys()
        .filter(|name| !to.contains_key(*name))
        .cloned()
        .collect();

    let add = to
        .values()
        .filter(|col| !from.contains_key(&col.name))
        .cloned()
        .collect();

    let modify = to
        .values()
        .filter(|col| matches!(from.get(&col.name), Some(current) if current != *col))
        .cloned()
        .collect();

    ColumnDiff {
        drop: non_empty(drop),
        add: non_empty(add),
        modify: non_empty(modify),
    }
}

/// Compute index drop/add/change sets
///
/// Any `from` index covering a column in `dropped_columns` that is not already
/// dropped or changed is dropped explicitly.
pub fn diff_indexes(
    from: &IndexMap<String, IndexDef>,
    to: &IndexMap<String, IndexDef>,
    dropped_columns: &[String],
) -> KeyedDiff<IndexDef> {
    let mut diff = diff_keyed(from, to, |index, column| index.references_column(column), dropped_columns);

    let order = |index: &IndexDef| (index.kind.emit_rank(), index.name.clone());
    if let Some(drop) = diff.drop.as_mut() {
        drop.sort_by_key(order);
    }
    if let Some(add) = diff.add.as_mut() {
        add.sort_by_key(order);
    }
    if let Some(change) = diff.change.as_mut() {
        change.sort_by_key(|c| order(&c.to));
    }
    diff
}

/// Compute foreign key drop/add/change sets
///
/// Constraints whose local columns include a dropped column are dropped explicitly.
pub fn diff_foreign_keys(
    from: &IndexMap<String, ForeignKeyDef>,
    to: &IndexMap<String, ForeignKeyDef>,
    dropped_columns: &[String],
) -> KeyedDiff<ForeignKeyDef> {
    let mut diff = diff_keyed(from, to, |fk, column| fk.references_column(column), dropped_columns);

    if let Some(drop) = diff.drop.as_mut() {
        drop.sort_by(|a, b| a.name.cmp(&b.name));
    }
    if let Some(add) = diff.add.as_mut() {
        add.sort_by(|a, b| a.name.cmp(&b.name));
    }
    if let Some(change) = diff.change.as_mut() {
        change.sort_by(|a, b| a.to.name.cmp(&b.to.name));
    }
    diff
}

fn diff_keyed<T, F>(
    from: &IndexMap<String, T>,
    to: &IndexMap<String, T>,
    covers: F,
    dropped_columns: &[String],
) -> KeyedDiff<T>
where
    T: Clone + PartialEq,
    F: Fn(&T, &str) -> bool,
{
    let mut drop = Vec::new();
    let mut change = Vec::new();

    for (name, current) in from {
        match to.get(name) {
            None => drop.push(current.clone()),
            Some(target) if target != current => change.push(Change {
                from: current.clone(),
                to: target.clone(),
            }),
            Some(_) => {
                if dropped_columns.iter().any(|column| covers(current, column.as_str())) {
                    drop.push(current.clone());
                }
            }
        }
    }

    let add = to
        .iter()
        .filter(|(name, _)| !from.contains_key(*name))
        .map(|(_, target)| target.clone())
        .collect();

    KeyedDiff {
        drop: non_empty(drop),
        add: non_empty(add),
        change: non_empty(change),
    }
}

/// Diff two versions of the same table
///
/// Fails with [`Error::UnsupportedConstruct`] when either side uses a feature
/// outside the modelled subset.
pub fn diff_table(from: &TableSchema, to: &TableSchema) -> Result<TableDiff> {
    if let Some(construct) = from.unsupported.first().or_else(|| to.unsupported.first()) {
        return Err(Error::UnsupportedConstruct {
            table: to.name.clone(),
            construct: construct.clone(),
        });
    }

    let columns = diff_columns(&from.columns, &to.columns);
    let indexes = diff_indexes(&from.indexes, &to.indexes, columns.dropped());
    let foreign_keys = diff_foreign_keys(&from.foreign_keys, &to.foreign_keys, columns.dropped());

    let engine = match (&from.engine, &to.engine) {
        (Some(current), Some(target)) if current.eq_ignore_ascii_case(target) => None,
        (_, Some(target)) => Some(target.clone()),
        (_, None) => None,
    };

    Ok(TableDiff {
        table: to.name.clone(),
        columns,
        indexes,
        foreign_keys,
        engine,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::{ColumnDefault, IndexColumn, IndexKind};
    use pretty_assertions::assert_eq;

    fn columns(defs: Vec<ColumnDef>) -> IndexMap<String, ColumnDef> {
        defs.into_iter().map(|c| (c.name.clone(), c)).collect()
    }

    fn indexes(defs: Vec<IndexDef>) -> IndexMap<String, IndexDef> {
        defs.into_iter().map(|i| (i.name.clone(), i)).collect()
    }

    #[test]
    fn identical_columns_produce_no_categories() {
        let cols = columns(vec![
            ColumnDef::new("id", "int(11)"),
            ColumnDef::new("name", "varchar(32)").nullable(true),
        ]);
        let diff = diff_columns(&cols, &cols);
        assert!(diff.is_empty());
        assert_eq!(diff, ColumnDiff::default());
    }

    #[test]
    fn column_sets_are_split_by_presence() {
        let from = columns(vec![
            ColumnDef::new("a", "int(11)"),
            ColumnDef::new("b", "int(11)"),
            ColumnDef::new("c", "int(11)"),
        ]);
        let to = columns(vec![
            ColumnDef::new("a", "int(11)"),
            ColumnDef::new("c", "bigint(20)"),
            ColumnDef::new("d", "int(11)"),
        ]);

        let diff = diff_columns(&from, &to);
        assert_eq!(diff.drop, Some(vec!["b".to_string()]));
        assert_eq!(diff.add, Some(vec![ColumnDef::new("d", "int(11)")]));
        assert_eq!(diff.modify, Some(vec![ColumnDef::new("c", "bigint(20)")]));
    }

    #[test]
    fn every_attribute_counts_as_a_modification() {
        let base = ColumnDef::new("c", "varchar(10)");
        let variants = vec![
            base.clone().nullable(true),
            base.clone().default(ColumnDefault::literal("x")),
            base.clone().extra("auto_increment"),
            base.clone().comment("it's"),
            ColumnDef::new("c", "varchar(11)"),
        ];

        for variant in variants {
            let diff = diff_columns(&columns(vec![base.clone()]), &columns(vec![variant.clone()]));
            assert_eq!(diff.modify, Some(vec![variant]));
        }
    }

    #[test]
    fn empty_default_differs_from_no_default() {
        let from = columns(vec![ColumnDef::new("t", "varchar(10)")]);
        let to = columns(vec![ColumnDef::new("t", "varchar(10)").default_raw("")]);
        assert!(diff_columns(&from, &to).modify.is_some());
    }

    #[test]
    fn current_timestamp_spellings_compare_equal() {
        let from = columns(vec![ColumnDef::new("ts", "timestamp").default_raw("CURRENT_TIMESTAMP")]);
        let to = columns(vec![ColumnDef::new("ts", "timestamp").default_raw("current_timestamp()")]);
        assert!(diff_columns(&from, &to).is_empty());
    }

    #[test]
    fn index_column_order_is_significant() {
        let from = indexes(vec![IndexDef::plain("k", &["a", "b"])]);
        let to = indexes(vec![IndexDef::plain("k", &["b", "a"])]);

        let diff = diff_indexes(&from, &to, &[]);
        assert_eq!(diff.drop, None);
        assert_eq!(diff.add, None);
        assert_eq!(
            diff.change,
            Some(vec![Change {
                from: IndexDef::plain("k", &["a", "b"]),
                to: IndexDef::plain("k", &["b", "a"]),
            }])
        );
    }

    #[test]
    fn index_kind_and_prefix_are_significant() {
        let from = indexes(vec![IndexDef::plain("k", &["a"])]);
        let to = indexes(vec![IndexDef::unique("k", &["a"])]);
        assert!(diff_indexes(&from, &to, &[]).change.is_some());

        let to = indexes(vec![IndexDef::new("k", IndexKind::Plain, vec![IndexColumn::with_prefix("a", 8)])]);
        assert!(diff_indexes(&from, &to, &[]).change.is_some());
    }

    #[test]
    fn plain_indexes_are_ordered_before_unique_ones() {
        let from = indexes(vec![]);
        let to = indexes(vec![
            IndexDef::unique("a_unique", &["a"]),
            IndexDef::primary(&["id"]),
            IndexDef::plain("z_plain", &["z"]),
        ]);

        let names: Vec<String> = diff_indexes(&from, &to, &[])
            .add
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, vec!["z_plain", "PRIMARY", "a_unique"]);
    }

    #[test]
    fn index_on_dropped_column_is_dropped_explicitly() {
        // A malformed target that still lists the index after its column went away
        let from = indexes(vec![IndexDef::plain("k_gone", &["gone"]), IndexDef::plain("k_kept", &["kept"])]);
        let to = from.clone();

        let diff = diff_indexes(&from, &to, &["gone".to_string()]);
        assert_eq!(diff.drop, Some(vec![IndexDef::plain("k_gone", &["gone"])]));
        assert_eq!(diff.change, None);
    }

    #[test]
    fn foreign_keys_follow_the_same_shape() {
        let fk = ForeignKeyDef::new("fk_user", &["user_id"], "users", &["id"]);
        let moved = ForeignKeyDef::new("fk_user", &["user_id"], "accounts", &["id"]);
        let from: IndexMap<_, _> = [("fk_user".to_string(), fk.clone())].into_iter().collect();
        let to: IndexMap<_, _> = [("fk_user".to_string(), moved.clone())].into_iter().collect();

        let diff = diff_foreign_keys(&from, &to, &[]);
        assert_eq!(diff.change, Some(vec![Change { from: fk.clone(), to: moved }]));
        assert_eq!(diff.drops(), vec![&fk]);

        let diff = diff_foreign_keys(&from, &from, &["user_id".to_string()]);
        assert_eq!(diff.drop, Some(vec![fk]));
    }

    #[test]
    fn engine_change_carries_the_target_engine() {
        let from = TableSchema::new("t").with_engine("MyISAM");
        let to = TableSchema::new("t").with_engine("InnoDB");
        assert_eq!(diff_table(&from, &to).unwrap().engine, Some("InnoDB".to_string()));

        let same = TableSchema::new("t").with_engine("innodb");
        assert!(diff_table(&same, &to).unwrap().is_empty());
    }

    #[test]
    fn unsupported_constructs_fail_the_table() {
        let mut from = TableSchema::new("posts");
        from.mark_unsupported("FULLTEXT index ft_body");
        let to = TableSchema::new("posts");

        match diff_table(&from, &to) {
            Err(Error::UnsupportedConstruct { table, construct }) => {
                assert_eq!(table, "posts");
                assert_eq!(construct, "FULLTEXT index ft_body");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
