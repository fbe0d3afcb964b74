//! Naming utilities for schema_diff
//!
//! Identifier quoting for generated DDL and naming of scratch databases.

use std::path::Path;

use crate::schema::checksum::sha1_hex;

/// Maximum identifier length in MySQL
pub const MAX_IDENTIFIER_LENGTH: usize = 64;

/// Sanitize identifiers for SQL
pub fn sanitize_identifier(name: &str) -> String {
    // Remove or replace characters not allowed in SQL identifiers
    let mut sanitized = name.replace(|c: char| !c.is_ascii_alphanumeric() && c != '_', "_");

    // Ensure identifier doesn't start with a number
    if sanitized.chars().next().map_or(false, |c| c.is_numeric()) {
        sanitized = format!("_{}", sanitized);
    }

    sanitized
}

/// Truncate an identifier to fit database limits
pub fn truncate_identifier(name: &str, max_length: usize) -> String {
    if name.len() <= max_length {
        name.to_string()
    } else {
        // Keep room for the underscore and an 8 character hash
        let keep_length = max_length.saturating_sub(9);
        let hash = sha1_hex(name);

        // Identifiers produced by sanitize_identifier are ASCII, but be safe on char boundaries
        let mut end = keep_length.min(name.len());
        while !name.is_char_boundary(end) {
            end -= 1;
        }

        format!("{}_{}", &name[..end], &hash[0..8])
    }
}

/// Quote an identifier with backticks
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// MySQL 8 reserved words (`INFORMATION_SCHEMA.KEYWORDS` where `RESERVED = 1`), sorted
const RESERVED_WORDS: &[&str] = &[
    "accessible", "add", "all", "alter", "analyze", "and", "as", "asc", "asensitive",
    "before", "between", "bigint", "binary", "blob", "both", "by", "call", "cascade",
    "case", "change", "char", "character", "check", "collate", "column", "condition",
    "constraint", "continue", "convert", "create", "cross", "cube", "cume_dist",
    "current_date", "current_time", "current_timestamp", "current_user", "cursor",
    "database", "databases", "day_hour", "day_microsecond", "day_minute", "day_second",
    "dec", "decimal", "declare", "default", "delayed", "delete", "dense_rank", "desc",
    "describe", "deterministic", "distinct", "distinctrow", "div", "double", "drop", "dual",
    "each", "else", "elseif", "empty", "enclosed", "escaped", "except", "exists", "exit",
    "explain", "false", "fetch", "first_value", "float", "float4", "float8", "for", "force",
    "foreign", "from", "fulltext", "function", "generated", "get", "grant", "group",
    "grouping", "groups", "having", "high_priority", "hour_microsecond", "hour_minute",
    "hour_second", "if", "ignore", "in", "index", "infile", "inner", "inout", "insensitive",
    "insert", "int", "int1", "int2", "int3", "int4", "int8", "integer", "intersect",
    "interval", "into", "io_after_gtids", "io_before_gtids", "is", "iterate", "join",
    "json_table", "key", "keys", "kill", "lag", "last_value", "lateral", "lead", "leading",
    "leave", "left", "like", "limit", "linear", "lines", "load", "localtime",
    "localtimestamp", "lock", "long", "longblob", "longtext", "loop", "low_priority",
    "master_bind", "master_ssl_verify_server_cert", "match", "maxvalue", "mediumblob",
    "mediumint", "mediumtext", "middleint", "minute_microsecond", "minute_second", "mod",
    "modifies", "natural", "no_write_to_binlog", "not", "nth_value", "ntile", "null",
    "numeric", "of", "on", "optimize", "optimizer_costs", "option", "optionally", "or",
    "order", "out", "outer", "outfile", "over", "partition", "percent_rank", "precision",
    "primary", "procedure", "purge", "range", "rank", "read", "read_write", "reads", "real",
    "recursive", "references", "regexp", "release", "rename", "repeat", "replace",
    "require", "resignal", "restrict", "return", "revoke", "right", "rlike", "row",
    "row_number", "rows", "schema", "schemas", "second_microsecond", "select", "sensitive",
    "separator", "set", "show", "signal", "smallint", "spatial", "specific", "sql",
    "sql_big_result", "sql_calc_found_rows", "sql_small_result", "sqlexception", "sqlstate",
    "sqlwarning", "ssl", "starting", "stored", "straight_join", "system", "table",
    "terminated", "then", "tinyblob", "tinyint", "tinytext", "to", "trailing", "trigger",
    "true", "undo", "union", "unique", "unlock", "unsigned", "update", "usage", "use",
    "using", "utc_date", "utc_time", "utc_timestamp", "values", "varbinary", "varchar",
    "varcharacter", "varying", "virtual", "when", "where", "while", "window", "with",
    "write", "xor", "year_month", "zerofill",
];

/// Check if a name is a reserved MySQL keyword
pub fn is_sql_keyword(name: &str) -> bool {
    RESERVED_WORDS
        .binary_search(&name.to_ascii_lowercase().as_str())
        .is_ok()
}

/// Backtick-quote an identifier only when it would not parse bare
pub fn escape_identifier(name: &str) -> String {
    let bare = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        && !name.chars().all(|c| c.is_ascii_digit());

    if bare && !is_sql_keyword(name) {
        name.to_string()
    } else {
        quote_identifier(name)
    }
}

/// Name for a scratch database loaded from a schema file
pub fn scratch_database_name(prefix: &str, label: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let name = format!(
        "{}_{}_{}",
        sanitize_identifier(prefix),
        sanitize_identifier(label).to_lowercase(),
        &suffix[..8]
    );

    truncate_identifier(&name, MAX_IDENTIFIER_LENGTH)
}

/// Label derived from a schema file name, e.g. `v2/shop.sql` becomes `shop`
pub fn label_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "schema".to_string())
}
