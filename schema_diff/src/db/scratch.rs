//! Scratch databases
//!
//! Schema files are loaded into throwaway databases so they can be introspected
//! like any live schema. The loader splits the file into statements itself and
//! runs them one at a time on a single connection.

use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::Executor;
use std::iter::Peekable;
use std::str::Chars;

use crate::db::connection::DatabaseConnection;
use crate::error::{Error, Result};
use crate::utils::naming::quote_identifier;

static TEMPLATE_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s?%[a-z0-9_]+%").expect("valid regex"));

static USE_STATEMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^use\s").expect("valid regex"));

/// Create `name` and load `schema_sql` into it
pub async fn create_scratch_database(
    connection: &DatabaseConnection,
    name: &str,
    schema_sql: &str,
) -> Result<()> {
    let statements = split_statements(schema_sql);
    let mut conn = connection.pool().acquire().await?;

    (&mut *conn)
        .execute(format!("CREATE DATABASE {}", quote_identifier(name)).as_str())
        .await?;
    (&mut *conn)
        .execute(format!("USE {}", quote_identifier(name)).as_str())
        .await?;

    for statement in &statements {
        if let Err(source) = (&mut *conn).execute(statement.as_str()).await {
            return Err(Error::ExecutionFailure {
                statement: statement.clone(),
                source,
            });
        }
    }

    tracing::info!(database = name, statements = statements.len(), "Created scratch database");
    Ok(())
}

/// Drop a scratch database if it exists
pub async fn drop_scratch_database(connection: &DatabaseConnection, name: &str) -> Result<()> {
    connection
        .execute(&format!("DROP DATABASE IF EXISTS {}", quote_identifier(name)))
        .await?;
    tracing::debug!(database = name, "Dropped scratch database");
    Ok(())
}

/// Split a schema file into executable statements
///
/// Semicolons inside quoted strings and identifiers do not terminate a
/// statement. Comments (`-- `, `#`, `/* */`) are removed wherever they start;
/// `/*! */` conditional comments are executable and kept. `USE` statements and
/// `%PLACEHOLDER%` templates are removed; fragments left empty are skipped.
pub fn split_statements(sql: &str) -> Vec<String> {
    let sql = TEMPLATE_PLACEHOLDER.replace_all(sql, "");

    let mut statements = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            current.push(c);
            if c == '\\' && q != '`' {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            } else if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '\'' | '"' | '`' => {
                quote = Some(c);
                current.push(c);
            }
            ';' => {
                push_statement(&mut statements, &current);
                current.clear();
            }
            '#' => {
                skip_line(&mut chars);
                current.push('\n');
            }
            '-' if chars.peek() == Some(&'-') => {
                chars.next();
                match chars.peek() {
                    None => {}
                    Some(next) if next.is_whitespace() => {
                        skip_line(&mut chars);
                        current.push('\n');
                    }
                    Some(_) => current.push_str("--"),
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                if chars.peek() == Some(&'!') {
                    current.push_str("/*");
                } else {
                    skip_block_comment(&mut chars);
                    current.push(' ');
                }
            }
            _ => current.push(c),
        }
    }
    push_statement(&mut statements, &current);

    statements
}

fn skip_line(chars: &mut Peekable<Chars<'_>>) {
    for c in chars.by_ref() {
        if c == '\n' {
            break;
        }
    }
}

fn skip_block_comment(chars: &mut Peekable<Chars<'_>>) {
    while let Some(c) = chars.next() {
        if c == '*' && chars.peek() == Some(&'/') {
            chars.next();
            return;
        }
    }
}

fn push_statement(statements: &mut Vec<String>, fragment: &str) {
    let statement = fragment.trim();
    if statement.is_empty() || USE_STATEMENT.is_match(statement) {
        return;
    }
    statements.push(statement.to_string());
}
