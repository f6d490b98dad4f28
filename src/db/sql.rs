//! SQL text helpers.
//!
//! Condition expressions and literal queries are written with `?`
//! placeholders. PostgreSQL expects `$n`, so statements are rendered right
//! before execution. Quoted text (`'...'` and `E'...'` literals, `"..."`
//! identifiers, `$tag$` bodies) and comments are copied through untouched.
//!
//! Literal queries handed to the executor are checked with
//! [sqlparser](https://docs.rs/sqlparser/) so that only a single SELECT can
//! reach the row-mapping path.

use crate::error::{RepoError, RepoResult};
use sqlparser::ast::Statement;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

/// Quote an identifier, doubling embedded double quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote a string literal, doubling embedded single quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Quote a possibly dotted column reference part by part: `t.name` becomes
/// `"t"."name"`.
pub fn quote_column(column: &str) -> String {
    column
        .split('.')
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(".")
}

/// `"schema"."table"`
pub fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

/// Count `?` placeholders outside quoted text and comments.
pub fn count_placeholders(sql: &str) -> usize {
    let mut count = 0;
    scan(sql, |_| count += 1);
    count
}

/// Replace each `?` outside quoted text with `$first_index`, `$first_index + 1`, ...
///
/// Returns the rendered SQL and the number of placeholders replaced.
pub fn render_placeholders(sql: &str, first_index: usize) -> (String, usize) {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut next = first_index;
    let mut last = 0;
    let mut positions = Vec::new();
    scan(sql, |pos| positions.push(pos));
    for pos in &positions {
        out.push_str(&sql[last..*pos]);
        out.push('$');
        out.push_str(&next.to_string());
        next += 1;
        last = pos + 1;
    }
    out.push_str(&sql[last..]);
    (out, positions.len())
}

/// Render placeholders and check they match the number of arguments.
pub fn render_checked(sql: &str, first_index: usize, args: usize) -> RepoResult<String> {
    let (rendered, found) = render_placeholders(sql, first_index);
    if found != args {
        return Err(RepoError::query(format!(
            "statement has {} placeholders but {} arguments were supplied",
            found, args
        )));
    }
    Ok(rendered)
}

/// Walk `sql`, calling `on_placeholder` with the byte offset of every `?`
/// outside quoted text, comments and dollar-quoted bodies.
fn scan(sql: &str, mut on_placeholder: impl FnMut(usize)) {
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' => {
                // E'...' honours backslash escapes
                let escaped = i > 0
                    && matches!(bytes[i - 1], b'E' | b'e')
                    && (i < 2 || !is_ident_byte(bytes[i - 2]));
                i = skip_quoted(bytes, i, b'\'', escaped);
            }
            b'"' => i = skip_quoted(bytes, i, b'"', false),
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                i = bytes[i..]
                    .iter()
                    .position(|&b| b == b'\n')
                    .map_or(bytes.len(), |p| i + p + 1);
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => i = skip_block_comment(bytes, i),
            b'$' => i = skip_dollar_quoted(sql, i),
            b'?' => {
                on_placeholder(i);
                i += 1;
            }
            _ => i += 1,
        }
    }
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

/// Offset just past the closing quote. A doubled quote stays inside.
fn skip_quoted(bytes: &[u8], start: usize, quote: u8, backslash: bool) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        let b = bytes[i];
        if backslash && b == b'\\' {
            i += 2;
        } else if b == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
            } else {
                return i + 1;
            }
        } else {
            i += 1;
        }
    }
    bytes.len()
}

/// Block comments nest in PostgreSQL.
fn skip_block_comment(bytes: &[u8], start: usize) -> usize {
    let mut depth = 0usize;
    let mut i = start;
    while i < bytes.len() {
        if bytes[i] == b'/' && bytes.get(i + 1) == Some(&b'*') {
            depth += 1;
            i += 2;
        } else if bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/') {
            depth -= 1;
            i += 2;
            if depth == 0 {
                return i;
            }
        } else {
            i += 1;
        }
    }
    bytes.len()
}

/// `$$...$$` or `$tag$...$tag$`. A `$1` parameter or a `$` inside an
/// identifier is not a quote and is stepped over.
fn skip_dollar_quoted(sql: &str, start: usize) -> usize {
    let bytes = sql.as_bytes();
    if start > 0 && is_ident_byte(bytes[start - 1]) {
        return start + 1;
    }
    let mut end = start + 1;
    while end < bytes.len() && is_ident_byte(bytes[end]) {
        end += 1;
    }
    let tag_starts_with_digit = bytes.get(start + 1).is_some_and(u8::is_ascii_digit);
    if tag_starts_with_digit || bytes.get(end) != Some(&b'$') {
        return start + 1;
    }
    let delimiter = &sql[start..=end];
    let body = end + 1;
    sql[body..]
        .find(delimiter)
        .map_or(sql.len(), |p| body + p + delimiter.len())
}

/// Check that `sql` (already rendered to `$n` placeholders) is exactly one
/// SELECT. With `allow_limit == false`, a query carrying its own
/// LIMIT/OFFSET/FETCH is rejected because the caller appends one.
pub fn validate_select(sql: &str, allow_limit: bool) -> RepoResult<()> {
    let statements = Parser::parse_sql(&PostgreSqlDialect {}, sql)
        .map_err(|e| RepoError::query(format!("failed to parse custom query: {}", e)))?;

    let statement = match statements.as_slice() {
        [] => return Err(RepoError::query("empty custom query")),
        [statement] => statement,
        _ => {
            return Err(RepoError::query(
                "custom query must be a single statement",
            ));
        }
    };

    match statement {
        Statement::Query(query) => {
            if !allow_limit && (query.limit_clause.is_some() || query.fetch.is_some()) {
                return Err(RepoError::query(
                    "paged custom query must not carry its own LIMIT/OFFSET",
                ));
            }
            Ok(())
        }
        _ => Err(RepoError::query("custom query must be a SELECT statement")),
    }
}
