//! Generic row access
//!
//! Rows move between SQLite and bundles as JSON objects. Only columns
//! declared by [`Table::columns`] are ever interpolated into SQL, always
//! quoted; values are bound as parameters.

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, OptionalExtension, params_from_iter};
use serde_json::{Number, Value};

use crate::bundle::Row;
use crate::table::{ID_COLUMN, Table};
use crate::{Error, Result};

/// Largest id list bound into one `IN (...)` clause
const IN_CHUNK: usize = 500;

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn select_list(table: Table) -> String {
    table
        .columns()
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Every row of a table in identity order
pub fn read_rows(conn: &Connection, table: Table) -> Result<Vec<Row>> {
    let sql = format!(
        "SELECT {} FROM {} ORDER BY id",
        select_list(table),
        table.sql_name()
    );
    query_rows(conn, table, &sql, Vec::new())
}

/// A single row by identity
pub fn read_row(conn: &Connection, table: Table, id: i64) -> Result<Option<Row>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE id = ?1",
        select_list(table),
        table.sql_name()
    );
    let mut stmt = conn.prepare(&sql)?;
    stmt.query_row([id], |row| row_to_json(table, row))
        .optional()
        .map_err(Into::into)
}

/// Rows whose `column` holds one of `ids`, in identity order
pub fn read_rows_where_in(
    conn: &Connection,
    table: Table,
    column: &str,
    ids: &[i64],
) -> Result<Vec<Row>> {
    if !table.has_column(column) {
        return Err(Error::Schema(format!("{} has no column {}", table, column)));
    }

    let mut rows = Vec::new();
    for chunk in ids.chunks(IN_CHUNK) {
        let placeholders = (1..=chunk.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {} FROM {} WHERE {} IN ({}) ORDER BY id",
            select_list(table),
            table.sql_name(),
            quote_ident(column),
            placeholders
        );
        let params = chunk.iter().map(|id| SqlValue::Integer(*id)).collect();
        rows.extend(query_rows(conn, table, &sql, params)?);
    }

    if ids.len() > IN_CHUNK {
        rows.sort_by_key(|row| row_id(row).unwrap_or(i64::MAX));
    }
    Ok(rows)
}

fn query_rows(conn: &Connection, table: Table, sql: &str, params: Vec<SqlValue>) -> Result<Vec<Row>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params_from_iter(params), |row| row_to_json(table, row))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn row_to_json(table: Table, row: &rusqlite::Row) -> rusqlite::Result<Row> {
    let mut out = Row::new();
    for (i, column) in table.columns().iter().enumerate() {
        out.insert((*column).to_string(), value_from_sql(row.get_ref(i)?));
    }
    Ok(out)
}

/// Insert the columns present in `row` as given and return the new identity.
///
/// An `id` column, when present, is inserted verbatim.
pub fn insert_row(conn: &Connection, table: Table, row: &Row) -> Result<i64> {
    for column in row.keys() {
        if !table.has_column(column) {
            return Err(Error::InvalidFormat(format!("{} has no column {}", table, column)));
        }
    }

    if row.is_empty() {
        conn.execute(&format!("INSERT INTO {} DEFAULT VALUES", table.sql_name()), [])?;
        return Ok(conn.last_insert_rowid());
    }

    let columns = row.keys().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ");
    let placeholders = (1..=row.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table.sql_name(),
        columns,
        placeholders
    );

    let mut stmt = conn.prepare_cached(&sql)?;
    stmt.execute(params_from_iter(row.values().map(value_to_sql)))?;
    Ok(conn.last_insert_rowid())
}

/// Overwrite the given columns of one row, bumping `updated_at` where the
/// table has it. Returns the number of rows changed.
pub fn update_row(conn: &Connection, table: Table, id: i64, row: &Row) -> Result<usize> {
    let mut assignments = Vec::new();
    let mut values = Vec::new();
    for (column, value) in row {
        if column == ID_COLUMN || column == "created_at" || column == "updated_at" {
            continue;
        }
        if !table.has_column(column) {
            return Err(Error::InvalidFormat(format!("{} has no column {}", table, column)));
        }
        values.push(value_to_sql(value));
        assignments.push(format!("{} = ?{}", quote_ident(column), values.len()));
    }
    if table.has_column("updated_at") {
        assignments.push("\"updated_at\" = CURRENT_TIMESTAMP".to_string());
    }
    if assignments.is_empty() {
        return Ok(0);
    }

    values.push(SqlValue::Integer(id));
    let sql = format!(
        "UPDATE {} SET {} WHERE id = ?{}",
        table.sql_name(),
        assignments.join(", "),
        values.len()
    );
    Ok(conn.execute(&sql, params_from_iter(values))?)
}

pub fn delete_all(conn: &Connection, table: Table) -> Result<usize> {
    Ok(conn.execute(&format!("DELETE FROM {}", table.sql_name()), [])?)
}

pub fn count_rows(conn: &Connection, table: Table) -> Result<usize> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", table.sql_name()),
        [],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

/// Copy of `row` without identity and timestamp columns
pub fn strip_identity(table: Table, row: &Row) -> Row {
    row.iter()
        .filter(|(column, _)| !table.is_identity_or_timestamp(column))
        .map(|(column, value)| (column.clone(), value.clone()))
        .collect()
}

/// Identity carried by a row, if it is an integer
pub fn row_id(row: &Row) -> Option<i64> {
    row.get(ID_COLUMN).and_then(Value::as_i64)
}

/// Integer held by `column`, `None` for null, missing or non-integer values
pub fn row_i64(row: &Row, column: &str) -> Option<i64> {
    row.get(column).and_then(Value::as_i64)
}

fn value_from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
    }
}

fn value_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map(SqlValue::Real).unwrap_or(SqlValue::Null),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}
