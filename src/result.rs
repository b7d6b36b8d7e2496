//! Query results
//!
//! A statement either produces a grid of rows (`Tabular`) or a status
//! outcome (`Status`). The variant is decided by the statement's leading
//! keyword (see [`crate::classify`]), never by whether any rows came back.

use rusqlite::types::ValueRef;
use serde::Serialize;
use std::fmt;

/// Message carried by every successful mutating execution
pub const SUCCESS_MESSAGE: &str = "Query executed successfully";

/// A single cell, mirroring SQLite's storage classes
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(f) => Value::Real(f),
            ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(r) => write!(f, "{}", r),
            Value::Text(s) => write!(f, "{}", s),
            Value::Blob(b) => write!(f, "<blob {} bytes>", b.len()),
        }
    }
}

/// Rows and named columns returned by a data-returning statement
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by name (first match)
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell at `row` in the column named `column`
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// First cell of the first row, for scalar queries
    pub fn scalar(&self) -> Option<&Value> {
        self.rows.first().and_then(|r| r.first())
    }
}

/// Outcome of a mutating execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    pub message: String,
    /// Rows inserted, updated or deleted across the batch
    pub rows_affected: u64,
    /// Number of statements that ran
    pub statements: usize,
}

impl Status {
    pub fn success(rows_affected: u64, statements: usize) -> Self {
        Self {
            message: SUCCESS_MESSAGE.to_string(),
            rows_affected,
            statements,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} statement{}, {} row{} affected)",
            self.message,
            self.statements,
            if self.statements == 1 { "" } else { "s" },
            self.rows_affected,
            if self.rows_affected == 1 { "" } else { "s" },
        )
    }
}

/// Result of [`crate::Session::execute`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryResult {
    Tabular(Table),
    Status(Status),
}

impl QueryResult {
    pub fn is_tabular(&self) -> bool {
        matches!(self, QueryResult::Tabular(_))
    }

    pub fn is_status(&self) -> bool {
        matches!(self, QueryResult::Status(_))
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            QueryResult::Tabular(table) => Some(table),
            QueryResult::Status(_) => None,
        }
    }

    pub fn into_table(self) -> Option<Table> {
        match self {
            QueryResult::Tabular(table) => Some(table),
            QueryResult::Status(_) => None,
        }
    }

    pub fn as_status(&self) -> Option<&Status> {
        match self {
            QueryResult::Status(status) => Some(status),
            QueryResult::Tabular(_) => None,
        }
    }

    /// Row count of a tabular result; 0 for a status
    pub fn row_count(&self) -> usize {
        self.as_table().map(Table::row_count).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::new(
            vec!["id".into(), "name".into()],
            vec![
                vec![Value::Integer(1), Value::Text("Ann".into())],
                vec![Value::Integer(2), Value::Null],
            ],
        )
    }

    #[test]
    fn test_table_lookup() {
        let table = sample();
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column_count(), 2);
        assert_eq!(table.get(0, "name").and_then(Value::as_str), Some("Ann"));
        assert!(table.get(1, "name").unwrap().is_null());
        assert!(table.get(0, "missing").is_none());
        assert_eq!(table.scalar().and_then(Value::as_i64), Some(1));
    }

    #[test]
    fn test_empty_table_is_still_tabular() {
        let result = QueryResult::Tabular(Table::new(vec!["x".into()], vec![]));
        assert!(result.is_tabular());
        assert!(!result.is_status());
        assert_eq!(result.row_count(), 0);
    }

    #[test]
    fn test_status_display() {
        let status = Status::success(1, 2);
        assert_eq!(
            status.to_string(),
            "Query executed successfully (2 statements, 1 row affected)"
        );
    }

    #[test]
    fn test_serialized_shape_is_tagged() {
        let json = serde_json::to_value(QueryResult::Status(Status::success(0, 1))).unwrap();
        assert_eq!(json["kind"], "status");
        assert_eq!(json["message"], SUCCESS_MESSAGE);

        let json = serde_json::to_value(QueryResult::Tabular(sample())).unwrap();
        assert_eq!(json["kind"], "tabular");
        assert_eq!(json["rows"][0][1], "Ann");
        assert!(json["rows"][1][1].is_null());
    }
}
