//! Schema metadata types
//!
//! Everything here is derived from the live database on demand
//! (`PRAGMA table_info`, `PRAGMA foreign_key_list`) and never cached.

use serde::Serialize;
use std::collections::BTreeMap;

/// One column as reported by `PRAGMA table_info`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    /// 0-based ordinal position
    pub position: usize,
    pub name: String,
    /// Declared type, empty when the column has none
    pub declared_type: String,
    pub not_null: bool,
    pub default_value: Option<String>,
    /// 1-based position in the primary key, 0 when not part of it
    pub primary_key: u32,
}

impl ColumnInfo {
    pub fn is_primary_key(&self) -> bool {
        self.primary_key > 0
    }
}

/// One row of `PRAGMA foreign_key_list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKey {
    /// Column in the referencing table
    pub column: String,
    /// Referenced table
    pub table: String,
    /// Referenced column; `None` when the parent's primary key is implied
    pub to: Option<String>,
}

impl ForeignKey {
    /// `table.column`, or just `table` when the target column is implied
    pub fn target(&self) -> String {
        match &self.to {
            Some(col) => format!("{}.{}", self.table, col),
            None => self.table.clone(),
        }
    }
}

/// Columns, primary key and foreign keys of one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableOverview {
    pub name: String,
    pub columns: Vec<String>,
    pub primary_key: Vec<String>,
    pub column_types: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<ForeignKey>,
}

impl TableOverview {
    pub fn new(name: impl Into<String>, columns: &[ColumnInfo], foreign_keys: Vec<ForeignKey>) -> Self {
        let mut primary: Vec<&ColumnInfo> = columns.iter().filter(|c| c.is_primary_key()).collect();
        primary.sort_by_key(|c| c.primary_key);

        Self {
            name: name.into(),
            columns: columns.iter().map(|c| c.name.clone()).collect(),
            primary_key: primary.into_iter().map(|c| c.name.clone()).collect(),
            column_types: columns
                .iter()
                .map(|c| (c.name.clone(), c.declared_type.clone()))
                .collect(),
            foreign_keys,
        }
    }
}

/// Snapshot of every table known to a session, in table-list order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SchemaOverview {
    pub tables: Vec<TableOverview>,
}

impl SchemaOverview {
    pub fn get(&self, table: &str) -> Option<&TableOverview> {
        self.tables.iter().find(|t| t.name == table)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|t| t.name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Plain-text summary handed to translation backends.
    ///
    /// ```text
    /// Table: orders
    ///   - id (INTEGER) PRIMARY KEY
    ///   - customer_id (INTEGER) -> customers.id
    /// ```
    pub fn to_prompt_text(&self) -> String {
        let mut out = String::new();
        for table in &self.tables {
            out.push_str(&format!("Table: {}\n", table.name));
            for column in &table.columns {
                let ty = table.column_types.get(column).map(String::as_str).unwrap_or("");
                out.push_str(&format!("  - {} ({})", column, ty));
                if table.primary_key.contains(column) {
                    out.push_str(" PRIMARY KEY");
                }
                if let Some(fk) = table.foreign_keys.iter().find(|fk| &fk.column == column) {
                    out.push_str(&format!(" -> {}", fk.target()));
                }
                out.push('\n');
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(position: usize, name: &str, ty: &str, pk: u32) -> ColumnInfo {
        ColumnInfo {
            position,
            name: name.to_string(),
            declared_type: ty.to_string(),
            not_null: pk > 0,
            default_value: None,
            primary_key: pk,
        }
    }

    #[test]
    fn test_overview_primary_key_order() {
        let cols = vec![
            column(0, "b", "TEXT", 2),
            column(1, "a", "INTEGER", 1),
            column(2, "note", "", 0),
        ];
        let overview = TableOverview::new("pairs", &cols, vec![]);
        assert_eq!(overview.columns, vec!["b", "a", "note"]);
        assert_eq!(overview.primary_key, vec!["a", "b"]);
        assert_eq!(overview.column_types["note"], "");
    }

    #[test]
    fn test_prompt_text() {
        let orders = TableOverview::new(
            "orders",
            &[column(0, "id", "INTEGER", 1), column(1, "customer_id", "INTEGER", 0)],
            vec![ForeignKey {
                column: "customer_id".into(),
                table: "customers".into(),
                to: Some("id".into()),
            }],
        );
        let overview = SchemaOverview { tables: vec![orders] };
        let text = overview.to_prompt_text();
        assert!(text.starts_with("Table: orders\n"));
        assert!(text.contains("  - id (INTEGER) PRIMARY KEY\n"));
        assert!(text.contains("  - customer_id (INTEGER) -> customers.id\n"));
    }

    #[test]
    fn test_implied_foreign_key_target() {
        let fk = ForeignKey {
            column: "owner".into(),
            table: "users".into(),
            to: None,
        };
        assert_eq!(fk.target(), "users");
    }
}
