//! Schema inspection on an open session
//!
//! Every call queries the live database; nothing is cached beyond the
//! session's table list.

use rusqlite::Connection;
use crate::result::{QueryResult, Value};
use crate::schema::{ColumnInfo, ForeignKey, SchemaOverview, TableOverview};
use crate::{Error, Result};
use super::{Session, query_table};

/// Rows returned by [`Session::preview_of`] when no limit is given
pub const DEFAULT_PREVIEW_LIMIT: usize = 5;

/// Quote an identifier for interpolation into SQL
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl Session {
    fn require_table(&self, table: &str) -> Result<()> {
        if self.has_table(table) {
            Ok(())
        } else {
            Err(Error::NoSuchTable(table.to_string()))
        }
    }

    /// Columns of `table` in declaration order.
    ///
    /// The table must be in the cached table list; refresh first if the
    /// schema may have changed outside this session.
    pub fn columns_of(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let conn = self.conn()?;
        self.require_table(table)?;
        read_columns(conn, table)
            .map_err(|e| Error::metadata(format!("get schema for table {}", table), e))
    }

    /// Foreign keys declared on `table`.
    ///
    /// Metadata failures are not errors here: the list is informational,
    /// so an unreadable one comes back empty.
    pub fn foreign_keys_of(&self, table: &str) -> Result<Vec<ForeignKey>> {
        let conn = self.conn()?;
        match read_foreign_keys(conn, table) {
            Ok(fks) => Ok(fks),
            Err(e) => {
                tracing::debug!("No foreign key information for {}: {}", table, e);
                Ok(Vec::new())
            }
        }
    }

    /// Up to `limit` rows of `table` in storage order
    pub fn preview_of(&self, table: &str, limit: usize) -> Result<QueryResult> {
        let conn = self.conn()?;
        self.require_table(table)?;
        // sqlite takes a signed 64-bit limit
        let limit = limit.min(i64::MAX as usize);
        let sql = format!("SELECT * FROM {} LIMIT {}", quote_identifier(table), limit);
        let rows = query_table(conn, &sql)
            .map_err(|e| Error::metadata(format!("get preview for table {}", table), e))?;
        Ok(QueryResult::Tabular(rows))
    }

    /// Number of rows in `table`
    pub fn row_count_of(&self, table: &str) -> Result<u64> {
        let conn = self.conn()?;
        let sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(table));
        let count: i64 = conn
            .query_row(&sql, [], |row| row.get(0))
            .map_err(|source| Error::Count {
                table: table.to_string(),
                source,
            })?;
        Ok(count as u64)
    }

    /// Columns, primary key and foreign keys of every known table.
    ///
    /// Issues two metadata queries per table.
    pub fn schema_overview(&self) -> Result<SchemaOverview> {
        self.conn()?;
        let mut tables = Vec::with_capacity(self.tables().len());
        for name in self.tables() {
            let columns = self.columns_of(name)?;
            let foreign_keys = self.foreign_keys_of(name)?;
            tables.push(TableOverview::new(name.as_str(), &columns, foreign_keys));
        }
        Ok(SchemaOverview { tables })
    }
}

fn read_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<ColumnInfo>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_identifier(table)))?;
    let columns = stmt
        .query_map([], |row| {
            let position: i64 = row.get(0)?;
            let not_null: i64 = row.get(3)?;
            let default_value = match Value::from(row.get_ref(4)?) {
                Value::Null => None,
                other => Some(other.to_string()),
            };
            let primary_key: i64 = row.get(5)?;
            Ok(ColumnInfo {
                position: position as usize,
                name: row.get(1)?,
                declared_type: row.get(2)?,
                not_null: not_null != 0,
                default_value,
                primary_key: primary_key as u32,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(columns)
}

fn read_foreign_keys(conn: &Connection, table: &str) -> rusqlite::Result<Vec<ForeignKey>> {
    // id, seq, table, from, to, on_update, on_delete, match
    let mut stmt = conn.prepare(&format!("PRAGMA foreign_key_list({})", quote_identifier(table)))?;
    let fks = stmt
        .query_map([], |row| {
            Ok(ForeignKey {
                column: row.get(3)?,
                table: row.get(2)?,
                to: row.get(4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(fks)
}
