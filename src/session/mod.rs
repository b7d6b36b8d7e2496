//! Database session - one SQLite connection and what it knows
//!
//! A session moves through `Unopened -> Open -> Closed`. Only an open
//! session executes SQL, reads metadata or persists the file; everything
//! else fails with [`Error::InvalidState`].
//!
//! Operations are split across:
//! - this module: lifecycle, table list, execution
//! - `schema`: column / key / preview / count inspection
//! - `persist`: save-as, export, backups

pub mod schema;
pub mod persist;

use std::path::{Path, PathBuf};
use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use tempfile::TempDir;
use crate::classify::{StatementKind, leading_keyword, split_statements};
use crate::result::{QueryResult, Status, Table, Value};
use crate::source::{LoadedSource, SourceLoader};
use crate::{Error, Result};

pub use schema::{DEFAULT_PREVIEW_LIMIT, quote_identifier};

/// User tables in creation order
const LIST_TABLES_SQL: &str =
    "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY rowid";

/// Externally visible lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Unopened,
    Open,
    Closed,
}

enum Handle {
    Unopened,
    Open(Connection),
    Closed,
}

/// Outcome of one statement run by [`Session::execute_batch`]
#[derive(Debug)]
pub struct StatementOutcome {
    /// 1-based position in the batch
    pub index: usize,
    pub statement: String,
    pub outcome: Result<QueryResult>,
}

impl StatementOutcome {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// A single SQLite database opened for inspection and querying.
///
/// The session exclusively owns its connection and is the source of
/// truth for which tables exist. It is `Send`; callers sharing one
/// across threads serialize access themselves.
pub struct Session {
    path: PathBuf,
    // dropped before `workspace` so the file is closed before its directory goes
    handle: Handle,
    tables: Vec<String>,
    workspace: Option<TempDir>,
}

impl Session {
    /// Create an unopened session for the database at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let path = std::path::absolute(&path).unwrap_or(path);
        Self {
            path,
            handle: Handle::Unopened,
            tables: Vec::new(),
            workspace: None,
        }
    }

    /// Open the database file at `path`
    pub fn open_path(path: impl Into<PathBuf>) -> Result<Self> {
        let mut session = Self::new(path);
        session.open()?;
        Ok(session)
    }

    /// Load a database file or SQL script and open it
    pub fn from_source(path: &Path) -> Result<Self> {
        Self::from_loaded(SourceLoader::new().load(path)?)
    }

    /// Open a source produced by a [`SourceLoader`], taking over its
    /// working directory
    pub fn from_loaded(loaded: LoadedSource) -> Result<Self> {
        let (path, workspace) = loaded.into_parts();
        let mut session = Self::new(path);
        session.workspace = workspace;
        session.open()?;
        Ok(session)
    }

    pub(crate) fn attach_workspace(&mut self, workspace: TempDir) {
        self.workspace = Some(workspace);
    }

    /// Absolute path of the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> SessionState {
        match self.handle {
            Handle::Unopened => SessionState::Unopened,
            Handle::Open(_) => SessionState::Open,
            Handle::Closed => SessionState::Closed,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    /// Whether the database file is removed when the session is dropped
    pub fn is_temporary(&self) -> bool {
        self.workspace.is_some()
    }

    /// Cached table names, as of the last refresh
    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.iter().any(|t| t == name)
    }

    /// Establish the connection and load the table list.
    ///
    /// Opening an open session is a no-op; a closed session cannot be
    /// reopened.
    pub fn open(&mut self) -> Result<()> {
        match self.handle {
            Handle::Open(_) => return Ok(()),
            Handle::Closed => return Err(Error::InvalidState("session is closed".to_string())),
            Handle::Unopened => {}
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        let conn = Connection::open_with_flags(&self.path, flags).map_err(|source| Error::Connection {
            path: self.path.clone(),
            source,
        })?;

        // sqlite only notices a non-database file on first read
        match list_tables(&conn) {
            Ok(tables) => {
                self.tables = tables;
                self.handle = Handle::Open(conn);
            }
            Err(source) => {
                return Err(Error::Connection {
                    path: self.path.clone(),
                    source,
                });
            }
        }

        tracing::info!("Opened {} ({} tables)", self.path.display(), self.tables.len());
        Ok(())
    }

    pub(crate) fn conn(&self) -> Result<&Connection> {
        match &self.handle {
            Handle::Open(conn) => Ok(conn),
            Handle::Unopened => Err(Error::InvalidState("session is not open".to_string())),
            Handle::Closed => Err(Error::InvalidState("session is closed".to_string())),
        }
    }

    fn conn_mut(&mut self) -> Result<&mut Connection> {
        match &mut self.handle {
            Handle::Open(conn) => Ok(conn),
            Handle::Unopened => Err(Error::InvalidState("session is not open".to_string())),
            Handle::Closed => Err(Error::InvalidState("session is closed".to_string())),
        }
    }

    /// Re-read the table list from the catalog
    pub fn refresh_tables(&mut self) -> Result<&[String]> {
        let tables = list_tables(self.conn()?).map_err(|e| Error::metadata("get tables", e))?;
        self.tables = tables;
        Ok(&self.tables)
    }

    /// Commit an open transaction, if any
    pub fn commit(&self) -> Result<()> {
        let conn = self.conn()?;
        if !conn.is_autocommit() {
            conn.execute_batch("COMMIT").map_err(|e| Error::metadata("commit", e))?;
        }
        Ok(())
    }

    // ========== Execution ==========

    /// Execute SQL and classify the outcome.
    ///
    /// Statements starting with SELECT, WITH or PRAGMA run as a single
    /// statement and return [`QueryResult::Tabular`]; anything after the
    /// first statement is ignored. All other input is split on `;` and run
    /// statement by statement, returning [`QueryResult::Status`] and
    /// refreshing the table list.
    ///
    /// A failing statement stops a mutating batch, but statements that ran
    /// before it are **not** rolled back: the database may be left partially
    /// modified (see [`Error::is_partial_batch`]). Use
    /// [`Session::execute_atomic`] for all-or-nothing batches.
    pub fn execute(&mut self, sql: &str) -> Result<QueryResult> {
        self.conn()?;
        let sql = sql.trim();
        if sql.is_empty() {
            return Err(Error::EmptyQuery);
        }

        if StatementKind::of(sql).is_data_returning() {
            return self.run_data_returning(sql);
        }

        let statements = split_statements(sql);
        if statements.is_empty() {
            return Err(Error::EmptyQuery);
        }

        let outcome = {
            let conn = self.conn()?;
            run_statements(conn, &statements).and_then(|rows| {
                commit_batch(conn, statements.len())?;
                Ok(rows)
            })
        };
        self.finish_mutation(outcome, statements.len())
    }

    /// Like [`Session::execute`], but a mutating batch runs inside one
    /// transaction and is rolled back entirely if any statement fails.
    pub fn execute_atomic(&mut self, sql: &str) -> Result<QueryResult> {
        self.conn()?;
        let sql = sql.trim();
        if sql.is_empty() {
            return Err(Error::EmptyQuery);
        }

        if StatementKind::of(sql).is_data_returning() {
            return self.run_data_returning(sql);
        }

        let statements = split_statements(sql);
        if statements.is_empty() {
            return Err(Error::EmptyQuery);
        }

        let outcome = {
            let conn = self.conn_mut()?;
            let tx = conn.transaction().map_err(|e| Error::metadata("begin transaction", e))?;
            match run_statements(&tx, &statements) {
                Ok(rows) => tx
                    .commit()
                    .map(|_| rows)
                    .map_err(|e| Error::metadata("commit", e)),
                Err(err) => {
                    if let Err(e) = tx.rollback() {
                        tracing::warn!("Rollback failed: {}", e);
                    }
                    Err(match err {
                        Error::Execution { index, statement, source, .. } => Error::Execution {
                            index,
                            statement,
                            applied: 0,
                            source,
                        },
                        other => other,
                    })
                }
            }
        };
        self.finish_mutation(outcome, statements.len())
    }

    /// Run every statement independently through [`Session::execute`],
    /// reporting each outcome. A failure never stops the rest.
    pub fn execute_batch(&mut self, sql: &str) -> Result<Vec<StatementOutcome>> {
        self.conn()?;
        let mut outcomes = Vec::new();
        for (i, statement) in split_statements(sql).into_iter().enumerate() {
            let outcome = self.execute(&statement);
            if let Err(e) = &outcome {
                tracing::debug!("Statement {} failed: {}", i + 1, e);
            }
            outcomes.push(StatementOutcome {
                index: i + 1,
                statement,
                outcome,
            });
        }
        Ok(outcomes)
    }

    fn run_data_returning(&self, sql: &str) -> Result<QueryResult> {
        let statements = split_statements(sql);
        let first = statements.first().map(String::as_str).unwrap_or(sql);
        if statements.len() > 1 {
            tracing::warn!(
                "Only the first statement of a data-returning query runs; ignoring {} more",
                statements.len() - 1
            );
        }

        tracing::debug!("Querying: {}", first);
        let table = query_table(self.conn()?, first).map_err(|source| Error::Execution {
            index: 1,
            statement: first.to_string(),
            applied: 0,
            source,
        })?;
        Ok(QueryResult::Tabular(table))
    }

    fn finish_mutation(&mut self, outcome: Result<u64>, statements: usize) -> Result<QueryResult> {
        // a failed batch may still have changed the schema
        let refreshed = self.refresh_tables().map(|_| ());

        let rows = match outcome {
            Ok(rows) => rows,
            Err(err) => {
                if let Err(e) = refreshed {
                    tracing::warn!("Table refresh after failed batch also failed: {}", e);
                }
                if err.is_partial_batch() {
                    tracing::warn!("Batch stopped part-way; earlier statements were not rolled back");
                }
                return Err(err);
            }
        };
        refreshed?;

        Ok(QueryResult::Status(Status::success(rows, statements)))
    }

    /// Release the connection. Safe to call repeatedly.
    pub fn close(&mut self) {
        match std::mem::replace(&mut self.handle, Handle::Closed) {
            Handle::Open(conn) => {
                if let Err((_, e)) = conn.close() {
                    tracing::warn!("Error while closing {}: {}", self.path.display(), e);
                } else {
                    tracing::debug!("Closed {}", self.path.display());
                }
            }
            Handle::Unopened | Handle::Closed => {}
        }
        self.tables.clear();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("path", &self.path)
            .field("state", &self.state())
            .field("tables", &self.tables)
            .field("temporary", &self.is_temporary())
            .finish()
    }
}

fn list_tables(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(LIST_TABLES_SQL)?;
    let names = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(names)
}

/// Run a data-returning statement and collect every row
pub(crate) fn query_table(conn: &Connection, sql: &str) -> rusqlite::Result<Table> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();

    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(width);
        for i in 0..width {
            values.push(Value::from(row.get_ref(i)?));
        }
        out.push(values);
    }
    Ok(Table::new(columns, out))
}

/// Run statements in order, stopping at the first failure.
/// Returns the number of rows changed by DML statements.
fn run_statements(conn: &Connection, statements: &[String]) -> Result<u64> {
    let mut rows = 0u64;
    for (i, statement) in statements.iter().enumerate() {
        tracing::debug!("Executing statement {}: {}", i + 1, statement);
        conn.execute_batch(statement).map_err(|source| Error::Execution {
            index: i + 1,
            statement: statement.clone(),
            applied: i,
            source,
        })?;

        // changes() is not reset by DDL
        if matches!(
            leading_keyword(statement).as_deref(),
            Some("INSERT" | "UPDATE" | "DELETE" | "REPLACE")
        ) {
            rows += conn.changes() as u64;
        }
    }
    Ok(rows)
}

/// Commit once after a successful batch that left a transaction open
fn commit_batch(conn: &Connection, statements: usize) -> Result<()> {
    if conn.is_autocommit() {
        return Ok(());
    }
    conn.execute_batch("COMMIT").map_err(|source| Error::Execution {
        index: statements + 1,
        statement: "COMMIT".to_string(),
        applied: statements,
        source,
    })
}
