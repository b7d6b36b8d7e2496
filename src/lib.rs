//! # sqlsage - SQLite session manager
//!
//! Point sqlsage at a SQLite database (or a SQL script defining one),
//! inspect its structure, run SQL against it, and ask questions that an
//! external language model translates into SQL.
//!
//! sqlsage provides:
//! - Source loading for `.db` / `.sqlite` / `.sqlite3` files and `.sql` scripts
//! - A `Session` owning one connection, with keyword-based result classification
//! - Schema inspection (columns, primary keys, foreign keys, previews, counts)
//! - Persistence (save-as, byte export, timestamped backups, database creation)
//! - A pluggable translation backend for natural-language questions

use std::path::PathBuf;

pub mod classify;
pub mod result;
pub mod schema;
pub mod source;
pub mod session;
pub mod create;
pub mod translate;
pub mod config;
pub mod output;
pub mod ui;

// Re-exports for convenient access
pub use classify::{StatementKind, split_statements};
pub use result::{QueryResult, Status, Table, Value};
pub use schema::{ColumnInfo, ForeignKey, SchemaOverview, TableOverview};
pub use source::{LoadedSource, SourceKind, SourceLoader};
pub use session::{Session, SessionState, StatementOutcome};
pub use create::{ColumnSpec, DatabaseSpec, Placement, TableSpec, create_database};
pub use translate::{Answer, CommandTranslator, Translator, ask, ask_and_explain, clean_generated_sql};

/// Result type alias for sqlsage operations
pub type Result<T> = std::result::Result<T, Error>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error types for sqlsage operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unsupported file format: {extension:?}")]
    UnsupportedFormat { extension: String },

    #[error("Failed to connect to database {}: {source}", path.display())]
    Connection {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Failed to create database from SQL script {}: {source}", path.display())]
    Script {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Failed to {operation}: {source}")]
    Metadata {
        operation: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("No SQL to execute")]
    EmptyQuery,

    #[error("Statement {index} failed: {statement}: {source}")]
    Execution {
        /// 1-based position of the failing statement in its batch
        index: usize,
        statement: String,
        /// Statements of the same batch that were applied before the failure
        applied: usize,
        #[source]
        source: rusqlite::Error,
    },

    #[error("No such table: {0}")]
    NoSuchTable(String),

    #[error("Failed to count rows in {table}: {source}")]
    Count {
        table: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Failed to persist database to {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("Failed to create database {name}: {source}")]
    Creation {
        name: String,
        #[source]
        source: BoxError,
    },

    #[error("Translation failed: {0}")]
    Translation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True when a mutating batch failed after earlier statements were
    /// already applied, leaving the database in a mixed state.
    pub fn is_partial_batch(&self) -> bool {
        matches!(self, Error::Execution { applied, .. } if *applied > 0)
    }

    pub(crate) fn metadata(operation: impl Into<String>, source: rusqlite::Error) -> Self {
        Error::Metadata {
            operation: operation.into(),
            source,
        }
    }

    pub(crate) fn persistence(path: impl Into<PathBuf>, source: impl Into<BoxError>) -> Self {
        Error::Persistence {
            path: path.into(),
            source: source.into(),
        }
    }
}
