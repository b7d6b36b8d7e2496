//! Creating new databases from declarative table specs
//!
//! Table definition files read by the CLI look like:
//!
//! ```toml
//! [[table]]
//! name = "users"
//! columns = [
//!     { name = "id", type = "INTEGER", primary_key = true },
//!     { name = "email", type = "TEXT", not_null = true },
//! ]
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use crate::session::{Session, quote_identifier};
use crate::{Error, Result};

/// One column of a table to create
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type", default)]
    pub sql_type: String,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub not_null: bool,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            primary_key: false,
            not_null: false,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }
}

/// A table to create
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    pub name: String,
    pub columns: Vec<ColumnSpec>,
}

impl TableSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnSpec) -> Self {
        self.columns.push(column);
        self
    }

    /// `CREATE TABLE` statement for this spec.
    ///
    /// A single primary-key column is declared inline (so an `INTEGER`
    /// key becomes the rowid alias); several form a table constraint.
    pub fn to_ddl(&self) -> String {
        let pk_count = self.columns.iter().filter(|c| c.primary_key).count();

        let mut defs: Vec<String> = self
            .columns
            .iter()
            .map(|col| {
                let mut def = quote_identifier(&col.name);
                if !col.sql_type.trim().is_empty() {
                    def.push(' ');
                    def.push_str(col.sql_type.trim());
                }
                if col.primary_key && pk_count == 1 {
                    def.push_str(" PRIMARY KEY");
                }
                if col.not_null {
                    def.push_str(" NOT NULL");
                }
                def
            })
            .collect();

        if pk_count > 1 {
            let keys: Vec<String> = self
                .columns
                .iter()
                .filter(|c| c.primary_key)
                .map(|c| quote_identifier(&c.name))
                .collect();
            defs.push(format!("PRIMARY KEY ({})", keys.join(", ")));
        }

        format!(
            "CREATE TABLE {} (\n    {}\n)",
            quote_identifier(&self.name),
            defs.join(",\n    ")
        )
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("table name is empty".to_string());
        }
        if self.columns.is_empty() {
            return Err(format!("table {} has no columns", self.name));
        }
        let mut seen = HashSet::new();
        for col in &self.columns {
            if col.name.trim().is_empty() {
                return Err(format!("table {} has a column without a name", self.name));
            }
            if !seen.insert(col.name.to_lowercase()) {
                return Err(format!("table {} declares column {} twice", self.name, col.name));
            }
        }
        Ok(())
    }
}

/// Table specs as read from a TOML file (`[[table]]` entries)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSpec {
    #[serde(rename = "table", default)]
    pub tables: Vec<TableSpec>,
}

impl DatabaseSpec {
    pub fn from_toml(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

/// Where a created database lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// The current working directory
    Permanent,
    /// A fresh temporary directory, removed with the session
    Temporary,
}

/// Create a new database named `name` holding `specs`, in order.
pub fn create_database(name: &str, specs: &[TableSpec], placement: Placement) -> Result<Session> {
    match placement {
        Placement::Permanent => {
            let cwd = std::env::current_dir().map_err(|e| creation_error(name, e))?;
            create_database_in(&cwd, name, specs)
        }
        Placement::Temporary => {
            let workspace = tempfile::Builder::new()
                .prefix("sqlsage-")
                .tempdir()
                .map_err(|e| creation_error(name, e))?;
            let mut session = create_database_in(workspace.path(), name, specs)?;
            session.attach_workspace(workspace);
            Ok(session)
        }
    }
}

/// Create a new database file inside `dir`.
///
/// On any failure the connection is closed and the half-built file
/// removed before the error is returned.
pub fn create_database_in(dir: &Path, name: &str, specs: &[TableSpec]) -> Result<Session> {
    validate(name, specs).map_err(|reason| creation_error(name, reason))?;

    let path = database_path(dir, name);
    if path.exists() {
        return Err(creation_error(
            name,
            format!("{} already exists", path.display()),
        ));
    }

    let mut session = Session::open_path(&path).map_err(|e| creation_error(name, e))?;

    if let Err(err) = apply_specs(&mut session, specs) {
        session.close();
        std::fs::remove_file(&path).ok();
        return Err(creation_error(name, err));
    }

    tracing::info!("Created {} with {} tables", path.display(), specs.len());
    Ok(session)
}

fn apply_specs(session: &mut Session, specs: &[TableSpec]) -> Result<()> {
    {
        let conn = session.conn()?;
        for spec in specs {
            let ddl = spec.to_ddl();
            tracing::debug!("Creating table {}: {}", spec.name, ddl);
            conn.execute_batch(&ddl)
                .map_err(|e| Error::metadata(format!("create table {}", spec.name), e))?;
        }
    }
    session.commit()?;
    session.refresh_tables()?;
    Ok(())
}

fn database_path(dir: &Path, name: &str) -> PathBuf {
    if Path::new(name).extension().is_some() {
        dir.join(name)
    } else {
        dir.join(format!("{}.db", name))
    }
}

fn validate(name: &str, specs: &[TableSpec]) -> std::result::Result<(), String> {
    if name.trim().is_empty() {
        return Err("database name is empty".to_string());
    }
    if name.contains(['/', '\\']) {
        return Err(format!("database name {:?} must not contain a path", name));
    }
    if specs.is_empty() {
        return Err("no tables specified".to_string());
    }
    let mut seen = HashSet::new();
    for spec in specs {
        spec.validate()?;
        if !seen.insert(spec.name.to_lowercase()) {
            return Err(format!("table {} is specified twice", spec.name));
        }
    }
    Ok(())
}

fn creation_error(name: &str, source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Error {
    Error::Creation {
        name: name.to_string(),
        source: source.into(),
    }
}
