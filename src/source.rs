//! Source loading
//!
//! Turns an input artifact into a SQLite file a session can open:
//! - `.db`, `.sqlite`, `.sqlite3`: used in place
//! - `.sql`: executed into a fresh database inside a working directory
//!
//! Each script load gets its own working directory unless the caller
//! supplies one, so loads never clobber each other's databases.

use std::path::{Path, PathBuf};
use rusqlite::Connection;
use tempfile::TempDir;
use crate::{Error, Result};

/// Extensions opened directly as SQLite databases
pub const DATABASE_EXTENSIONS: &[&str] = &["db", "sqlite", "sqlite3"];

/// Extension of SQL scripts
pub const SCRIPT_EXTENSION: &str = "sql";

/// Kind of input artifact, decided by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Database,
    Script,
}

impl SourceKind {
    /// Detect the kind from the (case-insensitive) extension
    pub fn detect(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        if DATABASE_EXTENSIONS.contains(&ext.as_str()) {
            Ok(SourceKind::Database)
        } else if ext == SCRIPT_EXTENSION {
            Ok(SourceKind::Script)
        } else {
            Err(Error::UnsupportedFormat { extension: ext })
        }
    }
}

/// A database file ready to be opened
#[derive(Debug)]
pub struct LoadedSource {
    path: PathBuf,
    origin: PathBuf,
    kind: SourceKind,
    workspace: Option<TempDir>,
}

impl LoadedSource {
    /// Database file to open
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The artifact that was loaded (the script for `Script` sources)
    pub fn origin(&self) -> &Path {
        &self.origin
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Whether the database lives in a directory removed on drop
    pub fn is_temporary(&self) -> bool {
        self.workspace.is_some()
    }

    pub(crate) fn into_parts(self) -> (PathBuf, Option<TempDir>) {
        (self.path, self.workspace)
    }
}

/// Loads databases and SQL scripts
#[derive(Debug, Clone, Default)]
pub struct SourceLoader {
    work_dir: Option<PathBuf>,
}

impl SourceLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Materialize scripts into `dir` instead of a fresh temporary directory.
    ///
    /// A script with the same stem loaded twice into the same directory
    /// replaces the earlier database.
    pub fn with_work_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: Some(dir.into()),
        }
    }

    /// Resolve `path` into an openable database
    pub fn load(&self, path: &Path) -> Result<LoadedSource> {
        match SourceKind::detect(path)? {
            SourceKind::Database => {
                if !path.is_file() {
                    return Err(Error::Connection {
                        path: path.to_path_buf(),
                        source: rusqlite::Error::InvalidPath(path.to_path_buf()),
                    });
                }
                Ok(LoadedSource {
                    path: path.to_path_buf(),
                    origin: path.to_path_buf(),
                    kind: SourceKind::Database,
                    workspace: None,
                })
            }
            SourceKind::Script => self.materialize_script(path),
        }
    }

    fn materialize_script(&self, script: &Path) -> Result<LoadedSource> {
        let script_text = std::fs::read_to_string(script)?;

        let (dir, workspace) = match &self.work_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                (dir.clone(), None)
            }
            None => {
                let tmp = tempfile::Builder::new().prefix("sqlsage-").tempdir()?;
                (tmp.path().to_path_buf(), Some(tmp))
            }
        };

        let stem = script.file_stem().and_then(|s| s.to_str()).unwrap_or("script");
        let db_path = dir.join(format!("{}.sqlite", stem));
        if db_path.exists() {
            std::fs::remove_file(&db_path)?;
        }

        tracing::debug!("Materializing {} into {}", script.display(), db_path.display());

        let conn = Connection::open(&db_path).map_err(|source| Error::Connection {
            path: db_path.clone(),
            source,
        })?;

        let applied = conn.execute_batch(&script_text).and_then(|_| {
            // a script may leave its own BEGIN open
            if conn.is_autocommit() {
                Ok(())
            } else {
                conn.execute_batch("COMMIT")
            }
        });

        if let Err(source) = applied {
            drop(conn);
            std::fs::remove_file(&db_path).ok();
            return Err(Error::Script {
                path: script.to_path_buf(),
                source,
            });
        }

        conn.close().map_err(|(_, source)| Error::Connection {
            path: db_path.clone(),
            source,
        })?;

        tracing::info!("Loaded SQL script {} into {}", script.display(), db_path.display());

        Ok(LoadedSource {
            path: db_path,
            origin: script.to_path_buf(),
            kind: SourceKind::Script,
            workspace,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USERS_SCRIPT: &str =
        "CREATE TABLE users(id INTEGER PRIMARY KEY, name TEXT); INSERT INTO users VALUES (1,'Ann');";

    #[test]
    fn test_detect_kinds() {
        assert_eq!(SourceKind::detect(Path::new("a.db")).unwrap(), SourceKind::Database);
        assert_eq!(SourceKind::detect(Path::new("a.SQLite")).unwrap(), SourceKind::Database);
        assert_eq!(SourceKind::detect(Path::new("a.sqlite3")).unwrap(), SourceKind::Database);
        assert_eq!(SourceKind::detect(Path::new("dump.sql")).unwrap(), SourceKind::Script);
    }

    #[test]
    fn test_detect_unsupported() {
        match SourceKind::detect(Path::new("data.csv")) {
            Err(Error::UnsupportedFormat { extension }) => assert_eq!(extension, "csv"),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(matches!(
            SourceKind::detect(Path::new("README")),
            Err(Error::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn test_script_loads_into_fresh_database() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("users.sql");
        std::fs::write(&script, USERS_SCRIPT).unwrap();

        let loaded = SourceLoader::new().load(&script).unwrap();
        assert_eq!(loaded.kind(), SourceKind::Script);
        assert!(loaded.is_temporary());
        assert_ne!(loaded.path(), script.as_path());
        assert_eq!(loaded.origin(), script.as_path());

        let conn = Connection::open(loaded.path()).unwrap();
        let name: String = conn
            .query_row("SELECT name FROM users WHERE id = 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(name, "Ann");
    }

    #[test]
    fn test_separate_loads_do_not_share_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("users.sql");
        std::fs::write(&script, USERS_SCRIPT).unwrap();

        let loader = SourceLoader::new();
        let first = loader.load(&script).unwrap();
        let second = loader.load(&script).unwrap();
        assert_ne!(first.path(), second.path());
    }

    #[test]
    fn test_work_dir_replaces_previous_database() {
        let dir = tempfile::tempdir().unwrap();
        let work = dir.path().join("work");
        let script = dir.path().join("users.sql");
        std::fs::write(&script, USERS_SCRIPT).unwrap();

        let loader = SourceLoader::with_work_dir(&work);
        let first = loader.load(&script).unwrap();
        assert!(!first.is_temporary());
        assert_eq!(first.path(), work.join("users.sqlite"));

        // loading again must not fail on the existing users table
        let second = loader.load(&script).unwrap();
        assert_eq!(second.path(), first.path());
    }

    #[test]
    fn test_missing_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.db");
        assert!(matches!(
            SourceLoader::new().load(&missing),
            Err(Error::Connection { .. })
        ));
        assert!(!missing.exists());
    }

    #[test]
    fn test_broken_script() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("broken.sql");
        std::fs::write(&script, "CREATE TABLE ok(x); THIS IS NOT SQL;").unwrap();

        let work = dir.path().join("work");
        let err = SourceLoader::with_work_dir(&work).load(&script).unwrap_err();
        assert!(matches!(err, Error::Script { .. }));
        assert!(!work.join("broken.sqlite").exists());
    }
}
