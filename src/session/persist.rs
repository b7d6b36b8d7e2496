//! Persistence operations: save-as, export and backups
//!
//! All of them commit first, then copy the database file. Failures are
//! reported once, never retried.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use chrono::{DateTime, Local};
use crate::{Error, Result};
use super::Session;

/// Timestamp format used in backup file names (second precision)
pub const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

impl Session {
    /// Commit and make sure a WAL-mode database has everything in the main file
    fn flush_to_file(&self) -> Result<()> {
        self.conn()?;
        self.commit()
            .map_err(|e| Error::persistence(&self.path, e))?;

        let conn = self.conn()?;
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .map_err(|e| Error::persistence(&self.path, e))?;
        if mode.eq_ignore_ascii_case("wal") {
            conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
                .map_err(|e| Error::persistence(&self.path, e))?;
        }
        Ok(())
    }

    /// Copy the database to `dest`, creating parent directories.
    ///
    /// Returns the number of bytes written.
    pub fn save_as(&self, dest: &Path) -> Result<u64> {
        self.flush_to_file()?;

        if is_same_file(&self.path, dest) {
            tracing::debug!("Save target is the open database; nothing to copy");
            return Ok(std::fs::metadata(&self.path)
                .map_err(|e| Error::persistence(dest, e))?
                .len());
        }

        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| Error::persistence(dest, e))?;
            }
        }

        let bytes = std::fs::copy(&self.path, dest).map_err(|e| Error::persistence(dest, e))?;
        tracing::info!("Saved {} to {} ({} bytes)", self.path.display(), dest.display(), bytes);
        Ok(bytes)
    }

    /// The whole database file as bytes
    pub fn export_bytes(&self) -> Result<Vec<u8>> {
        self.flush_to_file()?;
        std::fs::read(&self.path).map_err(|e| Error::persistence(&self.path, e))
    }

    /// Copy the database to a backup file and return its path.
    ///
    /// Without an explicit path the backup goes next to the database as
    /// `<stem>_backup_<YYYYmmdd_HHMMSS>.<ext>`. An existing file is never
    /// overwritten by an automatic name: a numeric suffix is added instead.
    pub fn backup(&self, explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(dest) = explicit {
            self.save_as(dest)?;
            return Ok(dest.to_path_buf());
        }

        self.flush_to_file()?;
        let (dest, mut file) = create_backup_file(&self.path, Local::now())?;

        let mut source = File::open(&self.path).map_err(|e| Error::persistence(&dest, e))?;
        if let Err(e) = std::io::copy(&mut source, &mut file) {
            drop(file);
            std::fs::remove_file(&dest).ok();
            return Err(Error::persistence(&dest, e));
        }

        tracing::info!("Backed up {} to {}", self.path.display(), dest.display());
        Ok(dest)
    }
}

/// Automatic backup name for `db` at time `at`, with an optional
/// collision counter
pub fn backup_file_name(db: &Path, at: DateTime<Local>, attempt: usize) -> String {
    let stem = db.file_stem().and_then(|s| s.to_str()).unwrap_or("database");
    let ext = db.extension().and_then(|s| s.to_str()).unwrap_or("db");
    let stamp = at.format(BACKUP_TIMESTAMP_FORMAT);
    if attempt == 0 {
        format!("{}_backup_{}.{}", stem, stamp, ext)
    } else {
        format!("{}_backup_{}_{}.{}", stem, stamp, attempt, ext)
    }
}

/// Create (exclusively) the first free backup file next to `db`
fn create_backup_file(db: &Path, at: DateTime<Local>) -> Result<(PathBuf, File)> {
    let dir = db.parent().unwrap_or_else(|| Path::new("."));
    let mut attempt = 0;
    loop {
        let candidate = dir.join(backup_file_name(db, at, attempt));
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(file) => return Ok((candidate, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(Error::persistence(candidate, e)),
        }
    }
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn populated() -> (TempDir, Session) {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::open_path(dir.path().join("inventory.db")).unwrap();
        session
            .execute(
                "CREATE TABLE items(id INTEGER PRIMARY KEY, label TEXT);
                 CREATE TABLE tags(name TEXT);
                 INSERT INTO items(label) VALUES ('bolt'), ('nut'), ('gear');
                 INSERT INTO tags VALUES ('metal');",
            )
            .unwrap();
        (dir, session)
    }

    #[test]
    fn test_save_as_round_trip() {
        let (dir, session) = populated();
        let dest = dir.path().join("copies").join("saved.db");
        let bytes = session.save_as(&dest).unwrap();
        assert!(bytes > 0);

        let copy = Session::open_path(&dest).unwrap();
        assert_eq!(copy.tables(), session.tables());
        for table in session.tables() {
            assert_eq!(
                copy.row_count_of(table).unwrap(),
                session.row_count_of(table).unwrap()
            );
        }
    }

    #[test]
    fn test_save_as_includes_open_transaction() {
        let (dir, session) = populated();
        session
            .conn()
            .unwrap()
            .execute_batch("BEGIN; INSERT INTO tags VALUES ('late')")
            .unwrap();

        let dest = dir.path().join("tx.db");
        session.save_as(&dest).unwrap();
        let copy = Session::open_path(&dest).unwrap();
        assert_eq!(copy.row_count_of("tags").unwrap(), 2);
    }

    #[test]
    fn test_save_as_onto_itself_keeps_data() {
        let (_dir, session) = populated();
        let path = session.path().to_path_buf();
        session.save_as(&path).unwrap();
        assert_eq!(session.row_count_of("items").unwrap(), 3);
    }

    #[test]
    fn test_export_bytes_is_a_sqlite_file() {
        let (_dir, session) = populated();
        let bytes = session.export_bytes().unwrap();
        assert!(bytes.starts_with(b"SQLite format 3\0"));
    }

    #[test]
    fn test_backup_names_never_collide() {
        let (_dir, session) = populated();
        let first = session.backup(None).unwrap();
        let second = session.backup(None).unwrap();
        assert_ne!(first, second);
        assert!(first.exists() && second.exists());

        let name = first.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("inventory_backup_"));
        assert!(name.ends_with(".db"));
    }

    #[test]
    fn test_backup_to_explicit_path() {
        let (dir, session) = populated();
        let dest = dir.path().join("explicit.sqlite");
        assert_eq!(session.backup(Some(&dest)).unwrap(), dest);
        assert_eq!(Session::open_path(&dest).unwrap().row_count_of("items").unwrap(), 3);
    }

    #[test]
    fn test_backup_file_name_format() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        let db = Path::new("/data/shop.sqlite3");
        assert_eq!(backup_file_name(db, at, 0), "shop_backup_20240309_070501.sqlite3");
        assert_eq!(backup_file_name(db, at, 2), "shop_backup_20240309_070501_2.sqlite3");
    }

    #[test]
    fn test_persistence_requires_open_session() {
        let (dir, mut session) = populated();
        session.close();
        assert!(session.save_as(&dir.path().join("x.db")).is_err());
        assert!(session.export_bytes().is_err());
    }
}
