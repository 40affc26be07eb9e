//! Connection setup and migration bookkeeping.
//!
//! The table definitions themselves live in the versioned migrations; this
//! module only holds what every connection needs before they run.

use std::time::Duration;

use rusqlite::Connection;

use crate::error::Result;

/// Bookkeeping table for applied migrations.
pub const MIGRATIONS_TABLE_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at INTEGER NOT NULL
);
";

/// Default time a statement waits on a locked database file.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Set the per-connection pragmas.
///
/// `journal_mode` is left alone for in-memory databases, which only support
/// `memory`.
///
/// # Errors
///
/// Returns an error if a pragma cannot be set.
pub fn apply_pragmas(conn: &Connection, in_memory: bool) -> Result<()> {
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    if !in_memory {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
    }
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    Ok(())
}

/// Create the `schema_migrations` table if missing.
///
/// # Errors
///
/// Returns an error if the statement fails.
pub fn ensure_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(MIGRATIONS_TABLE_SQL)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pragmas_on_memory_db() {
        let conn = Connection::open_in_memory().unwrap();
        apply_pragmas(&conn, true).unwrap();
        let fk: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn test_wal_on_file_db() {
        let temp = tempfile::TempDir::new().unwrap();
        let conn = Connection::open(temp.path().join("main.db")).unwrap();
        apply_pragmas(&conn, false).unwrap();
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }
}
