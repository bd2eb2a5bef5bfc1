//! SQL schema migrations and connection setup for the SQLite backend.
//!
//! Uses `rusqlite_migration` to manage schema migrations via SQLite's
//! `user_version` pragma. Migrations are embedded at compile time via
//! `include_str!`.

use std::time::Duration;

use rusqlite::Connection;
use rusqlite_migration::{Migrations, M};

use crate::error::{BackendError, StorageError};

/// Busy timeout applied to connections unless configured otherwise.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// All schema migrations, applied in order via `user_version` tracking.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        M::up(include_str!("migrations/001_initial_schema.sql")),
        // Future migrations added here as new M::up(...) entries.
    ])
}

/// Opens (or creates) a SQLite database at `path` with WAL mode, foreign keys,
/// and all pending migrations applied.
pub fn open_database(path: &str, busy_timeout: Duration) -> Result<Connection, StorageError> {
    let mut conn = Connection::open(path).map_err(StorageError::during("open database"))?;
    configure_and_migrate(&mut conn, busy_timeout)?;
    tracing::debug!(path, "opened link graph database");
    Ok(conn)
}

/// Opens an in-memory SQLite database with foreign keys and all migrations
/// applied.
pub fn open_in_memory() -> Result<Connection, StorageError> {
    let mut conn =
        Connection::open_in_memory().map_err(StorageError::during("open database"))?;
    configure_and_migrate(&mut conn, DEFAULT_BUSY_TIMEOUT)?;
    Ok(conn)
}

/// Configures pragmas and applies pending migrations.
fn configure_and_migrate(conn: &mut Connection, busy_timeout: Duration) -> Result<(), StorageError> {
    let configure = |conn: &Connection| -> rusqlite::Result<()> {
        // WAL lets readers proceed while a writer appends (no-op in memory).
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        // Off by default in SQLite; edge upserts rely on it.
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(busy_timeout)
    };
    configure(&*conn).map_err(StorageError::during("configure database"))?;

    migrations().to_latest(conn).map_err(|e| {
        StorageError::backend("migrate database", BackendError::Migration(e.to_string()))
    })?;
    tracing::debug!("link graph schema is up to date");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_valid() {
        assert!(migrations().validate().is_ok());
    }

    #[test]
    fn open_sets_pragmas_and_creates_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.sqlite3");
        let conn = open_database(path.to_str().unwrap(), Duration::from_millis(1500)).unwrap();

        let journal_mode: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .unwrap();
        assert_eq!(journal_mode.to_ascii_lowercase(), "wal");

        let busy_timeout_ms: i64 = conn
            .pragma_query_value(None, "busy_timeout", |row| row.get(0))
            .unwrap();
        assert_eq!(busy_timeout_ms, 1500);

        let foreign_keys: i64 = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .unwrap();
        assert_eq!(foreign_keys, 1);

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('links', 'edges')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 2);
    }

    #[test]
    fn reopening_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.sqlite3");
        let path = path.to_str().unwrap();
        drop(open_database(path, DEFAULT_BUSY_TIMEOUT).unwrap());
        assert!(open_database(path, DEFAULT_BUSY_TIMEOUT).is_ok());
    }
}
