//! Scoped `DuckDB` session handles.
//!
//! The warehouse keeps one database handle open for its lifetime and hands
//! every pipeline step its own [`StoreSession`]. A session is a separate
//! connection to the same database and is closed when it is dropped, on
//! success and failure paths alike.

use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ::duckdb::Connection;
use tracing::debug;

use crate::WarehouseError;

/// Declared intent of a store session.
///
/// The mode labels the session in logs and is reported by
/// [`StoreSession::mode`]. It is not enforced: `DuckDB` applies read-only
/// access per database, not per connection, so every session opened from a
/// writable database can write. Read paths open `ReadOnly` sessions so the
/// logs show which steps touch the store for writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Read-only access.
    ReadOnly,
    /// Read-write access.
    ReadWrite,
}

struct DatabaseInner {
    location: Option<PathBuf>,
    root: Mutex<Connection>,
}

/// Owner of the database handle that sessions are opened from.
#[derive(Clone)]
pub struct DuckDbDatabase {
    inner: Arc<DatabaseInner>,
}

impl DuckDbDatabase {
    /// Open (or create) the database file at `path`.
    ///
    /// # Errors
    /// Returns an error if the database file cannot be opened or configured.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ::duckdb::Error> {
        let path = path.into();
        let root = Connection::open(path.as_path())?;
        configure_connection(&root)?;
        Ok(Self::from_root(Some(path), root))
    }

    /// Open a private in-memory database. Sessions opened from it share its contents.
    ///
    /// # Errors
    /// Returns an error if `DuckDB` cannot allocate the database.
    pub fn open_in_memory() -> Result<Self, ::duckdb::Error> {
        let root = Connection::open_in_memory()?;
        configure_connection(&root)?;
        Ok(Self::from_root(None, root))
    }

    fn from_root(location: Option<PathBuf>, root: Connection) -> Self {
        Self {
            inner: Arc::new(DatabaseInner {
                location,
                root: Mutex::new(root),
            }),
        }
    }

    /// Open a new session against the database.
    ///
    /// # Errors
    /// Returns an error if a new connection cannot be established or configured,
    /// or if the root handle lock was poisoned.
    pub fn session(&self, mode: AccessMode) -> Result<StoreSession, WarehouseError> {
        let connection = {
            let root = self.inner.root.lock().map_err(|_| {
                WarehouseError::SessionUnavailable(String::from(
                    "duckdb root connection lock poisoned",
                ))
            })?;
            root.try_clone()?
        };
        configure_connection(&connection)?;
        debug!(?mode, "store session opened");

        Ok(StoreSession { mode, connection })
    }

    /// Path of the database file, `None` for in-memory databases.
    #[must_use]
    pub fn location(&self) -> Option<&Path> {
        self.inner.location.as_deref()
    }
}

/// A connection owned by exactly one pipeline step; closed on drop.
pub struct StoreSession {
    mode: AccessMode,
    connection: Connection,
}

impl StoreSession {
    /// Mode the session was opened with. Informational only.
    #[must_use]
    pub fn mode(&self) -> AccessMode {
        self.mode
    }
}

impl Deref for StoreSession {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        &self.connection
    }
}

impl Drop for StoreSession {
    fn drop(&mut self) {
        debug!(mode = ?self.mode, "store session closed");
    }
}

/// Configure a connection with appropriate settings.
///
/// # Errors
/// Returns an error if configuration SQL fails to execute.
fn configure_connection(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch("PRAGMA disable_progress_bar;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sessions_share_one_in_memory_database() {
        let database = DuckDbDatabase::open_in_memory().expect("open");

        {
            let writer = database.session(AccessMode::ReadWrite).expect("session");
            writer
                .execute_batch("CREATE TABLE t (v INTEGER); INSERT INTO t VALUES (1), (2);")
                .expect("write");
        }

        let reader = database.session(AccessMode::ReadOnly).expect("session");
        let count: i64 = reader
            .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .expect("count");
        assert_eq!(count, 2);
        assert!(database.location().is_none());
    }

    #[test]
    fn session_reports_its_declared_mode() {
        let database = DuckDbDatabase::open_in_memory().expect("open");

        let reader = database.session(AccessMode::ReadOnly).expect("session");
        let writer = database.session(AccessMode::ReadWrite).expect("session");

        assert_eq!(reader.mode(), AccessMode::ReadOnly);
        assert_eq!(writer.mode(), AccessMode::ReadWrite);
    }
}
