//! SQLite file behind `SqliteStore`.
//!
//! Holds the job records that must outlive the host process. One connection
//! guarded by a `Mutex`; callers reach it through `with_conn`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::Connection;

pub mod error;
pub mod kv_repo;
pub mod migrations;

pub use error::DatabaseError;

/// How long a statement waits on a lock held by another process (e.g. a
/// second host pointed at the same file) before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared handle to the state database. Clones share one connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens the state file at `path`, creating it and its directory on
    /// first use, and brings the schema up to date.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| DatabaseError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        let db = Self::prepare(conn)?;
        log::info!("State database ready at {}", path.display());
        Ok(db)
    }

    /// A throwaway state database, used by tests.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::prepare(Connection::open_in_memory()?)
    }

    fn prepare(mut conn: Connection) -> Result<Self, DatabaseError> {
        let applied = migrations::apply_pending(&mut conn)?;
        if applied > 0 {
            log::debug!("Applied {} state schema migration(s)", applied);
        }
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` with the connection locked.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&conn)
    }
}

/// `~/.atelier/data/atelier.db`, or `None` without a home directory.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".atelier").join("data").join("atelier.db"))
}
