use gptmem_common::{Error, Result};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::log_store::LogStore;
use crate::memory_store::MemoryStore;
use crate::migrations::CURRENT_SCHEMA;

pub use gptmem_common::DEFAULT_DB_FILE;

/// Owns the single connection to a store file.
///
/// Stores borrow the connection through [`Database::memories`] and
/// [`Database::logs`] and cannot outlive it. The handle is released on
/// [`Database::close`] or on drop.
pub struct Database {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Database {
    pub fn open(db_path: &Path) -> Result<Self> {
        info!("opening memory database at {}", db_path.display());
        let conn = Connection::open(db_path).map_err(|e| {
            Error::StorageUnavailable(format!(
                "failed to open database {}: {e}",
                db_path.display()
            ))
        })?;

        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
            .map_err(|e| Error::StorageUnavailable(format!("failed to set pragmas: {e}")))?;
        debug!("journal mode: {journal_mode}");

        let db = Self {
            conn,
            path: Some(db_path.to_path_buf()),
        };
        db.run_migrations()?;
        Ok(db)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            Error::StorageUnavailable(format!("failed to open in-memory database: {e}"))
        })?;

        let db = Self { conn, path: None };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> Result<()> {
        let found: u32 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .map_err(|e| Error::StorageUnavailable(format!("failed to read schema version: {e}")))?;

        if found > CURRENT_SCHEMA.version {
            return Err(Error::StorageUnavailable(format!(
                "database schema version {found} is newer than supported version {}",
                CURRENT_SCHEMA.version
            )));
        }

        self.conn
            .execute_batch(CURRENT_SCHEMA.sql)
            .map_err(|e| Error::StorageUnavailable(format!("schema setup failed: {e}")))?;

        if found < CURRENT_SCHEMA.version {
            self.conn
                .pragma_update(None, "user_version", CURRENT_SCHEMA.version)
                .map_err(|e| {
                    Error::StorageUnavailable(format!("failed to stamp schema version: {e}"))
                })?;
            debug!(
                "applied schema {} (v{})",
                CURRENT_SCHEMA.name, CURRENT_SCHEMA.version
            );
        }

        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Path of the backing file, `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn memories(&self) -> MemoryStore<'_> {
        MemoryStore::new(&self.conn)
    }

    pub fn logs(&self) -> LogStore<'_> {
        LogStore::new(&self.conn)
    }

    /// Releases the connection, reporting any failure to flush or close.
    pub fn close(self) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, e)| Error::Database(format!("failed to close database: {e}")))
    }
}
