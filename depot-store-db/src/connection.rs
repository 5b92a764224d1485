// SPDX-FileCopyrightText: 2026 The Depot Authors
// SPDX-License-Identifier: MIT

//! Database connection management.

use std::path::Path;

use rusqlite::{Connection, OpenFlags};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::schema::{SCHEMA_SQL, SCHEMA_VERSION};

/// Database open mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read-only access (reporting, offline inspection)
    ReadOnly,
    /// Read-write access to an existing database
    ReadWrite,
    /// Create the database and its schema if missing
    Create,
}

/// SQLite connection holding the registry tables.
///
/// This is the explicit registry object every component receives by
/// reference; there is no process-wide table registration.
pub struct RegistryDb {
    pub(crate) conn: Connection,
}

impl std::fmt::Debug for RegistryDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryDb")
            .field("path", &self.conn.path())
            .finish()
    }
}

impl RegistryDb {
    /// Open or create a database at `path`.
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> Result<Self> {
        let path = path.as_ref();
        let flags = match mode {
            OpenMode::ReadOnly => {
                if !path.exists() {
                    return Err(Error::DatabaseNotFound(path.to_owned()));
                }
                OpenFlags::SQLITE_OPEN_READ_ONLY
            }
            OpenMode::ReadWrite => {
                if !path.exists() {
                    return Err(Error::DatabaseNotFound(path.to_owned()));
                }
                OpenFlags::SQLITE_OPEN_READ_WRITE
            }
            OpenMode::Create => OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        };

        let conn = Connection::open_with_flags(path, flags).map_err(|e| Error::DatabaseOpen {
            path: path.to_owned(),
            source: e,
        })?;
        let db = Self { conn };

        if mode != OpenMode::ReadOnly {
            db.configure_pragmas()?;
        }
        if mode == OpenMode::Create {
            db.create_schema()?;
        }

        debug!("Opened registry database at {} ({:?})", path.display(), mode);
        Ok(db)
    }

    /// Create an in-memory database (for testing).
    ///
    /// The database is initialized with the full schema.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.configure_pragmas()?;
        db.create_schema()?;
        debug!("Created in-memory registry database");
        Ok(db)
    }

    fn configure_pragmas(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
            "#,
        )?;
        Ok(())
    }

    /// Create every registry table. Idempotent.
    pub fn create_schema(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA_SQL)?;
        self.conn
            .pragma_update(None, "user_version", SCHEMA_VERSION)?;
        debug!("Created registry schema (version {SCHEMA_VERSION})");
        Ok(())
    }

    /// The `user_version` recorded by [`create_schema`](Self::create_schema).
    pub fn schema_version(&self) -> Result<i32> {
        Ok(self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }

    /// Check if the database has the registry tables.
    pub fn has_schema(&self) -> Result<bool> {
        let count: i32 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='service'",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Run `f` atomically. Nested calls become nested savepoints.
    ///
    /// Any error returned by `f` rolls back everything it wrote.
    pub fn transaction<T, E>(&self, f: impl FnOnce(&Self) -> std::result::Result<T, E>) -> std::result::Result<T, E>
    where
        E: From<Error>,
    {
        self.conn
            .execute_batch("SAVEPOINT depot_tx")
            .map_err(|e| E::from(Error::from(e)))?;
        match f(self) {
            Ok(value) => {
                self.conn
                    .execute_batch("RELEASE depot_tx")
                    .map_err(|e| E::from(Error::from(e)))?;
                Ok(value)
            }
            Err(err) => {
                if let Err(e) = self
                    .conn
                    .execute_batch("ROLLBACK TO depot_tx; RELEASE depot_tx")
                {
                    warn!("failed to roll back transaction: {e}");
                }
                Err(err)
            }
        }
    }

    /// Get raw connection (for advanced usage).
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}
