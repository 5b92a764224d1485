// SPDX-FileCopyrightText: 2026 The Depot Authors
// SPDX-License-Identifier: MIT

//! Error types for registry database operations.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for registry database operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The kind of row an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Service,
    Version,
    File,
    Blob,
    BlobUpload,
    Property,
    CleanupRule,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Entity::Service => "service",
            Entity::Version => "service version",
            Entity::File => "service file",
            Entity::Blob => "service blob",
            Entity::BlobUpload => "service blob upload",
            Entity::Property => "service property",
            Entity::CleanupRule => "service cleanup rule",
        })
    }
}

/// Errors that can occur during registry database operations.
#[derive(Error, Debug)]
pub enum Error {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to open database with context
    #[error("Failed to open database at '{path}': {source}")]
    DatabaseOpen {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Database file not found
    #[error("Database not found at: {0}")]
    DatabaseNotFound(PathBuf),

    #[error("{0} does not exist")]
    NotExist(Entity),

    #[error("{0} already exists")]
    AlreadyExists(Entity),

    /// A cleanup rule pattern is not a valid regular expression
    #[error("invalid {field}: {source}")]
    InvalidPattern {
        field: &'static str,
        #[source]
        source: regex::Error,
    },

    #[error("unknown service type '{0}'")]
    UnknownServiceType(String),

    /// Stored upload hash state could not be restored
    #[error("invalid upload hash state: {0}")]
    InvalidHashState(#[from] depot_utils_hash::InvalidHashState),

    /// The OS random source failed while allocating an upload token
    #[error("failed to generate random token: {0}")]
    Random(#[from] getrandom::Error),
}

impl Error {
    /// True for every "row is absent" failure, whatever the entity.
    pub fn is_not_exist(&self) -> bool {
        matches!(self, Error::NotExist(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::AlreadyExists(_))
    }
}

/// Map `QueryReturnedNoRows` onto [`Error::NotExist`].
pub(crate) trait OptionalRow<T> {
    fn or_not_exist(self, entity: Entity) -> Result<T>;
}

impl<T> OptionalRow<T> for std::result::Result<T, rusqlite::Error> {
    fn or_not_exist(self, entity: Entity) -> Result<T> {
        match self {
            Ok(v) => Ok(v),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(Error::NotExist(entity)),
            Err(e) => Err(e.into()),
        }
    }
}

/// True if the SQLite error is a UNIQUE / PRIMARY KEY constraint violation.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
                && (e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
    )
}
