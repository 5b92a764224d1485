// SPDX-FileCopyrightText: 2026 The Depot Authors
// SPDX-License-Identifier: MIT

use depot_store_db::{Entity, ServiceType};
use thiserror::Error;

use crate::quota::QuotaLimit;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Db(#[from] depot_store_db::Error),

    /// Stored metadata does not have the shape its service type expects
    #[error("failed to decode {service_type} metadata: {source}")]
    MetadataDecode {
        service_type: ServiceType,
        #[source]
        source: serde_json::Error,
    },

    /// No metadata decoder is registered for this service type
    #[error("no metadata decoder registered for service type '{0}'")]
    UnregisteredServiceType(ServiceType),

    #[error("invalid version '{0}'")]
    InvalidVersion(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(QuotaLimit),

    #[error("upload offset mismatch: expected {expected}, got {actual}")]
    UploadOffsetMismatch { expected: u64, actual: u64 },

    #[error("{message}: {source}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Content keys are lowercase hex digests
    #[error("invalid content key '{0}'")]
    InvalidContentKey(String),

    #[error("content {0} is missing from storage")]
    ContentMissing(String),

    #[error("account {0} does not exist")]
    AccountNotFound(i64),

    /// The account directory failed
    #[error("account lookup failed: {0}")]
    Account(String),

    /// The repository directory failed
    #[error("repository lookup failed: {0}")]
    Repository(String),
}

impl Error {
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// True when a looked-up row or account is absent.
    pub fn is_not_exist(&self) -> bool {
        match self {
            Error::Db(e) => e.is_not_exist(),
            Error::AccountNotFound(_) | Error::ContentMissing(_) => true,
            _ => false,
        }
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::Db(e) if e.is_already_exists())
    }

    pub(crate) fn already_exists(entity: Entity) -> Self {
        Error::Db(depot_store_db::Error::AlreadyExists(entity))
    }
}

/// Helper trait for adding context to IO errors
pub trait IoContext<T> {
    fn io_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn io_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| Error::io(f(), e))
    }
}
