// SPDX-FileCopyrightText: 2026 The Depot Authors
// SPDX-License-Identifier: MIT

//! SQLite database interface for Depot registry metadata.
//!
//! This crate stores the registry graph (services, versions, files), the
//! deduplicated blob index, resumable upload sessions, schema-less properties
//! and per-owner cleanup rules.
//!
//! **Architecture**: This is the Database Layer. Every operation is a method
//! on [`RegistryDb`]; callers pass the handle explicitly.
//!
//! # Key Features
//!
//! - Conflict-checked inserts returning the stored row on a duplicate
//! - Faceted property queries and composable file search
//! - Savepoint transactions via [`RegistryDb::transaction`]
//! - In-memory database for testing
//!
//! # Example
//!
//! ```ignore
//! use depot_store_db::{NewService, RegistryDb, ServiceType};
//!
//! let db = RegistryDb::open_memory()?;
//! let service = db.try_insert_service(&NewService {
//!     owner_id: 1,
//!     repo_id: 0,
//!     service_type: ServiceType::AwsLambda,
//!     name: "resize".into(),
//!     semver_compatible: true,
//!     is_internal: false,
//! })?;
//! println!("service id: {}", service.get().id);
//! ```

mod blob;
mod cleanup;
mod connection;
mod error;
mod file;
mod property;
mod schema;
mod service;
mod types;
mod upload;
mod version;

pub use cleanup::ServiceCleanupRule;
pub use connection::{OpenMode, RegistryDb};
pub use error::{Entity, Error, Result};
pub use file::{Paginator, ServiceFileSearchOptions};
pub use property::PropertyDependency;
pub use schema::SCHEMA_VERSION;
pub use types::*;
pub use upload::UPLOAD_TOKEN_LEN;
