// SPDX-FileCopyrightText: 2026 The Depot Authors
// SPDX-License-Identifier: MIT

//! Registry semantics on top of the Depot database.
//!
//! [`depot_store_db`] knows rows; this crate knows what they mean. It turns
//! uploaded bytes into services, versions and files, decides which versions a
//! retention rule removes, assembles the full view of a version and answers
//! whether a user may download a blob.
//!
//! **Architecture**: This is the Core Layer. Accounts, teams and
//! repositories belong to the host application and are reached through the
//! [`AccountDirectory`] and [`RepositoryDirectory`] traits. Blob bytes live
//! behind [`ContentStore`].
//!
//! # Key Modules
//!
//! - `ingest` - Adding uploads, with deduplication and quotas
//! - `upload` - Spooling and resumable upload sessions
//! - `cleanup` - Retention rule evaluation and sweeps
//! - `gc` - Removal of unreferenced blobs and empty services
//! - `descriptor` - The assembled view of a version
//! - `metadata` - Per-type metadata decoders
//! - `facets` - Branch, repository and architecture discovery

pub mod access;
pub mod cleanup;
pub mod content;
pub mod descriptor;
mod error;
pub mod facets;
pub mod gc;
pub mod ingest;
pub mod metadata;
pub mod quota;
pub mod upload;
pub mod version;

pub use access::{
    AccessMode, Account, AccountDirectory, AccountKind, Repository, RepositoryDirectory,
    Visibility, is_blob_accessible_for,
};
pub use cleanup::{CleanupPolicy, CleanupReport, preview_cleanup, run_cleanup};
pub use content::{ContentStore, FsContentStore};
pub use descriptor::{DescriptorContext, ServiceDescriptor, ServiceFileDescriptor};
pub use error::{Error, IoContext, Result};
pub use gc::{
    GcReport, collect_garbage, purge_blob_content, release_expired_blobs,
    remove_unreferenced_services,
};
pub use ingest::{FileCreationInfo, IngestContext, ServiceCreationInfo, ServiceInfo};
pub use metadata::{MetadataRegistry, VersionMetadata};
pub use quota::{Limits, QuotaLimit};
pub use upload::{HashedBlob, UploadSpool};
pub use version::SemVer;
