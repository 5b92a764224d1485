// SPDX-FileCopyrightText: 2026 The Depot Authors
// SPDX-License-Identifier: MIT

//! Garbage collection of unreferenced blobs and empty services.

use std::time::Duration;

use depot_store_db::{RegistryDb, ServiceBlob};
use tracing::{info, warn};

use crate::cleanup::delete_service_and_properties;
use crate::content::ContentStore;
use crate::error::Result;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcReport {
    pub blobs_removed: usize,
    pub bytes_freed: u64,
}

/// Forget blobs no file references that are older than `grace`.
///
/// Only the rows are deleted; the released blobs are returned so their
/// bytes can be removed with [`purge_blob_content`] once the database is
/// no longer needed.
pub fn release_expired_blobs(db: &RegistryDb, grace: Duration) -> Result<Vec<ServiceBlob>> {
    let mut released = Vec::new();
    for blob in db.find_expired_unreferenced_blobs(grace)? {
        if db.delete_blob_if_unreferenced(blob.id)? {
            released.push(blob);
        }
    }
    Ok(released)
}

/// Remove the stored bytes of released blobs.
///
/// A failed delete leaves the bytes orphaned and is logged; the blob still
/// counts as removed since the registry no longer tracks it.
pub async fn purge_blob_content<C: ContentStore>(content: &C, released: &[ServiceBlob]) -> GcReport {
    let mut report = GcReport::default();
    for blob in released {
        if let Err(e) = content.delete(&blob.hash_sha256).await {
            warn!(
                blob_id = blob.id,
                key = %blob.hash_sha256,
                "failed to delete blob content: {e}"
            );
        }
        report.blobs_removed += 1;
        report.bytes_freed = report.bytes_freed.saturating_add(blob.size);
    }
    if report.blobs_removed > 0 {
        info!(
            blobs = report.blobs_removed,
            bytes = report.bytes_freed,
            "collected unreferenced blobs"
        );
    }
    report
}

/// Delete blobs no file references that are older than `grace`, rows first
/// and then their bytes.
pub async fn collect_garbage<C: ContentStore>(
    db: &RegistryDb,
    content: &C,
    grace: Duration,
) -> Result<GcReport> {
    let released = release_expired_blobs(db, grace)?;
    Ok(purge_blob_content(content, &released).await)
}

/// Delete services that have no versions left. Returns how many were removed.
pub fn remove_unreferenced_services(db: &RegistryDb) -> Result<usize> {
    let services = db.find_unreferenced_services()?;
    for service in &services {
        delete_service_and_properties(db, service.id)?;
    }
    if !services.is_empty() {
        info!(removed = services.len(), "removed empty services");
    }
    Ok(services.len())
}
