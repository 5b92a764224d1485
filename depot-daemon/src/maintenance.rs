// SPDX-FileCopyrightText: 2026 The Depot Authors
// SPDX-License-Identifier: MIT

//! Periodic registry maintenance.
//!
//! One sweep applies the cleanup rules, drops services without versions,
//! expires stale upload sessions and collects unreferenced blobs, in that
//! order, so blobs freed by the rules are collected once their grace
//! period has passed.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use depot_store_core::{
    CleanupReport, FsContentStore, GcReport, UploadSpool, purge_blob_content,
    release_expired_blobs, remove_unreferenced_services, run_cleanup,
};
use depot_store_db::{OpenMode, RegistryDb};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{DaemonError, IoContext};

/// What one sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub cleanup: CleanupReport,
    pub empty_services_removed: usize,
    pub uploads_expired: usize,
    pub gc: GcReport,
}

#[derive(Clone)]
pub struct Maintainer {
    db: Arc<Mutex<RegistryDb>>,
    content: FsContentStore,
    uploads: UploadSpool,
    blob_grace_period: Duration,
    upload_expiry: Duration,
}

impl Maintainer {
    pub fn new(db: RegistryDb, config: &Config) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            content: FsContentStore::new(&config.storage_path),
            uploads: UploadSpool::new(&config.chunked_upload_path),
            blob_grace_period: config.blob_grace_period(),
            upload_expiry: config.upload_expiry(),
        }
    }

    /// Open (or create) the database and the storage directories.
    pub async fn open(config: &Config) -> Result<Self, DaemonError> {
        tokio::fs::create_dir_all(&config.storage_path)
            .await
            .io_context(|| {
                format!(
                    "Failed to create storage directory {}",
                    config.storage_path.display()
                )
            })?;
        if let Some(parent) = config.db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .io_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let db_path = config.db_path.clone();
        let db = tokio::task::spawn_blocking(move || RegistryDb::open(&db_path, OpenMode::Create))
            .await??;
        let maintainer = Self::new(db, config);
        maintainer.uploads.ensure_dir().await?;
        Ok(maintainer)
    }

    pub fn db(&self) -> &Arc<Mutex<RegistryDb>> {
        &self.db
    }

    /// Execute a database operation on the blocking pool
    async fn db_operation<T, F>(&self, f: F) -> Result<T, DaemonError>
    where
        T: Send + 'static,
        F: FnOnce(&RegistryDb) -> Result<T, DaemonError> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let db = db.blocking_lock();
            f(&db)
        })
        .await?
    }

    pub async fn sweep(&self) -> Result<SweepReport, DaemonError> {
        let now = SystemTime::now();
        let cleanup = self
            .db_operation(move |db| Ok(run_cleanup(db, now)?))
            .await?;
        let empty_services_removed = self
            .db_operation(|db| Ok(remove_unreferenced_services(db)?))
            .await?;

        // Rows go in short database operations; file removal runs unlocked.
        let upload_expiry = self.upload_expiry;
        let expired = self
            .db_operation(move |db| Ok(UploadSpool::expire_sessions(db, upload_expiry)?))
            .await?;
        self.uploads.remove_files(&expired).await;
        let uploads_expired = expired.len();

        let grace = self.blob_grace_period;
        let released = self
            .db_operation(move |db| Ok(release_expired_blobs(db, grace)?))
            .await?;
        let gc = purge_blob_content(&self.content, &released).await;

        let report = SweepReport {
            cleanup,
            empty_services_removed,
            uploads_expired,
            gc,
        };
        debug!(?report, "sweep finished");
        Ok(report)
    }

    /// Sweep every `interval` until the future is dropped. The first sweep
    /// runs immediately. A failed sweep is logged and retried on the next
    /// tick.
    pub async fn run(&self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.sweep().await {
                Ok(report) => {
                    info!(
                        versions = report.cleanup.versions_removed,
                        services = report.cleanup.services_removed + report.empty_services_removed,
                        uploads = report.uploads_expired,
                        blobs = report.gc.blobs_removed,
                        bytes = report.gc.bytes_freed,
                        "maintenance sweep complete"
                    );
                    if !report.cleanup.rules_skipped.is_empty() {
                        warn!(
                            rules = ?report.cleanup.rules_skipped,
                            "cleanup rules with invalid patterns were skipped"
                        );
                    }
                }
                Err(e) => error!("maintenance sweep failed: {e}"),
            }
        }
    }
}
