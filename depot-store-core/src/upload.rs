// SPDX-FileCopyrightText: 2026 The Depot Authors
// SPDX-License-Identifier: MIT

//! Spooling and resumable uploads.
//!
//! Incoming bytes are written to a spool directory while being hashed. A
//! resumable upload persists the running hash state with each chunk, so a
//! session survives a restart without re-reading what was already received.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use depot_store_db::{RegistryDb, ServiceBlobUpload};
use depot_utils_hash::BlobDigests;
use depot_utils_hash::hashing_reader::HashingReader;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::error::{Error, IoContext, Result};

/// Spooled bytes with their size and digests, ready for ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedBlob {
    pub path: PathBuf,
    pub size: u64,
    pub digests: BlobDigests,
}

impl HashedBlob {
    /// Remove the spool file.
    pub async fn discard(self) -> Result<()> {
        remove_if_exists(&self.path).await
    }
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io(format!("Failed to remove {}", path.display()), e)),
    }
}

static SPOOL_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Hash `reader` to EOF while writing it to a fresh file in `dir`.
pub async fn spool<R: AsyncRead + Unpin>(dir: &Path, reader: R) -> Result<HashedBlob> {
    let path = dir.join(format!(
        "spool-{}-{}",
        std::process::id(),
        SPOOL_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    let mut file = tokio::fs::File::create(&path)
        .await
        .io_context(|| format!("Failed to create {}", path.display()))?;

    let mut reader = HashingReader::new(reader);
    let copied = tokio::io::copy(&mut reader, &mut file).await;
    if let Err(e) = copied {
        drop(file);
        remove_if_exists(&path).await?;
        return Err(Error::io(format!("Failed to spool to {}", path.display()), e));
    }
    file.flush()
        .await
        .io_context(|| format!("Failed to flush {}", path.display()))?;

    let (_, hasher) = reader.into_parts();
    let (size, digests) = hasher.finish();
    Ok(HashedBlob {
        path,
        size,
        digests,
    })
}

/// Drives resumable upload sessions backed by files in one directory.
///
/// Session state lives in the registry database; the received bytes live
/// in `{dir}/{session id}`.
#[derive(Debug, Clone)]
pub struct UploadSpool {
    dir: PathBuf,
}

impl UploadSpool {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .io_context(|| format!("Failed to create upload directory {}", self.dir.display()))
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(id)
    }

    /// Open a new session with an empty spool file.
    pub async fn begin(&self, db: &RegistryDb) -> Result<ServiceBlobUpload> {
        let upload = db.create_blob_upload()?;
        let path = self.path_for(&upload.id);
        if let Err(e) = tokio::fs::File::create(&path).await {
            db.delete_blob_upload(&upload.id)?;
            return Err(Error::io(format!("Failed to create {}", path.display()), e));
        }
        debug!(upload_id = %upload.id, "began upload");
        Ok(upload)
    }

    /// Append the bytes of `chunk` at `offset`, which must equal the number
    /// of bytes received so far.
    pub async fn append<R: AsyncRead + Unpin>(
        &self,
        db: &RegistryDb,
        id: &str,
        offset: u64,
        chunk: R,
    ) -> Result<ServiceBlobUpload> {
        let mut upload = db.get_blob_upload(id)?;
        if offset != upload.bytes_received {
            return Err(Error::UploadOffsetMismatch {
                expected: upload.bytes_received,
                actual: offset,
            });
        }
        let hasher = upload.hasher()?;

        let path = self.path_for(id);
        let mut file = OpenOptions::new()
            .write(true)
            .open(&path)
            .await
            .io_context(|| format!("Failed to open {}", path.display()))?;
        // Drop bytes a failed earlier attempt wrote past the recorded offset.
        file.set_len(upload.bytes_received)
            .await
            .io_context(|| format!("Failed to truncate {}", path.display()))?;
        tokio::io::AsyncSeekExt::seek(&mut file, std::io::SeekFrom::End(0))
            .await
            .io_context(|| format!("Failed to seek {}", path.display()))?;

        let mut reader = HashingReader::resume(chunk, hasher);
        tokio::io::copy(&mut reader, &mut file)
            .await
            .io_context(|| format!("Failed to append to {}", path.display()))?;
        file.sync_data()
            .await
            .io_context(|| format!("Failed to sync {}", path.display()))?;

        let (_, hasher) = reader.into_parts();
        upload.bytes_received = hasher.size();
        upload.hash_state = hasher.save_state();
        db.update_blob_upload(&mut upload)?;
        debug!(upload_id = id, bytes = upload.bytes_received, "appended upload chunk");
        Ok(upload)
    }

    /// Close the session and hand over the received bytes.
    pub async fn finish(&self, db: &RegistryDb, id: &str) -> Result<HashedBlob> {
        let upload = db.get_blob_upload(id)?;
        let (size, digests) = upload.hasher()?.finish();
        db.delete_blob_upload(id)?;
        debug!(upload_id = id, size, "finished upload");
        Ok(HashedBlob {
            path: self.path_for(id),
            size,
            digests,
        })
    }

    /// Drop the session and its bytes.
    pub async fn abort(&self, db: &RegistryDb, id: &str) -> Result<()> {
        if !db.delete_blob_upload(id)? {
            return Err(depot_store_db::Error::NotExist(depot_store_db::Entity::BlobUpload).into());
        }
        remove_if_exists(&self.path_for(id)).await
    }

    /// Delete the sessions not updated within `older_than` and return them.
    ///
    /// Their spool files stay behind until [`UploadSpool::remove_files`].
    pub fn expire_sessions(db: &RegistryDb, older_than: Duration) -> Result<Vec<ServiceBlobUpload>> {
        let mut expired = Vec::new();
        for upload in db.find_expired_blob_uploads(older_than)? {
            if db.delete_blob_upload(&upload.id)? {
                expired.push(upload);
            }
        }
        Ok(expired)
    }

    /// Remove the spool files of ended sessions. A file that cannot be
    /// removed is logged and left in place.
    pub async fn remove_files(&self, uploads: &[ServiceBlobUpload]) {
        for upload in uploads {
            if let Err(e) = remove_if_exists(&self.path_for(&upload.id)).await {
                warn!(upload_id = %upload.id, "failed to remove expired upload: {e}");
            }
        }
        if !uploads.is_empty() {
            info!(removed = uploads.len(), "removed expired uploads");
        }
    }

    /// Delete sessions not updated within `older_than` along with their
    /// bytes. Returns how many were removed.
    pub async fn remove_expired(&self, db: &RegistryDb, older_than: Duration) -> Result<usize> {
        let expired = Self::expire_sessions(db, older_than)?;
        self.remove_files(&expired).await;
        Ok(expired.len())
    }
}

#[cfg(test)]
mod tests {
    use depot_store_db::OpenMode;

    use super::*;

    #[tokio::test]
    async fn spool_hashes_while_writing() {
        let dir = tempfile::tempdir().unwrap();
        let blob = spool(dir.path(), &b"some artifact"[..]).await.unwrap();
        assert_eq!(blob.size, 13);
        assert_eq!(blob.digests, BlobDigests::compute(b"some artifact"));
        assert_eq!(tokio::fs::read(&blob.path).await.unwrap(), b"some artifact");

        let path = blob.path.clone();
        blob.discard().await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn chunked_upload_matches_one_shot() {
        let dir = tempfile::tempdir().unwrap();
        let db = RegistryDb::open_memory().unwrap();
        let spool = UploadSpool::new(dir.path());

        let upload = spool.begin(&db).await.unwrap();
        spool.append(&db, &upload.id, 0, &b"hello "[..]).await.unwrap();
        let after = spool.append(&db, &upload.id, 6, &b"world"[..]).await.unwrap();
        assert_eq!(after.bytes_received, 11);

        let blob = spool.finish(&db, &upload.id).await.unwrap();
        assert_eq!(blob.size, 11);
        assert_eq!(blob.digests, BlobDigests::compute(b"hello world"));
        assert_eq!(tokio::fs::read(&blob.path).await.unwrap(), b"hello world");
        assert!(db.get_blob_upload(&upload.id).unwrap_err().is_not_exist());
    }

    #[tokio::test]
    async fn wrong_offset_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let db = RegistryDb::open_memory().unwrap();
        let spool = UploadSpool::new(dir.path());

        let upload = spool.begin(&db).await.unwrap();
        spool.append(&db, &upload.id, 0, &b"abc"[..]).await.unwrap();
        let err = spool
            .append(&db, &upload.id, 1, &b"x"[..])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::UploadOffsetMismatch {
                expected: 3,
                actual: 1
            }
        ));
    }

    #[tokio::test]
    async fn upload_survives_reopening_the_database() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("registry.db");
        let spool = UploadSpool::new(dir.path().join("uploads"));
        spool.ensure_dir().await.unwrap();

        let id = {
            let db = RegistryDb::open(&db_path, OpenMode::Create).unwrap();
            let upload = spool.begin(&db).await.unwrap();
            spool.append(&db, &upload.id, 0, &b"first half, "[..]).await.unwrap();
            upload.id
        };

        let db = RegistryDb::open(&db_path, OpenMode::ReadWrite).unwrap();
        spool.append(&db, &id, 12, &b"second half"[..]).await.unwrap();
        let blob = spool.finish(&db, &id).await.unwrap();
        assert_eq!(
            blob.digests,
            BlobDigests::compute(b"first half, second half")
        );
    }

    #[tokio::test]
    async fn abort_and_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let db = RegistryDb::open_memory().unwrap();
        let spool = UploadSpool::new(dir.path());

        let aborted = spool.begin(&db).await.unwrap();
        spool.abort(&db, &aborted.id).await.unwrap();
        assert!(!dir.path().join(&aborted.id).exists());
        assert!(spool.abort(&db, &aborted.id).await.unwrap_err().is_not_exist());

        let stale = spool.begin(&db).await.unwrap();
        let fresh = spool.begin(&db).await.unwrap();
        db.connection()
            .execute(
                "UPDATE service_blob_upload SET updated_unix = updated_unix - 7200 WHERE id = ?1",
                [&stale.id],
            )
            .unwrap();

        assert_eq!(
            spool
                .remove_expired(&db, Duration::from_secs(3600))
                .await
                .unwrap(),
            1
        );
        assert!(!dir.path().join(&stale.id).exists());
        assert!(dir.path().join(&fresh.id).exists());
        db.get_blob_upload(&fresh.id).unwrap();
    }
}
