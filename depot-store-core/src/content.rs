// SPDX-FileCopyrightText: 2026 The Depot Authors
// SPDX-License-Identifier: MIT

//! Byte storage for blobs, keyed by SHA-256 hex digest.

use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::io::AsyncRead;
use tracing::debug;

use crate::error::{Error, IoContext, Result};

/// Where blob bytes live. The registry tables only hold digests.
pub trait ContentStore: Send + Sync {
    type Reader: AsyncRead + Unpin + Send;

    /// Take ownership of the file at `source` and store it under `key`.
    /// Storing an existing key replaces it with identical content.
    fn put(&self, key: &str, source: &Path) -> impl Future<Output = Result<()>> + Send;

    /// Fails with [`Error::ContentMissing`] for unknown keys.
    fn open(&self, key: &str) -> impl Future<Output = Result<Self::Reader>> + Send;

    /// Deleting a missing key succeeds.
    fn delete(&self, key: &str) -> impl Future<Output = Result<()>> + Send;

    fn exists(&self, key: &str) -> impl Future<Output = Result<bool>> + Send;
}

fn validate_key(key: &str) -> Result<()> {
    if key.len() >= 4 && key.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        Ok(())
    } else {
        Err(Error::InvalidContentKey(key.to_owned()))
    }
}

/// Stores blobs under `{root}/{aa}/{bb}/{key}` where `aabb` is the key prefix.
#[derive(Debug, Clone)]
pub struct FsContentStore {
    root: PathBuf,
}

impl FsContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(&key[0..2]).join(&key[2..4]).join(key))
    }
}

impl ContentStore for FsContentStore {
    type Reader = tokio::fs::File;

    async fn put(&self, key: &str, source: &Path) -> Result<()> {
        let dest = self.path_for(key)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .io_context(|| format!("Failed to create {}", parent.display()))?;
        }

        match tokio::fs::rename(source, &dest).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::CrossesDevices => {
                // Different filesystem: copy beside the target, then rename into place.
                let partial = dest.with_extension("partial");
                tokio::fs::copy(source, &partial).await.io_context(|| {
                    format!("Failed to copy {} to {}", source.display(), partial.display())
                })?;
                tokio::fs::rename(&partial, &dest)
                    .await
                    .io_context(|| format!("Failed to move {} into place", partial.display()))?;
                tokio::fs::remove_file(source)
                    .await
                    .io_context(|| format!("Failed to remove {}", source.display()))?;
            }
            Err(e) => {
                return Err(Error::io(
                    format!("Failed to move {} to {}", source.display(), dest.display()),
                    e,
                ));
            }
        }

        debug!(key, path = %dest.display(), "stored content");
        Ok(())
    }

    async fn open(&self, key: &str) -> Result<Self::Reader> {
        let path = self.path_for(key)?;
        match tokio::fs::File::open(&path).await {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::ContentMissing(key.to_owned())),
            Err(e) => Err(Error::io(format!("Failed to open {}", path.display()), e)),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(key, "deleted content");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(format!("Failed to delete {}", path.display()), e)),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        tokio::fs::try_exists(&path)
            .await
            .io_context(|| format!("Failed to stat {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;

    const KEY: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[tokio::test]
    async fn put_open_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsContentStore::new(dir.path().join("blobs"));
        let source = dir.path().join("spooled");
        tokio::fs::write(&source, b"hello").await.unwrap();

        store.put(KEY, &source).await.unwrap();
        assert!(!source.exists());
        assert!(store.exists(KEY).await.unwrap());
        assert_eq!(
            store.path_for(KEY).unwrap(),
            dir.path().join("blobs/2c/f2").join(KEY)
        );

        let mut content = String::new();
        store
            .open(KEY)
            .await
            .unwrap()
            .read_to_string(&mut content)
            .await
            .unwrap();
        assert_eq!(content, "hello");

        store.delete(KEY).await.unwrap();
        assert!(!store.exists(KEY).await.unwrap());
        // Idempotent
        store.delete(KEY).await.unwrap();
        assert!(matches!(
            store.open(KEY).await,
            Err(Error::ContentMissing(_))
        ));
    }

    #[test]
    fn rejects_path_like_keys() {
        let store = FsContentStore::new("/srv/blobs");
        for key in ["", "ab", "../../etc/passwd", "ABCDEF", "abcd/ef"] {
            assert!(
                matches!(store.path_for(key), Err(Error::InvalidContentKey(_))),
                "{key}"
            );
        }
    }
}
