// SPDX-FileCopyrightText: 2026 The Depot Authors
// SPDX-License-Identifier: MIT

//! Resumable upload sessions.

use std::time::{Duration, SystemTime};

use depot_utils_hash::{InvalidHashState, MultiHasher};
use rusqlite::{Row, params};
use tracing::debug;

use crate::connection::RegistryDb;
use crate::error::{Entity, Error, OptionalRow, Result};
use crate::types::{ServiceBlobUpload, cutoff_unix, system_time_to_unix, unix_to_system_time};

/// Length of an upload session token.
pub const UPLOAD_TOKEN_LEN: usize = 25;

const TOKEN_ALPHABET: &[u8; 36] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Draw a random lowercase alphanumeric token from the OS random source.
pub(crate) fn random_token(len: usize) -> Result<String> {
    // Largest multiple of the alphabet size that fits in a byte, so every
    // accepted byte maps onto the alphabet uniformly.
    const LIMIT: u8 = (256 / TOKEN_ALPHABET.len() * TOKEN_ALPHABET.len()) as u8;

    let mut token = String::with_capacity(len);
    let mut buf = [0u8; 32];
    while token.len() < len {
        getrandom::fill(&mut buf)?;
        for b in buf {
            if b < LIMIT && token.len() < len {
                token.push(TOKEN_ALPHABET[(b as usize) % TOKEN_ALPHABET.len()] as char);
            }
        }
    }
    Ok(token)
}

const UPLOAD_COLUMNS: &str = "id, bytes_received, hash_state, created_unix, updated_unix";

impl ServiceBlobUpload {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(ServiceBlobUpload {
            id: row.get(0)?,
            bytes_received: row.get::<_, i64>(1)? as u64,
            hash_state: row.get::<_, Option<Vec<u8>>>(2)?.unwrap_or_default(),
            created_at: unix_to_system_time(row.get(3)?),
            updated_at: unix_to_system_time(row.get(4)?),
        })
    }

    /// Rebuild the running hasher, or start a fresh one before the first chunk.
    pub fn hasher(&self) -> Result<MultiHasher> {
        if self.hash_state.is_empty() {
            return Ok(MultiHasher::new());
        }
        let hasher = MultiHasher::restore_state(&self.hash_state)?;
        if hasher.size() != self.bytes_received {
            return Err(Error::InvalidHashState(InvalidHashState::ByteCount {
                hashed: hasher.size(),
                recorded: self.bytes_received,
            }));
        }
        Ok(hasher)
    }
}

impl RegistryDb {
    /// Start a new upload session with a fresh random token.
    pub fn create_blob_upload(&self) -> Result<ServiceBlobUpload> {
        let now = system_time_to_unix(SystemTime::now());
        let id = random_token(UPLOAD_TOKEN_LEN)?;

        self.conn.execute(
            r#"
            INSERT INTO service_blob_upload (id, bytes_received, hash_state, created_unix, updated_unix)
            VALUES (?1, 0, NULL, ?2, ?2)
            "#,
            params![id, now],
        )?;

        debug!(upload_id = %id, "created blob upload");
        self.get_blob_upload(&id)
    }

    pub fn get_blob_upload(&self, id: &str) -> Result<ServiceBlobUpload> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {UPLOAD_COLUMNS} FROM service_blob_upload WHERE id = ?1"
        ))?;
        stmt.query_row(params![id], ServiceBlobUpload::from_row)
            .or_not_exist(Entity::BlobUpload)
    }

    /// Persist byte count and hash state, refreshing `updated_at`.
    pub fn update_blob_upload(&self, upload: &mut ServiceBlobUpload) -> Result<()> {
        let now = SystemTime::now();
        let rows = self.conn.execute(
            r#"
            UPDATE service_blob_upload
            SET bytes_received = ?2, hash_state = ?3, updated_unix = ?4
            WHERE id = ?1
            "#,
            params![
                upload.id,
                upload.bytes_received as i64,
                upload.hash_state,
                system_time_to_unix(now),
            ],
        )?;
        if rows == 0 {
            return Err(Error::NotExist(Entity::BlobUpload));
        }
        upload.updated_at = now;
        Ok(())
    }

    pub fn delete_blob_upload(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM service_blob_upload WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    /// Sessions whose last update is more than `older_than` ago.
    pub fn find_expired_blob_uploads(&self, older_than: Duration) -> Result<Vec<ServiceBlobUpload>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {UPLOAD_COLUMNS} FROM service_blob_upload WHERE updated_unix < ?1 ORDER BY updated_unix"
        ))?;
        let rows = stmt.query_map(params![cutoff_unix(older_than)], ServiceBlobUpload::from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_shape() {
        let token = random_token(UPLOAD_TOKEN_LEN).unwrap();
        assert_eq!(token.len(), UPLOAD_TOKEN_LEN);
        assert!(
            token
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        );
    }

    #[test]
    fn tokens_differ() {
        let a = random_token(UPLOAD_TOKEN_LEN).unwrap();
        let b = random_token(UPLOAD_TOKEN_LEN).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn session_roundtrip() {
        let db = RegistryDb::open_memory().unwrap();
        let mut upload = db.create_blob_upload().unwrap();
        assert_eq!(upload.bytes_received, 0);
        assert!(upload.hash_state.is_empty());

        let mut hasher = upload.hasher().unwrap();
        hasher.update(b"chunk");
        upload.bytes_received = hasher.size();
        upload.hash_state = hasher.save_state();
        db.update_blob_upload(&mut upload).unwrap();

        let reloaded = db.get_blob_upload(&upload.id).unwrap();
        assert_eq!(reloaded.bytes_received, 5);
        assert_eq!(reloaded.hasher().unwrap().size(), 5);

        assert!(db.delete_blob_upload(&upload.id).unwrap());
        assert!(db.get_blob_upload(&upload.id).unwrap_err().is_not_exist());
    }

    #[test]
    fn mismatched_byte_count_is_rejected() {
        let db = RegistryDb::open_memory().unwrap();
        let mut upload = db.create_blob_upload().unwrap();

        let mut hasher = MultiHasher::new();
        hasher.update(b"abc");
        upload.hash_state = hasher.save_state();
        upload.bytes_received = 10;

        assert!(matches!(upload.hasher(), Err(Error::InvalidHashState(_))));
    }

    #[test]
    fn expired_sessions() {
        let db = RegistryDb::open_memory().unwrap();
        let stale = db.create_blob_upload().unwrap();
        let fresh = db.create_blob_upload().unwrap();
        db.connection()
            .execute(
                "UPDATE service_blob_upload SET updated_unix = updated_unix - 7200 WHERE id = ?1",
                params![stale.id],
            )
            .unwrap();

        let expired = db
            .find_expired_blob_uploads(Duration::from_secs(3600))
            .unwrap();
        let ids: Vec<_> = expired.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, [stale.id.as_str()]);
        assert_ne!(ids[0], fresh.id);
    }
}
