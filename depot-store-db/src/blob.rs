// SPDX-FileCopyrightText: 2026 The Depot Authors
// SPDX-License-Identifier: MIT

//! Blob rows: content dedup, lookup and garbage-collection queries.

use std::time::Duration;

use rusqlite::{OptionalExtension, params};
use tracing::debug;

use crate::connection::RegistryDb;
use crate::error::{Entity, Error, OptionalRow, Result, is_unique_violation};
use crate::types::{
    BLOB_COLUMNS, BlobOutcome, NewBlob, ServiceBlob, cutoff_unix, system_time_to_unix,
};

impl RegistryDb {
    fn find_blob_by_content(&self, blob: &NewBlob) -> Result<Option<ServiceBlob>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            r#"
            SELECT {BLOB_COLUMNS}
            FROM service_blob
            WHERE size = ?1 AND hash_md5 = ?2 AND hash_sha1 = ?3
              AND hash_sha256 = ?4 AND hash_sha512 = ?5
            "#
        ))?;
        Ok(stmt
            .query_row(
                params![
                    blob.size as i64,
                    blob.hash_md5,
                    blob.hash_sha1,
                    blob.hash_sha256,
                    blob.hash_sha512,
                ],
                ServiceBlob::from_row,
            )
            .optional()?)
    }

    /// Look up content by size and all four digests, inserting it if absent.
    ///
    /// With [`BlobOutcome::Existing`] the returned row was already stored and
    /// the caller must discard its bytes. A concurrent writer that inserted
    /// the same content first also yields `Existing`.
    pub fn get_or_insert_blob(&self, blob: &NewBlob) -> Result<(ServiceBlob, BlobOutcome)> {
        if let Some(existing) = self.find_blob_by_content(blob)? {
            return Ok((existing, BlobOutcome::Existing));
        }

        let inserted = self.conn.execute(
            r#"
            INSERT INTO service_blob (size, hash_md5, hash_sha1, hash_sha256, hash_sha512, created_unix)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                blob.size as i64,
                blob.hash_md5,
                blob.hash_sha1,
                blob.hash_sha256,
                blob.hash_sha512,
                system_time_to_unix(blob.created_at),
            ],
        );

        match inserted {
            Ok(_) => {
                let id = self.conn.last_insert_rowid();
                debug!(blob_id = id, size = blob.size, "inserted service blob");
                Ok((self.get_blob_by_id(id)?, BlobOutcome::Created))
            }
            Err(e) if is_unique_violation(&e) => match self.find_blob_by_content(blob)? {
                Some(existing) => Ok((existing, BlobOutcome::Existing)),
                // One digest collides with different content.
                None => Err(Error::AlreadyExists(Entity::Blob)),
            },
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_blob_by_id(&self, blob_id: i64) -> Result<ServiceBlob> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("SELECT {BLOB_COLUMNS} FROM service_blob WHERE id = ?1"))?;
        stmt.query_row(params![blob_id], ServiceBlob::from_row)
            .or_not_exist(Entity::Blob)
    }

    /// Check whether any blob has the given lowercase SHA-256 hex digest.
    pub fn exist_blob_with_sha256(&self, sha256: &str) -> Result<bool> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT 1 FROM service_blob WHERE hash_sha256 = ?1 LIMIT 1")?;
        Ok(stmt.exists(params![sha256])?)
    }

    /// Delete a blob row. The caller removes the stored bytes.
    pub fn delete_blob_by_id(&self, blob_id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM service_blob WHERE id = ?1", params![blob_id])?;
        Ok(rows > 0)
    }

    /// Delete a blob row unless a file references it.
    ///
    /// A blob that gained a file after it was found unreferenced is kept.
    pub fn delete_blob_if_unreferenced(&self, blob_id: i64) -> Result<bool> {
        let rows = self.conn.execute(
            r#"
            DELETE FROM service_blob
            WHERE id = ?1
              AND NOT EXISTS (SELECT 1 FROM service_file WHERE service_file.blob_id = ?1)
            "#,
            params![blob_id],
        )?;
        Ok(rows > 0)
    }

    /// Blobs no file references that were created more than `older_than` ago.
    pub fn find_expired_unreferenced_blobs(&self, older_than: Duration) -> Result<Vec<ServiceBlob>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            r#"
            SELECT {BLOB_COLUMNS}
            FROM service_blob
            LEFT JOIN service_file ON service_file.blob_id = service_blob.id
            WHERE service_file.id IS NULL AND service_blob.created_unix < ?1
            ORDER BY service_blob.id
            "#
        ))?;

        let rows = stmt.query_map(params![cutoff_unix(older_than)], ServiceBlob::from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Total size of all stored blobs in bytes.
    pub fn total_blob_size(&self) -> Result<u64> {
        let size: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(size), 0) FROM service_blob",
            [],
            |row| row.get(0),
        )?;
        Ok(size as u64)
    }

    /// Total size of blobs no file references, in bytes.
    pub fn total_unreferenced_blob_size(&self) -> Result<u64> {
        let size: i64 = self.conn.query_row(
            r#"
            SELECT COALESCE(SUM(service_blob.size), 0)
            FROM service_blob
            LEFT JOIN service_file ON service_file.blob_id = service_blob.id
            WHERE service_file.id IS NULL
            "#,
            [],
            |row| row.get(0),
        )?;
        Ok(size as u64)
    }

    /// Distinct owners of services with a file pointing at the blob.
    pub fn owners_referencing_blob(&self, blob_id: i64) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare_cached(
            r#"
            SELECT DISTINCT service.owner_id
            FROM service_file
            INNER JOIN service_version ON service_version.id = service_file.version_id
            INNER JOIN service ON service.id = service_version.service_id
            WHERE service_file.blob_id = ?1
            ORDER BY service.owner_id
            "#,
        )?;

        let rows = stmt.query_map(params![blob_id], |row| row.get::<_, i64>(0))?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }
}

#[cfg(test)]
mod tests {
    use depot_utils_hash::BlobDigests;

    use super::*;

    #[test]
    fn one_colliding_digest_is_a_conflict() {
        let db = RegistryDb::open_memory().unwrap();
        let stored = NewBlob::from_digests(5, &BlobDigests::compute(b"hello"));
        db.get_or_insert_blob(&stored).unwrap();

        // Same SHA-256 but different everything else: the lookup misses and
        // the insert trips the unique index with no row to fall back on.
        let other = BlobDigests::compute(b"world");
        let colliding = NewBlob {
            hash_sha256: stored.hash_sha256.clone(),
            ..NewBlob::from_digests(5, &other)
        };
        let err = db.get_or_insert_blob(&colliding).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(Entity::Blob)));
        assert_eq!(db.total_blob_size().unwrap(), 5);
    }
}
