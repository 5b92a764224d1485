// SPDX-FileCopyrightText: 2026 The Depot Authors
// SPDX-License-Identifier: MIT

//! Service version rows.

use rusqlite::{OptionalExtension, params};
use tracing::{debug, info};

use crate::connection::RegistryDb;
use crate::error::{Entity, Error, OptionalRow, Result, is_unique_violation};
use crate::types::{
    InsertOutcome, NewVersion, PropertyType, ServiceFile, ServiceType, ServiceVersion,
    VERSION_COLUMNS, system_time_to_unix,
};

impl RegistryDb {
    fn find_version_by_key(&self, service_id: i64, lower_version: &str) -> Result<Option<ServiceVersion>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {VERSION_COLUMNS} FROM service_version WHERE service_id = ?1 AND lower_version = ?2"
        ))?;
        Ok(stmt
            .query_row(params![service_id, lower_version], ServiceVersion::from_row)
            .optional()?)
    }

    /// Insert a version unless the service already has it (case-insensitive).
    pub fn get_or_insert_version(&self, new: &NewVersion) -> Result<InsertOutcome<ServiceVersion>> {
        let lower_version = new.version.to_lowercase();
        if let Some(existing) = self.find_version_by_key(new.service_id, &lower_version)? {
            return Ok(InsertOutcome::Existing(existing));
        }

        let inserted = self.conn.execute(
            r#"
            INSERT INTO service_version
                (service_id, creator_id, version, lower_version, created_unix, is_internal, metadata_json)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                new.service_id,
                new.creator_id,
                new.version,
                lower_version,
                system_time_to_unix(new.created_at),
                new.is_internal,
                new.metadata_json,
            ],
        );

        match inserted {
            Ok(_) => {
                let id = self.conn.last_insert_rowid();
                debug!(version_id = id, version = %new.version, "inserted service version");
                Ok(InsertOutcome::Created(self.get_version_by_id(id)?))
            }
            Err(e) if is_unique_violation(&e) => self
                .find_version_by_key(new.service_id, &lower_version)?
                .map(InsertOutcome::Existing)
                .ok_or_else(|| e.into()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_version_by_id(&self, version_id: i64) -> Result<ServiceVersion> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {VERSION_COLUMNS} FROM service_version WHERE id = ?1"
        ))?;
        stmt.query_row(params![version_id], ServiceVersion::from_row)
            .or_not_exist(Entity::Version)
    }

    /// Look up a non-internal version by service name and version string,
    /// both case-insensitive.
    pub fn get_version_by_name_and_version(
        &self,
        owner_id: i64,
        service_type: ServiceType,
        name: &str,
        version: &str,
    ) -> Result<ServiceVersion> {
        let mut stmt = self.conn.prepare_cached(&format!(
            r#"
            SELECT {VERSION_COLUMNS}
            FROM service_version
            INNER JOIN service ON service.id = service_version.service_id
            WHERE service.owner_id = ?1 AND service.type = ?2 AND service.lower_name = ?3
              AND service_version.lower_version = ?4 AND service_version.is_internal = 0
            "#
        ))?;
        stmt.query_row(
            params![owner_id, service_type, name.to_lowercase(), version.to_lowercase()],
            ServiceVersion::from_row,
        )
        .or_not_exist(Entity::Version)
    }

    /// Every version of a service, internal ones included, newest first.
    pub fn get_versions_by_service(&self, service_id: i64) -> Result<Vec<ServiceVersion>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            r#"
            SELECT {VERSION_COLUMNS} FROM service_version
            WHERE service_id = ?1
            ORDER BY created_unix DESC, id DESC
            "#
        ))?;
        let rows = stmt.query_map(params![service_id], ServiceVersion::from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn increment_download_counter(&self, version_id: i64) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE service_version SET download_count = download_count + 1 WHERE id = ?1",
            params![version_id],
        )?;
        if rows == 0 {
            return Err(Error::NotExist(Entity::Version));
        }
        Ok(())
    }

    /// Number of non-internal versions across all services of an owner.
    pub fn count_owner_versions(&self, owner_id: i64) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            r#"
            SELECT COUNT(*)
            FROM service_version
            INNER JOIN service ON service.id = service_version.service_id
            WHERE service.owner_id = ?1 AND service_version.is_internal = 0
            "#,
            params![owner_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Delete the version row only; see
    /// [`remove_version_and_references`](Self::remove_version_and_references).
    pub fn delete_version_by_id(&self, version_id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM service_version WHERE id = ?1", params![version_id])?;
        Ok(rows > 0)
    }

    /// Delete a version with its files and all their properties in one
    /// transaction. Returns the removed files; their blobs stay behind for
    /// the garbage collector.
    pub fn remove_version_and_references(&self, version_id: i64) -> Result<Vec<ServiceFile>> {
        self.transaction(|db| {
            let files = db.get_files_by_version_id(version_id)?;
            for file in &files {
                db.delete_all_properties(PropertyType::File, file.id)?;
            }
            db.conn.execute(
                "DELETE FROM service_file WHERE version_id = ?1",
                params![version_id],
            )?;
            db.delete_all_properties(PropertyType::Version, version_id)?;
            if !db.delete_version_by_id(version_id)? {
                return Err(Error::NotExist(Entity::Version));
            }
            info!(version_id, files = files.len(), "removed service version");
            Ok(files)
        })
    }
}
