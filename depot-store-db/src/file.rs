// SPDX-FileCopyrightText: 2026 The Depot Authors
// SPDX-License-Identifier: MIT

//! Service file rows and the file search filter.

use std::collections::BTreeMap;
use std::time::Duration;

use depot_utils_hash::Algorithm;
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, params, params_from_iter};
use tracing::debug;

use crate::connection::RegistryDb;
use crate::error::{Entity, Error, OptionalRow, Result, is_unique_violation};
use crate::types::{
    FILE_COLUMNS, InsertOutcome, NewFile, PropertyType, ServiceFile, ServiceType, cutoff_unix,
    system_time_to_unix,
};

/// One page of results, `page` counts from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    pub page: u32,
    pub page_size: u32,
}

impl Paginator {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self { page, page_size }
    }

    fn offset(&self) -> u64 {
        u64::from(self.page.max(1) - 1) * u64::from(self.page_size)
    }
}

/// Filter over service files. Every set field narrows the result.
#[derive(Debug, Clone, Default)]
pub struct ServiceFileSearchOptions {
    /// `0` matches any owner
    pub owner_id: i64,
    /// `None` matches any type
    pub service_type: Option<ServiceType>,
    /// Takes precedence over `owner_id` and `service_type` when non-zero
    pub version_id: i64,
    /// Case-insensitive substring of the file name
    pub query: String,
    pub composite_key: String,
    /// Files must carry every one of these file properties
    pub properties: BTreeMap<String, String>,
    pub older_than: Option<Duration>,
    /// `md5`, `sha1`, `sha256` or `sha512`; anything else selects SHA-512
    pub hash_algorithm: String,
    pub hash: String,
    pub paginator: Option<Paginator>,
}

impl ServiceFileSearchOptions {
    /// Build the `WHERE` clause body and its positional parameters.
    fn to_conds(&self) -> (String, Vec<Value>) {
        let mut conds: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if self.version_id != 0 {
            values.push(self.version_id.into());
            conds.push(format!("service_file.version_id = ?{}", values.len()));
        } else if self.owner_id != 0 || self.service_type.is_some() {
            let mut version_conds = vec!["service_version.is_internal = 0".to_owned()];
            if self.owner_id != 0 {
                values.push(self.owner_id.into());
                version_conds.push(format!("service.owner_id = ?{}", values.len()));
            }
            if let Some(service_type) = self.service_type {
                values.push(service_type.as_str().to_owned().into());
                version_conds.push(format!("service.type = ?{}", values.len()));
            }
            conds.push(format!(
                r#"service_file.version_id IN (
                    SELECT service_version.id FROM service_version
                    INNER JOIN service ON service.id = service_version.service_id
                    WHERE {}
                )"#,
                version_conds.join(" AND ")
            ));
        }

        if !self.composite_key.is_empty() {
            values.push(self.composite_key.clone().into());
            conds.push(format!("service_file.composite_key = ?{}", values.len()));
        }

        if !self.query.is_empty() {
            values.push(format!("%{}%", self.query.to_lowercase()).into());
            conds.push(format!("service_file.lower_name LIKE ?{}", values.len()));
        }

        if !self.properties.is_empty() {
            let mut alternatives = Vec::with_capacity(self.properties.len());
            for (name, value) in &self.properties {
                values.push(name.clone().into());
                let name_idx = values.len();
                values.push(value.clone().into());
                alternatives.push(format!(
                    "(service_property.name = ?{name_idx} AND service_property.value = ?{})",
                    values.len()
                ));
            }
            conds.push(format!(
                r#"{} = (
                    SELECT COUNT(*) FROM service_property
                    WHERE service_property.ref_type = {} AND service_property.ref_id = service_file.id
                      AND ({})
                )"#,
                self.properties.len(),
                PropertyType::File as i64,
                alternatives.join(" OR ")
            ));
        }

        if let Some(older_than) = self.older_than {
            values.push(cutoff_unix(older_than).into());
            conds.push(format!("service_file.created_unix < ?{}", values.len()));
        }

        if !self.hash.is_empty() {
            let column = match Algorithm::from_selector(&self.hash_algorithm) {
                Algorithm::MD5 => "hash_md5",
                Algorithm::SHA1 => "hash_sha1",
                Algorithm::SHA256 => "hash_sha256",
                Algorithm::SHA512 => "hash_sha512",
            };
            values.push(self.hash.to_lowercase().into());
            conds.push(format!(
                r#"EXISTS (
                    SELECT service_blob.id FROM service_blob
                    WHERE service_blob.id = service_file.blob_id AND service_blob.{column} = ?{}
                )"#,
                values.len()
            ));
        }

        if conds.is_empty() {
            ("1 = 1".to_owned(), values)
        } else {
            (conds.join(" AND "), values)
        }
    }
}

impl RegistryDb {
    fn find_file_by_key(
        &self,
        version_id: i64,
        lower_name: &str,
        composite_key: &str,
    ) -> Result<Option<ServiceFile>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            r#"
            SELECT {FILE_COLUMNS} FROM service_file
            WHERE version_id = ?1 AND lower_name = ?2 AND composite_key = ?3
            "#
        ))?;
        Ok(stmt
            .query_row(params![version_id, lower_name, composite_key], ServiceFile::from_row)
            .optional()?)
    }

    /// Insert a file unless `(version, lower name, composite key)` is taken.
    pub fn try_insert_file(&self, new: &NewFile) -> Result<InsertOutcome<ServiceFile>> {
        let lower_name = new.name.to_lowercase();
        if let Some(existing) = self.find_file_by_key(new.version_id, &lower_name, &new.composite_key)? {
            return Ok(InsertOutcome::Existing(existing));
        }

        let inserted = self.conn.execute(
            r#"
            INSERT INTO service_file
                (version_id, blob_id, name, lower_name, composite_key, is_lead, created_unix)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                new.version_id,
                new.blob_id,
                new.name,
                lower_name,
                new.composite_key,
                new.is_lead,
                system_time_to_unix(new.created_at),
            ],
        );

        match inserted {
            Ok(_) => {
                let id = self.conn.last_insert_rowid();
                debug!(file_id = id, name = %new.name, "inserted service file");
                Ok(InsertOutcome::Created(self.get_file_by_id(id)?))
            }
            Err(e) if is_unique_violation(&e) => self
                .find_file_by_key(new.version_id, &lower_name, &new.composite_key)?
                .map(InsertOutcome::Existing)
                .ok_or_else(|| e.into()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_file_by_id(&self, file_id: i64) -> Result<ServiceFile> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("SELECT {FILE_COLUMNS} FROM service_file WHERE id = ?1"))?;
        stmt.query_row(params![file_id], ServiceFile::from_row)
            .or_not_exist(Entity::File)
    }

    pub fn get_files_by_version_id(&self, version_id: i64) -> Result<Vec<ServiceFile>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {FILE_COLUMNS} FROM service_file WHERE version_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![version_id], ServiceFile::from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// A file by id, provided it belongs to `version_id`.
    pub fn get_file_for_version_by_id(&self, version_id: i64, file_id: i64) -> Result<ServiceFile> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {FILE_COLUMNS} FROM service_file WHERE id = ?1 AND version_id = ?2"
        ))?;
        stmt.query_row(params![file_id, version_id], ServiceFile::from_row)
            .or_not_exist(Entity::File)
    }

    /// A file by case-insensitive name and exact composite key.
    pub fn get_file_for_version_by_name(
        &self,
        version_id: i64,
        name: &str,
        composite_key: &str,
    ) -> Result<ServiceFile> {
        if name.is_empty() {
            return Err(Error::NotExist(Entity::File));
        }
        self.find_file_by_key(version_id, &name.to_lowercase(), composite_key)?
            .ok_or(Error::NotExist(Entity::File))
    }

    pub fn delete_file_by_id(&self, file_id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM service_file WHERE id = ?1", params![file_id])?;
        Ok(rows > 0)
    }

    /// Files matching `opts` and the total number of matches ignoring paging.
    pub fn search_files(&self, opts: &ServiceFileSearchOptions) -> Result<(Vec<ServiceFile>, u64)> {
        let (conds, values) = opts.to_conds();

        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM service_file WHERE {conds}"),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        let mut sql = format!("SELECT {FILE_COLUMNS} FROM service_file WHERE {conds} ORDER BY service_file.id");
        if let Some(paginator) = opts.paginator {
            sql.push_str(&format!(
                " LIMIT {} OFFSET {}",
                paginator.page_size,
                paginator.offset()
            ));
        }
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), ServiceFile::from_row)?;
        let files = rows.collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((files, total as u64))
    }

    pub fn has_files(&self, opts: &ServiceFileSearchOptions) -> Result<bool> {
        let (conds, values) = opts.to_conds();
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT 1 FROM service_file WHERE {conds} LIMIT 1"))?;
        Ok(stmt.exists(params_from_iter(values.iter()))?)
    }

    /// Sum of blob sizes of every matching file. A blob shared by several
    /// files is counted once per file.
    pub fn calculate_file_size(&self, opts: &ServiceFileSearchOptions) -> Result<u64> {
        let (conds, values) = opts.to_conds();
        let size: i64 = self.conn.query_row(
            &format!(
                r#"
                SELECT COALESCE(SUM(service_blob.size), 0)
                FROM service_file
                INNER JOIN service_blob ON service_blob.id = service_file.blob_id
                WHERE {conds}
                "#
            ),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;
        Ok(size as u64)
    }
}
