// SPDX-FileCopyrightText: 2026 The Depot Authors
// SPDX-License-Identifier: MIT

//! Service rows.

use rusqlite::{OptionalExtension, params};
use tracing::{debug, info};

use crate::connection::RegistryDb;
use crate::error::{Entity, Error, OptionalRow, Result, is_unique_violation};
use crate::types::{InsertOutcome, NewService, SERVICE_COLUMNS, Service, ServiceType};

impl RegistryDb {
    fn find_service_by_key(
        &self,
        owner_id: i64,
        service_type: ServiceType,
        lower_name: &str,
    ) -> Result<Option<Service>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {SERVICE_COLUMNS} FROM service WHERE owner_id = ?1 AND type = ?2 AND lower_name = ?3"
        ))?;
        Ok(stmt
            .query_row(params![owner_id, service_type, lower_name], Service::from_row)
            .optional()?)
    }

    /// Insert a service unless `(owner, type, lower name)` is taken.
    ///
    /// On conflict, including a lost race against a concurrent insert, the
    /// stored row is returned as [`InsertOutcome::Existing`].
    pub fn try_insert_service(&self, new: &NewService) -> Result<InsertOutcome<Service>> {
        let lower_name = new.name.to_lowercase();
        if let Some(existing) = self.find_service_by_key(new.owner_id, new.service_type, &lower_name)? {
            return Ok(InsertOutcome::Existing(existing));
        }

        let inserted = self.conn.execute(
            r#"
            INSERT INTO service (owner_id, repo_id, type, name, lower_name, semver_compatible, is_internal)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                new.owner_id,
                new.repo_id,
                new.service_type,
                new.name,
                lower_name,
                new.semver_compatible,
                new.is_internal,
            ],
        );

        match inserted {
            Ok(_) => {
                let id = self.conn.last_insert_rowid();
                debug!(service_id = id, name = %new.name, "inserted service");
                Ok(InsertOutcome::Created(Service {
                    id,
                    owner_id: new.owner_id,
                    repo_id: new.repo_id,
                    service_type: new.service_type,
                    name: new.name.clone(),
                    lower_name,
                    semver_compatible: new.semver_compatible,
                    is_internal: new.is_internal,
                }))
            }
            Err(e) if is_unique_violation(&e) => self
                .find_service_by_key(new.owner_id, new.service_type, &lower_name)?
                .map(InsertOutcome::Existing)
                .ok_or_else(|| e.into()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn delete_service_by_id(&self, service_id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM service WHERE id = ?1", params![service_id])?;
        if rows > 0 {
            info!(service_id, "deleted service");
        }
        Ok(rows > 0)
    }

    /// Link a service to a repository, `0` unlinks it.
    pub fn set_repository_link(&self, service_id: i64, repo_id: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE service SET repo_id = ?2 WHERE id = ?1",
            params![service_id, repo_id],
        )?;
        Ok(())
    }

    /// Unlink every service from a repository that is going away.
    pub fn unlink_repository_from_all_services(&self, repo_id: i64) -> Result<usize> {
        Ok(self.conn.execute(
            "UPDATE service SET repo_id = 0 WHERE repo_id = ?1",
            params![repo_id],
        )?)
    }

    pub fn get_service_by_id(&self, service_id: i64) -> Result<Service> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("SELECT {SERVICE_COLUMNS} FROM service WHERE id = ?1"))?;
        stmt.query_row(params![service_id], Service::from_row)
            .or_not_exist(Entity::Service)
    }

    /// Look up a non-internal service by case-insensitive name.
    pub fn get_service_by_name(
        &self,
        owner_id: i64,
        service_type: ServiceType,
        name: &str,
    ) -> Result<Service> {
        let mut stmt = self.conn.prepare_cached(&format!(
            r#"
            SELECT {SERVICE_COLUMNS} FROM service
            WHERE owner_id = ?1 AND type = ?2 AND lower_name = ?3 AND is_internal = 0
            "#
        ))?;
        stmt.query_row(
            params![owner_id, service_type, name.to_lowercase()],
            Service::from_row,
        )
        .or_not_exist(Entity::Service)
    }

    /// Rename a non-internal service. Internal services are left untouched
    /// and `false` is returned.
    ///
    /// Fails with [`Error::AlreadyExists`] if the owner already has a
    /// service of that type with the new name.
    pub fn update_service_name_by_id(
        &self,
        owner_id: i64,
        service_type: ServiceType,
        service_id: i64,
        name: &str,
    ) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                r#"
                UPDATE service SET name = ?4, lower_name = ?5
                WHERE id = ?1 AND owner_id = ?2 AND type = ?3 AND is_internal = 0
                "#,
                params![service_id, owner_id, service_type, name, name.to_lowercase()],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    Error::AlreadyExists(Entity::Service)
                } else {
                    e.into()
                }
            })?;
        Ok(rows > 0)
    }

    /// All non-internal services of an owner and type.
    pub fn get_services_by_type(
        &self,
        owner_id: i64,
        service_type: ServiceType,
    ) -> Result<Vec<Service>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            r#"
            SELECT {SERVICE_COLUMNS} FROM service
            WHERE owner_id = ?1 AND type = ?2 AND is_internal = 0
            ORDER BY lower_name
            "#
        ))?;
        let rows = stmt.query_map(params![owner_id, service_type], Service::from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Services without any version, internal versions included.
    pub fn find_unreferenced_services(&self) -> Result<Vec<Service>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            r#"
            SELECT {SERVICE_COLUMNS}
            FROM service
            LEFT JOIN service_version ON service_version.service_id = service.id
            WHERE service_version.id IS NULL
            ORDER BY service.id
            "#
        ))?;
        let rows = stmt.query_map([], Service::from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Whether the owner has a service with at least one non-internal version.
    pub fn has_owner_services(&self, owner_id: i64) -> Result<bool> {
        let mut stmt = self.conn.prepare_cached(
            r#"
            SELECT 1
            FROM service_version
            INNER JOIN service ON service.id = service_version.service_id
            WHERE service_version.is_internal = 0 AND service.owner_id = ?1
            LIMIT 1
            "#,
        )?;
        Ok(stmt.exists(params![owner_id])?)
    }

    pub fn has_repository_services(&self, repo_id: i64) -> Result<bool> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT 1 FROM service WHERE repo_id = ?1 LIMIT 1")?;
        Ok(stmt.exists(params![repo_id])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_service(owner_id: i64, name: &str) -> NewService {
        NewService {
            owner_id,
            repo_id: 0,
            service_type: ServiceType::AwsLambda,
            name: name.into(),
            semver_compatible: true,
            is_internal: false,
        }
    }

    #[test]
    fn duplicate_insert_returns_existing_row() {
        let db = RegistryDb::open_memory().unwrap();
        let first = db.try_insert_service(&new_service(1, "Hello")).unwrap();
        assert!(!first.is_existing());

        let second = db.try_insert_service(&new_service(1, "HELLO")).unwrap();
        assert!(second.is_existing());
        assert_eq!(second.get(), first.get());
        assert_eq!(second.get().name, "Hello");

        let other_type = db
            .try_insert_service(&NewService {
                service_type: ServiceType::AzureFunction,
                ..new_service(1, "hello")
            })
            .unwrap();
        assert!(!other_type.is_existing());
    }

    #[test]
    fn internal_services_are_hidden() {
        let db = RegistryDb::open_memory().unwrap();
        let internal = db
            .try_insert_service(&NewService {
                is_internal: true,
                ..new_service(1, "system")
            })
            .unwrap()
            .into_inner();

        assert!(
            db.get_service_by_name(1, ServiceType::AwsLambda, "system")
                .unwrap_err()
                .is_not_exist()
        );
        assert!(
            db.get_services_by_type(1, ServiceType::AwsLambda)
                .unwrap()
                .is_empty()
        );
        assert!(
            !db.update_service_name_by_id(1, ServiceType::AwsLambda, internal.id, "renamed")
                .unwrap()
        );
        assert_eq!(db.get_service_by_id(internal.id).unwrap().name, "system");
    }

    #[test]
    fn rename_updates_lower_name() {
        let db = RegistryDb::open_memory().unwrap();
        let svc = db
            .try_insert_service(&new_service(1, "old"))
            .unwrap()
            .into_inner();
        assert!(
            db.update_service_name_by_id(1, ServiceType::AwsLambda, svc.id, "NewName")
                .unwrap()
        );
        let renamed = db
            .get_service_by_name(1, ServiceType::AwsLambda, "newname")
            .unwrap();
        assert_eq!(renamed.name, "NewName");
        assert_eq!(renamed.lower_name, "newname");
    }

    #[test]
    fn rename_onto_taken_name_is_a_conflict() {
        let db = RegistryDb::open_memory().unwrap();
        db.try_insert_service(&new_service(1, "taken")).unwrap();
        let svc = db
            .try_insert_service(&new_service(1, "free"))
            .unwrap()
            .into_inner();

        let err = db
            .update_service_name_by_id(1, ServiceType::AwsLambda, svc.id, "TAKEN")
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(Entity::Service)));
        assert_eq!(db.get_service_by_id(svc.id).unwrap().name, "free");
    }

    #[test]
    fn repository_links() {
        let db = RegistryDb::open_memory().unwrap();
        let a = db.try_insert_service(&new_service(1, "a")).unwrap().into_inner();
        let b = db.try_insert_service(&new_service(1, "b")).unwrap().into_inner();
        db.set_repository_link(a.id, 42).unwrap();
        db.set_repository_link(b.id, 42).unwrap();
        assert!(db.has_repository_services(42).unwrap());

        assert_eq!(db.unlink_repository_from_all_services(42).unwrap(), 2);
        assert!(!db.has_repository_services(42).unwrap());
        assert_eq!(db.get_service_by_id(a.id).unwrap().repo_id, 0);
    }

    #[test]
    fn delete_service() {
        let db = RegistryDb::open_memory().unwrap();
        let svc = db.try_insert_service(&new_service(1, "a")).unwrap().into_inner();
        assert!(db.delete_service_by_id(svc.id).unwrap());
        assert!(!db.delete_service_by_id(svc.id).unwrap());
        assert!(db.get_service_by_id(svc.id).unwrap_err().is_not_exist());
    }
}
