// SPDX-FileCopyrightText: 2026 The Depot Authors
// SPDX-License-Identifier: MIT

//! Schema-less name/value properties on services, versions and files.

use rusqlite::{Row, params};

use crate::connection::RegistryDb;
use crate::error::{Entity, Error, Result};
use crate::types::{PropertyType, ServiceProperty, ServicePropertyList, ServiceType};

/// Restricts a facet query to refs that also carry `name = value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDependency {
    pub name: String,
    pub value: String,
}

impl PropertyDependency {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

const PROPERTY_COLUMNS: &str = "id, ref_type, ref_id, name, value";

impl ServiceProperty {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(ServiceProperty {
            id: row.get(0)?,
            ref_type: row.get(1)?,
            ref_id: row.get(2)?,
            name: row.get(3)?,
            value: row.get(4)?,
        })
    }
}

/// Join from `service_property` up to the owning `service` row.
fn owner_join(ref_type: PropertyType) -> &'static str {
    match ref_type {
        PropertyType::File => {
            r#"
            INNER JOIN service_file ON service_file.id = service_property.ref_id
            INNER JOIN service_version ON service_version.id = service_file.version_id
            INNER JOIN service ON service.id = service_version.service_id
            "#
        }
        PropertyType::Version => {
            r#"
            INNER JOIN service_version ON service_version.id = service_property.ref_id
            INNER JOIN service ON service.id = service_version.service_id
            "#
        }
        PropertyType::Service => {
            r#"
            INNER JOIN service ON service.id = service_property.ref_id
            "#
        }
    }
}

impl RegistryDb {
    pub fn insert_property(
        &self,
        ref_type: PropertyType,
        ref_id: i64,
        name: &str,
        value: &str,
    ) -> Result<ServiceProperty> {
        self.conn.execute(
            "INSERT INTO service_property (ref_type, ref_id, name, value) VALUES (?1, ?2, ?3, ?4)",
            params![ref_type, ref_id, name, value],
        )?;
        Ok(ServiceProperty {
            id: self.conn.last_insert_rowid(),
            ref_type,
            ref_id,
            name: name.to_owned(),
            value: value.to_owned(),
        })
    }

    /// All properties of a ref, in insertion order.
    pub fn get_properties(&self, ref_type: PropertyType, ref_id: i64) -> Result<ServicePropertyList> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {PROPERTY_COLUMNS} FROM service_property WHERE ref_type = ?1 AND ref_id = ?2 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![ref_type, ref_id], ServiceProperty::from_row)?;
        Ok(ServicePropertyList(rows.collect::<rusqlite::Result<_>>()?))
    }

    pub fn get_properties_by_name(
        &self,
        ref_type: PropertyType,
        ref_id: i64,
        name: &str,
    ) -> Result<ServicePropertyList> {
        let mut stmt = self.conn.prepare_cached(&format!(
            r#"
            SELECT {PROPERTY_COLUMNS} FROM service_property
            WHERE ref_type = ?1 AND ref_id = ?2 AND name = ?3
            ORDER BY id
            "#
        ))?;
        let rows = stmt.query_map(params![ref_type, ref_id, name], ServiceProperty::from_row)?;
        Ok(ServicePropertyList(rows.collect::<rusqlite::Result<_>>()?))
    }

    pub fn update_property(&self, property: &ServiceProperty) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE service_property SET ref_type = ?2, ref_id = ?3, name = ?4, value = ?5 WHERE id = ?1",
            params![
                property.id,
                property.ref_type,
                property.ref_id,
                property.name,
                property.value,
            ],
        )?;
        if rows == 0 {
            return Err(Error::NotExist(Entity::Property));
        }
        Ok(())
    }

    /// Delete every property of a ref. Returns the number removed.
    pub fn delete_all_properties(&self, ref_type: PropertyType, ref_id: i64) -> Result<usize> {
        Ok(self.conn.execute(
            "DELETE FROM service_property WHERE ref_type = ?1 AND ref_id = ?2",
            params![ref_type, ref_id],
        )?)
    }

    pub fn delete_property_by_id(&self, property_id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM service_property WHERE id = ?1", params![property_id])?;
        Ok(rows > 0)
    }

    pub fn delete_properties_by_name(
        &self,
        ref_type: PropertyType,
        ref_id: i64,
        name: &str,
    ) -> Result<usize> {
        Ok(self.conn.execute(
            "DELETE FROM service_property WHERE ref_type = ?1 AND ref_id = ?2 AND name = ?3",
            params![ref_type, ref_id, name],
        )?)
    }

    /// Distinct values of property `name` on refs of `ref_type` whose
    /// service has the given type and owner.
    ///
    /// With a `dependency`, only refs that also carry a property
    /// `dependency.name = dependency.value` are considered. Chaining calls,
    /// each depending on the value picked from the previous one, narrows a
    /// facet at a time.
    pub fn distinct_property_values(
        &self,
        service_type: ServiceType,
        owner_id: i64,
        ref_type: PropertyType,
        name: &str,
        dependency: Option<&PropertyDependency>,
    ) -> Result<Vec<String>> {
        let join = owner_join(ref_type);
        let base = format!(
            r#"
            SELECT DISTINCT service_property.value
            FROM service_property
            {join}
            WHERE service_property.ref_type = ?1
              AND service_property.name = ?2
              AND service.type = ?3
              AND service.owner_id = ?4
            "#
        );

        let values: Vec<String> = match dependency {
            None => {
                let mut stmt = self
                    .conn
                    .prepare_cached(&format!("{base} ORDER BY service_property.value"))?;
                let rows = stmt.query_map(
                    params![ref_type, name, service_type, owner_id],
                    |row| row.get::<_, String>(0),
                )?;
                rows.collect::<rusqlite::Result<_>>()?
            }
            Some(dep) => {
                let mut stmt = self.conn.prepare_cached(&format!(
                    r#"
                    {base}
                      AND EXISTS (
                        SELECT pp.ref_id FROM service_property pp
                        WHERE pp.ref_id = service_property.ref_id
                          AND pp.ref_type = ?1
                          AND pp.name = ?5
                          AND pp.value = ?6
                      )
                    ORDER BY service_property.value
                    "#
                ))?;
                let rows = stmt.query_map(
                    params![ref_type, name, service_type, owner_id, dep.name, dep.value],
                    |row| row.get::<_, String>(0),
                )?;
                rows.collect::<rusqlite::Result<_>>()?
            }
        };
        Ok(values)
    }
}
