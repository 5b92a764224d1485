// SPDX-FileCopyrightText: 2026 The Depot Authors
// SPDX-License-Identifier: MIT

//! Branch, repository and architecture facets over file properties.
//!
//! Each ecosystem records the facets of a file as properties named
//! `{type}.branch`, `{type}.repository` and `{type}.architecture`. A
//! repository is looked up within a branch and an architecture within a
//! repository, so a client can narrow one level at a time.

use depot_store_db::{PropertyDependency, PropertyType, RegistryDb, ServiceType};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facet {
    Branch,
    Repository,
    Architecture,
}

impl Facet {
    pub fn as_str(self) -> &'static str {
        match self {
            Facet::Branch => "branch",
            Facet::Repository => "repository",
            Facet::Architecture => "architecture",
        }
    }
}

/// The file property name holding `facet` for `service_type`.
pub fn property_name(service_type: ServiceType, facet: Facet) -> String {
    format!("{}.{}", service_type.as_str(), facet.as_str())
}

pub fn branches(db: &RegistryDb, service_type: ServiceType, owner_id: i64) -> Result<Vec<String>> {
    Ok(db.distinct_property_values(
        service_type,
        owner_id,
        PropertyType::File,
        &property_name(service_type, Facet::Branch),
        None,
    )?)
}

/// Repositories with at least one file on `branch`.
pub fn repositories(
    db: &RegistryDb,
    service_type: ServiceType,
    owner_id: i64,
    branch: &str,
) -> Result<Vec<String>> {
    let dependency = PropertyDependency::new(property_name(service_type, Facet::Branch), branch);
    Ok(db.distinct_property_values(
        service_type,
        owner_id,
        PropertyType::File,
        &property_name(service_type, Facet::Repository),
        Some(&dependency),
    )?)
}

/// Architectures with at least one file in `repository`.
pub fn architectures(
    db: &RegistryDb,
    service_type: ServiceType,
    owner_id: i64,
    repository: &str,
) -> Result<Vec<String>> {
    let dependency =
        PropertyDependency::new(property_name(service_type, Facet::Repository), repository);
    Ok(db.distinct_property_values(
        service_type,
        owner_id,
        PropertyType::File,
        &property_name(service_type, Facet::Architecture),
        Some(&dependency),
    )?)
}
