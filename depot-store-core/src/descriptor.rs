// SPDX-FileCopyrightText: 2026 The Depot Authors
// SPDX-License-Identifier: MIT

//! Assembles the full view of a service version.

use depot_store_db::{
    PropertyType, RegistryDb, Service, ServiceBlob, ServiceFile, ServicePropertyList,
    ServiceVersion,
};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tracing::debug;

use crate::access::{Account, AccountDirectory, Repository, RepositoryDirectory};
use crate::error::{Error, Result};
use crate::metadata::{MetadataRegistry, VersionMetadata};
use crate::version::SemVer;

/// Collaborators needed to resolve a descriptor.
#[derive(Clone, Copy)]
pub struct DescriptorContext<'a> {
    pub db: &'a RegistryDb,
    pub accounts: &'a dyn AccountDirectory,
    pub repositories: &'a dyn RepositoryDirectory,
    pub metadata: &'a MetadataRegistry,
}

/// A version together with everything it references.
#[derive(Debug)]
pub struct ServiceDescriptor {
    pub service: Service,
    pub owner: Account,
    /// `None` when unlinked or the repository is gone
    pub repository: Option<Repository>,
    pub version: ServiceVersion,
    /// Only set for semver-compatible services
    pub semver: Option<SemVer>,
    /// The ghost account if the creator was deleted
    pub creator: Account,
    pub service_properties: ServicePropertyList,
    pub version_properties: ServicePropertyList,
    pub metadata: Box<dyn VersionMetadata>,
    pub files: Vec<ServiceFileDescriptor>,
}

#[derive(Debug, Clone)]
pub struct ServiceFileDescriptor {
    pub file: ServiceFile,
    pub blob: ServiceBlob,
    pub properties: ServicePropertyList,
}

/// Bytes a path segment keeps verbatim: unreserved characters plus the
/// sub-delimiters that are legal inside a segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b':')
    .remove(b'=')
    .remove(b'@');

fn path_escape(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

impl ServiceDescriptor {
    /// Relative link to the service page.
    pub fn service_web_link(&self) -> String {
        format!(
            "/{}/-/services/{}/{}",
            path_escape(&self.owner.name),
            self.service.service_type,
            path_escape(&self.service.lower_name)
        )
    }

    /// Relative link to the version page.
    pub fn version_web_link(&self) -> String {
        format!(
            "{}/{}",
            self.service_web_link(),
            path_escape(&self.version.lower_version)
        )
    }

    /// Sum of blob sizes over all files. Shared blobs count once per file.
    pub fn calculate_blob_size(&self) -> u64 {
        self.files.iter().map(|f| f.blob.size).sum()
    }
}

pub fn service_file_descriptor(db: &RegistryDb, file: ServiceFile) -> Result<ServiceFileDescriptor> {
    let blob = db.get_blob_by_id(file.blob_id)?;
    let properties = db.get_properties(PropertyType::File, file.id)?;
    Ok(ServiceFileDescriptor {
        file,
        blob,
        properties,
    })
}

pub fn service_file_descriptors(
    db: &RegistryDb,
    files: Vec<ServiceFile>,
) -> Result<Vec<ServiceFileDescriptor>> {
    files
        .into_iter()
        .map(|file| service_file_descriptor(db, file))
        .collect()
}

pub fn service_descriptor(ctx: &DescriptorContext<'_>, version: &ServiceVersion) -> Result<ServiceDescriptor> {
    let service = ctx.db.get_service_by_id(version.service_id)?;
    let owner = ctx
        .accounts
        .get_account(service.owner_id)?
        .ok_or(Error::AccountNotFound(service.owner_id))?;

    let repository = if service.repo_id == 0 {
        None
    } else {
        ctx.repositories.get_repository(service.repo_id)?
    };

    let creator = match ctx.accounts.get_account(version.creator_id)? {
        Some(creator) => creator,
        None => {
            debug!(
                version_id = version.id,
                creator_id = version.creator_id,
                "creator no longer exists"
            );
            Account::ghost()
        }
    };

    let semver = if service.semver_compatible {
        Some(SemVer::parse(&version.version)?)
    } else {
        None
    };

    let service_properties = ctx.db.get_properties(PropertyType::Service, service.id)?;
    let version_properties = ctx.db.get_properties(PropertyType::Version, version.id)?;
    let files = service_file_descriptors(ctx.db, ctx.db.get_files_by_version_id(version.id)?)?;
    let metadata = ctx
        .metadata
        .decode(service.service_type, &version.metadata_json)?;

    Ok(ServiceDescriptor {
        service,
        owner,
        repository,
        version: version.clone(),
        semver,
        creator,
        service_properties,
        version_properties,
        metadata,
        files,
    })
}

/// Descriptors for every version, failing on the first error.
pub fn service_descriptors(
    ctx: &DescriptorContext<'_>,
    versions: &[ServiceVersion],
) -> Result<Vec<ServiceDescriptor>> {
    versions
        .iter()
        .map(|version| service_descriptor(ctx, version))
        .collect()
}
