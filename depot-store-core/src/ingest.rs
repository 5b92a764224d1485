// SPDX-FileCopyrightText: 2026 The Depot Authors
// SPDX-License-Identifier: MIT

//! Adding uploaded artifacts to the registry.
//!
//! Rows are written in one transaction. Bytes of a newly created blob are
//! moved into the content store after that transaction commits; if that
//! fails, the file and blob rows are removed again so no row points at
//! missing content.

use depot_store_db::{
    BlobOutcome, Entity, InsertOutcome, NewBlob, NewFile, NewService, NewVersion,
    PropertyType, RegistryDb, ServiceBlob, ServiceFile, ServiceType, ServiceVersion,
};
use tracing::{debug, info, warn};

use crate::access::Account;
use crate::content::ContentStore;
use crate::error::{Error, Result};
use crate::quota::{Limits, check_count_quota, check_size_quota};
use crate::upload::HashedBlob;

/// Identifies a version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub owner_id: i64,
    pub service_type: ServiceType,
    pub name: String,
    pub version: String,
}

/// Everything needed to create a service version on first upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCreationInfo {
    pub info: ServiceInfo,
    pub semver_compatible: bool,
    pub is_internal: bool,
    pub metadata_json: String,
    /// Recorded only when the service is created
    pub service_properties: Vec<(String, String)>,
    /// Recorded only when the version is created
    pub version_properties: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileCreationInfo {
    pub name: String,
    pub composite_key: String,
    pub is_lead: bool,
    pub properties: Vec<(String, String)>,
    /// Replace a file with the same name and key instead of failing
    pub overwrite_existing: bool,
}

/// Collaborators of an ingestion.
pub struct IngestContext<'a, C> {
    pub db: &'a RegistryDb,
    pub content: &'a C,
    pub limits: &'a Limits,
}

struct Staged {
    version: ServiceVersion,
    file: ServiceFile,
    blob: ServiceBlob,
    blob_outcome: BlobOutcome,
}

/// Add a file, creating the service and version when needed.
pub async fn create_service_or_add_file<C: ContentStore>(
    ctx: &IngestContext<'_, C>,
    creator: &Account,
    service: &ServiceCreationInfo,
    file: &FileCreationInfo,
    blob: HashedBlob,
) -> Result<(ServiceVersion, ServiceFile)> {
    ingest(ctx, creator, service, file, blob, false).await
}

/// Like [`create_service_or_add_file`], but the version must not exist yet.
pub async fn create_service_and_add_file<C: ContentStore>(
    ctx: &IngestContext<'_, C>,
    creator: &Account,
    service: &ServiceCreationInfo,
    file: &FileCreationInfo,
    blob: HashedBlob,
) -> Result<(ServiceVersion, ServiceFile)> {
    ingest(ctx, creator, service, file, blob, true).await
}

/// Add a file to a version that already exists.
pub async fn add_file_to_existing_version<C: ContentStore>(
    ctx: &IngestContext<'_, C>,
    creator: &Account,
    info: &ServiceInfo,
    file: &FileCreationInfo,
    blob: HashedBlob,
) -> Result<ServiceFile> {
    let staged = match stage_existing(ctx.db, ctx.limits, creator, info, file, &blob) {
        Ok(staged) => staged,
        Err(e) => return Err(discard_after(blob, e).await),
    };
    persist_content(ctx, &staged, blob).await?;
    Ok(staged.file)
}

async fn ingest<C: ContentStore>(
    ctx: &IngestContext<'_, C>,
    creator: &Account,
    service: &ServiceCreationInfo,
    file: &FileCreationInfo,
    blob: HashedBlob,
    require_new_version: bool,
) -> Result<(ServiceVersion, ServiceFile)> {
    let info = &service.info;
    let staged = match stage_new(ctx.db, ctx.limits, creator, service, file, &blob, require_new_version) {
        Ok(staged) => staged,
        Err(e) => return Err(discard_after(blob, e).await),
    };
    persist_content(ctx, &staged, blob).await?;
    info!(
        owner_id = info.owner_id,
        service_type = %info.service_type,
        name = %info.name,
        version = %info.version,
        file = %staged.file.name,
        "ingested file"
    );
    Ok((staged.version, staged.file))
}

fn stage_existing(
    db: &RegistryDb,
    limits: &Limits,
    creator: &Account,
    info: &ServiceInfo,
    file: &FileCreationInfo,
    blob: &HashedBlob,
) -> Result<Staged> {
    let version =
        db.get_version_by_name_and_version(info.owner_id, info.service_type, &info.name, &info.version)?;
    if !creator.is_admin {
        check_size_quota(db, limits, info.owner_id, info.service_type, blob.size)?;
    }
    db.transaction(|db| stage_file(db, version, file, blob))
}

fn stage_new(
    db: &RegistryDb,
    limits: &Limits,
    creator: &Account,
    service: &ServiceCreationInfo,
    file: &FileCreationInfo,
    blob: &HashedBlob,
    require_new_version: bool,
) -> Result<Staged> {
    let info = &service.info;
    if !creator.is_admin {
        check_size_quota(db, limits, info.owner_id, info.service_type, blob.size)?;
    }
    db.transaction(|db| -> Result<Staged> {
        let (version, created) = get_or_create_version(db, creator, service)?;
        if require_new_version && !created {
            return Err(Error::already_exists(Entity::Version));
        }
        // Counted after the insert so the new version is included.
        if created && !creator.is_admin {
            check_count_quota(db, limits, info.owner_id)?;
        }
        stage_file(db, version, file, blob)
    })
}

fn insert_properties(
    db: &RegistryDb,
    ref_type: PropertyType,
    ref_id: i64,
    properties: &[(String, String)],
) -> Result<()> {
    for (name, value) in properties {
        db.insert_property(ref_type, ref_id, name, value)?;
    }
    Ok(())
}

/// Returns the version and whether it was created.
fn get_or_create_version(
    db: &RegistryDb,
    creator: &Account,
    service: &ServiceCreationInfo,
) -> Result<(ServiceVersion, bool)> {
    let info = &service.info;
    let outcome = db.try_insert_service(&NewService {
        owner_id: info.owner_id,
        repo_id: 0,
        service_type: info.service_type,
        name: info.name.clone(),
        semver_compatible: service.semver_compatible,
        is_internal: service.is_internal,
    })?;
    if let InsertOutcome::Created(created) = &outcome {
        insert_properties(db, PropertyType::Service, created.id, &service.service_properties)?;
    }
    let service_row = outcome.into_inner();

    let outcome = db.get_or_insert_version(&NewVersion {
        service_id: service_row.id,
        creator_id: creator.id,
        version: info.version.clone(),
        is_internal: service.is_internal,
        metadata_json: service.metadata_json.clone(),
        ..Default::default()
    })?;
    match outcome {
        InsertOutcome::Created(version) => {
            insert_properties(db, PropertyType::Version, version.id, &service.version_properties)?;
            debug!(version_id = version.id, "created version");
            Ok((version, true))
        }
        InsertOutcome::Existing(version) => Ok((version, false)),
    }
}

/// Store the blob row and the file with its properties.
fn stage_file(
    db: &RegistryDb,
    version: ServiceVersion,
    file: &FileCreationInfo,
    blob: &HashedBlob,
) -> Result<Staged> {
    let (blob_row, blob_outcome) =
        db.get_or_insert_blob(&NewBlob::from_digests(blob.size, &blob.digests))?;

    let new_file = NewFile {
        version_id: version.id,
        blob_id: blob_row.id,
        name: file.name.clone(),
        composite_key: file.composite_key.clone(),
        is_lead: file.is_lead,
        ..Default::default()
    };
    let file_row = match db.try_insert_file(&new_file)? {
        InsertOutcome::Created(row) => row,
        InsertOutcome::Existing(existing) if file.overwrite_existing => {
            db.delete_all_properties(PropertyType::File, existing.id)?;
            db.delete_file_by_id(existing.id)?;
            debug!(file_id = existing.id, "replacing existing file");
            db.try_insert_file(&new_file)?.into_inner()
        }
        InsertOutcome::Existing(_) => return Err(Error::already_exists(Entity::File)),
    };
    insert_properties(db, PropertyType::File, file_row.id, &file.properties)?;

    Ok(Staged {
        version,
        file: file_row,
        blob: blob_row,
        blob_outcome,
    })
}

/// Move the spooled bytes into the content store if the blob is new,
/// otherwise drop them.
async fn persist_content<C: ContentStore>(
    ctx: &IngestContext<'_, C>,
    staged: &Staged,
    blob: HashedBlob,
) -> Result<()> {
    if staged.blob_outcome == BlobOutcome::Existing {
        return blob.discard().await;
    }

    if let Err(e) = ctx.content.put(&staged.blob.hash_sha256, &blob.path).await {
        warn!(
            blob_id = staged.blob.id,
            file_id = staged.file.id,
            "failed to store content, removing rows: {e}"
        );
        let file_id = staged.file.id;
        let blob_id = staged.blob.id;
        ctx.db.transaction(|db| -> Result<()> {
            db.delete_all_properties(PropertyType::File, file_id)?;
            db.delete_file_by_id(file_id)?;
            db.delete_blob_by_id(blob_id)?;
            Ok(())
        })?;
        return Err(discard_after(blob, e).await);
    }
    Ok(())
}

/// Remove the spool file, then hand back `err`.
async fn discard_after(blob: HashedBlob, err: Error) -> Error {
    let path = blob.path.clone();
    if let Err(e) = blob.discard().await {
        warn!(path = %path.display(), "failed to remove spooled upload: {e}");
    }
    err
}
