// SPDX-FileCopyrightText: 2026 The Depot Authors
// SPDX-License-Identifier: MIT

//! Per-owner and per-type storage limits. `-1` means unlimited.

use std::collections::BTreeMap;
use std::fmt;

use depot_store_db::{RegistryDb, ServiceFileSearchOptions, ServiceType};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum number of non-internal versions per owner
    pub total_owner_count: i64,
    /// Maximum bytes stored per owner, summed over files
    pub total_owner_size: i64,
    /// Maximum size of a single file, keyed by service type tag
    pub per_type: BTreeMap<String, i64>,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            total_owner_count: -1,
            total_owner_size: -1,
            per_type: BTreeMap::new(),
        }
    }
}

impl Limits {
    pub fn size_limit_for(&self, service_type: ServiceType) -> i64 {
        self.per_type
            .get(service_type.as_str())
            .copied()
            .unwrap_or(-1)
    }
}

/// Which limit an upload ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaLimit {
    TotalOwnerCount,
    TotalOwnerSize,
    TypeSize(ServiceType),
}

impl fmt::Display for QuotaLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuotaLimit::TotalOwnerCount => f.write_str("maximum number of versions per owner"),
            QuotaLimit::TotalOwnerSize => f.write_str("maximum total size per owner"),
            QuotaLimit::TypeSize(t) => write!(f, "maximum file size for {}", t.name()),
        }
    }
}

/// Fails once the owner holds more non-internal versions than allowed.
/// Call after the new version is written, inside the same transaction.
pub fn check_count_quota(db: &RegistryDb, limits: &Limits, owner_id: i64) -> Result<()> {
    if limits.total_owner_count < 0 {
        return Ok(());
    }
    let count = db.count_owner_versions(owner_id)?;
    if count > limits.total_owner_count as u64 {
        return Err(Error::QuotaExceeded(QuotaLimit::TotalOwnerCount));
    }
    Ok(())
}

/// Fails if adding `size` bytes of `service_type` content would exceed a
/// size limit.
pub fn check_size_quota(
    db: &RegistryDb,
    limits: &Limits,
    owner_id: i64,
    service_type: ServiceType,
    size: u64,
) -> Result<()> {
    let type_limit = limits.size_limit_for(service_type);
    if type_limit >= 0 && size > type_limit as u64 {
        return Err(Error::QuotaExceeded(QuotaLimit::TypeSize(service_type)));
    }

    if limits.total_owner_size >= 0 {
        let used = db.calculate_file_size(&ServiceFileSearchOptions {
            owner_id,
            ..Default::default()
        })?;
        if used.saturating_add(size) > limits.total_owner_size as u64 {
            return Err(Error::QuotaExceeded(QuotaLimit::TotalOwnerSize));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use depot_store_db::{NewBlob, NewFile, NewService, NewVersion};
    use depot_utils_hash::BlobDigests;

    use super::*;

    fn limits(count: i64, owner_size: i64, lambda_size: i64) -> Limits {
        Limits {
            total_owner_count: count,
            total_owner_size: owner_size,
            per_type: BTreeMap::from([("awslambda".to_owned(), lambda_size)]),
        }
    }

    fn seed(db: &RegistryDb, owner_id: i64, versions: &[&str], bytes: &[u8]) {
        let service = db
            .try_insert_service(&NewService {
                owner_id,
                repo_id: 0,
                service_type: ServiceType::AwsLambda,
                name: "svc".into(),
                semver_compatible: false,
                is_internal: false,
            })
            .unwrap()
            .into_inner();
        let (blob, _) = db
            .get_or_insert_blob(&NewBlob::from_digests(
                bytes.len() as u64,
                &BlobDigests::compute(bytes),
            ))
            .unwrap();
        for version in versions {
            let version = db
                .get_or_insert_version(&NewVersion {
                    service_id: service.id,
                    version: (*version).into(),
                    ..Default::default()
                })
                .unwrap()
                .into_inner();
            db.try_insert_file(&NewFile {
                version_id: version.id,
                blob_id: blob.id,
                name: "f".into(),
                ..Default::default()
            })
            .unwrap();
        }
    }

    #[test]
    fn unlimited_by_default() {
        let db = RegistryDb::open_memory().unwrap();
        seed(&db, 1, &["1", "2", "3"], b"0123456789");
        let limits = Limits::default();
        check_count_quota(&db, &limits, 1).unwrap();
        check_size_quota(&db, &limits, 1, ServiceType::AwsLambda, u64::MAX / 2).unwrap();
    }

    #[test]
    fn count_limit() {
        let db = RegistryDb::open_memory().unwrap();
        seed(&db, 1, &["1", "2"], b"x");
        check_count_quota(&db, &limits(2, -1, -1), 1).unwrap();
        assert!(matches!(
            check_count_quota(&db, &limits(1, -1, -1), 1),
            Err(Error::QuotaExceeded(QuotaLimit::TotalOwnerCount))
        ));
        // Other owners are unaffected.
        check_count_quota(&db, &limits(0, -1, -1), 2).unwrap();
    }

    #[test]
    fn per_type_size_limit() {
        let db = RegistryDb::open_memory().unwrap();
        let limits = limits(-1, -1, 100);
        check_size_quota(&db, &limits, 1, ServiceType::AwsLambda, 100).unwrap();
        assert!(matches!(
            check_size_quota(&db, &limits, 1, ServiceType::AwsLambda, 101),
            Err(Error::QuotaExceeded(QuotaLimit::TypeSize(ServiceType::AwsLambda)))
        ));
        check_size_quota(&db, &limits, 1, ServiceType::AzureFunction, 101).unwrap();
    }

    #[test]
    fn owner_size_counts_every_file() {
        let db = RegistryDb::open_memory().unwrap();
        // One 10-byte blob shared by two files counts as 20 bytes.
        seed(&db, 1, &["1", "2"], b"0123456789");
        let limits = limits(-1, 25, -1);
        check_size_quota(&db, &limits, 1, ServiceType::AwsLambda, 5).unwrap();
        assert!(matches!(
            check_size_quota(&db, &limits, 1, ServiceType::AwsLambda, 6),
            Err(Error::QuotaExceeded(QuotaLimit::TotalOwnerSize))
        ));
    }

    #[test]
    fn huge_upload_does_not_wrap_the_owner_total() {
        let db = RegistryDb::open_memory().unwrap();
        seed(&db, 1, &["1"], b"0123456789");
        assert!(matches!(
            check_size_quota(&db, &limits(-1, 100, -1), 1, ServiceType::AwsLambda, u64::MAX),
            Err(Error::QuotaExceeded(QuotaLimit::TotalOwnerSize))
        ));
    }

    #[test]
    fn missing_limits_default_to_unlimited() {
        let limits: Limits = serde_json::from_str(
            r#"{"total_owner_size": 1048576, "per_type": {"azurefunction": 512}}"#,
        )
        .unwrap();
        assert_eq!(limits.total_owner_count, -1);
        assert_eq!(limits.total_owner_size, 1_048_576);
        assert_eq!(limits.size_limit_for(ServiceType::AzureFunction), 512);
        assert_eq!(limits.size_limit_for(ServiceType::AwsLambda), -1);
    }
}
