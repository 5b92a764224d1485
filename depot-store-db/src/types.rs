// SPDX-FileCopyrightText: 2026 The Depot Authors
// SPDX-License-Identifier: MIT

//! Database row types for registry metadata.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use depot_utils_hash::{Algorithm, BlobDigests};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{Row, ToSql};

use crate::error::Error;

/// Ecosystem a service belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ServiceType {
    AwsLambda,
    AzureFunction,
}

impl ServiceType {
    /// Every supported type.
    pub const ALL: [ServiceType; 2] = [ServiceType::AwsLambda, ServiceType::AzureFunction];

    /// Tag stored in the database and used in URLs.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ServiceType::AwsLambda => "awslambda",
            ServiceType::AzureFunction => "azurefunction",
        }
    }

    /// Human readable name.
    pub const fn name(&self) -> &'static str {
        match self {
            ServiceType::AwsLambda => "AwsLambda",
            ServiceType::AzureFunction => "AzureFunction",
        }
    }

    /// Parse a type filter where `""` and `"all"` mean "any type".
    pub fn parse_filter(s: &str) -> Result<Option<ServiceType>, Error> {
        match s {
            "" | "all" => Ok(None),
            other => other.parse().map(Some),
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ServiceType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::UnknownServiceType(s.to_owned()))
    }
}

impl ToSql for ServiceType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ServiceType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// What a property is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyType {
    Version = 0,
    File = 1,
    Service = 2,
}

impl ToSql for PropertyType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(*self as i64))
    }
}

impl FromSql for PropertyType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_i64()? {
            0 => Ok(PropertyType::Version),
            1 => Ok(PropertyType::File),
            2 => Ok(PropertyType::Service),
            other => Err(FromSqlError::OutOfRange(other)),
        }
    }
}

/// Result of a conflict-checked insert.
///
/// Both variants carry the row: on conflict the caller gets the row that was
/// already stored, which is authoritative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome<T> {
    Created(T),
    Existing(T),
}

impl<T> InsertOutcome<T> {
    pub fn is_existing(&self) -> bool {
        matches!(self, InsertOutcome::Existing(_))
    }

    pub fn get(&self) -> &T {
        match self {
            InsertOutcome::Created(v) | InsertOutcome::Existing(v) => v,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            InsertOutcome::Created(v) | InsertOutcome::Existing(v) => v,
        }
    }
}

/// Whether [`get_or_insert_blob`](crate::RegistryDb::get_or_insert_blob)
/// found stored content or created a new row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobOutcome {
    /// Content is already stored; the caller must not store the bytes again.
    Existing,
    /// A new row was created; the caller must persist the bytes.
    Created,
}

/// A named artifact collection of one owner and one type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub id: i64,
    pub owner_id: i64,
    /// Linked repository, `0` when unlinked
    pub repo_id: i64,
    pub service_type: ServiceType,
    pub name: String,
    pub lower_name: String,
    pub semver_compatible: bool,
    pub is_internal: bool,
}

/// Parameters for creating a service.
#[derive(Debug, Clone)]
pub struct NewService {
    pub owner_id: i64,
    pub repo_id: i64,
    pub service_type: ServiceType,
    pub name: String,
    pub semver_compatible: bool,
    pub is_internal: bool,
}

/// A release of a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceVersion {
    pub id: i64,
    pub service_id: i64,
    pub creator_id: i64,
    pub version: String,
    pub lower_version: String,
    pub created_at: SystemTime,
    pub is_internal: bool,
    /// Opaque JSON, decoded by the service type's metadata decoder
    pub metadata_json: String,
    pub download_count: i64,
}

/// Parameters for creating a version.
#[derive(Debug, Clone)]
pub struct NewVersion {
    pub service_id: i64,
    pub creator_id: i64,
    pub version: String,
    pub created_at: SystemTime,
    pub is_internal: bool,
    pub metadata_json: String,
}

impl Default for NewVersion {
    fn default() -> Self {
        Self {
            service_id: 0,
            creator_id: 0,
            version: String::new(),
            created_at: SystemTime::now(),
            is_internal: false,
            metadata_json: String::new(),
        }
    }
}

/// Composite key value meaning "no composite key".
pub const EMPTY_FILE_KEY: &str = "";

/// One uploaded file of a version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceFile {
    pub id: i64,
    pub version_id: i64,
    pub blob_id: i64,
    pub name: String,
    pub lower_name: String,
    /// Disambiguates same-named files, [`EMPTY_FILE_KEY`] when unused
    pub composite_key: String,
    pub is_lead: bool,
    pub created_at: SystemTime,
}

/// Parameters for creating a file.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub version_id: i64,
    pub blob_id: i64,
    pub name: String,
    pub composite_key: String,
    pub is_lead: bool,
    pub created_at: SystemTime,
}

impl Default for NewFile {
    fn default() -> Self {
        Self {
            version_id: 0,
            blob_id: 0,
            name: String::new(),
            composite_key: EMPTY_FILE_KEY.to_owned(),
            is_lead: false,
            created_at: SystemTime::now(),
        }
    }
}

/// Deduplicated immutable content, identified by size plus four digests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceBlob {
    pub id: i64,
    pub size: u64,
    pub hash_md5: String,
    pub hash_sha1: String,
    pub hash_sha256: String,
    pub hash_sha512: String,
    pub created_at: SystemTime,
}

impl ServiceBlob {
    /// Lowercase hex digest for `algorithm`.
    pub fn hash(&self, algorithm: Algorithm) -> &str {
        match algorithm {
            Algorithm::MD5 => &self.hash_md5,
            Algorithm::SHA1 => &self.hash_sha1,
            Algorithm::SHA256 => &self.hash_sha256,
            Algorithm::SHA512 => &self.hash_sha512,
        }
    }
}

/// Parameters for storing a blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBlob {
    pub size: u64,
    pub hash_md5: String,
    pub hash_sha1: String,
    pub hash_sha256: String,
    pub hash_sha512: String,
    pub created_at: SystemTime,
}

impl NewBlob {
    pub fn from_digests(size: u64, digests: &BlobDigests) -> Self {
        Self {
            size,
            hash_md5: digests.md5.to_hex(),
            hash_sha1: digests.sha1.to_hex(),
            hash_sha256: digests.sha256.to_hex(),
            hash_sha512: digests.sha512.to_hex(),
            created_at: SystemTime::now(),
        }
    }
}

/// An in-progress resumable upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceBlobUpload {
    /// Unguessable lowercase token
    pub id: String,
    pub bytes_received: u64,
    /// Serialized [`MultiHasher`](depot_utils_hash::MultiHasher) state,
    /// empty before the first chunk
    pub hash_state: Vec<u8>,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

/// A name/value attribute of a service, version or file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceProperty {
    pub id: i64,
    pub ref_type: PropertyType,
    pub ref_id: i64,
    pub name: String,
    pub value: String,
}

/// Properties of a single ref, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServicePropertyList(pub Vec<ServiceProperty>);

impl ServicePropertyList {
    /// First value recorded under `name`.
    pub fn get_by_name(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }

    /// Every value recorded under `name`.
    pub fn get_all_by_name<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |p| p.name == name)
            .map(|p| p.value.as_str())
    }
}

impl std::ops::Deref for ServicePropertyList {
    type Target = [ServiceProperty];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<ServiceProperty>> for ServicePropertyList {
    fn from(v: Vec<ServiceProperty>) -> Self {
        Self(v)
    }
}

/// Convert Unix timestamp to SystemTime.
pub(crate) fn unix_to_system_time(timestamp: i64) -> SystemTime {
    if timestamp >= 0 {
        UNIX_EPOCH + Duration::from_secs(timestamp as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs((-timestamp) as u64)
    }
}

/// Convert SystemTime to Unix timestamp.
pub(crate) fn system_time_to_unix(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(duration) => duration.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    }
}

/// Unix timestamp of `now - older_than`.
pub(crate) fn cutoff_unix(older_than: Duration) -> i64 {
    let secs = i64::try_from(older_than.as_secs()).unwrap_or(i64::MAX);
    system_time_to_unix(SystemTime::now()).saturating_sub(secs)
}

pub(crate) const SERVICE_COLUMNS: &str =
    "service.id, service.owner_id, service.repo_id, service.type, service.name, \
     service.lower_name, service.semver_compatible, service.is_internal";

impl Service {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Service {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            repo_id: row.get(2)?,
            service_type: row.get(3)?,
            name: row.get(4)?,
            lower_name: row.get(5)?,
            semver_compatible: row.get(6)?,
            is_internal: row.get(7)?,
        })
    }
}

pub(crate) const VERSION_COLUMNS: &str =
    "service_version.id, service_version.service_id, service_version.creator_id, \
     service_version.version, service_version.lower_version, service_version.created_unix, \
     service_version.is_internal, service_version.metadata_json, service_version.download_count";

impl ServiceVersion {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(ServiceVersion {
            id: row.get(0)?,
            service_id: row.get(1)?,
            creator_id: row.get(2)?,
            version: row.get(3)?,
            lower_version: row.get(4)?,
            created_at: unix_to_system_time(row.get(5)?),
            is_internal: row.get(6)?,
            metadata_json: row.get(7)?,
            download_count: row.get(8)?,
        })
    }
}

pub(crate) const FILE_COLUMNS: &str =
    "service_file.id, service_file.version_id, service_file.blob_id, service_file.name, \
     service_file.lower_name, service_file.composite_key, service_file.is_lead, \
     service_file.created_unix";

impl ServiceFile {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(ServiceFile {
            id: row.get(0)?,
            version_id: row.get(1)?,
            blob_id: row.get(2)?,
            name: row.get(3)?,
            lower_name: row.get(4)?,
            composite_key: row.get(5)?,
            is_lead: row.get(6)?,
            created_at: unix_to_system_time(row.get(7)?),
        })
    }
}

pub(crate) const BLOB_COLUMNS: &str =
    "service_blob.id, service_blob.size, service_blob.hash_md5, service_blob.hash_sha1, \
     service_blob.hash_sha256, service_blob.hash_sha512, service_blob.created_unix";

impl ServiceBlob {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(ServiceBlob {
            id: row.get(0)?,
            size: row.get::<_, i64>(1)? as u64,
            hash_md5: row.get(2)?,
            hash_sha1: row.get(3)?,
            hash_sha256: row.get(4)?,
            hash_sha512: row.get(5)?,
            created_at: unix_to_system_time(row.get(6)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_unix_time_roundtrip() {
        let now = SystemTime::now();
        let unix = system_time_to_unix(now);
        let back = unix_to_system_time(unix);
        // Allow 1 second tolerance due to subsecond truncation
        let diff = now.duration_since(back).unwrap_or_default();
        assert!(diff.as_secs() <= 1);
    }

    #[test]
    fn cutoff_saturates_for_huge_durations() {
        let now = system_time_to_unix(SystemTime::now());
        assert!((now - 60..=now - 59).contains(&cutoff_unix(Duration::from_secs(60))));
        assert!(cutoff_unix(Duration::MAX) < 0);
        assert!(cutoff_unix(Duration::from_secs(i64::MAX as u64 + 1)) < 0);
    }

    #[rstest]
    #[case::awslambda("awslambda", ServiceType::AwsLambda, "AwsLambda")]
    #[case::azurefunction("azurefunction", ServiceType::AzureFunction, "AzureFunction")]
    fn service_type_tags(#[case] tag: &str, #[case] expected: ServiceType, #[case] name: &str) {
        let parsed: ServiceType = tag.parse().unwrap();
        assert_eq!(parsed, expected);
        assert_eq!(parsed.to_string(), tag);
        assert_eq!(parsed.name(), name);
    }

    #[test]
    fn unknown_service_type_is_an_error() {
        let err = "npm".parse::<ServiceType>().unwrap_err();
        assert!(matches!(err, Error::UnknownServiceType(t) if t == "npm"));
    }

    #[rstest]
    #[case::empty("", None)]
    #[case::all("all", None)]
    #[case::one("awslambda", Some(ServiceType::AwsLambda))]
    fn type_filter(#[case] input: &str, #[case] expected: Option<ServiceType>) {
        assert_eq!(ServiceType::parse_filter(input).unwrap(), expected);
    }

    fn prop(name: &str, value: &str) -> ServiceProperty {
        ServiceProperty {
            id: 0,
            ref_type: PropertyType::File,
            ref_id: 1,
            name: name.into(),
            value: value.into(),
        }
    }

    #[test]
    fn property_list_returns_first_value() {
        let list = ServicePropertyList::from(vec![
            prop("provides", "common"),
            prop("arch", "x86_64"),
            prop("provides", "gitea"),
        ]);

        assert_eq!(list.get_by_name("provides"), Some("common"));
        assert_eq!(list.get_by_name("missing"), None);
        assert_eq!(
            list.get_all_by_name("provides").collect::<Vec<_>>(),
            ["common", "gitea"]
        );
    }

    #[test]
    fn insert_outcome_accessors() {
        let created = InsertOutcome::Created(1);
        let existing = InsertOutcome::Existing(2);
        assert!(!created.is_existing());
        assert!(existing.is_existing());
        assert_eq!(*created.get(), 1);
        assert_eq!(existing.into_inner(), 2);
    }
}
