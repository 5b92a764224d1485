// SPDX-FileCopyrightText: 2026 The Depot Authors
// SPDX-License-Identifier: MIT

//! Database schema for the service registry.

/// Registry tables, indexes and unique constraints.
///
/// Uniqueness is the only concurrency control: racing inserts of the same
/// blob, service, version or file lose on one of these constraints and
/// re-read the winner.
pub const SCHEMA_SQL: &str = r#"
create table if not exists service (
    id                integer primary key autoincrement not null,
    owner_id          integer not null,
    repo_id           integer not null default 0,
    type              text not null,
    name              text not null,
    lower_name        text not null,
    semver_compatible integer not null default 0,
    is_internal       integer not null default 0,
    unique (owner_id, type, lower_name)
);

create index if not exists IndexServiceOwner on service(owner_id);
create index if not exists IndexServiceRepo on service(repo_id);
create index if not exists IndexServiceType on service(type);

create table if not exists service_version (
    id             integer primary key autoincrement not null,
    service_id     integer not null,
    creator_id     integer not null default 0,
    version        text not null,
    lower_version  text not null,
    created_unix   integer not null,
    is_internal    integer not null default 0,
    metadata_json  text not null default '',
    download_count integer not null default 0,
    unique (service_id, lower_version)
);

create index if not exists IndexServiceVersionService on service_version(service_id);
create index if not exists IndexServiceVersionCreated on service_version(created_unix);

create table if not exists service_file (
    id            integer primary key autoincrement not null,
    version_id    integer not null,
    blob_id       integer not null,
    name          text not null,
    lower_name    text not null,
    composite_key text not null default '',
    is_lead       integer not null default 0,
    created_unix  integer not null,
    unique (version_id, lower_name, composite_key)
);

create index if not exists IndexServiceFileVersion on service_file(version_id);
create index if not exists IndexServiceFileBlob on service_file(blob_id);
create index if not exists IndexServiceFileCreated on service_file(created_unix);

create table if not exists service_blob (
    id           integer primary key autoincrement not null,
    size         integer not null default 0,
    hash_md5     text not null unique,
    hash_sha1    text not null unique,
    hash_sha256  text not null unique,
    hash_sha512  text not null unique,
    created_unix integer not null
);

create index if not exists IndexServiceBlobCreated on service_blob(created_unix);

create table if not exists service_blob_upload (
    id             text primary key not null,
    bytes_received integer not null default 0,
    hash_state     blob,
    created_unix   integer not null,
    updated_unix   integer not null
);

create index if not exists IndexServiceBlobUploadUpdated on service_blob_upload(updated_unix);

create table if not exists service_property (
    id       integer primary key autoincrement not null,
    ref_type integer not null,
    ref_id   integer not null,
    name     text not null,
    value    text not null
);

create index if not exists IndexServicePropertyRef on service_property(ref_type, ref_id);
create index if not exists IndexServicePropertyName on service_property(name);

create table if not exists service_cleanup_rule (
    id              integer primary key autoincrement not null,
    enabled         integer not null default 0,
    owner_id        integer not null default 0,
    type            text not null,
    keep_count      integer not null default 0,
    keep_pattern    text not null default '',
    remove_days     integer not null default 0,
    remove_pattern  text not null default '',
    match_full_name integer not null default 0,
    created_unix    integer not null default 0,
    updated_unix    integer not null default 0,
    unique (owner_id, type)
);

create index if not exists IndexServiceCleanupRuleEnabled on service_cleanup_rule(enabled);
"#;

/// Stored in `PRAGMA user_version` when the schema is created.
pub const SCHEMA_VERSION: i32 = 1;
