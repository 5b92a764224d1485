// SPDX-FileCopyrightText: 2026 The Depot Authors
// SPDX-License-Identifier: MIT

use std::path::{Path, PathBuf};
use std::time::Duration;

use depot_store_core::Limits;
use serde::{Deserialize, Serialize};

use crate::error::{DaemonError, IoContext};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Path to the registry database
    pub db_path: PathBuf,

    /// Root of the blob content store
    pub storage_path: PathBuf,

    /// Directory holding resumable upload sessions
    pub chunked_upload_path: PathBuf,

    /// Seconds between maintenance sweeps
    pub sweep_interval_secs: u64,

    /// Unreferenced blobs younger than this are kept
    pub blob_grace_period_secs: u64,

    /// Upload sessions idle for longer than this are dropped
    pub upload_expiry_secs: u64,

    pub limits: Limits,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("/var/lib/depot/depot.sqlite"),
            storage_path: PathBuf::from("/var/lib/depot/blobs"),
            chunked_upload_path: PathBuf::from("/var/lib/depot/tmp/upload"),
            sweep_interval_secs: 3600,
            blob_grace_period_secs: 86400,
            upload_expiry_secs: 86400,
            limits: Limits::default(),
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, DaemonError> {
        let contents = std::fs::read_to_string(path)
            .io_context(|| format!("Failed to read config file at {}", path.display()))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, DaemonError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DaemonError> {
        if self.sweep_interval_secs == 0 {
            return Err(DaemonError::config("sweep_interval_secs must be positive"));
        }
        Ok(())
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn blob_grace_period(&self) -> Duration {
        Duration::from_secs(self.blob_grace_period_secs)
    }

    pub fn upload_expiry(&self) -> Duration {
        Duration::from_secs(self.upload_expiry_secs)
    }
}

#[cfg(test)]
mod tests {
    use depot_store_db::ServiceType;

    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        assert_eq!(Config::from_toml("").unwrap(), Config::default());
    }

    #[test]
    fn full_config() {
        let config = Config::from_toml(
            r#"
            db_path = "/srv/depot/db.sqlite"
            storage_path = "/srv/depot/blobs"
            sweep_interval_secs = 60
            blob_grace_period_secs = 0

            [limits]
            total_owner_count = 100

            [limits.per_type]
            awslambda = 52428800
            "#,
        )
        .unwrap();

        assert_eq!(config.db_path, PathBuf::from("/srv/depot/db.sqlite"));
        assert_eq!(config.storage_path, PathBuf::from("/srv/depot/blobs"));
        assert_eq!(
            config.chunked_upload_path,
            PathBuf::from("/var/lib/depot/tmp/upload")
        );
        assert_eq!(config.sweep_interval(), Duration::from_secs(60));
        assert_eq!(config.blob_grace_period(), Duration::ZERO);
        assert_eq!(config.limits.total_owner_count, 100);
        assert_eq!(config.limits.total_owner_size, -1);
        assert_eq!(config.limits.size_limit_for(ServiceType::AwsLambda), 52_428_800);
        assert_eq!(config.limits.size_limit_for(ServiceType::AzureFunction), -1);
    }

    #[test]
    fn zero_sweep_interval_is_rejected() {
        assert!(matches!(
            Config::from_toml("sweep_interval_secs = 0"),
            Err(DaemonError::Config(_))
        ));
    }

    #[test]
    fn malformed_toml_is_rejected() {
        assert!(matches!(
            Config::from_toml("sweep_interval_secs = \"often\""),
            Err(DaemonError::Toml(_))
        ));
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Config::from_file(&dir.path().join("depot.toml")),
            Err(DaemonError::Io { .. })
        ));
    }
}
