// SPDX-FileCopyrightText: 2026 The Depot Authors
// SPDX-License-Identifier: MIT

//! Per-type version metadata and the decoder registry.
//!
//! Version metadata is stored as an opaque JSON document. The service type
//! alone selects the decoder, so every [`ServiceType`] must have one
//! registered; [`MetadataRegistry::verify_exhaustive`] checks this once at
//! startup instead of failing on the first request.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use depot_store_db::ServiceType;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Decoded, type-specific metadata of a version.
pub trait VersionMetadata: fmt::Debug + Send + Sync {
    fn service_type(&self) -> ServiceType;

    fn description(&self) -> &str;

    fn to_json(&self) -> serde_json::Value;

    fn as_any(&self) -> &dyn Any;
}

/// Metadata recorded for an AWS Lambda function version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsLambdaMetadata {
    pub description: String,
    pub maintainer: String,
    pub project_url: String,
    pub license: String,
    /// Lambda runtime identifier, e.g. `python3.12`
    pub runtime: String,
    pub handler: String,
}

/// Metadata recorded for an Azure Function app version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AzureFunctionMetadata {
    pub description: String,
    pub maintainer: String,
    pub project_url: String,
    pub license: String,
    /// `FUNCTIONS_WORKER_RUNTIME` of the app, e.g. `node`
    pub worker_runtime: String,
}

macro_rules! impl_version_metadata {
    ($ty:ty, $service_type:expr) => {
        impl VersionMetadata for $ty {
            fn service_type(&self) -> ServiceType {
                $service_type
            }

            fn description(&self) -> &str {
                &self.description
            }

            fn to_json(&self) -> serde_json::Value {
                serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
            }

            fn as_any(&self) -> &dyn Any {
                self
            }
        }
    };
}

impl_version_metadata!(AwsLambdaMetadata, ServiceType::AwsLambda);
impl_version_metadata!(AzureFunctionMetadata, ServiceType::AzureFunction);

type Decoder = fn(&str) -> serde_json::Result<Box<dyn VersionMetadata>>;

fn decode_json<T>(json: &str) -> serde_json::Result<Box<dyn VersionMetadata>>
where
    T: DeserializeOwned + VersionMetadata + 'static,
{
    // Versions created without metadata store an empty string.
    let json = if json.trim().is_empty() { "{}" } else { json };
    Ok(Box::new(serde_json::from_str::<T>(json)?))
}

/// Maps each service type to its metadata decoder.
#[derive(Clone, Default)]
pub struct MetadataRegistry {
    decoders: HashMap<ServiceType, Decoder>,
}

impl fmt::Debug for MetadataRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.decoders.keys().map(ServiceType::as_str).collect();
        types.sort_unstable();
        f.debug_struct("MetadataRegistry")
            .field("types", &types)
            .finish()
    }
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with a decoder for every built-in service type.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register::<AwsLambdaMetadata>(ServiceType::AwsLambda);
        registry.register::<AzureFunctionMetadata>(ServiceType::AzureFunction);
        registry
    }

    /// Register (or replace) the decoder for `service_type`.
    pub fn register<T>(&mut self, service_type: ServiceType)
    where
        T: DeserializeOwned + VersionMetadata + 'static,
    {
        self.decoders.insert(service_type, decode_json::<T>);
    }

    /// Fails with the first service type that has no decoder.
    pub fn verify_exhaustive(&self) -> Result<()> {
        match ServiceType::ALL
            .iter()
            .find(|t| !self.decoders.contains_key(*t))
        {
            Some(missing) => Err(Error::UnregisteredServiceType(*missing)),
            None => Ok(()),
        }
    }

    pub fn decode(&self, service_type: ServiceType, json: &str) -> Result<Box<dyn VersionMetadata>> {
        let decoder = self
            .decoders
            .get(&service_type)
            .ok_or(Error::UnregisteredServiceType(service_type))?;
        decoder(json).map_err(|source| Error::MetadataDecode {
            service_type,
            source,
        })
    }
}
