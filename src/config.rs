//! Provider configuration descriptors.
//!
//! A [`ProviderConfig`] is a discriminated descriptor: the `type` tag selects
//! a backend kind and the remaining fields are that kind's sub-configuration.
//! Field names follow the external camelCase surface, so a descriptor
//! produced by a host's config loader deserializes directly:
//!
//! ```json
//! { "type": "json-file", "directoryPath": "/var/lib/app/data" }
//! ```
//!
//! [`ProviderConfig::validate`] is pure — it rejects a descriptor missing a
//! required field for its selected kind before any I/O is attempted or any
//! provider is constructed.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::provider::{ProviderError, ProviderResult};
use crate::store::JsonFileConfig;
use crate::sync::SyncOptions;

/// Descriptor selecting one backend kind plus its sub-configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ProviderConfig {
    /// volatile in-memory backend
    Memory,
    /// JSON-file persistence engine
    JsonFile(JsonFileConfig),
    /// sqlite driver (external collaborator; validated but not built in)
    Sqlite(SqliteConfig),
    /// mongodb driver (external collaborator; validated but not built in)
    Mongodb(MongodbConfig),
    /// git-sync layer wrapping a base backend
    GitSync(GitSyncConfig),
    /// object-storage driver (external collaborator; validated but not built in)
    ObjectStorage(ObjectStorageConfig),
}

impl ProviderConfig {
    /// The kind tag, as it appears in the external surface.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::JsonFile(_) => "json-file",
            Self::Sqlite(_) => "sqlite",
            Self::Mongodb(_) => "mongodb",
            Self::GitSync(_) => "git-sync",
            Self::ObjectStorage(_) => "object-storage",
        }
    }

    /// Reject a descriptor missing required fields for its kind. Pure; no
    /// I/O and no provider construction.
    pub fn validate(&self) -> ProviderResult<()> {
        match self {
            Self::Memory => Ok(()),
            Self::JsonFile(config) => config.validate(),
            Self::Sqlite(config) => config.validate(),
            Self::Mongodb(config) => config.validate(),
            Self::GitSync(config) => config.validate(),
            Self::ObjectStorage(config) => config.validate(),
        }
    }
}

/// Sub-configuration for the sqlite kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SqliteConfig {
    pub file_path: PathBuf,
}

impl SqliteConfig {
    pub fn validate(&self) -> ProviderResult<()> {
        if self.file_path.as_os_str().is_empty() {
            return Err(ProviderError::MissingConfig {
                backend: "sqlite",
                field: "filePath",
            });
        }
        Ok(())
    }
}

/// Sub-configuration for the mongodb kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MongodbConfig {
    pub connection_string: String,
    pub database_name: String,
    /// driver-specific options, passed through opaquely
    pub options: Option<Value>,
}

impl MongodbConfig {
    pub fn validate(&self) -> ProviderResult<()> {
        if self.connection_string.is_empty() {
            return Err(ProviderError::MissingConfig {
                backend: "mongodb",
                field: "connectionString",
            });
        }
        if self.database_name.is_empty() {
            return Err(ProviderError::MissingConfig {
                backend: "mongodb",
                field: "databaseName",
            });
        }
        Ok(())
    }
}

/// Sub-configuration for the object-storage kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectStorageConfig {
    pub endpoint: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
    pub key_prefix: Option<String>,
}

impl ObjectStorageConfig {
    pub fn validate(&self) -> ProviderResult<()> {
        let required: [(&'static str, &str); 4] = [
            ("endpoint", &self.endpoint),
            ("accessKeyId", &self.access_key_id),
            ("secretAccessKey", &self.secret_access_key),
            ("bucketName", &self.bucket_name),
        ];
        for (field, value) in required {
            if value.is_empty() {
                return Err(ProviderError::MissingConfig {
                    backend: "object-storage",
                    field,
                });
            }
        }
        Ok(())
    }
}

/// Sub-configuration for the git-sync kind: the repository path, the full
/// descriptor of the wrapped base backend, and the sync options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GitSyncConfig {
    pub repository_path: PathBuf,
    pub base_provider: Box<ProviderConfig>,
    pub sync_options: SyncOptions,
}

impl Default for GitSyncConfig {
    fn default() -> Self {
        Self {
            repository_path: PathBuf::new(),
            base_provider: Box::new(ProviderConfig::Memory),
            sync_options: SyncOptions::default(),
        }
    }
}

impl GitSyncConfig {
    pub fn validate(&self) -> ProviderResult<()> {
        if self.repository_path.as_os_str().is_empty() {
            return Err(ProviderError::MissingConfig {
                backend: "git-sync",
                field: "repositoryPath",
            });
        }
        if matches!(&*self.base_provider, ProviderConfig::GitSync(_)) {
            return Err(ProviderError::InvalidConfig(
                "git-sync cannot wrap another git-sync provider".to_string(),
            ));
        }
        if self.sync_options.auto_sync && self.sync_options.interval_ms == 0 {
            return Err(ProviderError::InvalidConfig(
                "sync interval must be greater than zero when autoSync is enabled".to_string(),
            ));
        }
        self.base_provider.validate()
    }
}
