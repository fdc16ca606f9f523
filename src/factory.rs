//! Mapping from configuration descriptors to provider instances.

use crate::config::ProviderConfig;
use crate::provider::{MemoryProvider, Provider, ProviderError, ProviderResult};
use crate::store::JsonFileProvider;
use crate::sync::GitSyncProvider;

/// Builds concrete providers from [`ProviderConfig`] descriptors.
pub struct ProviderFactory;

impl ProviderFactory {
    /// Validate the descriptor and construct the matching provider.
    ///
    /// Validation happens before any instance is constructed, so a
    /// descriptor missing required sub-configuration fails without touching
    /// the filesystem or the network. The returned provider is not yet
    /// connected.
    pub fn build(config: &ProviderConfig) -> ProviderResult<Box<dyn Provider>> {
        config.validate()?;
        Self::instantiate(config)
    }

    fn instantiate(config: &ProviderConfig) -> ProviderResult<Box<dyn Provider>> {
        match config {
            ProviderConfig::Memory => Ok(Box::new(MemoryProvider::new())),
            ProviderConfig::JsonFile(config) => {
                Ok(Box::new(JsonFileProvider::new(config.clone())))
            }
            ProviderConfig::GitSync(config) => {
                let base = Self::instantiate(&config.base_provider)?;
                Ok(Box::new(GitSyncProvider::new(
                    base,
                    &config.repository_path,
                    config.sync_options.clone(),
                )))
            }
            // drivers for these kinds are external collaborators; their
            // descriptors validate, but no implementation ships here
            ProviderConfig::Sqlite(_) => Err(ProviderError::BackendUnavailable("sqlite")),
            ProviderConfig::Mongodb(_) => Err(ProviderError::BackendUnavailable("mongodb")),
            ProviderConfig::ObjectStorage(_) => {
                Err(ProviderError::BackendUnavailable("object-storage"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GitSyncConfig;
    use crate::store::JsonFileConfig;
    use serde_json::json;

    #[test]
    fn test_build_memory() {
        let provider = ProviderFactory::build(&ProviderConfig::Memory).unwrap();
        assert!(!provider.is_connected());
        provider.connect().unwrap();
        assert!(provider.is_connected());
    }

    #[test]
    fn test_validation_before_filesystem_io() {
        // missing directoryPath fails before any directory could be created
        let config: ProviderConfig =
            serde_json::from_value(json!({"type": "json-file"})).unwrap();
        let err = ProviderFactory::build(&config).err().unwrap();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_build_json_file_does_no_io() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("never-created");
        let config = ProviderConfig::JsonFile(JsonFileConfig::new(&target));

        let _provider = ProviderFactory::build(&config).unwrap();
        assert!(!target.exists());
    }

    #[test]
    fn test_build_git_sync_over_json_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = ProviderConfig::GitSync(GitSyncConfig {
            repository_path: dir.path().to_path_buf(),
            base_provider: Box::new(ProviderConfig::JsonFile(JsonFileConfig::new(
                dir.path().join("data"),
            ))),
            ..Default::default()
        });

        let provider = ProviderFactory::build(&config).unwrap();
        provider.connect().unwrap();
        assert!(provider.is_connected());
        provider.disconnect().unwrap();
    }

    #[test]
    fn test_unavailable_backends() {
        let sqlite: ProviderConfig =
            serde_json::from_value(json!({"type": "sqlite", "filePath": "/tmp/db.sqlite"}))
                .unwrap();
        let err = ProviderFactory::build(&sqlite).err().unwrap();
        assert!(matches!(err, ProviderError::BackendUnavailable("sqlite")));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_invalid_base_rejected_before_construction() {
        let config = ProviderConfig::GitSync(GitSyncConfig {
            repository_path: std::path::PathBuf::from("/tmp/repo"),
            base_provider: Box::new(ProviderConfig::JsonFile(JsonFileConfig::default())),
            ..Default::default()
        });
        assert!(ProviderFactory::build(&config).is_err());
    }
}
