//! Provider error types.
//!
//! Every failure a backend can surface lives in one enum, and every variant
//! maps onto one of five classes via [`ProviderError::kind`]:
//! configuration, connection, query, transaction, unsupported. Callers branch
//! on the class; the variants carry the offending field, path, or underlying
//! error so a failure is diagnosable without re-running with extra logging.

use std::path::PathBuf;

use thiserror::Error;

use crate::model::InvalidNameError;

/// the main error type for provider operations
#[derive(Debug, Error)]
pub enum ProviderError {
    /// a required config field is absent for the selected backend kind
    #[error("missing required config field '{field}' for {backend} backend")]
    MissingConfig {
        backend: &'static str,
        field: &'static str,
    },

    /// the config descriptor is structurally invalid
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// the backend kind is recognized but its driver is not built into this crate
    #[error("backend '{0}' is not built into this distribution")]
    BackendUnavailable(&'static str),

    /// operation attempted while disconnected
    #[error("provider is not connected")]
    NotConnected,

    /// connect failed; the underlying message is preserved
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// invalid collection or item name
    #[error("invalid name: {0}")]
    InvalidName(#[from] InvalidNameError),

    /// filesystem-level failure
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// a stored file exists but cannot be parsed
    #[error("corrupt data at {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// JSON serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// create with an id that already exists (constraint violation)
    #[error("duplicate id '{id}' in collection '{collection}'")]
    DuplicateId { collection: String, id: String },

    /// item payload or update patch is not a JSON object
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// a `regex` filter carries an uncompilable pattern
    #[error("invalid regex pattern '{pattern}': {reason}")]
    InvalidRegex { pattern: String, reason: String },

    /// error from the underlying git library
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// merge conflict left unresolved under the manual strategy
    #[error("merge conflict requires manual resolution: {}", paths_display(.paths))]
    MergeConflict { paths: Vec<PathBuf> },

    /// transaction-level failure
    #[error("transaction error: {0}")]
    Transaction(String),

    /// optional contract member not implemented by this backend
    #[error("operation '{0}' is not supported by this backend")]
    Unsupported(&'static str),
}

fn paths_display(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// The five failure classes of the provider contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Connection,
    Query,
    Transaction,
    Unsupported,
}

impl ProviderError {
    /// classify this error into its contract-level failure class
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingConfig { .. } | Self::InvalidConfig(_) | Self::BackendUnavailable(_) => {
                ErrorKind::Configuration
            }
            Self::NotConnected | Self::ConnectionFailed(_) => ErrorKind::Connection,
            Self::InvalidName(_)
            | Self::Io { .. }
            | Self::Corrupt { .. }
            | Self::Serialization(_)
            | Self::DuplicateId { .. }
            | Self::InvalidPayload(_)
            | Self::InvalidRegex { .. }
            | Self::Git(_) => ErrorKind::Query,
            Self::MergeConflict { .. } | Self::Transaction(_) => ErrorKind::Transaction,
            Self::Unsupported(_) => ErrorKind::Unsupported,
        }
    }

    /// check if this is a configuration error
    pub fn is_configuration(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }

    /// check if this is a connection error
    pub fn is_connection(&self) -> bool {
        self.kind() == ErrorKind::Connection
    }

    /// check if this error came from an unsupported optional operation
    pub fn is_unsupported(&self) -> bool {
        self.kind() == ErrorKind::Unsupported
    }

    /// wrap a filesystem error with the path it occurred at
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// result type alias for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;
