//! Database service: lifecycle wrapper around a single provider.
//!
//! Callers never construct providers directly; they hold a service and ask
//! it for a connected handle. The service builds and connects the provider
//! on first use, verifies the connection on every call (reconnecting
//! transparently once if it went stale), and tears it down idempotently.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::ProviderConfig;
use crate::factory::ProviderFactory;
use crate::provider::{ErrorKind, Provider, ProviderError, ProviderResult};

/// Owns at most one live provider built from its configuration.
pub struct DatabaseService {
    config: ProviderConfig,
    provider: Mutex<Option<Arc<dyn Provider>>>,
}

impl DatabaseService {
    /// Create a service for the given configuration. Nothing is constructed
    /// until the first [`DatabaseService::provider`] call.
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            provider: Mutex::new(None),
        }
    }

    /// Get the shared provider handle, constructing and connecting it on
    /// first use. A stale connection gets one transparent reconnect; connect
    /// failures surface as connection errors with the underlying message
    /// preserved.
    pub fn provider(&self) -> ProviderResult<Arc<dyn Provider>> {
        let mut guard = self.provider.lock();

        if let Some(existing) = guard.as_ref() {
            if existing.is_connected() {
                return Ok(existing.clone());
            }
            existing.connect().map_err(as_connection_error)?;
            return Ok(existing.clone());
        }

        let provider: Arc<dyn Provider> = Arc::from(ProviderFactory::build(&self.config)?);
        provider.connect().map_err(as_connection_error)?;
        *guard = Some(provider.clone());
        Ok(provider)
    }

    /// Disconnect and drop the provider. Idempotent; the next
    /// [`DatabaseService::provider`] call builds a fresh instance.
    pub fn disconnect_provider(&self) -> ProviderResult<()> {
        let mut guard = self.provider.lock();
        if let Some(provider) = guard.take() {
            provider.disconnect()?;
        }
        Ok(())
    }

    /// Whether a live, connected provider is currently held.
    pub fn is_connected(&self) -> bool {
        self.provider
            .lock()
            .as_ref()
            .map(|p| p.is_connected())
            .unwrap_or(false)
    }

    /// The configuration this service builds from.
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }
}

fn as_connection_error(e: ProviderError) -> ProviderError {
    match e.kind() {
        ErrorKind::Connection => e,
        _ => ProviderError::ConnectionFailed(e.to_string()),
    }
}
