//! Shared application state.

use std::sync::Arc;

use mirage_core::config::CacheKeyPolicy;
use mirage_core::event::HttpRequestRecord;
use mirage_core::{Config, EnrichCache, ResponseGenerator};
use mirage_storage::ResponseCache;

use crate::handler::KeyLocks;
use crate::logger::EventLogger;

/// Handles shared by every listener.
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration (read-only after startup).
    pub config: Arc<Config>,
    /// Durable response cache.
    pub cache: ResponseCache,
    /// Response synthesizer.
    pub generator: Arc<dyn ResponseGenerator>,
    /// Source-IP enrichment cache.
    pub enrich: Arc<EnrichCache>,
    /// Event log appender.
    pub logger: EventLogger,
    /// Host name recorded as `sensorName` in events.
    pub sensor: String,
    /// Per-key synthesis locks.
    pub(crate) locks: KeyLocks,
}

impl AppState {
    /// Bundles the shared handles.
    pub fn new(
        config: Arc<Config>,
        cache: ResponseCache,
        generator: Arc<dyn ResponseGenerator>,
        enrich: Arc<EnrichCache>,
        logger: EventLogger,
        sensor: impl Into<String>,
    ) -> Self {
        Self {
            config,
            cache,
            generator,
            enrich,
            logger,
            sensor: sensor.into(),
            locks: KeyLocks::default(),
        }
    }
}

/// Per-listener state: the shared handles plus this listener's port.
#[derive(Clone)]
pub struct ListenerState {
    pub shared: AppState,
    /// The listening port, as recorded in events and cache keys.
    pub port: String,
}

impl ListenerState {
    /// The cache key for a request, per the configured policy.
    pub(crate) fn cache_key(&self, record: &HttpRequestRecord) -> String {
        match self.shared.config.cache_key {
            CacheKeyPolicy::Uri => format!("{}_{}", self.port, record.request),
            CacheKeyPolicy::UriMethodBody => format!(
                "{}_{}_{}_{}",
                self.port, record.request, record.method, record.body_sha256
            ),
        }
    }
}
