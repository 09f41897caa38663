//! Source-IP enrichment.
//!
//! Every logged event carries the source host name and a known-scanner tag
//! when one applies. The lookups themselves (reverse DNS, GeoIP, scanner
//! lists) live behind [`LookupSource`]; this module owns the bounded
//! LRU + TTL cache in front of them so a scan burst from one address costs
//! one lookup per hour instead of one per request.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

/// Default cache capacity.
pub const DEFAULT_CACHE_SIZE: usize = 1_000_000;

/// Default per-entry freshness window.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Errors from enrichment lookups.
#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("enrichment lookup failed: {0}")]
    Lookup(String),
}

/// Result type for enrichment operations.
pub type Result<T> = std::result::Result<T, EnrichError>;

/// What a lookup knows about a source IP. Either field may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichmentInfo {
    /// Resolved host name.
    pub host: String,
    /// Name of the scanning service this IP belongs to, if recognized.
    pub known_scanner: String,
}

/// An underlying enrichment data source.
#[async_trait]
pub trait LookupSource: Send + Sync {
    async fn lookup(&self, ip: IpAddr) -> Result<EnrichmentInfo>;
}

/// A source that knows nothing. Deployments plug real GeoIP/scanner-list
/// providers in behind [`LookupSource`].
pub struct NullSource;

#[async_trait]
impl LookupSource for NullSource {
    async fn lookup(&self, _ip: IpAddr) -> Result<EnrichmentInfo> {
        Ok(EnrichmentInfo::default())
    }
}

struct CachedInfo {
    info: EnrichmentInfo,
    fetched_at: Instant,
}

/// LRU map with per-entry expiry. Stale entries are dropped on access.
struct TtlLruCache {
    capacity: usize,
    ttl: Duration,
    entries: HashMap<IpAddr, CachedInfo>,
    order: Vec<IpAddr>,
}

impl TtlLruCache {
    fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }

    fn get(&mut self, ip: &IpAddr) -> Option<EnrichmentInfo> {
        let fresh = match self.entries.get(ip) {
            Some(cached) => cached.fetched_at.elapsed() <= self.ttl,
            None => return None,
        };

        if !fresh {
            self.entries.remove(ip);
            if let Some(pos) = self.order.iter().position(|k| k == ip) {
                self.order.remove(pos);
            }
            return None;
        }

        // Move to the most-recently-used position.
        if let Some(pos) = self.order.iter().position(|k| k == ip) {
            self.order.remove(pos);
            self.order.push(*ip);
        }
        self.entries.get(ip).map(|cached| cached.info.clone())
    }

    fn insert(&mut self, ip: IpAddr, info: EnrichmentInfo) {
        if self.entries.contains_key(&ip) {
            if let Some(pos) = self.order.iter().position(|k| k == &ip) {
                self.order.remove(pos);
            }
        } else if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.order.first().copied() {
                self.entries.remove(&oldest);
                self.order.remove(0);
            }
        }

        self.entries.insert(
            ip,
            CachedInfo {
                info,
                fetched_at: Instant::now(),
            },
        );
        self.order.push(ip);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Bounded, TTL-expiring cache over a [`LookupSource`].
///
/// Safe for concurrent `process` calls; the lock is only held around map
/// access, never across the underlying lookup.
pub struct EnrichCache {
    cache: Mutex<TtlLruCache>,
    source: Arc<dyn LookupSource>,
}

impl EnrichCache {
    /// Creates a cache with the default capacity and TTL.
    pub fn new(source: Arc<dyn LookupSource>) -> Self {
        Self {
            cache: Mutex::new(TtlLruCache::new(DEFAULT_CACHE_SIZE, DEFAULT_CACHE_TTL)),
            source,
        }
    }

    /// Overrides the cache capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        let ttl = self.cache.get_mut().ttl;
        self.cache = Mutex::new(TtlLruCache::new(capacity, ttl));
        self
    }

    /// Overrides the per-entry TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        let capacity = self.cache.get_mut().capacity;
        self.cache = Mutex::new(TtlLruCache::new(capacity, ttl));
        self
    }

    /// Resolves enrichment info for `ip`, from cache when fresh.
    ///
    /// Lookup failures are returned to the caller and cache nothing, so the
    /// next request retries.
    pub async fn process(&self, ip: IpAddr) -> Result<EnrichmentInfo> {
        if let Some(hit) = self.cache.lock().get(&ip) {
            return Ok(hit);
        }

        let info = self.source.lookup(ip).await?;
        self.cache.lock().insert(ip, info.clone());
        Ok(info)
    }

    /// Number of currently cached entries.
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
