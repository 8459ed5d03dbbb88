//! External title lookup used when an id is missing from the local index.

pub mod omdb;

use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;

/// How long an explicit "unknown id" answer is remembered.
pub const NOT_FOUND_TTL: Duration = Duration::from_secs(30 * 60);
/// How long a failed request (network, status, bad body) is remembered.
pub const FAILURE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Resolves an IMDb id to a human title, e.g. `tt0903747` → `Breaking Bad`.
#[async_trait]
pub trait TitleSource: Send + Sync {
    /// `Ok(None)` means the service answered and does not know the id.
    async fn fetch_title(&self, id: &str) -> Result<Option<String>, LookupError>;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Option<String>,
    expires_at: Instant,
}

/// A [`TitleSource`] fronted by a bounded TTL cache. Failures are cached as `None` too,
/// so a flapping service is not hit on every request.
pub struct CachedTitles {
    source: Box<dyn TitleSource>,
    cache: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
}

impl CachedTitles {
    pub fn new(source: Box<dyn TitleSource>, ttl: Duration, capacity: NonZeroUsize) -> Self {
        Self {
            source,
            cache: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Title for `id`, or `None` when unknown or the service is unavailable.
    pub async fn title(&self, id: &str) -> Option<String> {
        let id = id.trim();
        if id.is_empty() {
            return None;
        }

        if let Some(hit) = self.cached(id) {
            return hit;
        }

        let (value, ttl) = match self.source.fetch_title(id).await {
            Ok(Some(title)) => (Some(title), self.ttl),
            Ok(None) => {
                tracing::warn!("Title lookup: {} is unknown", id);
                (None, NOT_FOUND_TTL)
            }
            Err(e) => {
                tracing::error!("Title lookup for {} failed: {}", id, e);
                (None, FAILURE_TTL)
            }
        };

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.put(
            id.to_string(),
            CacheEntry {
                value: value.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
        value
    }

    /// Number of entries currently held, expired ones included.
    pub fn cached_len(&self) -> usize {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// `Some(value)` for a live entry. Expired entries are dropped on the way out.
    fn cached(&self, id: &str) -> Option<Option<String>> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = cache.get(id)?;
        if entry.expires_at > Instant::now() {
            return Some(entry.value.clone());
        }
        cache.pop(id);
        None
    }
}
