//! Cache layer that orchestrates caching logic with network fetching.

use reqwest::Method;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

use super::key::CacheKey;
use super::result::CacheResult;
use crate::clock::Clock;
use crate::error::Result;

#[derive(Debug, Clone)]
struct CacheEntry {
  data: Option<Value>,
  path: String,
  /// Unix milliseconds when stored
  timestamp: i64,
  ttl_ms: i64,
}

/// In-memory response cache.
///
/// This layer sits between the caller and `request`, serving fresh entries
/// without touching the network and stale entries when the network fails.
pub struct ResponseCache {
  entries: Mutex<HashMap<String, CacheEntry>>,
  clock: Arc<dyn Clock>,
}

impl ResponseCache {
  pub fn new(clock: Arc<dyn Clock>) -> Self {
    Self {
      entries: Mutex::new(HashMap::new()),
      clock,
    }
  }

  fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// ttl is an exclusive upper bound on age.
  fn is_fresh(&self, entry: &CacheEntry) -> bool {
    self.clock.now_ms() - entry.timestamp < entry.ttl_ms
  }

  fn lookup(&self, key: &CacheKey) -> Option<CacheEntry> {
    self.entries().get(&key.cache_hash()).cloned()
  }

  pub fn store(&self, key: &CacheKey, data: Option<Value>, ttl: Duration) {
    let entry = CacheEntry {
      data,
      path: key.path().to_string(),
      timestamp: self.clock.now_ms(),
      ttl_ms: i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX),
    };
    self.entries().insert(key.cache_hash(), entry);
  }

  /// Fetch with cache-first strategy.
  ///
  /// 1. Fresh entry: return it without calling `fetcher`
  /// 2. Otherwise call `fetcher`; store the result if the request is a GET
  /// 3. On fetch failure, return any cached entry (ignoring ttl) or the error
  pub async fn fetch<F, Fut>(
    &self,
    key: &CacheKey,
    ttl: Duration,
    fetcher: F,
  ) -> Result<CacheResult<Option<Value>>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Option<Value>>>,
  {
    let cached = self.lookup(key);

    if let Some(entry) = &cached {
      if self.is_fresh(entry) {
        debug!(key = %key.description(), "Cache hit");
        return Ok(CacheResult::from_cache(entry.data.clone(), entry.timestamp));
      }
    }

    match fetcher().await {
      Ok(data) => {
        if *key.method() == Method::GET {
          self.store(key, data.clone(), ttl);
        }
        Ok(CacheResult::from_network(data))
      }
      Err(e) => match cached {
        Some(entry) => {
          warn!(key = %key.description(), error = %e, "Request failed, serving cached response");
          Ok(CacheResult::offline(entry.data, entry.timestamp))
        }
        None => Err(e),
      },
    }
  }

  pub fn clear(&self) {
    self.entries().clear();
  }

  /// Drop every entry whose path starts with `prefix`. Returns how many were removed.
  pub fn invalidate(&self, prefix: &str) -> usize {
    let mut entries = self.entries();
    let before = entries.len();
    entries.retain(|_, entry| !entry.path.starts_with(prefix));
    before - entries.len()
  }

  pub fn len(&self) -> usize {
    self.entries().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}
