//! Cached response envelope.

use chrono::{DateTime, Utc};

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Create a new cache result from a fresh cache hit.
  pub fn from_cache(data: T, cached_at_ms: i64) -> Self {
    Self {
      data,
      source: CacheSource::CacheFresh,
      cached_at: DateTime::from_timestamp_millis(cached_at_ms),
    }
  }

  /// Create a new cache result served because the network failed.
  pub fn offline(data: T, cached_at_ms: i64) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      cached_at: DateTime::from_timestamp_millis(cached_at_ms),
    }
  }

  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheResult<U> {
    CacheResult {
      data: f(self.data),
      source: self.source,
      cached_at: self.cached_at,
    }
  }

  /// Like [`map`](Self::map) for fallible conversions such as decoding.
  pub fn try_map<U, E>(self, f: impl FnOnce(T) -> Result<U, E>) -> Result<CacheResult<U>, E> {
    Ok(CacheResult {
      data: f(self.data)?,
      source: self.source,
      cached_at: self.cached_at,
    })
  }
}

/// Indicates where cached data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Data from cache, still within its ttl
  CacheFresh,
  /// Network failed, serving cached data of any age
  Offline,
}
