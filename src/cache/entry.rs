//! Cache keys, stored entries and strategy results.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::http::{Request, Response};

/// Key of a cache entry: request method plus full URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
  pub method: String,
  pub url: String,
}

impl RequestKey {
  pub fn from_request(request: &Request) -> Self {
    Self {
      method: request.method.clone(),
      url: request.url.to_string(),
    }
  }

  /// SHA256 of `METHOD url` for stable, fixed-length keys.
  pub fn hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }
}

/// A response read back from a partition.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub partition: String,
  pub response: Response,
  pub cached_at: DateTime<Utc>,
}

/// Result of a strategy, including where the data came from.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  pub data: T,
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      cached_at: Some(cached_at),
    }
  }

  /// Synthesized when neither network nor cache could answer.
  pub fn fallback(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Fallback,
      cached_at: None,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Served from a cache partition
  Cache,
  /// Offline document or synthesized response
  Fallback,
}

impl CacheSource {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Network => "network",
      Self::Cache => "cache",
      Self::Fallback => "fallback",
    }
  }
}
