//! Cache layer that orchestrates caching strategies with network fetching.

use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use super::entry::{CacheResult, CachedResponse, RequestKey};
use super::storage::CacheStorage;
use crate::http::{NetworkError, Response};

/// Cache layer that applies cache-first and network-first strategies
/// over a storage backend.
///
/// Storage failures never fail a request: a failed read is treated as a
/// miss and a failed write is logged and skipped.
pub struct CacheLayer<S: CacheStorage + ?Sized> {
  storage: Arc<S>,
}

impl<S: CacheStorage + ?Sized> CacheLayer<S> {
  pub fn new(storage: Arc<S>) -> Self {
    Self { storage }
  }

  /// Cache-first against a single partition.
  ///
  /// 1. Check the partition - on hit, return immediately
  /// 2. On miss, fetch from network
  /// 3. Store 2xx responses into the partition
  /// 4. Network failure is propagated
  pub async fn cache_first<F, Fut>(
    &self,
    partition: &str,
    key: &RequestKey,
    fetcher: F,
  ) -> Result<CacheResult<Response>, NetworkError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Response, NetworkError>>,
  {
    if let Some(cached) = self.lookup_in(partition, key) {
      return Ok(CacheResult::from_cache(cached.response, cached.cached_at));
    }

    let response = fetcher().await?;
    self.store(partition, key, &response);
    Ok(CacheResult::from_network(response))
  }

  /// Network-first, falling back to any partition.
  ///
  /// 1. Fetch from network, store 2xx responses into the partition
  /// 2. On network failure, return any cached match
  /// 3. With no cached match, propagate the network error
  pub async fn network_first<F, Fut>(
    &self,
    partition: &str,
    key: &RequestKey,
    fetcher: F,
  ) -> Result<CacheResult<Response>, NetworkError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Response, NetworkError>>,
  {
    match fetcher().await {
      Ok(response) => {
        self.store(partition, key, &response);
        Ok(CacheResult::from_network(response))
      }
      Err(e) => match self.lookup_any(key) {
        Some(cached) => {
          debug!(url = %key.url, partition = %cached.partition, "Network failed, serving cached copy");
          Ok(CacheResult::from_cache(cached.response, cached.cached_at))
        }
        None => Err(e),
      },
    }
  }

  pub fn lookup_in(&self, partition: &str, key: &RequestKey) -> Option<CachedResponse> {
    self
      .storage
      .match_in(partition, key)
      .unwrap_or_else(|e| {
        warn!(url = %key.url, partition, "Cache read failed: {}", e);
        None
      })
  }

  pub fn lookup_any(&self, key: &RequestKey) -> Option<CachedResponse> {
    self.storage.match_any(key).unwrap_or_else(|e| {
      warn!(url = %key.url, "Cache read failed: {}", e);
      None
    })
  }

  /// Store a response if it is cacheable (2xx).
  fn store(&self, partition: &str, key: &RequestKey, response: &Response) {
    if !response.is_success() {
      return;
    }
    if let Err(e) = self.storage.put(partition, key, response) {
      warn!(url = %key.url, partition, "Cache write failed: {}", e);
    }
  }
}

impl<S: CacheStorage + ?Sized> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::entry::CacheSource;
  use crate::cache::storage::SqliteStorage;
  use std::sync::atomic::{AtomicU32, Ordering};

  fn layer() -> CacheLayer<SqliteStorage> {
    CacheLayer::new(Arc::new(SqliteStorage::open_in_memory().unwrap()))
  }

  fn key(url: &str) -> RequestKey {
    RequestKey {
      method: "GET".to_string(),
      url: url.to_string(),
    }
  }

  fn unreachable(url: &str) -> NetworkError {
    NetworkError::Unreachable {
      url: url.to_string(),
    }
  }

  #[tokio::test]
  async fn test_cache_first_second_request_skips_network() {
    let layer = layer();
    let calls = AtomicU32::new(0);
    let k = key("http://localhost/app.js");

    for _ in 0..2 {
      layer
        .cache_first("static", &k, || async {
          calls.fetch_add(1, Ordering::SeqCst);
          Ok(Response::new(200, vec![], b"js".to_vec()))
        })
        .await
        .unwrap();
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_cache_first_does_not_store_errors() {
    let layer = layer();
    let k = key("http://localhost/missing.css");

    let result = layer
      .cache_first("static", &k, || async { Ok(Response::new(404, vec![], vec![])) })
      .await
      .unwrap();

    assert_eq!(result.data.status, 404);
    assert!(layer.lookup_in("static", &k).is_none());
  }

  #[tokio::test]
  async fn test_cache_first_propagates_network_failure() {
    let layer = layer();
    let k = key("http://localhost/app.js");

    let result = layer
      .cache_first("static", &k, || async { Err(unreachable("http://localhost/app.js")) })
      .await;

    assert!(result.is_err());
  }

  #[tokio::test]
  async fn test_network_first_stores_and_falls_back() {
    let layer = layer();
    let k = key("https://api.example/x");

    let fresh = layer
      .network_first("api", &k, || async {
        Ok(Response::new(200, vec![], b"{\"n\":1}".to_vec()))
      })
      .await
      .unwrap();
    assert_eq!(fresh.source, CacheSource::Network);

    let offline = layer
      .network_first("api", &k, || async { Err(unreachable("https://api.example/x")) })
      .await
      .unwrap();
    assert_eq!(offline.source, CacheSource::Cache);
    assert_eq!(offline.data.body, b"{\"n\":1}");
    assert!(offline.cached_at.is_some());
  }

  #[tokio::test]
  async fn test_network_first_without_cache_is_error() {
    let layer = layer();
    let k = key("https://api.example/y");

    let result = layer
      .network_first("api", &k, || async { Err(unreachable("https://api.example/y")) })
      .await;

    assert!(matches!(result, Err(NetworkError::Unreachable { .. })));
  }
}
