//! The offline cache controller: install, activate and per-request dispatch.

use color_eyre::{
  eyre::{eyre, WrapErr},
  Result,
};
use futures::future::try_join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};
use url::Url;

use super::clients::Clients;
use super::fallback;
use super::lifecycle::WorkerState;
use super::push::{self, Notification, NotificationClick, NotificationSink};
use super::routes;
use crate::cache::{CacheLayer, CacheResult, CacheStorage, RequestKey};
use crate::classify::{Classifier, RequestClass};
use crate::config::{CacheNames, Config};
use crate::http::{Network, NetworkError, Request, Response};

/// Services the controller runs against.
#[derive(Clone)]
pub struct Platform {
  pub storage: Arc<dyn CacheStorage>,
  pub network: Arc<dyn Network>,
  pub clients: Arc<dyn Clients>,
  pub notifier: Arc<dyn NotificationSink>,
}

/// What the controller decided for an intercepted request.
#[derive(Debug)]
pub enum FetchOutcome {
  /// Not handled; the request goes to the network untouched.
  Passthrough,
  Respond(CacheResult<Response>),
}

/// One version of the offline cache controller.
///
/// All configuration is fixed at construction; the only shared mutable
/// resources are the cache partitions behind `Platform::storage`.
pub struct OfflineController {
  config: Arc<Config>,
  names: CacheNames,
  origin: Url,
  classifier: Classifier,
  cache: CacheLayer<dyn CacheStorage>,
  platform: Platform,
  state: Mutex<WorkerState>,
  skip_waiting: AtomicBool,
}

impl OfflineController {
  pub fn new(config: Arc<Config>, platform: Platform) -> Result<Self> {
    let origin = config.origin_url()?;
    let classifier = Classifier::new(&config)?;

    Ok(Self {
      names: config.cache_names(),
      origin,
      classifier,
      cache: CacheLayer::new(Arc::clone(&platform.storage)),
      platform,
      config,
      state: Mutex::new(WorkerState::Parsed),
      skip_waiting: AtomicBool::new(false),
    })
  }

  /// Version string reported to the application: the static cache name.
  pub fn version(&self) -> &str {
    &self.names.static_name
  }

  pub fn state(&self) -> WorkerState {
    self
      .state
      .lock()
      .map(|s| *s)
      .unwrap_or(WorkerState::Redundant)
  }

  pub(crate) fn transition(&self, next: WorkerState) -> Result<()> {
    let mut state = self
      .state
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    if !state.can_transition_to(next) {
      return Err(eyre!("Invalid worker transition {:?} -> {:?}", *state, next));
    }
    debug!(version = %self.names.static_name, from = ?*state, to = ?next, "Worker state");
    *state = next;
    Ok(())
  }

  /// Whether the install phase asked to take control without waiting.
  pub fn skip_waiting_requested(&self) -> bool {
    self.skip_waiting.load(Ordering::SeqCst)
  }

  pub fn request_skip_waiting(&self) {
    self.skip_waiting.store(true, Ordering::SeqCst);
  }

  /// Whether a previous run already installed this version.
  pub fn is_installed(&self) -> Result<bool> {
    self.platform.storage.has_partition(&self.names.static_name)
  }

  // ============================================================================
  // Lifecycle
  // ============================================================================

  /// Install: pre-cache every configured path into the static partition.
  ///
  /// All or nothing: if any asset fails to fetch or is not 2xx, nothing is
  /// written and the worker becomes redundant.
  pub async fn install(&self) -> Result<()> {
    self.transition(WorkerState::Installing)?;
    info!(
      cache = %self.names.static_name,
      assets = self.config.precache.len(),
      "Installing"
    );

    match self.precache().await {
      Ok(count) => {
        self.transition(WorkerState::Installed)?;
        if self.config.skip_waiting {
          self.request_skip_waiting();
        }
        info!(cache = %self.names.static_name, count, "Installed");
        Ok(())
      }
      Err(e) => {
        error!(cache = %self.names.static_name, "Install failed: {:#}", e);
        self.transition(WorkerState::Redundant)?;
        Err(e)
      }
    }
  }

  async fn precache(&self) -> Result<usize> {
    let requests = self
      .config
      .precache
      .iter()
      .map(|path| {
        self
          .origin
          .join(path)
          .map(Request::get)
          .map_err(|e| eyre!("Invalid precache path '{}': {}", path, e))
      })
      .collect::<Result<Vec<_>>>()?;

    let fetches = requests.iter().map(|request| async move {
      let response = self
        .platform
        .network
        .fetch(request)
        .await
        .wrap_err_with(|| format!("Failed to precache {}", request.url))?;

      if !response.is_success() {
        return Err(eyre!(
          "Failed to precache {}: status {}",
          request.url,
          response.status
        ));
      }

      Ok::<_, color_eyre::Report>((RequestKey::from_request(request), response))
    });

    let entries = try_join_all(fetches).await?;
    self
      .platform
      .storage
      .put_all(&self.names.static_name, &entries)?;

    Ok(entries.len())
  }

  /// Activate: drop stale partitions, then claim every open window.
  pub async fn activate(&self) -> Result<Vec<String>> {
    self.transition(WorkerState::Activating)?;

    let deleted = match self.delete_stale_partitions() {
      Ok(deleted) => deleted,
      Err(e) => {
        error!("Activation failed: {:#}", e);
        self.transition(WorkerState::Redundant)?;
        return Err(e);
      }
    };

    let claimed = match self.platform.clients.claim(self.version()).await {
      Ok(claimed) => claimed,
      Err(e) => {
        error!("Activation failed: {:#}", e);
        self.transition(WorkerState::Redundant)?;
        return Err(e);
      }
    };
    self.transition(WorkerState::Activated)?;
    info!(version = %self.names.static_name, claimed, "Activated");

    Ok(deleted)
  }

  /// Delete every partition that is not one of the current three.
  /// Idempotent; the current partitions are never touched.
  pub fn delete_stale_partitions(&self) -> Result<Vec<String>> {
    let mut deleted = Vec::new();

    for name in self.platform.storage.partition_names()? {
      if self.names.is_current(&name) {
        continue;
      }
      self.platform.storage.delete_partition(&name)?;
      info!(cache = %name, "Deleted old cache");
      deleted.push(name);
    }

    Ok(deleted)
  }

  /// Take over an installation from a previous run without re-fetching.
  ///
  /// The previous run may have stopped before activating, so this runs the
  /// full activation. Returns the deleted partition names.
  pub async fn resume(&self) -> Result<Vec<String>> {
    if !self.is_installed()? {
      return Err(eyre!(
        "{} is not installed; run install first",
        self.names.static_name
      ));
    }
    self.transition(WorkerState::Installed)?;
    info!(version = %self.names.static_name, "Resuming installed worker");
    self.activate().await
  }

  // ============================================================================
  // Fetch
  // ============================================================================

  /// Handle an intercepted request.
  ///
  /// Only GET over http(s) is intercepted. Errors are network failures the
  /// strategy could not recover from (static assets and "other" requests).
  pub async fn handle_fetch(&self, request: &Request) -> Result<FetchOutcome, NetworkError> {
    if !request.is_get() || !request.is_http() {
      return Ok(FetchOutcome::Passthrough);
    }

    let class = self.classifier.classify(request);
    let key = RequestKey::from_request(request);
    let fetch = || self.platform.network.fetch(request);

    let result = match class {
      RequestClass::StaticAsset => {
        self
          .cache
          .cache_first(&self.names.static_name, &key, fetch)
          .await?
      }
      RequestClass::ApiCall => {
        match self
          .cache
          .network_first(&self.names.api_name, &key, fetch)
          .await
        {
          Ok(result) => result,
          Err(e) => {
            warn!(url = %request.url, "API unreachable and not cached, answering offline: {}", e);
            CacheResult::fallback(fallback::offline_api_response())
          }
        }
      }
      RequestClass::Navigation => {
        self
          .platform
          .clients
          .track_navigation(&request.url, self.version())
          .await;

        match self
          .cache
          .network_first(&self.names.dynamic_name, &key, fetch)
          .await
        {
          Ok(result) => result,
          Err(e) => {
            warn!(url = %request.url, "Navigation failed, serving offline page: {}", e);
            self.offline_document()
          }
        }
      }
      RequestClass::Other => {
        self
          .cache
          .network_first(&self.names.dynamic_name, &key, fetch)
          .await?
      }
    };

    debug!(
      url = %request.url,
      class = class.as_str(),
      source = result.source.as_str(),
      status = result.data.status,
      "Fetch handled"
    );

    Ok(FetchOutcome::Respond(result))
  }

  /// Cached offline document, or the inline page when it is not cached.
  fn offline_document(&self) -> CacheResult<Response> {
    if let Ok(url) = self.origin.join(&self.config.offline_page) {
      let key = RequestKey::from_request(&Request::get(url));
      if let Some(cached) = self.cache.lookup_any(&key) {
        return CacheResult {
          cached_at: Some(cached.cached_at),
          ..CacheResult::fallback(cached.response)
        };
      }
    }

    CacheResult::fallback(fallback::inline_offline_page(
      &self.config.notifications.default_title,
    ))
  }

  // ============================================================================
  // Push
  // ============================================================================

  /// Display a notification for a push. Bad payloads degrade to plain text.
  pub async fn handle_push(&self, data: Option<&[u8]>) -> Result<Notification> {
    let notification = push::build_notification(data, &self.config.notifications);
    self.platform.notifier.show(&notification).await?;
    Ok(notification)
  }

  /// Route a notification click: focus a window already showing the
  /// target, otherwise open one. Returns the target, if any.
  pub async fn handle_notification_click(&self, click: &NotificationClick) -> Result<Option<Url>> {
    self.platform.notifier.close(click.tag.as_deref()).await?;

    let Some(path) = routes::resolve_click(click.action.as_deref(), &click.data) else {
      debug!(action = ?click.action, "Notification dismissed");
      return Ok(None);
    };
    let target = self
      .origin
      .join(&path)
      .map_err(|e| eyre!("Invalid notification route '{}': {}", path, e))?;

    info!(action = ?click.action, target = %target, "Notification clicked");

    let clients = self.platform.clients.match_all().await?;
    match clients.iter().find(|c| c.url.path() == target.path()) {
      Some(client) => self.platform.clients.focus(&client.id).await?,
      None => {
        self.platform.clients.open_window(&target).await?;
      }
    }

    Ok(Some(target))
  }
}

#[cfg(test)]
pub(crate) mod testing {
  //! Fakes shared by the worker tests.

  use super::*;
  use crate::cache::SqliteStorage;
  use crate::worker::clients::{ClientRegistry, WindowClient};
  use async_trait::async_trait;
  use std::collections::HashMap;
  use std::sync::atomic::AtomicU32;

  /// Network serving canned responses by URL; unknown URLs are unreachable.
  #[derive(Default)]
  pub struct FakeNetwork {
    pub responses: Mutex<HashMap<String, Response>>,
    pub online: AtomicBool,
    pub calls: AtomicU32,
  }

  impl FakeNetwork {
    pub fn online() -> Self {
      let network = Self::default();
      network.online.store(true, Ordering::SeqCst);
      network
    }

    pub fn serve(&self, url: &str, response: Response) {
      self
        .responses
        .lock()
        .unwrap()
        .insert(url.to_string(), response);
    }

    pub fn set_online(&self, online: bool) {
      self.online.store(online, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u32 {
      self.calls.load(Ordering::SeqCst)
    }
  }

  #[async_trait]
  impl Network for FakeNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      let unreachable = || NetworkError::Unreachable {
        url: request.url.to_string(),
      };

      if !self.online.load(Ordering::SeqCst) {
        return Err(unreachable());
      }
      self
        .responses
        .lock()
        .unwrap()
        .get(request.url.as_str())
        .cloned()
        .ok_or_else(unreachable)
    }
  }

  #[derive(Default)]
  pub struct RecordingNotifier {
    pub shown: Mutex<Vec<Notification>>,
    pub closed: Mutex<Vec<Option<String>>>,
  }

  #[async_trait]
  impl NotificationSink for RecordingNotifier {
    async fn show(&self, notification: &Notification) -> Result<()> {
      self.shown.lock().unwrap().push(notification.clone());
      Ok(())
    }

    async fn close(&self, tag: Option<&str>) -> Result<()> {
      self.closed.lock().unwrap().push(tag.map(String::from));
      Ok(())
    }
  }

  /// Clients that refuse every operation.
  pub struct FailingClients;

  #[async_trait]
  impl Clients for FailingClients {
    async fn match_all(&self) -> Result<Vec<WindowClient>> {
      Err(eyre!("clients unavailable"))
    }

    async fn focus(&self, _id: &str) -> Result<()> {
      Err(eyre!("clients unavailable"))
    }

    async fn open_window(&self, _url: &Url) -> Result<WindowClient> {
      Err(eyre!("clients unavailable"))
    }

    async fn claim(&self, _version: &str) -> Result<usize> {
      Err(eyre!("clients unavailable"))
    }

    async fn track_navigation(&self, _url: &Url, _version: &str) {}
  }

  pub struct Harness {
    pub storage: Arc<SqliteStorage>,
    pub network: Arc<FakeNetwork>,
    pub clients: Arc<ClientRegistry>,
    pub notifier: Arc<RecordingNotifier>,
  }

  impl Harness {
    pub fn new() -> Self {
      Self {
        storage: Arc::new(SqliteStorage::open_in_memory().unwrap()),
        network: Arc::new(FakeNetwork::online()),
        clients: Arc::new(ClientRegistry::default()),
        notifier: Arc::new(RecordingNotifier::default()),
      }
    }

    pub fn platform(&self) -> Platform {
      Platform {
        storage: self.storage.clone(),
        network: self.network.clone(),
        clients: self.clients.clone(),
        notifier: self.notifier.clone(),
      }
    }

    pub fn controller(&self, config: Config) -> OfflineController {
      OfflineController::new(Arc::new(config), self.platform()).unwrap()
    }

    /// Serve every default precache path with a 200.
    pub fn serve_precache(&self, config: &Config) {
      let origin = config.origin_url().unwrap();
      for path in &config.precache {
        let url = origin.join(path).unwrap();
        self.network.serve(
          url.as_str(),
          Response::new(200, vec![], format!("asset {}", path).into_bytes()),
        );
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::testing::*;
  use super::*;
  use crate::cache::CacheSource;

  const ORIGIN: &str = "http://localhost:3000";

  fn config() -> Config {
    Config {
      origin: ORIGIN.to_string(),
      ..Config::default()
    }
  }

  fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
  }

  async fn activated(harness: &Harness, config: Config) -> OfflineController {
    harness.serve_precache(&config);
    let controller = harness.controller(config);
    controller.install().await.unwrap();
    controller.activate().await.unwrap();
    controller
  }

  fn respond(outcome: FetchOutcome) -> CacheResult<Response> {
    match outcome {
      FetchOutcome::Respond(result) => result,
      FetchOutcome::Passthrough => panic!("expected the controller to respond"),
    }
  }

  #[tokio::test]
  async fn test_install_precaches_static_partition() {
    let harness = Harness::new();
    harness.serve_precache(&config());
    let controller = harness.controller(config());

    controller.install().await.unwrap();

    assert_eq!(controller.state(), WorkerState::Installed);
    assert!(controller.skip_waiting_requested());
    assert_eq!(harness.storage.entry_count("humidor-static-v1").unwrap(), 4);
  }

  #[tokio::test]
  async fn test_install_failure_creates_no_partition() {
    let harness = Harness::new();
    let config = Config {
      precache: vec!["/".to_string(), "/manifest.json".to_string()],
      ..config()
    };
    harness
      .network
      .serve(url("/").as_str(), Response::html(200, "<html></html>"));
    harness
      .network
      .serve(url("/manifest.json").as_str(), Response::new(404, vec![], vec![]));
    let controller = harness.controller(config);

    assert!(controller.install().await.is_err());
    assert_eq!(controller.state(), WorkerState::Redundant);
    assert!(harness.storage.partition_names().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_install_fails_when_offline() {
    let harness = Harness::new();
    harness.network.set_online(false);
    let controller = harness.controller(config());

    assert!(controller.install().await.is_err());
    assert!(!controller.is_installed().unwrap());
  }

  #[tokio::test]
  async fn test_activate_deletes_only_stale_partitions() {
    let harness = Harness::new();
    let stale = RequestKey::from_request(&Request::get(url("/old.js")));
    let ok = Response::new(200, vec![], vec![]);
    harness.storage.put("humidor-static-v0", &stale, &ok).unwrap();
    harness.storage.put("humidor-api-v0", &stale, &ok).unwrap();
    harness.storage.put("humidor-api-v1", &stale, &ok).unwrap();
    harness.storage.put("unrelated", &stale, &ok).unwrap();

    let controller = activated(&harness, config()).await;

    let mut names = harness.storage.partition_names().unwrap();
    names.sort();
    assert_eq!(names, vec!["humidor-api-v1", "humidor-static-v1"]);
    assert_eq!(harness.storage.entry_count("humidor-api-v1").unwrap(), 1);
    assert_eq!(controller.state(), WorkerState::Activated);

    // Running the cleanup again changes nothing
    assert!(controller.delete_stale_partitions().unwrap().is_empty());
    let mut again = harness.storage.partition_names().unwrap();
    again.sort();
    assert_eq!(again, names);
  }

  #[tokio::test]
  async fn test_activate_claims_clients() {
    let harness = Harness::new();
    harness.clients.open_window(&url("/dashboard")).await.unwrap();

    activated(&harness, config()).await;

    let clients = harness.clients.match_all().await.unwrap();
    assert_eq!(clients[0].controller.as_deref(), Some("humidor-static-v1"));
  }

  #[tokio::test]
  async fn test_static_asset_served_from_cache_without_network() {
    let harness = Harness::new();
    let controller = activated(&harness, config()).await;
    harness
      .network
      .serve(url("/assets/app.js").as_str(), Response::new(200, vec![], b"js".to_vec()));

    let request = Request::get(url("/assets/app.js"));
    let first = respond(controller.handle_fetch(&request).await.unwrap());
    assert_eq!(first.source, CacheSource::Network);

    let calls = harness.network.calls();
    let second = respond(controller.handle_fetch(&request).await.unwrap());
    assert_eq!(second.source, CacheSource::Cache);
    assert_eq!(second.data.body, b"js");
    assert_eq!(harness.network.calls(), calls);
  }

  #[tokio::test]
  async fn test_static_asset_failure_propagates() {
    let harness = Harness::new();
    let controller = activated(&harness, config()).await;
    harness.network.set_online(false);

    let request = Request::get(url("/assets/missing.css"));
    assert!(controller.handle_fetch(&request).await.is_err());
  }

  #[tokio::test]
  async fn test_api_response_is_cached_verbatim() {
    let harness = Harness::new();
    let controller = activated(&harness, config()).await;
    let api = "https://firestore.googleapis.com/v1/projects/shop/documents/inventory";
    let response = Response::json(200, &serde_json::json!({"items": [1, 2]}));
    harness.network.serve(api, response.clone());

    let request = Request::get(Url::parse(api).unwrap());
    respond(controller.handle_fetch(&request).await.unwrap());

    let stored = harness
      .storage
      .match_in("humidor-api-v1", &RequestKey::from_request(&request))
      .unwrap()
      .unwrap();
    assert_eq!(stored.response, response);
  }

  #[tokio::test]
  async fn test_api_offline_uses_cached_entry() {
    let harness = Harness::new();
    let controller = activated(&harness, config()).await;
    let api = "https://firestore.googleapis.com/v1/x";
    let request = Request::get(Url::parse(api).unwrap());
    let cached = Response::new(202, vec![], b"{\"cached\":true}".to_vec());
    harness
      .storage
      .put("humidor-api-v1", &RequestKey::from_request(&request), &cached)
      .unwrap();
    harness.network.set_online(false);

    let result = respond(controller.handle_fetch(&request).await.unwrap());

    assert_eq!(result.source, CacheSource::Cache);
    assert_eq!(result.data.status, 202);
    assert_eq!(result.data.body, cached.body);
  }

  #[tokio::test]
  async fn test_api_offline_without_cache_is_503() {
    let harness = Harness::new();
    let controller = activated(&harness, config()).await;
    harness.network.set_online(false);

    let request = Request::get(Url::parse("https://firestore.googleapis.com/v1/y").unwrap());
    let result = respond(controller.handle_fetch(&request).await.unwrap());

    assert_eq!(result.source, CacheSource::Fallback);
    assert_eq!(result.data.status, 503);
    let body: serde_json::Value = serde_json::from_slice(&result.data.body).unwrap();
    assert_eq!(body["offline"], true);
  }

  #[tokio::test]
  async fn test_navigation_offline_serves_cached_page() {
    let harness = Harness::new();
    let controller = activated(&harness, config()).await;
    harness
      .network
      .serve(url("/inventory").as_str(), Response::html(200, "<h1>Inventory</h1>"));

    let request = Request::navigate(url("/inventory"));
    respond(controller.handle_fetch(&request).await.unwrap());
    harness.network.set_online(false);

    let result = respond(controller.handle_fetch(&request).await.unwrap());
    assert_eq!(result.source, CacheSource::Cache);
    assert_eq!(result.data.body, b"<h1>Inventory</h1>");
  }

  #[tokio::test]
  async fn test_navigation_offline_serves_offline_document() {
    let harness = Harness::new();
    let controller = activated(&harness, config()).await;
    let offline = Request::get(url("/offline.html"));
    harness
      .storage
      .put(
        "humidor-static-v1",
        &RequestKey::from_request(&offline),
        &Response::html(200, "offline doc"),
      )
      .unwrap();
    harness.network.set_online(false);

    let result = respond(
      controller
        .handle_fetch(&Request::navigate(url("/events")))
        .await
        .unwrap(),
    );
    assert_eq!(result.source, CacheSource::Fallback);
    assert_eq!(result.data.body, b"offline doc");
  }

  #[tokio::test]
  async fn test_navigation_offline_inline_fallback() {
    let harness = Harness::new();
    let controller = activated(&harness, config()).await;
    harness.network.set_online(false);

    let result = respond(
      controller
        .handle_fetch(&Request::navigate(url("/customers")))
        .await
        .unwrap(),
    );
    assert_eq!(result.data.status, 200);
    assert_eq!(result.data.header("Content-Type"), Some("text/html"));
  }

  #[tokio::test]
  async fn test_navigation_tracks_window() {
    let harness = Harness::new();
    let controller = activated(&harness, config()).await;
    harness.network.set_online(false);

    respond(
      controller
        .handle_fetch(&Request::navigate(url("/events")))
        .await
        .unwrap(),
    );

    let clients = harness.clients.match_all().await.unwrap();
    assert_eq!(clients.len(), 1);
    assert_eq!(clients[0].url.path(), "/events");
  }

  #[tokio::test]
  async fn test_other_requests_cache_into_dynamic() {
    let harness = Harness::new();
    let controller = activated(&harness, config()).await;
    harness
      .network
      .serve(url("/manifest.json").as_str(), Response::new(200, vec![], b"{}".to_vec()));

    // Not a static asset, so a successful fetch lands in dynamic
    let request = Request::get(url("/manifest.json"));
    let result = respond(controller.handle_fetch(&request).await.unwrap());
    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(harness.storage.entry_count("humidor-dynamic-v1").unwrap(), 1);

    harness.network.set_online(false);
    let request = Request::get(url("/api/unknown"));
    assert!(controller.handle_fetch(&request).await.is_err());
  }

  #[tokio::test]
  async fn test_non_get_and_non_http_pass_through() {
    let harness = Harness::new();
    let controller = activated(&harness, config()).await;

    let post = Request::new("POST", url("/api/orders"));
    assert!(matches!(
      controller.handle_fetch(&post).await.unwrap(),
      FetchOutcome::Passthrough
    ));

    let ext = Request::get(Url::parse("chrome-extension://abc/script.js").unwrap());
    assert!(matches!(
      controller.handle_fetch(&ext).await.unwrap(),
      FetchOutcome::Passthrough
    ));
  }

  #[tokio::test]
  async fn test_resume_requires_installation() {
    let harness = Harness::new();
    let fresh = harness.controller(config());
    assert!(fresh.resume().await.is_err());

    activated(&harness, config()).await;
    let resumed = harness.controller(config());
    resumed.resume().await.unwrap();
    assert_eq!(resumed.state(), WorkerState::Activated);
  }

  #[tokio::test]
  async fn test_resume_deletes_partitions_left_by_interrupted_activation() {
    let harness = Harness::new();
    let catalog = Request::get(url("/catalog"));
    harness
      .storage
      .put(
        "humidor-dynamic-v0",
        &RequestKey::from_request(&catalog),
        &Response::html(200, "stale v0"),
      )
      .unwrap();

    // Installed, but the run stopped before activating
    harness.serve_precache(&config());
    harness.controller(config()).install().await.unwrap();

    let resumed = harness.controller(config());
    let deleted = resumed.resume().await.unwrap();
    assert_eq!(deleted, vec!["humidor-dynamic-v0"]);
    assert_eq!(resumed.state(), WorkerState::Activated);
    assert_eq!(harness.storage.partition_names().unwrap(), vec!["humidor-static-v1"]);

    harness.network.set_online(false);
    assert!(resumed.handle_fetch(&catalog).await.is_err());
  }

  #[tokio::test]
  async fn test_resume_claims_open_windows() {
    let harness = Harness::new();
    activated(&harness, config()).await;
    harness.clients.open_window(&url("/events")).await.unwrap();

    harness.controller(config()).resume().await.unwrap();

    let clients = harness.clients.match_all().await.unwrap();
    assert_eq!(clients[0].controller.as_deref(), Some("humidor-static-v1"));
  }

  #[tokio::test]
  async fn test_failed_claim_makes_worker_redundant() {
    let harness = Harness::new();
    harness.serve_precache(&config());
    let platform = Platform {
      clients: Arc::new(FailingClients),
      ..harness.platform()
    };
    let controller = OfflineController::new(Arc::new(config()), platform).unwrap();
    controller.install().await.unwrap();

    assert!(controller.activate().await.is_err());
    assert_eq!(controller.state(), WorkerState::Redundant);
  }

  #[tokio::test]
  async fn test_push_and_click_route_to_inventory() {
    let harness = Harness::new();
    let controller = activated(&harness, config()).await;

    let raw = br#"{"title":"Low stock","body":"Cohiba running low","data":{"type":"low-stock"}}"#;
    let notification = controller.handle_push(Some(&raw[..])).await.unwrap();
    assert_eq!(notification.title, "Low stock");
    assert_eq!(harness.notifier.shown.lock().unwrap().len(), 1);

    let click = NotificationClick {
      action: None,
      tag: None,
      data: serde_json::Value::Object(notification.data.clone()),
    };
    let target = controller.handle_notification_click(&click).await.unwrap();
    assert_eq!(target.unwrap().path(), "/inventory");

    let clients = harness.clients.match_all().await.unwrap();
    assert_eq!(clients.len(), 1);
    assert_eq!(clients[0].url.path(), "/inventory");
  }

  #[tokio::test]
  async fn test_click_focuses_existing_window() {
    let harness = Harness::new();
    let controller = activated(&harness, config()).await;
    let existing = harness.clients.open_window(&url("/events")).await.unwrap();
    harness.clients.open_window(&url("/dashboard")).await.unwrap();

    let click = NotificationClick {
      action: Some("view-event".to_string()),
      ..NotificationClick::default()
    };
    controller.handle_notification_click(&click).await.unwrap();

    let clients = harness.clients.match_all().await.unwrap();
    assert_eq!(clients.len(), 2);
    assert!(clients.iter().find(|c| c.id == existing.id).unwrap().focused);
  }

  #[tokio::test]
  async fn test_close_action_only_dismisses() {
    let harness = Harness::new();
    let controller = activated(&harness, config()).await;

    let click = NotificationClick {
      action: Some("close".to_string()),
      tag: Some("t1".to_string()),
      ..NotificationClick::default()
    };
    assert!(controller.handle_notification_click(&click).await.unwrap().is_none());
    assert_eq!(harness.notifier.closed.lock().unwrap().as_slice(), &[Some("t1".to_string())]);
    assert!(harness.clients.match_all().await.unwrap().is_empty());
  }
}
