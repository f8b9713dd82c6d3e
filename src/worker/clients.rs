//! Windows (pages) the worker can see, focus and open.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::{debug, info};
use url::Url;

/// Most windows tracked at once; the least recently seen is dropped.
const MAX_CLIENTS: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowClient {
  pub id: String,
  pub url: Url,
  pub focused: bool,
  /// Cache version of the controller serving this window
  pub controller: Option<String>,
}

#[async_trait]
pub trait Clients: Send + Sync {
  /// All open windows.
  async fn match_all(&self) -> Result<Vec<WindowClient>>;

  async fn focus(&self, id: &str) -> Result<()>;

  async fn open_window(&self, url: &Url) -> Result<WindowClient>;

  /// Take control of every open window. Returns how many were claimed.
  async fn claim(&self, version: &str) -> Result<usize>;

  /// Note a page load served by the controller with `version`.
  async fn track_navigation(&self, url: &Url, version: &str);
}

/// In-process registry of the windows seen through navigations.
#[derive(Debug)]
pub struct ClientRegistry {
  clients: Mutex<Vec<WindowClient>>,
  next_id: AtomicU64,
  open_browser: bool,
}

impl ClientRegistry {
  pub fn new(open_browser: bool) -> Self {
    Self {
      clients: Mutex::new(Vec::new()),
      next_id: AtomicU64::new(1),
      open_browser,
    }
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<WindowClient>>> {
    self
      .clients
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  fn insert(&self, url: &Url, controller: Option<&str>) -> Result<WindowClient> {
    let client = WindowClient {
      id: format!("window-{}", self.next_id.fetch_add(1, Ordering::Relaxed)),
      url: url.clone(),
      focused: true,
      controller: controller.map(String::from),
    };

    let mut clients = self.lock()?;
    for other in clients.iter_mut() {
      other.focused = false;
    }
    clients.push(client.clone());
    if clients.len() > MAX_CLIENTS {
      clients.remove(0);
    }

    Ok(client)
  }
}

impl Default for ClientRegistry {
  fn default() -> Self {
    Self::new(false)
  }
}

#[async_trait]
impl Clients for ClientRegistry {
  async fn match_all(&self) -> Result<Vec<WindowClient>> {
    Ok(self.lock()?.clone())
  }

  async fn focus(&self, id: &str) -> Result<()> {
    let mut clients = self.lock()?;
    if !clients.iter().any(|c| c.id == id) {
      return Err(eyre!("No window with id {}", id));
    }

    for client in clients.iter_mut() {
      client.focused = client.id == id;
    }
    info!(client = id, "Focused window");
    Ok(())
  }

  async fn open_window(&self, url: &Url) -> Result<WindowClient> {
    if self.open_browser {
      open::that_detached(url.as_str())
        .map_err(|e| eyre!("Failed to open browser at {}: {}", url, e))?;
    }

    let client = self.insert(url, None)?;
    info!(client = %client.id, url = %url, "Opened window");
    Ok(client)
  }

  async fn claim(&self, version: &str) -> Result<usize> {
    let mut clients = self.lock()?;
    for client in clients.iter_mut() {
      client.controller = Some(version.to_string());
    }
    info!(version, claimed = clients.len(), "Claimed clients");
    Ok(clients.len())
  }

  async fn track_navigation(&self, url: &Url, version: &str) {
    let existing = match self.lock() {
      Ok(mut clients) => {
        let found = clients.iter().position(|c| c.url == *url);
        if let Some(index) = found {
          let mut client = clients.remove(index);
          client.controller = Some(version.to_string());
          for other in clients.iter_mut() {
            other.focused = false;
          }
          client.focused = true;
          clients.push(client);
        }
        found.is_some()
      }
      Err(e) => {
        debug!("Skipping navigation tracking: {}", e);
        return;
      }
    };

    if !existing {
      if let Err(e) = self.insert(url, Some(version)) {
        debug!("Skipping navigation tracking: {}", e);
      }
    }
  }
}
