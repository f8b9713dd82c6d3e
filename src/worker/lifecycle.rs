//! Worker lifecycle states and the registration that swaps versions.

use color_eyre::{eyre::eyre, Result};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use super::controller::{FetchOutcome, OfflineController, Platform};
use super::messages::{self, ControlMessage, ReplyPort};
use super::push::{Notification, NotificationClick};
use crate::config::Config;
use crate::http::{NetworkError, Request};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  Parsed,
  Installing,
  Installed,
  Activating,
  Activated,
  Redundant,
}

impl WorkerState {
  pub fn can_transition_to(self, next: WorkerState) -> bool {
    use WorkerState::*;
    matches!(
      (self, next),
      (Parsed, Installing)
        | (Installing, Installed)
        | (Installing, Redundant)
        | (Installed, Activating)
        | (Installed, Redundant)
        | (Activating, Activated)
        | (Activating, Redundant)
        | (Activated, Redundant)
        // Already installed by an earlier run
        | (Parsed, Installed)
    )
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      WorkerState::Parsed => "parsed",
      WorkerState::Installing => "installing",
      WorkerState::Installed => "installed",
      WorkerState::Activating => "activating",
      WorkerState::Activated => "activated",
      WorkerState::Redundant => "redundant",
    }
  }
}

/// Holds the active controller and at most one waiting successor.
///
/// Locks are only held to swap the `Arc`s, never across an await.
pub struct Registration {
  platform: Platform,
  active: RwLock<Option<Arc<OfflineController>>>,
  waiting: RwLock<Option<Arc<OfflineController>>>,
}

impl Registration {
  pub fn new(platform: Platform) -> Self {
    Self {
      platform,
      active: RwLock::new(None),
      waiting: RwLock::new(None),
    }
  }

  pub fn active(&self) -> Option<Arc<OfflineController>> {
    self.active.read().ok().and_then(|a| a.clone())
  }

  pub fn waiting(&self) -> Option<Arc<OfflineController>> {
    self.waiting.read().ok().and_then(|w| w.clone())
  }

  /// Install a controller for `config` and park it as waiting.
  ///
  /// It takes over at once when install asked to skip waiting or when
  /// nothing is active yet.
  pub async fn register(&self, config: Arc<Config>) -> Result<Arc<OfflineController>> {
    let controller = Arc::new(OfflineController::new(config, self.platform.clone())?);
    controller.install().await?;

    let replaced = self
      .waiting
      .write()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?
      .replace(Arc::clone(&controller));
    if let Some(old) = replaced {
      debug!(version = old.version(), "Discarding previous waiting worker");
      if let Err(e) = old.transition(WorkerState::Redundant) {
        warn!(version = old.version(), "Could not retire waiting worker: {}", e);
      }
    }

    if controller.skip_waiting_requested() || self.active().is_none() {
      self.skip_waiting().await?;
    } else {
      info!(version = controller.version(), "Installed worker is waiting");
    }

    Ok(controller)
  }

  /// Promote the waiting controller. Returns false when nothing is waiting.
  pub async fn skip_waiting(&self) -> Result<bool> {
    let next = self
      .waiting
      .write()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?
      .take();
    let Some(next) = next else {
      return Ok(false);
    };

    next.activate().await?;

    let previous = self
      .active
      .write()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?
      .replace(Arc::clone(&next));
    if let Some(previous) = previous {
      if let Err(e) = previous.transition(WorkerState::Redundant) {
        warn!(version = previous.version(), "Could not retire worker: {}", e);
      }
      info!(from = previous.version(), to = next.version(), "Worker replaced");
    }

    Ok(true)
  }

  /// Make an already installed version active without re-installing.
  pub async fn resume(&self, config: Arc<Config>) -> Result<Arc<OfflineController>> {
    let controller = Arc::new(OfflineController::new(config, self.platform.clone())?);
    controller.resume().await?;

    *self
      .active
      .write()
      .map_err(|e| eyre!("Lock poisoned: {}", e))? = Some(Arc::clone(&controller));

    Ok(controller)
  }

  /// Route a request through the active controller, if any.
  pub async fn fetch(&self, request: &Request) -> Result<FetchOutcome, NetworkError> {
    match self.active() {
      Some(controller) => controller.handle_fetch(request).await,
      None => Ok(FetchOutcome::Passthrough),
    }
  }

  pub async fn post_message(&self, message: ControlMessage, port: Option<ReplyPort>) -> Result<()> {
    match message {
      ControlMessage::SkipWaiting => {
        match self.waiting() {
          Some(waiting) => {
            waiting.request_skip_waiting();
            self.skip_waiting().await?;
          }
          None => debug!("SKIP_WAITING with no waiting worker"),
        }
      }
      ControlMessage::GetVersion => {
        let controller = self
          .active()
          .or_else(|| self.waiting())
          .ok_or_else(|| eyre!("No worker is installed"))?;
        messages::reply_version(port, controller.version());
      }
    }
    Ok(())
  }

  pub async fn push(&self, data: Option<&[u8]>) -> Result<Notification> {
    self.require_active()?.handle_push(data).await
  }

  pub async fn notification_click(&self, click: &NotificationClick) -> Result<Option<Url>> {
    self
      .require_active()?
      .handle_notification_click(click)
      .await
  }

  fn require_active(&self) -> Result<Arc<OfflineController>> {
    self.active().ok_or_else(|| eyre!("No active worker"))
  }
}
