use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use url::Url;

use crate::config::Config;
use crate::http::{NetworkError, Request};
use crate::worker::{
  ControlMessage, FetchOutcome, Notification, NotificationClick, Registration, ReplyPort,
  VersionReply,
};

/// Events delivered to the worker
#[derive(Debug)]
pub enum WorkerEvent {
  /// Install a new version and make it current once it may take over
  Install {
    config: Arc<Config>,
    done: oneshot::Sender<Result<String>>,
  },
  /// Promote the waiting version, if any
  Activate { done: oneshot::Sender<Result<bool>> },
  /// Intercepted request; the outcome goes back over `respond`
  Fetch {
    request: Request,
    respond: oneshot::Sender<Result<FetchOutcome, NetworkError>>,
  },
  /// Control message from a page, with an optional reply port
  Message {
    message: ControlMessage,
    port: Option<ReplyPort>,
  },
  Push {
    data: Option<Vec<u8>>,
    done: oneshot::Sender<Result<Notification>>,
  },
  NotificationClick {
    click: NotificationClick,
    done: oneshot::Sender<Result<Option<Url>>>,
  },
}

impl WorkerEvent {
  fn name(&self) -> &'static str {
    match self {
      WorkerEvent::Install { .. } => "install",
      WorkerEvent::Activate { .. } => "activate",
      WorkerEvent::Fetch { .. } => "fetch",
      WorkerEvent::Message { .. } => "message",
      WorkerEvent::Push { .. } => "push",
      WorkerEvent::NotificationClick { .. } => "notificationclick",
    }
  }
}

/// Dispatches worker events. Each event runs as its own task so a slow
/// fetch never holds up messages or other fetches.
pub struct EventLoop;

impl EventLoop {
  pub fn spawn(registration: Arc<Registration>) -> EventSender {
    let (tx, mut rx) = mpsc::unbounded_channel::<WorkerEvent>();

    tokio::spawn(async move {
      while let Some(event) = rx.recv().await {
        debug!(event = event.name(), "Dispatching");
        let registration = Arc::clone(&registration);
        tokio::spawn(async move { dispatch(&registration, event).await });
      }
      debug!("Event loop stopped");
    });

    EventSender { tx }
  }
}

async fn dispatch(registration: &Registration, event: WorkerEvent) {
  let delivered = match event {
    WorkerEvent::Install { config, done } => {
      let installed = registration
        .register(config)
        .await
        .map(|controller| controller.version().to_string());
      done.send(installed).is_ok()
    }
    WorkerEvent::Activate { done } => done.send(registration.skip_waiting().await).is_ok(),
    WorkerEvent::Fetch { request, respond } => {
      respond.send(registration.fetch(&request).await).is_ok()
    }
    WorkerEvent::Message { message, port } => {
      if let Err(e) = registration.post_message(message, port).await {
        warn!(?message, "Message handling failed: {:#}", e);
      }
      true
    }
    WorkerEvent::Push { data, done } => done.send(registration.push(data.as_deref()).await).is_ok(),
    WorkerEvent::NotificationClick { click, done } => done
      .send(registration.notification_click(&click).await)
      .is_ok(),
  };

  if !delivered {
    debug!("Event requester went away");
  }
}

/// Handle used to post events into the loop.
#[derive(Clone)]
pub struct EventSender {
  tx: mpsc::UnboundedSender<WorkerEvent>,
}

impl EventSender {
  fn send(&self, event: WorkerEvent) -> Result<()> {
    self
      .tx
      .send(event)
      .map_err(|_| eyre!("Worker event loop has stopped"))
  }

  /// Install `config`. Returns the installed version.
  pub async fn install(&self, config: Arc<Config>) -> Result<String> {
    let (done, rx) = oneshot::channel();
    self.send(WorkerEvent::Install { config, done })?;
    rx.await.map_err(|_| eyre!("Install handler dropped"))?
  }

  pub async fn activate(&self) -> Result<bool> {
    let (done, rx) = oneshot::channel();
    self.send(WorkerEvent::Activate { done })?;
    rx.await.map_err(|_| eyre!("Activate handler dropped"))?
  }

  pub async fn fetch(&self, request: Request) -> Result<Result<FetchOutcome, NetworkError>> {
    let (respond, rx) = oneshot::channel();
    self.send(WorkerEvent::Fetch { request, respond })?;
    rx.await.map_err(|_| eyre!("Fetch handler dropped"))
  }

  /// Post a control message. GET_VERSION answers over the returned receiver.
  pub fn post_message(
    &self,
    message: ControlMessage,
  ) -> Result<Option<oneshot::Receiver<VersionReply>>> {
    match message {
      ControlMessage::GetVersion => {
        let (port, rx) = oneshot::channel();
        self.send(WorkerEvent::Message {
          message,
          port: Some(port),
        })?;
        Ok(Some(rx))
      }
      ControlMessage::SkipWaiting => {
        self.send(WorkerEvent::Message {
          message,
          port: None,
        })?;
        Ok(None)
      }
    }
  }

  pub async fn push(&self, data: Option<Vec<u8>>) -> Result<Notification> {
    let (done, rx) = oneshot::channel();
    self.send(WorkerEvent::Push { data, done })?;
    rx.await.map_err(|_| eyre!("Push handler dropped"))?
  }

  pub async fn notification_click(&self, click: NotificationClick) -> Result<Option<Url>> {
    let (done, rx) = oneshot::channel();
    self.send(WorkerEvent::NotificationClick { click, done })?;
    rx.await.map_err(|_| eyre!("Notification click handler dropped"))?
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::worker::testing::Harness;

  #[tokio::test]
  async fn test_events_reach_registration() {
    let harness = Harness::new();
    let config = Config::default();
    harness.serve_precache(&config);
    let events = EventLoop::spawn(Arc::new(Registration::new(harness.platform())));

    let installed = events.install(Arc::new(config)).await.unwrap();
    assert_eq!(installed, "humidor-static-v1");
    // Nothing left waiting after the first install
    assert!(!events.activate().await.unwrap());

    let reply = events
      .post_message(ControlMessage::GetVersion)
      .unwrap()
      .unwrap()
      .await
      .unwrap();
    assert_eq!(reply.version, "humidor-static-v1");

    let notification = events
      .push(Some(br#"{"title":"Order"}"#.to_vec()))
      .await
      .unwrap();
    assert_eq!(notification.title, "Order");

    let request = Request::new("POST", Url::parse("http://localhost:3000/").unwrap());
    let outcome = events.fetch(request).await.unwrap().unwrap();
    assert!(matches!(outcome, FetchOutcome::Passthrough));
  }

  #[tokio::test]
  async fn test_skip_waiting_has_no_reply() {
    let harness = Harness::new();
    let events = EventLoop::spawn(Arc::new(Registration::new(harness.platform())));
    assert!(events.post_message(ControlMessage::SkipWaiting).unwrap().is_none());
  }
}
