//! Push payload parsing and notification display.

use async_trait::async_trait;
use chrono::Utc;
use color_eyre::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::config::NotificationConfig;

/// Expected JSON body of a push message. Every field is optional, and a
/// field of the wrong type is treated as absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PushPayload {
  pub title: Option<String>,
  pub body: Option<String>,
  pub icon: Option<String>,
  pub badge: Option<String>,
  pub tag: Option<String>,
  pub data: Option<Value>,
  pub actions: Vec<ActionButton>,
  pub require_interaction: bool,
  pub silent: bool,
  pub vibrate: Option<Vec<u32>>,
}

impl PushPayload {
  /// Read the known fields of a JSON object, skipping malformed ones.
  pub fn from_object(object: &Map<String, Value>) -> Self {
    let text = |name: &str| object.get(name).and_then(Value::as_str).map(String::from);
    let flag = |name: &str| object.get(name).and_then(Value::as_bool).unwrap_or(false);

    let actions = object
      .get("actions")
      .and_then(Value::as_array)
      .map(|items| {
        items
          .iter()
          .filter_map(|item| serde_json::from_value::<ActionButton>(item.clone()).ok())
          .collect()
      })
      .unwrap_or_default();

    let vibrate = object.get("vibrate").and_then(Value::as_array).map(|steps| {
      steps
        .iter()
        .filter_map(Value::as_u64)
        .filter_map(|ms| u32::try_from(ms).ok())
        .collect()
    });

    Self {
      title: text("title"),
      body: text("body"),
      icon: text("icon"),
      badge: text("badge"),
      tag: text("tag"),
      data: object.get("data").cloned(),
      actions,
      require_interaction: flag("requireInteraction"),
      silent: flag("silent"),
      vibrate,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionButton {
  pub action: String,
  pub title: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub icon: Option<String>,
}

/// A notification ready to be displayed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub tag: Option<String>,
  pub data: Map<String, Value>,
  pub actions: Vec<ActionButton>,
  pub require_interaction: bool,
  pub silent: bool,
}

/// A click on a displayed notification, optionally on one of its actions.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NotificationClick {
  pub action: Option<String>,
  pub tag: Option<String>,
  #[serde(default)]
  pub data: Value,
}

/// Where notifications are displayed.
#[async_trait]
pub trait NotificationSink: Send + Sync {
  async fn show(&self, notification: &Notification) -> Result<()>;

  async fn close(&self, tag: Option<&str>) -> Result<()>;
}

/// Sink that records notifications in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl NotificationSink for TracingNotifier {
  async fn show(&self, notification: &Notification) -> Result<()> {
    info!(
      title = %notification.title,
      tag = notification.tag.as_deref().unwrap_or(""),
      actions = notification.actions.len(),
      "Notification: {}",
      notification.body
    );
    Ok(())
  }

  async fn close(&self, tag: Option<&str>) -> Result<()> {
    info!(tag = tag.unwrap_or(""), "Notification closed");
    Ok(())
  }
}

/// Build a notification from raw push data.
///
/// Never fails: a missing payload uses the default body, and anything
/// that is not a JSON object is shown as plain text.
pub fn build_notification(data: Option<&[u8]>, defaults: &NotificationConfig) -> Notification {
  let Some(bytes) = data else {
    return plain_notification(&defaults.default_body, defaults);
  };

  match serde_json::from_slice::<Value>(bytes) {
    Ok(Value::Object(object)) => from_payload(PushPayload::from_object(&object), defaults),
    parsed => {
      match parsed {
        Err(e) => warn!("Push payload is not JSON, showing as text: {}", e),
        Ok(_) => warn!("Push payload is not a JSON object, showing as text"),
      }
      let text = String::from_utf8_lossy(bytes);
      let text = text.trim();
      let body = if text.is_empty() {
        defaults.default_body.as_str()
      } else {
        text
      };
      plain_notification(body, defaults)
    }
  }
}

fn from_payload(payload: PushPayload, defaults: &NotificationConfig) -> Notification {
  let mut data = base_data();
  match payload.data {
    Some(Value::Object(extra)) => data.extend(extra),
    Some(Value::Null) | None => {}
    Some(other) => {
      data.insert("value".to_string(), other);
    }
  }

  Notification {
    title: payload
      .title
      .unwrap_or_else(|| defaults.default_title.clone()),
    body: payload.body.unwrap_or_else(|| defaults.default_body.clone()),
    icon: payload.icon.unwrap_or_else(|| defaults.icon.clone()),
    badge: payload.badge.unwrap_or_else(|| defaults.badge.clone()),
    vibrate: payload.vibrate.unwrap_or_else(|| defaults.vibrate.clone()),
    tag: payload.tag,
    data,
    actions: payload.actions,
    require_interaction: payload.require_interaction,
    silent: payload.silent,
  }
}

fn plain_notification(body: &str, defaults: &NotificationConfig) -> Notification {
  Notification {
    title: defaults.default_title.clone(),
    body: body.to_string(),
    icon: defaults.icon.clone(),
    badge: defaults.badge.clone(),
    vibrate: defaults.vibrate.clone(),
    tag: None,
    data: base_data(),
    actions: Vec::new(),
    require_interaction: false,
    silent: false,
  }
}

fn base_data() -> Map<String, Value> {
  let mut data = Map::new();
  data.insert(
    "dateOfArrival".to_string(),
    Value::from(Utc::now().timestamp_millis()),
  );
  data.insert("primaryKey".to_string(), Value::from(1));
  data
}
