//! Notification click routing.
//!
//! Both the explicit action buttons and the `data.type` of a push map to
//! an in-app route through exhaustive matches, so a new action or kind
//! cannot be added without choosing its destination.

use serde_json::Value;
use std::str::FromStr;

/// In-app pages a notification can open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppRoute {
  Home,
  Dashboard,
  Inventory,
  Events,
  Customers,
  Gifting,
  Settings,
}

impl AppRoute {
  pub fn path(&self) -> &'static str {
    match self {
      Self::Home => "/",
      Self::Dashboard => "/dashboard",
      Self::Inventory => "/inventory",
      Self::Events => "/events",
      Self::Customers => "/customers",
      Self::Gifting => "/gifting",
      Self::Settings => "/settings",
    }
  }
}

/// Action button identifiers a push may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationAction {
  Explore,
  ViewInventory,
  ViewEvent,
  ViewCustomer,
  ViewOrder,
  SendGift,
  ViewUpdate,
  Close,
}

impl NotificationAction {
  /// Where clicking the action leads. `Close` only dismisses.
  pub fn route(&self) -> Option<AppRoute> {
    match self {
      Self::Explore => Some(AppRoute::Dashboard),
      Self::ViewInventory => Some(AppRoute::Inventory),
      Self::ViewEvent => Some(AppRoute::Events),
      Self::ViewCustomer => Some(AppRoute::Customers),
      Self::ViewOrder => Some(AppRoute::Dashboard),
      Self::SendGift => Some(AppRoute::Gifting),
      Self::ViewUpdate => Some(AppRoute::Settings),
      Self::Close => None,
    }
  }
}

impl FromStr for NotificationAction {
  type Err = ();

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "explore" => Ok(Self::Explore),
      "view-inventory" => Ok(Self::ViewInventory),
      "view-event" => Ok(Self::ViewEvent),
      "view-customer" => Ok(Self::ViewCustomer),
      "view-order" => Ok(Self::ViewOrder),
      "send-gift" => Ok(Self::SendGift),
      "view-update" => Ok(Self::ViewUpdate),
      "close" => Ok(Self::Close),
      _ => Err(()),
    }
  }
}

/// The `data.type` of a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
  LowStock,
  EventReminder,
  BirthdayReminder,
  NewOrder,
  SystemUpdate,
}

impl NotificationKind {
  pub fn route(&self) -> AppRoute {
    match self {
      Self::LowStock => AppRoute::Inventory,
      Self::EventReminder => AppRoute::Events,
      Self::BirthdayReminder => AppRoute::Customers,
      Self::NewOrder => AppRoute::Dashboard,
      Self::SystemUpdate => AppRoute::Settings,
    }
  }
}

impl FromStr for NotificationKind {
  type Err = ();

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "low-stock" => Ok(Self::LowStock),
      "event-reminder" => Ok(Self::EventReminder),
      "birthday-reminder" => Ok(Self::BirthdayReminder),
      "new-order" => Ok(Self::NewOrder),
      "system-update" => Ok(Self::SystemUpdate),
      _ => Err(()),
    }
  }
}

/// Resolve the path a notification click should open.
///
/// An explicit action wins (unknown actions go to the dashboard, `close`
/// opens nothing). Without an action, `data.type` decides, then a
/// same-origin `data.url`, then the home page.
pub fn resolve_click(action: Option<&str>, data: &Value) -> Option<String> {
  if let Some(action) = action.filter(|a| !a.is_empty()) {
    return match action.parse::<NotificationAction>() {
      Ok(action) => action.route().map(|r| r.path().to_string()),
      Err(()) => Some(AppRoute::Dashboard.path().to_string()),
    };
  }

  if let Some(kind) = data
    .get("type")
    .and_then(Value::as_str)
    .and_then(|t| t.parse::<NotificationKind>().ok())
  {
    return Some(kind.route().path().to_string());
  }

  if let Some(url) = data.get("url").and_then(Value::as_str) {
    if url.starts_with('/') && !url.starts_with("//") {
      return Some(url.to_string());
    }
  }

  Some(AppRoute::Home.path().to_string())
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_action_routes() {
    let cases = [
      ("explore", "/dashboard"),
      ("view-inventory", "/inventory"),
      ("view-event", "/events"),
      ("view-customer", "/customers"),
      ("view-order", "/dashboard"),
      ("send-gift", "/gifting"),
      ("view-update", "/settings"),
    ];
    for (action, path) in cases {
      assert_eq!(resolve_click(Some(action), &Value::Null).as_deref(), Some(path));
    }
  }

  #[test]
  fn test_close_opens_nothing() {
    assert_eq!(resolve_click(Some("close"), &json!({"type": "low-stock"})), None);
  }

  #[test]
  fn test_unknown_action_goes_to_dashboard() {
    assert_eq!(resolve_click(Some("dance"), &Value::Null).as_deref(), Some("/dashboard"));
  }

  #[test]
  fn test_kind_routes() {
    let cases = [
      ("low-stock", "/inventory"),
      ("event-reminder", "/events"),
      ("birthday-reminder", "/customers"),
      ("new-order", "/dashboard"),
      ("system-update", "/settings"),
    ];
    for (kind, path) in cases {
      assert_eq!(resolve_click(None, &json!({ "type": kind })).as_deref(), Some(path));
    }
  }

  #[test]
  fn test_action_beats_kind() {
    let data = json!({"type": "low-stock"});
    assert_eq!(resolve_click(Some("send-gift"), &data).as_deref(), Some("/gifting"));
  }

  #[test]
  fn test_defaults() {
    assert_eq!(resolve_click(None, &Value::Null).as_deref(), Some("/"));
    assert_eq!(resolve_click(None, &json!({"type": "mystery"})).as_deref(), Some("/"));
    assert_eq!(resolve_click(None, &json!({"url": "/events/42"})).as_deref(), Some("/events/42"));
    assert_eq!(resolve_click(None, &json!({"url": "https://evil.example"})).as_deref(), Some("/"));
    assert_eq!(resolve_click(Some(""), &Value::Null).as_deref(), Some("/"));
  }
}
