//! The offline cache worker: lifecycle, request strategies, messaging and
//! push notifications.

mod clients;
mod controller;
mod fallback;
mod lifecycle;
mod messages;
mod push;
mod routes;

pub use clients::ClientRegistry;
pub use controller::{FetchOutcome, OfflineController, Platform};
pub use lifecycle::Registration;
pub use messages::{ControlMessage, ReplyPort, VersionReply};
pub use push::{Notification, NotificationClick, TracingNotifier};

#[cfg(test)]
pub(crate) use controller::testing;
