//! Control messages posted from the application to the worker.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
  /// Activate a waiting worker immediately. No reply.
  SkipWaiting,
  /// Ask for the active cache version. Replies over the port.
  GetVersion,
}

impl ControlMessage {
  pub fn parse(bytes: &[u8]) -> Result<Self> {
    serde_json::from_slice(bytes).map_err(|e| eyre!("Unrecognised control message: {}", e))
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionReply {
  pub version: String,
}

/// One-shot reply channel handed over with a message.
pub type ReplyPort = oneshot::Sender<VersionReply>;

/// Answer a GET_VERSION. The port is consumed, so it is answered at most once.
pub fn reply_version(port: Option<ReplyPort>, version: &str) {
  let Some(port) = port else {
    warn!("GET_VERSION received without a reply port");
    return;
  };

  let reply = VersionReply {
    version: version.to_string(),
  };
  if port.send(reply).is_err() {
    debug!("GET_VERSION requester went away before the reply");
  }
}
