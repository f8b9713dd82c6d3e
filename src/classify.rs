//! Request classification.

use color_eyre::{eyre::eyre, Result};
use regex::RegexSet;
use std::collections::HashSet;

use crate::config::Config;
use crate::http::{Request, RequestMode};

/// Which caching strategy applies to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
  /// Build output (scripts, stylesheets, images, fonts): cache-first
  StaticAsset,
  /// Backend data or auth call: network-first, 503 when offline
  ApiCall,
  /// Top-level page load: network-first, offline document fallback
  Navigation,
  /// Anything else: network-first, cache fallback
  Other,
}

impl RequestClass {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::StaticAsset => "static",
      Self::ApiCall => "api",
      Self::Navigation => "navigation",
      Self::Other => "other",
    }
  }
}

pub struct Classifier {
  api_hosts: RegexSet,
  static_extensions: HashSet<String>,
}

impl Classifier {
  pub fn new(config: &Config) -> Result<Self> {
    let api_hosts = RegexSet::new(&config.api_hosts)
      .map_err(|e| eyre!("Invalid api_hosts pattern: {}", e))?;

    let static_extensions = config
      .static_extensions
      .iter()
      .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
      .collect();

    Ok(Self {
      api_hosts,
      static_extensions,
    })
  }

  /// Classify a request. Every request maps to exactly one class; the
  /// checks run in order and the first match wins.
  pub fn classify(&self, request: &Request) -> RequestClass {
    if self.is_static_asset(request) {
      RequestClass::StaticAsset
    } else if self.api_hosts.is_match(request.url.as_str()) {
      RequestClass::ApiCall
    } else if request.mode == RequestMode::Navigate {
      RequestClass::Navigation
    } else {
      RequestClass::Other
    }
  }

  fn is_static_asset(&self, request: &Request) -> bool {
    let last_segment = request.url.path().rsplit('/').next().unwrap_or_default();

    match last_segment.rsplit_once('.') {
      Some((stem, ext)) if !stem.is_empty() => {
        self.static_extensions.contains(&ext.to_ascii_lowercase())
      }
      _ => false,
    }
  }
}
