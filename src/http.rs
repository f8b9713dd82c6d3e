//! Request/response snapshots and the network boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Why a request was issued, as reported by the browser.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
  /// Top-level document load
  Navigate,
  SameOrigin,
  NoCors,
  #[default]
  Cors,
}

impl RequestMode {
  /// Parse a `Sec-Fetch-Mode` header value.
  pub fn from_fetch_mode(value: &str) -> Option<Self> {
    match value.trim().to_ascii_lowercase().as_str() {
      "navigate" => Some(Self::Navigate),
      "same-origin" => Some(Self::SameOrigin),
      "no-cors" => Some(Self::NoCors),
      "cors" | "websocket" => Some(Self::Cors),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  pub method: String,
  pub url: Url,
  pub mode: RequestMode,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Request {
  pub fn new(method: &str, url: Url) -> Self {
    Self {
      method: method.to_ascii_uppercase(),
      url,
      mode: RequestMode::default(),
      headers: Vec::new(),
      body: Vec::new(),
    }
  }

  pub fn get(url: Url) -> Self {
    Self::new("GET", url)
  }

  /// A GET issued by the browser to load a page.
  pub fn navigate(url: Url) -> Self {
    Self {
      mode: RequestMode::Navigate,
      ..Self::get(url)
    }
  }

  pub fn is_get(&self) -> bool {
    self.method == "GET"
  }

  pub fn is_http(&self) -> bool {
    matches!(self.url.scheme(), "http" | "https")
  }
}

/// Captured response: status, headers and the full body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Response {
  pub fn new(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
    Self {
      status,
      headers,
      body,
    }
  }

  pub fn json(status: u16, value: &serde_json::Value) -> Self {
    Self::new(
      status,
      vec![("Content-Type".to_string(), "application/json".to_string())],
      value.to_string().into_bytes(),
    )
  }

  pub fn html(status: u16, body: impl Into<String>) -> Self {
    Self::new(
      status,
      vec![("Content-Type".to_string(), "text/html".to_string())],
      body.into().into_bytes(),
    )
  }

  /// 2xx, the only responses that may be cached.
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }
}

#[derive(Debug, Error)]
pub enum NetworkError {
  #[error("request to {url} failed: {source}")]
  Transport {
    url: String,
    #[source]
    source: reqwest::Error,
  },
  #[error("{url} is unreachable")]
  Unreachable { url: String },
}

/// Outbound network. A non-2xx response is still a successful fetch;
/// only transport failures are errors.
#[async_trait]
pub trait Network: Send + Sync {
  async fn fetch(&self, request: &Request) -> Result<Response, NetworkError>;
}

/// Network backed by a shared reqwest client.
#[derive(Clone, Default)]
pub struct HttpNetwork {
  client: reqwest::Client,
}

impl HttpNetwork {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl Network for HttpNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
    let transport = |source: reqwest::Error| NetworkError::Transport {
      url: request.url.to_string(),
      source,
    };

    let method = reqwest::Method::from_bytes(request.method.as_bytes()).map_err(|_| {
      NetworkError::Unreachable {
        url: request.url.to_string(),
      }
    })?;

    let mut builder = self.client.request(method, request.url.clone());
    for (name, value) in &request.headers {
      builder = builder.header(name, value);
    }
    if !request.body.is_empty() {
      builder = builder.body(request.body.clone());
    }

    let response = builder.send().await.map_err(transport)?;
    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
      .collect();
    let body = response.bytes().await.map_err(transport)?.to_vec();

    Ok(Response::new(status, headers, body))
  }
}

/// Network that is never reachable, for exercising the offline paths.
#[derive(Clone, Copy, Default)]
pub struct OfflineNetwork;

#[async_trait]
impl Network for OfflineNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
    Err(NetworkError::Unreachable {
      url: request.url.to_string(),
    })
  }
}
