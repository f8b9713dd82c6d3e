//! Caching proxy in front of the PWA origin.
//!
//! Every request that is not a worker endpoint is rebuilt against the
//! origin and handed to the worker as an intercepted fetch.

use axum::{
  body::{Body, Bytes},
  extract::{self, State},
  http::{header, HeaderMap, Method, StatusCode},
  response::{IntoResponse, Response},
  routing::{get, post},
  Json, Router,
};
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::CacheSource;
use crate::event::EventSender;
use crate::http::{self, Network, Request, RequestMode};
use crate::worker::{ControlMessage, FetchOutcome, NotificationClick, Registration};

/// Largest request body forwarded upstream.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Response header naming where the proxy got the response from.
pub const SOURCE_HEADER: &str = "x-humidor-cache";

/// Headers that describe one hop, not the resource.
const HOP_BY_HOP: &[&str] = &[
  "connection",
  "keep-alive",
  "proxy-authenticate",
  "proxy-authorization",
  "te",
  "trailer",
  "transfer-encoding",
  "upgrade",
  "host",
  "content-length",
  "content-encoding",
  "accept-encoding",
];

pub struct ServerState {
  pub events: EventSender,
  pub registration: Arc<Registration>,
  /// Used directly for requests the worker passes through
  pub network: Arc<dyn Network>,
  pub origin: Url,
}

#[derive(Serialize)]
pub struct HealthResponse {
  pub status: String,
  pub version: String,
  pub worker: Option<String>,
  pub state: Option<String>,
}

pub fn create_router(state: Arc<ServerState>) -> Router {
  Router::new()
    .route("/__worker/health", get(health))
    .route("/__worker/message", post(message))
    .route("/__worker/push", post(push))
    .route("/__worker/notificationclick", post(notification_click))
    .fallback(proxy)
    .with_state(state)
}

/// Bind `listen` and serve until ctrl-c.
pub async fn serve(listen: &str, state: Arc<ServerState>) -> Result<()> {
  let listener = TcpListener::bind(listen)
    .await
    .map_err(|e| eyre!("Failed to bind {}: {}", listen, e))?;
  info!(listen = %listener.local_addr()?, origin = %state.origin, "Proxy listening");

  axum::serve(listener, create_router(state))
    .with_graceful_shutdown(shutdown_signal())
    .await?;

  info!("Proxy stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    warn!("Failed to listen for ctrl-c: {}", e);
    std::future::pending::<()>().await;
  }
}

async fn health(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
  let active = state.registration.active();
  Json(HealthResponse {
    status: "healthy".to_string(),
    version: env!("CARGO_PKG_VERSION").to_string(),
    worker: active.as_ref().map(|c| c.version().to_string()),
    state: active.map(|c| c.state().as_str().to_string()),
  })
}

async fn message(State(state): State<Arc<ServerState>>, body: Bytes) -> Response {
  let message = match ControlMessage::parse(&body) {
    Ok(message) => message,
    Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
  };

  match state.events.post_message(message) {
    Ok(Some(reply)) => match reply.await {
      Ok(reply) => Json(reply).into_response(),
      Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "No worker is installed").into_response(),
    },
    Ok(None) => StatusCode::NO_CONTENT.into_response(),
    Err(e) => internal_error(e),
  }
}

async fn push(State(state): State<Arc<ServerState>>, body: Bytes) -> Response {
  let data = (!body.is_empty()).then(|| body.to_vec());
  match state.events.push(data).await {
    Ok(notification) => Json(notification).into_response(),
    Err(e) => (StatusCode::SERVICE_UNAVAILABLE, format!("{:#}", e)).into_response(),
  }
}

async fn notification_click(
  State(state): State<Arc<ServerState>>,
  Json(click): Json<NotificationClick>,
) -> Response {
  match state.events.notification_click(click).await {
    Ok(target) => Json(json!({ "target": target.map(String::from) })).into_response(),
    Err(e) => (StatusCode::SERVICE_UNAVAILABLE, format!("{:#}", e)).into_response(),
  }
}

async fn proxy(State(state): State<Arc<ServerState>>, request: extract::Request) -> Response {
  let request = match to_worker_request(&state.origin, request).await {
    Ok(request) => request,
    Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
  };

  let outcome = match state.events.fetch(request.clone()).await {
    Ok(outcome) => outcome,
    Err(e) => return internal_error(e),
  };

  match outcome {
    Ok(FetchOutcome::Respond(result)) => to_response(result.data, Some(result.source)),
    Ok(FetchOutcome::Passthrough) => match state.network.fetch(&request).await {
      Ok(response) => to_response(response, None),
      Err(e) => bad_gateway(e),
    },
    Err(e) => bad_gateway(e),
  }
}

/// Rebuild an incoming request against the origin.
async fn to_worker_request(origin: &Url, request: extract::Request) -> Result<Request> {
  let (parts, body) = request.into_parts();

  let path = parts
    .uri
    .path_and_query()
    .map(|p| p.as_str())
    .unwrap_or("/");
  let url = origin
    .join(path)
    .map_err(|e| eyre!("Invalid request path '{}': {}", path, e))?;

  let body = axum::body::to_bytes(body, MAX_BODY_BYTES)
    .await
    .map_err(|e| eyre!("Failed to read request body: {}", e))?;

  let mut request = Request::new(parts.method.as_str(), url);
  request.mode = request_mode(&parts.method, &parts.headers);
  request.headers = parts
    .headers
    .iter()
    .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
    .filter_map(|(name, value)| {
      value
        .to_str()
        .ok()
        .map(|v| (name.to_string(), v.to_string()))
    })
    .collect();
  request.body = body.to_vec();

  Ok(request)
}

/// `Sec-Fetch-Mode` when the browser sends it, otherwise a GET that
/// accepts HTML is taken as a page load.
fn request_mode(method: &Method, headers: &HeaderMap) -> RequestMode {
  if let Some(mode) = headers
    .get("sec-fetch-mode")
    .and_then(|v| v.to_str().ok())
    .and_then(RequestMode::from_fetch_mode)
  {
    return mode;
  }

  let accepts_html = headers
    .get(header::ACCEPT)
    .and_then(|v| v.to_str().ok())
    .is_some_and(|v| v.contains("text/html"));

  if method == Method::GET && accepts_html {
    RequestMode::Navigate
  } else {
    RequestMode::default()
  }
}

fn is_hop_by_hop(name: &str) -> bool {
  HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
}

fn to_response(response: http::Response, source: Option<CacheSource>) -> Response {
  let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);

  let mut builder = Response::builder().status(status);
  for (name, value) in &response.headers {
    if !is_hop_by_hop(name) {
      builder = builder.header(name.as_str(), value.as_str());
    }
  }
  if let Some(source) = source {
    builder = builder.header(SOURCE_HEADER, source.as_str());
  }

  builder
    .body(Body::from(response.body))
    .unwrap_or_else(|e| internal_error(eyre!("Failed to build response: {}", e)))
}

fn bad_gateway(e: http::NetworkError) -> Response {
  debug!("Upstream unreachable: {}", e);
  (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
}

fn internal_error(e: color_eyre::Report) -> Response {
  warn!("Proxy error: {:#}", e);
  (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
}
