//! Responses synthesized when neither network nor cache can answer.

use serde_json::json;

use crate::http::Response;

/// 503 with a JSON body the application can detect as "offline".
pub fn offline_api_response() -> Response {
  Response::json(
    503,
    &json!({
      "error": "offline",
      "offline": true,
      "message": "You are offline. This data will be available when the connection returns.",
    }),
  )
}

/// Minimal page served when the offline document itself is not cached.
pub fn inline_offline_page(title: &str) -> Response {
  let title = escape_html(title);
  Response::html(
    200,
    format!(
      r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>{title} - Offline</title>
  <style>
    body {{ font-family: system-ui, sans-serif; display: flex; align-items: center; justify-content: center; min-height: 100vh; margin: 0; background: #1c1410; color: #f5e6d3; }}
    main {{ text-align: center; padding: 2rem; }}
    button {{ margin-top: 1rem; padding: 0.5rem 1.5rem; border: 0; border-radius: 4px; background: #a0522d; color: #fff; }}
  </style>
</head>
<body>
  <main>
    <h1>You are offline</h1>
    <p>{title} can't reach the network right now. Check your connection and try again.</p>
    <button onclick="location.reload()">Retry</button>
  </main>
</body>
</html>
"#
    ),
  )
}

fn escape_html(s: &str) -> String {
  s.replace('&', "&amp;")
    .replace('<', "&lt;")
    .replace('>', "&gt;")
    .replace('"', "&quot;")
}
