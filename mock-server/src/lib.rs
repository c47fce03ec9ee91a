//! Local HTTP server the client tests run against.
//!
//! Routes:
//! - `ANY /echo` echoes the body and `Content-Type`, reports the method in
//!   `x-echo-method` and reflects any inbound request id.
//! - `GET /reqid` returns the inbound request id as the body.
//! - `ANY /headers` returns the request headers as a JSON object.
//! - `ANY /status/{code}` answers with that status.
//! - `GET /slow/{ms}` waits before answering `200 OK`.

use std::{collections::BTreeMap, time::Duration};

use axum::{
    body::Bytes,
    extract::Path,
    http::{header::CONTENT_TYPE, HeaderMap, HeaderValue, Method, StatusCode},
    routing::{any, get},
    Json, Router,
};
use tokio::net::TcpListener;

/// Header the client uses to carry request identifiers.
pub const REQUEST_ID_HEADER: &str = "x-req-id";

pub fn app() -> Router {
    Router::new()
        .route("/echo", any(echo))
        .route("/reqid", get(request_id))
        .route("/headers", any(request_headers))
        .route("/status/{code}", any(status))
        .route("/slow/{ms}", get(slow))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "mock server listening");
    }
    axum::serve(listener, app()).await
}

async fn echo(method: Method, headers: HeaderMap, body: Bytes) -> (StatusCode, HeaderMap, Bytes) {
    tracing::debug!(%method, len = body.len(), "echo");
    let mut out = HeaderMap::new();
    if let Some(content_type) = headers.get(CONTENT_TYPE) {
        out.insert(CONTENT_TYPE, content_type.clone());
    }
    if let Some(rid) = headers.get(REQUEST_ID_HEADER) {
        out.insert(REQUEST_ID_HEADER, rid.clone());
    }
    if let Ok(value) = HeaderValue::from_str(method.as_str()) {
        out.insert("x-echo-method", value);
    }
    (StatusCode::OK, out, body)
}

async fn request_id(headers: HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

async fn request_headers(headers: HeaderMap) -> Json<BTreeMap<String, String>> {
    let map = headers
        .iter()
        .filter_map(|(name, value)| Some((name.to_string(), value.to_str().ok()?.to_string())))
        .collect();
    Json(map)
}

async fn status(Path(code): Path<u16>) -> Result<(StatusCode, String), StatusCode> {
    let status = StatusCode::from_u16(code).map_err(|_| StatusCode::BAD_REQUEST)?;
    Ok((status, format!("status {code}")))
}

async fn slow(Path(ms): Path<u64>) -> &'static str {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    "done"
}
