use axum::{
    body::{Body, Bytes},
    extract::Request,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::Response,
};
use rand::RngCore;
use std::time::{Duration, Instant};

pub const TRACE_ID_HEADER: &str = "X-Trace-Id";

const MAX_TRACE_ID_LEN: usize = 64;
const MAX_BODY_LOG_CHARS: usize = 200;
const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

/// Trace id of the current request, stored in request extensions.
#[derive(Clone)]
pub struct TraceId(pub String);

impl std::ops::Deref for TraceId {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

/// 16 lowercase hex chars.
fn generate_trace_id() -> String {
    format!("{:016x}", rand::thread_rng().next_u64())
}

/// A caller-supplied trace id is kept when it is 1..=64 chars of
/// `[A-Za-z0-9_-]`; otherwise a fresh one is generated.
fn resolve_trace_id(headers: &HeaderMap) -> String {
    headers
        .get(TRACE_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| is_valid_trace_id(id))
        .map(str::to_string)
        .unwrap_or_else(generate_trace_id)
}

fn is_valid_trace_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_TRACE_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Cuts to at most `max` bytes on a char boundary.
fn body_snippet(bytes: &[u8], max: usize) -> String {
    let Ok(text) = std::str::from_utf8(bytes) else {
        return "<non-utf8 body>".to_string();
    };
    if text.len() <= max {
        return text.to_string();
    }
    let end = (0..=max)
        .rev()
        .find(|&i| text.is_char_boundary(i))
        .unwrap_or(0);
    format!("{}...", &text[..end])
}

fn format_elapsed(elapsed: Duration) -> String {
    match elapsed.as_micros() {
        us if us < 1_000 => format!("{us}µs"),
        us if us < 1_000_000 => format!("{}ms", us / 1_000),
        _ => format!("{:.1}s", elapsed.as_secs_f64()),
    }
}

/// Routes whose bodies are never logged.
fn is_sensitive(path: &str) -> bool {
    path.starts_with("/v1/internal/") || path.ends_with("/insight")
}

fn carries_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("application/json"))
}

/// Reads a body into memory. Unreadable bodies become empty.
async fn buffer(body: Body, limit: usize) -> Bytes {
    axum::body::to_bytes(body, limit).await.unwrap_or_default()
}

struct RequestSummary {
    method: Method,
    target: String,
    user_agent: String,
    sensitive: bool,
}

impl RequestSummary {
    fn of(req: &Request) -> Self {
        let uri = req.uri();
        let target = match uri.query() {
            Some(q) if !q.is_empty() => format!("{}?{q}", uri.path()),
            _ => uri.path().to_string(),
        };
        let user_agent = req
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string();
        Self {
            method: req.method().clone(),
            target,
            user_agent,
            sensitive: is_sensitive(uri.path()),
        }
    }

    fn log(&self, trace_id: &str, body: Option<&str>) {
        match body {
            Some(body) => tracing::info!(
                trace_id = %trace_id,
                method = %self.method,
                path = %self.target,
                body = %body,
                ua = %self.user_agent,
                "--> request"
            ),
            None => tracing::info!(
                trace_id = %trace_id,
                method = %self.method,
                path = %self.target,
                ua = %self.user_agent,
                "--> request"
            ),
        }
    }
}

fn log_response(trace_id: &str, status: StatusCode, elapsed: &str, body: &str) {
    let code = status.as_u16();
    if status.is_server_error() {
        tracing::error!(
            trace_id = %trace_id,
            status = code,
            elapsed = %elapsed,
            body = %body,
            "<-- response"
        );
    } else if status.is_client_error() {
        tracing::warn!(
            trace_id = %trace_id,
            status = code,
            elapsed = %elapsed,
            body = %body,
            "<-- response"
        );
    } else {
        tracing::info!(trace_id = %trace_id, status = code, elapsed = %elapsed, "<-- response");
    }
}

/// Assigns a trace id, logs the request and response, and echoes the id
/// in the `X-Trace-Id` response header.
pub async fn request_logging(mut req: Request, next: Next) -> Response {
    let trace_id = resolve_trace_id(req.headers());
    req.extensions_mut().insert(TraceId(trace_id.clone()));
    let summary = RequestSummary::of(&req);

    let req = if !summary.sensitive && carries_body(&summary.method) {
        let (parts, body) = req.into_parts();
        let bytes = buffer(body, MAX_REQUEST_BODY_BYTES).await;
        let snippet = (!bytes.is_empty()).then(|| body_snippet(&bytes, MAX_BODY_LOG_CHARS));
        summary.log(&trace_id, snippet.as_deref());
        Request::from_parts(parts, Body::from(bytes))
    } else {
        summary.log(&trace_id, None);
        req
    };

    let started = Instant::now();
    let response = next.run(req).await;
    let elapsed = format_elapsed(started.elapsed());

    let (mut parts, body) = response.into_parts();
    let bytes = buffer(body, usize::MAX).await;
    let snippet = if !summary.sensitive && is_json(&parts.headers) && !bytes.is_empty() {
        body_snippet(&bytes, MAX_BODY_LOG_CHARS)
    } else {
        String::new()
    };
    log_response(&trace_id, parts.status, &elapsed, &snippet);

    if let Ok(val) = HeaderValue::from_str(&trace_id) {
        parts.headers.insert(TRACE_ID_HEADER, val);
    }
    Response::from_parts(parts, Body::from(bytes))
}
