//! Response envelope: metadata headers, ETag, and Server-Timing.
//!
//! Result payloads travel as JSON bodies; metadata (totals, the canonical
//! query, histogram bounds) travels in headers under the `Claimdex-` prefix.
//! The ETag covers the body bytes *and* the metadata values, so a
//! metadata-only change still invalidates caches.

use std::time::Duration;

use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, ETAG, IF_NONE_MATCH};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// Metadata headers
// ---------------------------------------------------------------------------

pub const HEADER_TOTAL: &str = "claimdex-total";
pub const HEADER_QUERY: &str = "claimdex-query";
pub const HEADER_FILTERS: &str = "claimdex-filters";
pub const HEADER_MIN: &str = "claimdex-min";
pub const HEADER_MAX: &str = "claimdex-max";
pub const HEADER_INTERVAL: &str = "claimdex-interval";

const SERVER_TIMING: &str = "server-timing";

/// Metadata accompanying a JSON payload. Unset fields emit no header.
#[derive(Debug, Default, Clone)]
pub struct ResponseMeta {
    pub total: Option<String>,
    pub query: Option<String>,
    pub filters: Option<String>,
    pub min: Option<String>,
    pub max: Option<String>,
    pub interval: Option<String>,
    /// Cache-Control value; not covered by the ETag.
    pub cache_control: Option<String>,
}

impl ResponseMeta {
    pub fn with_total(total: impl Into<String>) -> Self {
        ResponseMeta { total: Some(total.into()), ..ResponseMeta::default() }
    }

    fn headers(&self) -> Vec<(&'static str, &str)> {
        [
            (HEADER_TOTAL, &self.total),
            (HEADER_QUERY, &self.query),
            (HEADER_FILTERS, &self.filters),
            (HEADER_MIN, &self.min),
            (HEADER_MAX, &self.max),
            (HEADER_INTERVAL, &self.interval),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.as_deref().map(|v| (name, v)))
        .collect()
    }
}

// ---------------------------------------------------------------------------
// Request metrics
// ---------------------------------------------------------------------------

/// Per-request durations emitted as Server-Timing metrics: state lookup,
/// index round trip, index-reported duration, and response decode.
#[derive(Debug, Default, Clone, Copy)]
pub struct Metrics {
    pub state: Duration,
    pub es: Duration,
    pub esi: Duration,
    pub decode: Duration,
}

impl Metrics {
    pub fn server_timing(&self) -> String {
        fn ms(duration: Duration) -> f64 {
            duration.as_secs_f64() * 1000.0
        }
        format!(
            "s;dur={:.1}, es;dur={:.1}, esi;dur={:.1}, d;dur={:.1}",
            ms(self.state),
            ms(self.es),
            ms(self.esi),
            ms(self.decode),
        )
    }
}

// ---------------------------------------------------------------------------
// Envelope assembly
// ---------------------------------------------------------------------------

/// Strong ETag over the body bytes and every set metadata value.
pub fn etag(body: &[u8], meta: &ResponseMeta) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    for (name, value) in meta.headers() {
        hasher.update([0]);
        hasher.update(name.as_bytes());
        hasher.update([0]);
        hasher.update(value.as_bytes());
    }
    format!("\"{}\"", hex::encode(hasher.finalize()))
}

/// Assemble a JSON response: metadata headers, ETag, Server-Timing, and a
/// 304 without body when the client already holds the current ETag.
pub fn json_response(
    request_headers: &HeaderMap,
    body: Vec<u8>,
    meta: ResponseMeta,
    metrics: Metrics,
) -> Response {
    let tag = etag(&body, &meta);

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    for (name, value) in meta.headers() {
        if let Ok(value) = HeaderValue::from_str(value) {
            headers.insert(name, value);
        }
    }
    if let Some(cache) = &meta.cache_control {
        if let Ok(value) = HeaderValue::from_str(cache) {
            headers.insert(CACHE_CONTROL, value);
        }
    }
    if let Ok(value) = HeaderValue::from_str(&tag) {
        headers.insert(ETAG, value);
    }
    if let Ok(value) = HeaderValue::from_str(&metrics.server_timing()) {
        headers.insert(SERVER_TIMING, value);
    }

    let matched = request_headers
        .get(IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|held| held.split(',').any(|candidate| candidate.trim() == tag));
    if matched {
        return (StatusCode::NOT_MODIFIED, headers).into_response();
    }
    (headers, body).into_response()
}
