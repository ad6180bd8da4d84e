//! HTTP handlers for the search gateway.
//!
//! Routes serve the SPA shell, search results, the filters discoverer, and
//! the per-property value distributions as JSON. Result payloads go in the
//! body; totals and histogram bounds go in metadata headers (see
//! [`crate::respond`]). Handlers that resolve a state loosely redirect to
//! the canonical `?s=…&q=…` URL whenever a state had to be created, so the
//! address bar always names a stored state.

use std::time::{Duration, Instant};

use axum::extract::{Form, Path, Query, State};
use axum::http::header::HOST;
use axum::http::HeaderMap;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use claimdex_core::{Identifier, Timestamp, Unit};

use crate::aggregate;
use crate::error::ApiError;
use crate::index::IndexError;
use crate::query;
use crate::respond::{self, Metrics, ResponseMeta};
use crate::site::Site;
use crate::state::{self, SearchState, StateForm};
use crate::types::{AppContext, DOCUMENT_CACHE_MAX_AGE, MAX_RESULTS_COUNT};

// ---------------------------------------------------------------------------
// Small helpers
// ---------------------------------------------------------------------------

fn host(headers: &HeaderMap) -> &str {
    headers.get(HOST).and_then(|v| v.to_str().ok()).unwrap_or("")
}

/// Incoming request id, forwarded to the index as its opaque id.
fn request_id(headers: &HeaderMap) -> Option<&str> {
    headers.get("x-request-id").and_then(|v| v.to_str().ok())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, ApiError> {
    serde_json::to_vec(value).map_err(|e| ApiError::Internal(format!("cannot encode response: {e}")))
}

/// The canonical query string for a state: `s`, `q`, and the pass-through
/// UI anchor.
fn canonical_query(state: &SearchState, at: Option<&str>) -> String {
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    query.append_pair("s", state.id.as_str());
    query.append_pair("q", &state.text);
    if let Some(at) = at {
        query.append_pair("at", at);
    }
    query.finish()
}

fn shell(ctx: &AppContext) -> Response {
    Html(ctx.shell.to_string()).into_response()
}

fn parse_prop(prop: &str) -> Result<Identifier, ApiError> {
    prop.parse().map_err(|_| ApiError::bad_request(format!("invalid property id: {prop:?}")))
}

/// Run a `size=0` aggregation search for a state. Returns the aggregation
/// subtree plus the round-trip and index-side durations.
async fn run_aggregation_search(
    ctx: &AppContext,
    headers: &HeaderMap,
    site: &Site,
    search_state: &SearchState,
    aggregations: Value,
) -> Result<(Value, Duration, Duration), ApiError> {
    let body = query::aggregation_request(search_state, aggregations);
    let started = Instant::now();
    let mut response = ctx
        .index
        .search(&site.index, &body, Some(host(headers)), request_id(headers))
        .await?;
    let es = started.elapsed();
    let esi = Duration::from_millis(response.took.max(0) as u64);
    Ok((response.take_aggregations()?, es, esi))
}

/// Resolve the strict state for a filter endpoint; never creates states.
fn strict_state(ctx: &AppContext, s: &str) -> Result<std::sync::Arc<SearchState>, ApiError> {
    state::get_search(&ctx.states, s).ok_or(ApiError::NotFound)
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

/// Health check: status, version, site count, uptime.
pub async fn health(State(ctx): State<AppContext>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "sites": ctx.sites.sites().len(),
        "uptime_seconds": ctx.start_time.elapsed().as_secs(),
    }))
}

// ---------------------------------------------------------------------------
// Search shell and state creation
// ---------------------------------------------------------------------------

/// `GET /d` — the HTML shell. Redirects to the canonical `?s=…&q=…` URL
/// whenever the request did not name a stored state exactly.
pub async fn docs_html(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Query(form): Query<StateForm>,
) -> Result<Response, ApiError> {
    ctx.sites.resolve(host(&headers))?;
    let (search_state, exact) = state::get_or_make_search(&ctx.states, &form);
    if !exact {
        let location = format!("/d?{}", canonical_query(&search_state, form.at.as_deref()));
        return Ok(Redirect::to(&location).into_response());
    }
    Ok(shell(&ctx))
}

/// `POST /d` — store the state from the form body, then 303 to the
/// canonical GET URL.
pub async fn docs_post(
    State(ctx): State<AppContext>,
    Form(form): Form<StateForm>,
) -> Result<Response, ApiError> {
    let (search_state, _) = state::get_or_make_search(&ctx.states, &form);
    let location = format!("/d?{}", canonical_query(&search_state, form.at.as_deref()));
    Ok(Redirect::to(&location).into_response())
}

// ---------------------------------------------------------------------------
// Search results
// ---------------------------------------------------------------------------

/// `GET /d/search` — ordered result ids plus the total (with a `+` suffix
/// when the index reports a lower bound).
pub async fn search_get(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Query(form): Query<StateForm>,
) -> Result<Response, ApiError> {
    let started = Instant::now();
    let (search_state, exact) = state::get_or_make_search(&ctx.states, &form);
    if !exact {
        let location = format!("/d/search?{}", canonical_query(&search_state, form.at.as_deref()));
        return Ok(Redirect::to(&location).into_response());
    }
    let mut metrics = Metrics { state: started.elapsed(), ..Metrics::default() };

    let site = ctx.sites.resolve(host(&headers))?;
    let body = query::results_request(&search_state);
    let es_started = Instant::now();
    let response = ctx
        .index
        .search(&site.index, &body, Some(host(&headers)), request_id(&headers))
        .await?;
    metrics.es = es_started.elapsed();
    metrics.esi = Duration::from_millis(response.took.max(0) as u64);

    let decode_started = Instant::now();
    let rows: Vec<Value> = response.hits.hits.iter().map(|hit| json!({ "_id": hit.id })).collect();
    let body = encode(&rows)?;
    metrics.decode = decode_started.elapsed();

    let filters = match &search_state.filters {
        Some(filters) => Some(
            serde_json::to_string(filters)
                .map_err(|e| ApiError::Internal(format!("cannot encode filters: {e}")))?,
        ),
        None => None,
    };
    let meta = ResponseMeta {
        total: Some(response.hits.total.display()),
        query: Some(search_state.text.clone()),
        filters,
        ..ResponseMeta::default()
    };
    Ok(respond::json_response(&headers, body, meta, metrics))
}

/// `POST /d/search` — create (or reuse) a state and return its handle.
pub async fn search_post(
    State(ctx): State<AppContext>,
    Form(form): Form<StateForm>,
) -> Result<Response, ApiError> {
    let search_state = state::make_search(&ctx.states, &form);
    let mut payload = json!({ "s": search_state.id, "q": search_state.text });
    if let Some(filters) = &search_state.filters {
        payload["filters"] = serde_json::to_value(filters)
            .map_err(|e| ApiError::Internal(format!("cannot encode filters: {e}")))?;
    }
    Ok(Json(payload).into_response())
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct DocumentQuery {
    pub s: Option<String>,
    pub q: Option<String>,
    pub tab: Option<String>,
}

/// `GET /d/{id}` — the HTML shell for a document. When search params ride
/// along they must name a stored state; otherwise redirect to the canonical
/// document URL (search params dropped, `tab` kept).
pub async fn document_html(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    Query(form): Query<DocumentQuery>,
) -> Result<Response, ApiError> {
    if !Identifier::valid(&id) {
        return Err(ApiError::bad_request(format!("invalid document id: {id:?}")));
    }
    if form.s.is_some() || form.q.is_some() {
        let resolved = form.s.as_deref().and_then(|s| state::get_search(&ctx.states, s));
        if resolved.is_none() {
            let mut location = format!("/d/{id}");
            if let Some(tab) = &form.tab {
                let query =
                    url::form_urlencoded::Serializer::new(String::new()).append_pair("tab", tab).finish();
                location = format!("{location}?{query}");
            }
            return Ok(Redirect::to(&location).into_response());
        }
    }
    Ok(shell(&ctx))
}

/// Splice `"_id"` into raw `_source` bytes just before the closing brace,
/// avoiding a decode/encode round trip of the whole document.
pub fn inject_id(source: &str, id: &str) -> String {
    let trimmed = source.trim_end();
    match trimmed.strip_suffix('}') {
        Some(head) => {
            let separator = if head.trim_end().ends_with('{') { "" } else { "," };
            format!("{head}{separator}\"_id\":\"{id}\"}}")
        }
        None => source.to_string(),
    }
}

/// `GET /d/{id}/json` — the stored document with its id injected from the
/// hit metadata. Documents are immutable, so the response caches for a
/// week.
pub async fn document_json(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if !Identifier::valid(&id) {
        return Err(ApiError::bad_request(format!("invalid document id: {id:?}")));
    }
    let site = ctx.sites.resolve(host(&headers))?;
    let body = json!({
        "query": { "term": { "_id": id } },
        "from": 0,
        "size": MAX_RESULTS_COUNT,
        "track_total_hits": true,
        "_source": true,
    });
    let mut metrics = Metrics::default();
    let es_started = Instant::now();
    let response = ctx
        .index
        .search(&site.index, &body, Some(host(&headers)), request_id(&headers))
        .await?;
    metrics.es = es_started.elapsed();
    metrics.esi = Duration::from_millis(response.took.max(0) as u64);

    if response.hits.hits.is_empty() {
        return Err(ApiError::NotFound);
    }
    if response.hits.hits.len() > 1 {
        warn!(id = id.as_str(), hits = response.hits.hits.len(), "multiple hits for one document id");
    }
    let decode_started = Instant::now();
    let source = response.hits.hits[0]
        .source
        .as_ref()
        .ok_or(ApiError::Upstream(IndexError::NoSource))?;
    let payload = inject_id(source.get(), &id);
    metrics.decode = decode_started.elapsed();

    let meta = ResponseMeta {
        cache_control: Some(format!("max-age={DOCUMENT_CACHE_MAX_AGE}")),
        ..ResponseMeta::default()
    };
    Ok(respond::json_response(&headers, payload.into_bytes(), meta, metrics))
}

// ---------------------------------------------------------------------------
// Filters discoverer
// ---------------------------------------------------------------------------

/// `GET /d/filters/{s}` — the union of properties applicable as relation,
/// amount, or time filters over the state's result set.
pub async fn filters_get(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Path(s): Path<String>,
) -> Result<Response, ApiError> {
    let started = Instant::now();
    let search_state = strict_state(&ctx, &s)?;
    let mut metrics = Metrics { state: started.elapsed(), ..Metrics::default() };

    let site = ctx.sites.resolve(host(&headers))?;
    let aggregations = aggregate::discoverer_aggregations(&site);
    let (subtree, es, esi) =
        run_aggregation_search(&ctx, &headers, &site, &search_state, aggregations).await?;
    metrics.es = es;
    metrics.esi = esi;

    let decode_started = Instant::now();
    let (rows, total) = aggregate::reshape_discoverer(subtree)?;
    let body = encode(&rows)?;
    metrics.decode = decode_started.elapsed();

    Ok(respond::json_response(&headers, body, ResponseMeta::with_total(total.to_string()), metrics))
}

// ---------------------------------------------------------------------------
// Terms distributions
// ---------------------------------------------------------------------------

/// `GET /d/filter/{s}/rel/{prop}` — distribution of relation targets.
pub async fn rel_filter_get(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Path((s, prop)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let started = Instant::now();
    let search_state = strict_state(&ctx, &s)?;
    let prop = parse_prop(&prop)?;
    let mut metrics = Metrics { state: started.elapsed(), ..Metrics::default() };

    let site = ctx.sites.resolve(host(&headers))?;
    let aggregations = aggregate::rel_distribution_aggregations(&prop);
    let (subtree, es, esi) =
        run_aggregation_search(&ctx, &headers, &site, &search_state, aggregations).await?;
    metrics.es = es;
    metrics.esi = esi;

    let decode_started = Instant::now();
    let (rows, total) = aggregate::reshape_rel_distribution(subtree)?;
    let body = encode(&rows)?;
    metrics.decode = decode_started.elapsed();

    Ok(respond::json_response(&headers, body, ResponseMeta::with_total(total.to_string()), metrics))
}

/// `GET /d/filter/{s}/str/{prop}` — distribution of exact string values.
pub async fn str_filter_get(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Path((s, prop)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let started = Instant::now();
    let search_state = strict_state(&ctx, &s)?;
    let prop = parse_prop(&prop)?;
    let mut metrics = Metrics { state: started.elapsed(), ..Metrics::default() };

    let site = ctx.sites.resolve(host(&headers))?;
    let aggregations = aggregate::string_distribution_aggregations(&prop);
    let (subtree, es, esi) =
        run_aggregation_search(&ctx, &headers, &site, &search_state, aggregations).await?;
    metrics.es = es;
    metrics.esi = esi;

    let decode_started = Instant::now();
    let (rows, total) = aggregate::reshape_string_distribution(subtree)?;
    let body = encode(&rows)?;
    metrics.decode = decode_started.elapsed();

    Ok(respond::json_response(&headers, body, ResponseMeta::with_total(total.to_string()), metrics))
}

/// `GET /d/filter/{s}/index` — distribution over physical index members.
pub async fn index_filter_get(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Path(s): Path<String>,
) -> Result<Response, ApiError> {
    let started = Instant::now();
    let search_state = strict_state(&ctx, &s)?;
    let mut metrics = Metrics { state: started.elapsed(), ..Metrics::default() };

    let site = ctx.sites.resolve(host(&headers))?;
    let aggregations = aggregate::index_distribution_aggregations();
    let (subtree, es, esi) =
        run_aggregation_search(&ctx, &headers, &site, &search_state, aggregations).await?;
    metrics.es = es;
    metrics.esi = esi;

    let decode_started = Instant::now();
    let (rows, total) = aggregate::reshape_index_distribution(subtree)?;
    let body = encode(&rows)?;
    metrics.decode = decode_started.elapsed();

    Ok(respond::json_response(&headers, body, ResponseMeta::with_total(total.to_string()), metrics))
}

// ---------------------------------------------------------------------------
// Histogram distributions
// ---------------------------------------------------------------------------

/// `GET /d/filter/{s}/amount/{prop}/{unit}` — two-pass amount histogram.
pub async fn amount_filter_get(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Path((s, prop, unit)): Path<(String, String, String)>,
) -> Result<Response, ApiError> {
    let started = Instant::now();
    let search_state = strict_state(&ctx, &s)?;
    let prop = parse_prop(&prop)?;
    let unit: Unit = unit
        .parse()
        .map_err(|_| ApiError::bad_request(format!("invalid unit: {unit:?}")))?;
    if !unit.comparable() {
        return Err(ApiError::bad_request("the custom unit cannot be filtered numerically"));
    }
    let mut metrics = Metrics { state: started.elapsed(), ..Metrics::default() };
    let site = ctx.sites.resolve(host(&headers))?;

    // pass 1: bounds and discreteness
    let (subtree, es, esi) = run_aggregation_search(
        &ctx,
        &headers,
        &site,
        &search_state,
        aggregate::amount_stats_aggregations(&prop, unit),
    )
    .await?;
    metrics.es += es;
    metrics.esi += esi;
    let Some(stats) = aggregate::reshape_amount_stats(subtree)? else {
        let body = encode(&Vec::<aggregate::HistogramBucket>::new())?;
        return Ok(respond::json_response(&headers, body, ResponseMeta::with_total("0"), metrics));
    };

    // pass 2: the histogram with the computed bins
    let params = aggregate::histogram_params(stats.min, stats.max, stats.discrete);
    let (subtree, es, esi) = run_aggregation_search(
        &ctx,
        &headers,
        &site,
        &search_state,
        aggregate::amount_histogram_aggregations(&prop, unit, params),
    )
    .await?;
    metrics.es += es;
    metrics.esi += esi;

    let decode_started = Instant::now();
    let buckets = aggregate::reshape_amount_histogram(subtree)?;
    let body = encode(&buckets)?;
    metrics.decode = decode_started.elapsed();

    let meta = ResponseMeta {
        total: Some(buckets.len().to_string()),
        min: Some(stats.min.to_string()),
        max: Some(stats.max.to_string()),
        interval: (stats.min != stats.max).then(|| params.interval.to_string()),
        ..ResponseMeta::default()
    };
    Ok(respond::json_response(&headers, body, meta, metrics))
}

/// `GET /d/filter/{s}/time/{prop}` — two-pass time histogram over epoch
/// seconds, rendered back as timestamps.
pub async fn time_filter_get(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Path((s, prop)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let started = Instant::now();
    let search_state = strict_state(&ctx, &s)?;
    let prop = parse_prop(&prop)?;
    let mut metrics = Metrics { state: started.elapsed(), ..Metrics::default() };
    let site = ctx.sites.resolve(host(&headers))?;

    let (subtree, es, esi) = run_aggregation_search(
        &ctx,
        &headers,
        &site,
        &search_state,
        aggregate::time_stats_aggregations(&prop),
    )
    .await?;
    metrics.es += es;
    metrics.esi += esi;
    let Some((min, max)) = aggregate::reshape_time_stats(subtree)? else {
        let body = encode(&Vec::<aggregate::TimeHistogramBucket>::new())?;
        return Ok(respond::json_response(&headers, body, ResponseMeta::with_total("0"), metrics));
    };

    let (offset, interval) = aggregate::time_histogram_params(min, max);
    let (subtree, es, esi) = run_aggregation_search(
        &ctx,
        &headers,
        &site,
        &search_state,
        aggregate::time_histogram_aggregations(&prop, offset, interval),
    )
    .await?;
    metrics.es += es;
    metrics.esi += esi;

    let decode_started = Instant::now();
    let buckets = aggregate::reshape_time_histogram(subtree)?;
    let body = encode(&buckets)?;
    metrics.decode = decode_started.elapsed();

    let meta = ResponseMeta {
        total: Some(buckets.len().to_string()),
        min: Some(Timestamp::from_epoch_seconds(min).to_string()),
        max: Some(Timestamp::from_epoch_seconds(max).to_string()),
        interval: (min != max).then(|| interval.to_string()),
        ..ResponseMeta::default()
    };
    Ok(respond::json_response(&headers, body, meta, metrics))
}

/// `GET /d/filter/{s}/size` — two-pass histogram over stored document byte
/// sizes. Only for sites whose index records `_size`.
pub async fn size_filter_get(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Path(s): Path<String>,
) -> Result<Response, ApiError> {
    let started = Instant::now();
    let search_state = strict_state(&ctx, &s)?;
    let site = ctx.sites.resolve(host(&headers))?;
    if !site.size_field {
        return Err(ApiError::NotFound);
    }
    let mut metrics = Metrics { state: started.elapsed(), ..Metrics::default() };

    let (subtree, es, esi) = run_aggregation_search(
        &ctx,
        &headers,
        &site,
        &search_state,
        aggregate::size_stats_aggregations(),
    )
    .await?;
    metrics.es += es;
    metrics.esi += esi;
    let Some((min, max)) = aggregate::reshape_size_stats(subtree)? else {
        let body = encode(&Vec::<aggregate::HistogramBucket>::new())?;
        return Ok(respond::json_response(&headers, body, ResponseMeta::with_total("0"), metrics));
    };

    let params = aggregate::histogram_params(min, max, 0.0);
    let (subtree, es, esi) = run_aggregation_search(
        &ctx,
        &headers,
        &site,
        &search_state,
        aggregate::size_histogram_aggregations(params),
    )
    .await?;
    metrics.es += es;
    metrics.esi += esi;

    let decode_started = Instant::now();
    let buckets = aggregate::reshape_size_histogram(subtree)?;
    let body = encode(&buckets)?;
    metrics.decode = decode_started.elapsed();

    let meta = ResponseMeta {
        total: Some(buckets.len().to_string()),
        min: Some(min.to_string()),
        max: Some(max.to_string()),
        interval: (min != max).then(|| params.interval.to_string()),
        ..ResponseMeta::default()
    };
    Ok(respond::json_response(&headers, body, meta, metrics))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inject_id_splices_before_the_closing_brace() {
        assert_eq!(
            inject_id(r#"{"name":{"en":"x"}}"#, "D1"),
            r#"{"name":{"en":"x"},"_id":"D1"}"#
        );
        assert_eq!(inject_id("{}", "D1"), r#"{"_id":"D1"}"#);
        assert_eq!(inject_id("{ }", "D1"), r#"{ "_id":"D1"}"#);
        // trailing whitespace after the object is tolerated
        assert_eq!(inject_id("{\"a\":1}\n", "D1"), "{\"a\":1,\"_id\":\"D1\"}");
        // non-objects pass through untouched
        assert_eq!(inject_id("null", "D1"), "null");
    }

    #[test]
    fn canonical_query_orders_and_encodes() {
        let id = Identifier::new();
        let search_state = SearchState {
            id: id.clone(),
            root_id: id.clone(),
            parent_id: None,
            text: "füü bar".to_string(),
            filters: None,
        };
        let query = canonical_query(&search_state, None);
        assert!(query.starts_with(&format!("s={id}&q=")));
        assert!(!query.contains("at="));
        let query = canonical_query(&search_state, Some("r/3"));
        assert!(query.ends_with("&at=r%2F3"));
    }
}
