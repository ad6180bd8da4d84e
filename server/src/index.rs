//! Thin client for the Elasticsearch-compatible HTTP API.
//!
//! Only the two calls the gateway needs: `_search` (hits and aggregations)
//! and `_count`. Bodies are built upstream as JSON trees; responses decode
//! into the minimal typed shapes below, with `_source` and aggregation
//! subtrees passed through raw for the caller to interpret.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::value::RawValue;
use serde_json::Value;
use thiserror::Error;

/// Header forwarded to the index for server-side request correlation.
pub const OPAQUE_ID_HEADER: &str = "X-Opaque-Id";

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("index returned status {0}")]
    Status(StatusCode),

    #[error("cannot decode index response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("index response carries no aggregations")]
    NoAggregations,

    #[error("hit carries no _source")]
    NoSource,

    #[error("invalid index URL: {0}")]
    Url(String),
}

/// `hits.total` with its exactness relation.
#[derive(Debug, Clone, Deserialize)]
pub struct HitsTotal {
    pub value: i64,
    pub relation: String,
}

impl HitsTotal {
    /// Render the count, with a `+` suffix when the index reports a lower
    /// bound instead of an exact total.
    pub fn display(&self) -> String {
        if self.relation == "gte" {
            format!("{}+", self.value)
        } else {
            self.value.to_string()
        }
    }
}

/// One hit. `_source` stays raw so document payloads pass through without a
/// decode/encode round trip.
#[derive(Debug, Deserialize)]
pub struct Hit {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_source", default)]
    pub source: Option<Box<RawValue>>,
}

#[derive(Debug, Deserialize)]
pub struct Hits {
    pub total: HitsTotal,
    #[serde(default)]
    pub hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    /// Index-side duration in milliseconds.
    pub took: i64,
    pub hits: Hits,
    #[serde(default)]
    pub aggregations: Option<Value>,
}

impl SearchResponse {
    /// The aggregation subtree, required present.
    pub fn take_aggregations(&mut self) -> Result<Value, IndexError> {
        self.aggregations.take().ok_or(IndexError::NoAggregations)
    }
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: i64,
}

/// The index client. Cheap to share behind an `Arc`; all calls are
/// sequential awaits bound to the request future.
pub struct IndexClient {
    http: reqwest::Client,
    base: reqwest::Url,
}

impl IndexClient {
    pub fn new(url: &str) -> Result<Self, IndexError> {
        let base = reqwest::Url::parse(url).map_err(|e| IndexError::Url(e.to_string()))?;
        let http = reqwest::Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(IndexClient { http, base })
    }

    fn endpoint(&self, index: &str, call: &str) -> Result<reqwest::Url, IndexError> {
        self.base
            .join(&format!("{index}/{call}"))
            .map_err(|e| IndexError::Url(e.to_string()))
    }

    /// `POST /{index}/_search`. `preference` pins shard routing per client;
    /// `request_id` is forwarded as `X-Opaque-Id`. Partial results are
    /// always rejected.
    pub async fn search(
        &self,
        index: &str,
        body: &Value,
        preference: Option<&str>,
        request_id: Option<&str>,
    ) -> Result<SearchResponse, IndexError> {
        let mut url = self.endpoint(index, "_search")?;
        url.query_pairs_mut().append_pair("allow_partial_search_results", "false");
        if let Some(preference) = preference {
            url.query_pairs_mut().append_pair("preference", preference);
        }
        let mut request = self.http.post(url).json(body);
        if let Some(request_id) = request_id {
            request = request.header(OPAQUE_ID_HEADER, request_id);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(IndexError::Status(response.status()));
        }
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// `POST /{index}/_count` with a query.
    pub async fn count(&self, index: &str, query: &Value) -> Result<i64, IndexError> {
        let url = self.endpoint(index, "_count")?;
        let response = self.http.post(url).json(&serde_json::json!({ "query": query })).send().await?;
        if !response.status().is_success() {
            return Err(IndexError::Status(response.status()));
        }
        let bytes = response.bytes().await?;
        let counted: CountResponse = serde_json::from_slice(&bytes)?;
        Ok(counted.count)
    }
}
