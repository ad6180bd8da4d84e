//! Aggregation bodies and reshaping for the filter endpoints.
//!
//! Every endpoint here follows one shape: build named aggregations over the
//! current search query, run a `size=0` search, decode the aggregation
//! subtree into a typed form, and reconcile the approximate cardinality
//! "total" with the buckets actually returned. The histogram endpoints are
//! two-pass: a min/max discovery pass fixes the bin parameters, then the
//! histogram pass fills them.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use claimdex_core::{Identifier, Timestamp, Unit};

use crate::error::ApiError;
use crate::index::IndexError;
use crate::site::Site;
use crate::types::{BUCKETS_COUNT, CARDINALITY_PRECISION_MAX, MAX_RESULTS_COUNT};

// ---------------------------------------------------------------------------
// Shared decode shapes and reconciliation
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Buckets<T> {
    buckets: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct DocCount {
    doc_count: i64,
}

#[derive(Debug, Deserialize)]
struct Cardinality {
    value: i64,
}

/// `min`/`max` report `null` over an empty set; `sum` reports `0`.
#[derive(Debug, Deserialize)]
struct AggValue {
    value: Option<f64>,
}

fn decode<T: DeserializeOwned>(aggregations: Value) -> Result<T, ApiError> {
    serde_json::from_value(aggregations).map_err(|e| ApiError::Upstream(IndexError::Decode(e)))
}

/// Cardinality estimates are approximate; never report fewer values than
/// the buckets actually returned.
pub fn reconcile(cardinality: i64, buckets: usize) -> i64 {
    cardinality.max(buckets as i64)
}

/// Precision threshold for a cardinality aggregation: twice the known
/// domain bound when one exists, capped at the index's maximum.
pub fn precision_threshold(bound: Option<i64>) -> i64 {
    match bound {
        Some(bound) if bound > 0 => (2 * bound).min(CARDINALITY_PRECISION_MAX),
        _ => CARDINALITY_PRECISION_MAX,
    }
}

// ---------------------------------------------------------------------------
// Filters discoverer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    Rel,
    Amount,
    Time,
}

/// One property applicable as a filter over the current result set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterableProperty {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: PropertyKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<Unit>,
    pub count: i64,
}

/// Three sibling aggregations discovering which properties can filter the
/// current result set: relation, amount (excluding the custom unit), and
/// time. Ordered by how many documents each property reaches.
pub fn discoverer_aggregations(site: &Site) -> Value {
    let props = precision_threshold(Some(site.properties_total()));
    let pairs = precision_threshold(Some(site.properties_total() * Unit::ALL.len() as i64));
    json!({
        "rel": {
            "nested": { "path": "claims.rel" },
            "aggs": {
                "props": {
                    "terms": {
                        "field": "claims.rel.prop._id",
                        "size": MAX_RESULTS_COUNT,
                        "order": { "docs": "desc" },
                    },
                    "aggs": { "docs": { "reverse_nested": {} } }
                },
                "total": {
                    "cardinality": {
                        "field": "claims.rel.prop._id",
                        "precision_threshold": props,
                    }
                }
            }
        },
        "amount": {
            "nested": { "path": "claims.amount" },
            "aggs": {
                "unit": {
                    "filter": {
                        "bool": { "must_not": [{ "term": { "claims.amount.unit": "@" } }] }
                    },
                    "aggs": {
                        "props": {
                            "multi_terms": {
                                "terms": [
                                    { "field": "claims.amount.prop._id" },
                                    { "field": "claims.amount.unit" },
                                ],
                                "size": MAX_RESULTS_COUNT,
                                "order": { "docs": "desc" },
                            },
                            "aggs": { "docs": { "reverse_nested": {} } }
                        },
                        "total": {
                            "cardinality": {
                                "script": {
                                    "source": "doc['claims.amount.prop._id'].value + '|' + doc['claims.amount.unit'].value",
                                },
                                "precision_threshold": pairs,
                            }
                        }
                    }
                }
            }
        },
        "time": {
            "nested": { "path": "claims.time" },
            "aggs": {
                "props": {
                    "terms": {
                        "field": "claims.time.prop._id",
                        "size": MAX_RESULTS_COUNT,
                        "order": { "docs": "desc" },
                    },
                    "aggs": { "docs": { "reverse_nested": {} } }
                },
                "total": {
                    "cardinality": {
                        "field": "claims.time.prop._id",
                        "precision_threshold": props,
                    }
                }
            }
        }
    })
}

#[derive(Debug, Deserialize)]
struct TermBucket {
    key: String,
    docs: DocCount,
}

#[derive(Debug, Deserialize)]
struct PairBucket {
    key: Vec<String>,
    docs: DocCount,
}

#[derive(Debug, Deserialize)]
struct PropsAgg {
    props: Buckets<TermBucket>,
    total: Cardinality,
}

#[derive(Debug, Deserialize)]
struct AmountUnitAgg {
    props: Buckets<PairBucket>,
    total: Cardinality,
}

#[derive(Debug, Deserialize)]
struct AmountOuterAgg {
    unit: AmountUnitAgg,
}

#[derive(Debug, Deserialize)]
struct DiscovererAggs {
    rel: PropsAgg,
    amount: AmountOuterAgg,
    time: PropsAgg,
}

/// Flatten the three discoverer aggregations into one list tagged by type,
/// stably sorted by document count, capped, with the reconciled totals
/// summed.
pub fn reshape_discoverer(aggregations: Value) -> Result<(Vec<FilterableProperty>, i64), ApiError> {
    let aggs: DiscovererAggs = decode(aggregations)?;

    let mut rows: Vec<FilterableProperty> = Vec::new();
    for bucket in &aggs.rel.props.buckets {
        rows.push(FilterableProperty {
            id: bucket.key.clone(),
            kind: PropertyKind::Rel,
            unit: None,
            count: bucket.docs.doc_count,
        });
    }
    for bucket in &aggs.amount.unit.props.buckets {
        let (Some(prop), Some(unit_tag)) = (bucket.key.first(), bucket.key.get(1)) else {
            warn!(key = ?bucket.key, "amount bucket key is not a (property, unit) pair");
            continue;
        };
        let Ok(unit) = unit_tag.parse::<Unit>() else {
            warn!(unit = unit_tag.as_str(), "amount bucket carries an unknown unit tag");
            continue;
        };
        rows.push(FilterableProperty {
            id: prop.clone(),
            kind: PropertyKind::Amount,
            unit: Some(unit),
            count: bucket.docs.doc_count,
        });
    }
    for bucket in &aggs.time.props.buckets {
        rows.push(FilterableProperty {
            id: bucket.key.clone(),
            kind: PropertyKind::Time,
            unit: None,
            count: bucket.docs.doc_count,
        });
    }

    let total = reconcile(aggs.rel.total.value, aggs.rel.props.buckets.len())
        + reconcile(aggs.amount.unit.total.value, aggs.amount.unit.props.buckets.len())
        + reconcile(aggs.time.total.value, aggs.time.props.buckets.len());

    // stable: equal counts keep the rel -> amount -> time flattening order
    rows.sort_by(|a, b| b.count.cmp(&a.count));
    rows.truncate(MAX_RESULTS_COUNT);
    Ok((rows, total))
}

// ---------------------------------------------------------------------------
// Terms distributions (rel, string, index)
// ---------------------------------------------------------------------------

/// A related-document value and the number of documents carrying it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TermCount {
    pub id: String,
    pub count: i64,
}

/// A string (or index) value and the number of documents carrying it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StringCount {
    pub str: String,
    pub count: i64,
}

fn nested_terms_distribution(path: &str, prop_field: &str, value_field: &str, prop: &Identifier) -> Value {
    json!({
        "dist": {
            "nested": { "path": path },
            "aggs": {
                "prop": {
                    "filter": { "term": { prop_field: prop } },
                    "aggs": {
                        "values": {
                            "terms": {
                                "field": value_field,
                                "size": MAX_RESULTS_COUNT,
                                "order": { "docs": "desc" },
                            },
                            "aggs": { "docs": { "reverse_nested": {} } }
                        },
                        "total": {
                            "cardinality": {
                                "field": value_field,
                                "precision_threshold": CARDINALITY_PRECISION_MAX,
                            }
                        }
                    }
                }
            }
        }
    })
}

/// Value distribution for a relation filter: which documents the property
/// points at, over the current result set.
pub fn rel_distribution_aggregations(prop: &Identifier) -> Value {
    nested_terms_distribution("claims.rel", "claims.rel.prop._id", "claims.rel.to._id", prop)
}

/// Value distribution for a string filter: the exact keyword values of the
/// property's string claims.
pub fn string_distribution_aggregations(prop: &Identifier) -> Value {
    nested_terms_distribution(
        "claims.string",
        "claims.string.prop._id",
        "claims.string.string",
        prop,
    )
}

#[derive(Debug, Deserialize)]
struct FilteredTerms {
    values: Buckets<TermBucket>,
    total: Cardinality,
}

#[derive(Debug, Deserialize)]
struct NestedDist<T> {
    prop: T,
}

#[derive(Debug, Deserialize)]
struct DistributionAggs<T> {
    dist: T,
}

fn reshape_nested_terms(aggregations: Value) -> Result<(Vec<(String, i64)>, i64), ApiError> {
    let aggs: DistributionAggs<NestedDist<FilteredTerms>> = decode(aggregations)?;
    let terms = aggs.dist.prop;
    let total = reconcile(terms.total.value, terms.values.buckets.len());
    let rows = terms
        .values
        .buckets
        .into_iter()
        .map(|bucket| (bucket.key, bucket.docs.doc_count))
        .collect();
    Ok((rows, total))
}

pub fn reshape_rel_distribution(aggregations: Value) -> Result<(Vec<TermCount>, i64), ApiError> {
    let (rows, total) = reshape_nested_terms(aggregations)?;
    Ok((rows.into_iter().map(|(id, count)| TermCount { id, count }).collect(), total))
}

pub fn reshape_string_distribution(
    aggregations: Value,
) -> Result<(Vec<StringCount>, i64), ApiError> {
    let (rows, total) = reshape_nested_terms(aggregations)?;
    Ok((rows.into_iter().map(|(str, count)| StringCount { str, count }).collect(), total))
}

/// Value distribution over the physical `_index` each hit lives in. Only
/// interesting when the site's index is an alias with several members.
pub fn index_distribution_aggregations() -> Value {
    json!({
        "dist": {
            "terms": { "field": "_index", "size": MAX_RESULTS_COUNT }
        },
        "total": {
            "cardinality": { "field": "_index", "precision_threshold": CARDINALITY_PRECISION_MAX }
        }
    })
}

#[derive(Debug, Deserialize)]
struct PlainBucket {
    key: String,
    doc_count: i64,
}

#[derive(Debug, Deserialize)]
struct IndexAggs {
    dist: Buckets<PlainBucket>,
    total: Cardinality,
}

pub fn reshape_index_distribution(
    aggregations: Value,
) -> Result<(Vec<StringCount>, i64), ApiError> {
    let aggs: IndexAggs = decode(aggregations)?;
    let total = reconcile(aggs.total.value, aggs.dist.buckets.len());
    let rows = aggs
        .dist
        .buckets
        .into_iter()
        .map(|bucket| StringCount { str: bucket.key, count: bucket.doc_count })
        .collect();
    Ok((rows, total))
}

// ---------------------------------------------------------------------------
// Histogram binning
// ---------------------------------------------------------------------------

/// Bin parameters for the second histogram pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistogramParams {
    pub offset: f64,
    pub interval: f64,
}

/// Compute bin parameters from the observed range.
///
/// Constant data gets a single bucket. A small all-integer domain keeps
/// integer-aligned unit bins. Otherwise the interval is nudged past
/// `(max - min) / 100` with `next_up` so the maximum lands inside the
/// topmost of exactly one hundred bins instead of opening bucket 101.
pub fn histogram_params(min: f64, max: f64, discrete_sum: f64) -> HistogramParams {
    let buckets = BUCKETS_COUNT as f64;
    if min == max {
        let up = min.next_up();
        let interval = if up > 0.0 { up } else { up - min };
        return HistogramParams { offset: min, interval };
    }
    if discrete_sum == 0.0 && max - min < buckets {
        return HistogramParams { offset: min, interval: 1.0 };
    }
    let interval = (max.next_up() - min) / buckets;
    let interval2 = (max - min) / buckets;
    let interval = if interval == interval2 { interval2.next_up() } else { interval };
    HistogramParams { offset: min, interval }
}

/// Bin parameters for the time histogram, in integer epoch seconds: the
/// integer analogue of the `next_up` rule. Ceiling division yields exactly
/// one hundred bins whenever a whole-second interval can, and the bump on
/// spans the bin count divides exactly keeps the maximum out of a
/// hundred-and-first bucket. Spans too short for a hundred whole-second
/// bins produce fewer, never more.
pub fn time_histogram_params(min: i64, max: i64) -> (i64, i64) {
    let buckets = BUCKETS_COUNT as i64;
    let span = max - min;
    let interval = if span % buckets == 0 {
        span / buckets + 1
    } else {
        (span + buckets - 1) / buckets
    };
    (min, interval)
}

/// First-pass statistics over the filtered amounts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistogramStats {
    pub count: i64,
    pub min: f64,
    pub max: f64,
    pub discrete: f64,
}

fn amount_filter(prop: &Identifier, unit: Unit) -> Value {
    json!({
        "bool": {
            "must": [
                { "term": { "claims.amount.prop._id": prop } },
                { "term": { "claims.amount.unit": unit } },
            ]
        }
    })
}

/// First pass: min, max, and a discreteness probe (the summed distance of
/// each amount from its floor; zero means every value is an integer).
pub fn amount_stats_aggregations(prop: &Identifier, unit: Unit) -> Value {
    json!({
        "dist": {
            "nested": { "path": "claims.amount" },
            "aggs": {
                "prop": {
                    "filter": amount_filter(prop, unit),
                    "aggs": {
                        "min": { "min": { "field": "claims.amount.amount" } },
                        "max": { "max": { "field": "claims.amount.amount" } },
                        "discrete": {
                            "sum": {
                                "script": {
                                    "source": "Math.abs(doc['claims.amount.amount'].value - Math.floor(doc['claims.amount.amount'].value))",
                                }
                            }
                        }
                    }
                }
            }
        }
    })
}

#[derive(Debug, Deserialize)]
struct StatsFiltered {
    doc_count: i64,
    min: AggValue,
    max: AggValue,
    discrete: AggValue,
}

/// Decode the first pass; `None` means the filtered set is empty and the
/// endpoint should answer with an empty histogram.
pub fn reshape_amount_stats(aggregations: Value) -> Result<Option<HistogramStats>, ApiError> {
    let aggs: DistributionAggs<NestedDist<StatsFiltered>> = decode(aggregations)?;
    let stats = aggs.dist.prop;
    let (Some(min), Some(max)) = (stats.min.value, stats.max.value) else {
        return Ok(None);
    };
    if stats.doc_count == 0 {
        return Ok(None);
    }
    Ok(Some(HistogramStats {
        count: stats.doc_count,
        min,
        max,
        discrete: stats.discrete.value.unwrap_or(0.0),
    }))
}

/// One histogram bin keyed by its inclusive lower bound.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBucket {
    pub min: f64,
    pub count: i64,
}

/// One time-histogram bin keyed by its inclusive lower bound.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeHistogramBucket {
    pub min: Timestamp,
    pub count: i64,
}

/// Second pass: the histogram itself, with parameters from the first pass.
pub fn amount_histogram_aggregations(
    prop: &Identifier,
    unit: Unit,
    params: HistogramParams,
) -> Value {
    json!({
        "dist": {
            "nested": { "path": "claims.amount" },
            "aggs": {
                "prop": {
                    "filter": amount_filter(prop, unit),
                    "aggs": {
                        "values": {
                            "histogram": {
                                "field": "claims.amount.amount",
                                "offset": params.offset,
                                "interval": params.interval,
                                "min_doc_count": 0,
                            },
                            "aggs": { "docs": { "reverse_nested": {} } }
                        }
                    }
                }
            }
        }
    })
}

#[derive(Debug, Deserialize)]
struct HistBucket {
    key: f64,
    docs: DocCount,
}

#[derive(Debug, Deserialize)]
struct FilteredHistogram {
    values: Buckets<HistBucket>,
}

pub fn reshape_amount_histogram(aggregations: Value) -> Result<Vec<HistogramBucket>, ApiError> {
    let aggs: DistributionAggs<NestedDist<FilteredHistogram>> = decode(aggregations)?;
    Ok(aggs
        .dist
        .prop
        .values
        .buckets
        .into_iter()
        .map(|bucket| HistogramBucket { min: bucket.key, count: bucket.docs.doc_count })
        .collect())
}

// ---------------------------------------------------------------------------
// Time histogram
// ---------------------------------------------------------------------------

fn time_filter(prop: &Identifier) -> Value {
    json!({ "term": { "claims.time.prop._id": prop } })
}

pub fn time_stats_aggregations(prop: &Identifier) -> Value {
    json!({
        "dist": {
            "nested": { "path": "claims.time" },
            "aggs": {
                "prop": {
                    "filter": time_filter(prop),
                    "aggs": {
                        "min": { "min": { "field": "claims.time.timestamp" } },
                        "max": { "max": { "field": "claims.time.timestamp" } },
                    }
                }
            }
        }
    })
}

#[derive(Debug, Deserialize)]
struct TimeStatsFiltered {
    doc_count: i64,
    min: AggValue,
    max: AggValue,
}

/// Decode the first pass into epoch-second bounds; `None` when empty.
pub fn reshape_time_stats(aggregations: Value) -> Result<Option<(i64, i64)>, ApiError> {
    let aggs: DistributionAggs<NestedDist<TimeStatsFiltered>> = decode(aggregations)?;
    let stats = aggs.dist.prop;
    let (Some(min), Some(max)) = (stats.min.value, stats.max.value) else {
        return Ok(None);
    };
    if stats.doc_count == 0 {
        return Ok(None);
    }
    Ok(Some((min.floor() as i64, max.floor() as i64)))
}

pub fn time_histogram_aggregations(prop: &Identifier, offset: i64, interval: i64) -> Value {
    json!({
        "dist": {
            "nested": { "path": "claims.time" },
            "aggs": {
                "prop": {
                    "filter": time_filter(prop),
                    "aggs": {
                        "values": {
                            "histogram": {
                                "field": "claims.time.timestamp",
                                "offset": offset,
                                "interval": interval,
                                "min_doc_count": 0,
                            },
                            "aggs": { "docs": { "reverse_nested": {} } }
                        }
                    }
                }
            }
        }
    })
}

pub fn reshape_time_histogram(aggregations: Value) -> Result<Vec<TimeHistogramBucket>, ApiError> {
    let aggs: DistributionAggs<NestedDist<FilteredHistogram>> = decode(aggregations)?;
    Ok(aggs
        .dist
        .prop
        .values
        .buckets
        .into_iter()
        .map(|bucket| TimeHistogramBucket {
            min: Timestamp::from_epoch_seconds(bucket.key as i64),
            count: bucket.docs.doc_count,
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Size histogram (document-level `_size`, no nesting)
// ---------------------------------------------------------------------------

pub fn size_stats_aggregations() -> Value {
    json!({
        "min": { "min": { "field": "_size" } },
        "max": { "max": { "field": "_size" } },
    })
}

#[derive(Debug, Deserialize)]
struct SizeStatsAggs {
    min: AggValue,
    max: AggValue,
}

pub fn reshape_size_stats(aggregations: Value) -> Result<Option<(f64, f64)>, ApiError> {
    let aggs: SizeStatsAggs = decode(aggregations)?;
    match (aggs.min.value, aggs.max.value) {
        (Some(min), Some(max)) => Ok(Some((min, max))),
        _ => Ok(None),
    }
}

pub fn size_histogram_aggregations(params: HistogramParams) -> Value {
    json!({
        "values": {
            "histogram": {
                "field": "_size",
                "offset": params.offset,
                "interval": params.interval,
                "min_doc_count": 0,
            }
        }
    })
}

#[derive(Debug, Deserialize)]
struct SizeBucket {
    key: f64,
    doc_count: i64,
}

#[derive(Debug, Deserialize)]
struct SizeHistogramAggs {
    values: Buckets<SizeBucket>,
}

pub fn reshape_size_histogram(aggregations: Value) -> Result<Vec<HistogramBucket>, ApiError> {
    let aggs: SizeHistogramAggs = decode(aggregations)?;
    Ok(aggs
        .values
        .buckets
        .into_iter()
        .map(|bucket| HistogramBucket { min: bucket.key, count: bucket.doc_count })
        .collect())
}
