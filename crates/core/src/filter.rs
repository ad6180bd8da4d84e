//! The filter algebra: a nestable boolean tree of typed predicates.
//!
//! Clients send filters as strict JSON (unknown fields rejected); a tree is
//! validated before use and compiles to an index query against the nested
//! `claims.*` paths. Exactly one variant per node may be populated —
//! `and`/`or`/`not` combinators or one of the six leaf predicates.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::FilterError;
use crate::identifier::Identifier;
use crate::time::Timestamp;
use crate::unit::Unit;

fn is_false(b: &bool) -> bool {
    !*b
}

/// Match documents related to a value through a property, or documents with
/// no relation claim for the property at all (`none`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelFilter {
    pub prop: Identifier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Identifier>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub none: bool,
}

/// Match documents whose amount claim for a property and unit falls in
/// `[gte, lte]`, or documents without such a claim (`none`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AmountFilter {
    pub prop: Identifier,
    pub unit: Unit,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gte: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lte: Option<f64>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub none: bool,
}

/// Match documents whose time claim for a property falls in `[gte, lte]`,
/// or documents without such a claim (`none`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeFilter {
    pub prop: Identifier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gte: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lte: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub none: bool,
}

/// Match documents with an exact string claim value for a property, or
/// documents without such a claim (`none`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StringFilter {
    pub prop: Identifier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub str: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub none: bool,
}

/// Match documents stored in a physical index / alias member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexFilter {
    pub str: String,
}

/// Match documents by their stored byte size, or documents without a
/// recorded size (`none`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SizeFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gte: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lte: Option<f64>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub none: bool,
}

/// A filter tree node. Exactly one field may be populated; [`Filters::valid`]
/// enforces this together with the per-leaf rules, and must pass before
/// [`Filters::compile`] is called.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Filters {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub and: Vec<Filters>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub or: Vec<Filters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not: Option<Box<Filters>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rel: Option<RelFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<AmountFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<TimeFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub str: Option<StringFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<IndexFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<SizeFilter>,
}

impl Filters {
    fn populated(&self) -> usize {
        usize::from(!self.and.is_empty())
            + usize::from(!self.or.is_empty())
            + usize::from(self.not.is_some())
            + usize::from(self.rel.is_some())
            + usize::from(self.amount.is_some())
            + usize::from(self.time.is_some())
            + usize::from(self.str.is_some())
            + usize::from(self.index.is_some())
            + usize::from(self.size.is_some())
    }

    /// Validate the whole tree. `and`/`or` require non-empty children (an
    /// empty array counts as unpopulated) and recurse; leaves enforce their
    /// value-or-none rules.
    pub fn valid(&self) -> Result<(), FilterError> {
        let populated = self.populated();
        if populated != 1 {
            return Err(FilterError::NotExactlyOne(populated));
        }
        for child in self.and.iter().chain(self.or.iter()) {
            child.valid()?;
        }
        if let Some(not) = &self.not {
            not.valid()?;
        }
        if let Some(rel) = &self.rel {
            if rel.value.is_some() == rel.none {
                return Err(FilterError::RelValueOrNone);
            }
        }
        if let Some(amount) = &self.amount {
            if !amount.unit.comparable() {
                return Err(FilterError::AmountCustomUnit);
            }
            let range = amount.gte.is_some() && amount.lte.is_some();
            let partial = amount.gte.is_some() != amount.lte.is_some();
            if partial || range == amount.none {
                return Err(FilterError::AmountBounds);
            }
        }
        if let Some(time) = &self.time {
            let range = time.gte.is_some() && time.lte.is_some();
            let partial = time.gte.is_some() != time.lte.is_some();
            if partial || range == time.none {
                return Err(FilterError::TimeBounds);
            }
        }
        if let Some(str_filter) = &self.str {
            if str_filter.str.is_some() == str_filter.none {
                return Err(FilterError::StrValueOrNone);
            }
        }
        if let Some(index) = &self.index {
            if index.str.is_empty() {
                return Err(FilterError::EmptyIndex);
            }
        }
        if let Some(size) = &self.size {
            let range = size.gte.is_some() && size.lte.is_some();
            let partial = size.gte.is_some() != size.lte.is_some();
            if partial || range == size.none {
                return Err(FilterError::SizeBounds);
            }
        }
        Ok(())
    }

    /// Compile a validated tree to an index query.
    ///
    /// # Panics
    /// Panics on an invalid tree; [`Filters::valid`] is a precondition.
    pub fn compile(&self) -> Value {
        if !self.and.is_empty() {
            let children: Vec<Value> = self.and.iter().map(Filters::compile).collect();
            return json!({ "bool": { "must": children } });
        }
        if !self.or.is_empty() {
            let children: Vec<Value> = self.or.iter().map(Filters::compile).collect();
            return json!({ "bool": { "should": children } });
        }
        if let Some(not) = &self.not {
            return json!({ "bool": { "must_not": [not.compile()] } });
        }
        if let Some(rel) = &self.rel {
            return rel.compile();
        }
        if let Some(amount) = &self.amount {
            return amount.compile();
        }
        if let Some(time) = &self.time {
            return time.compile();
        }
        if let Some(str_filter) = &self.str {
            return str_filter.compile();
        }
        if let Some(index) = &self.index {
            return json!({ "term": { "_index": index.str } });
        }
        if let Some(size) = &self.size {
            return size.compile();
        }
        panic!("compiling a filter node with no populated variant; validate first")
    }
}

impl RelFilter {
    fn compile(&self) -> Value {
        match &self.value {
            Some(value) => json!({
                "nested": {
                    "path": "claims.rel",
                    "query": {
                        "bool": {
                            "must": [
                                { "term": { "claims.rel.prop._id": self.prop } },
                                { "term": { "claims.rel.to._id": value } },
                            ]
                        }
                    }
                }
            }),
            None if self.none => json!({
                "bool": {
                    "must_not": [{
                        "nested": {
                            "path": "claims.rel",
                            "query": { "term": { "claims.rel.prop._id": self.prop } }
                        }
                    }]
                }
            }),
            None => panic!("compiling an invalid rel filter; validate first"),
        }
    }
}

impl AmountFilter {
    fn compile(&self) -> Value {
        let prop_and_unit = json!([
            { "term": { "claims.amount.prop._id": self.prop } },
            { "term": { "claims.amount.unit": self.unit } },
        ]);
        match (self.gte, self.lte) {
            (Some(gte), Some(lte)) => json!({
                "nested": {
                    "path": "claims.amount",
                    "query": {
                        "bool": {
                            "must": [
                                { "term": { "claims.amount.prop._id": self.prop } },
                                { "term": { "claims.amount.unit": self.unit } },
                                { "range": { "claims.amount.amount": { "gte": gte, "lte": lte } } },
                            ]
                        }
                    }
                }
            }),
            (None, None) if self.none => json!({
                "bool": {
                    "must_not": [{
                        "nested": {
                            "path": "claims.amount",
                            "query": { "bool": { "must": prop_and_unit } }
                        }
                    }]
                }
            }),
            _ => panic!("compiling an invalid amount filter; validate first"),
        }
    }
}

impl TimeFilter {
    fn compile(&self) -> Value {
        match (self.gte, self.lte) {
            (Some(gte), Some(lte)) => json!({
                "nested": {
                    "path": "claims.time",
                    "query": {
                        "bool": {
                            "must": [
                                { "term": { "claims.time.prop._id": self.prop } },
                                {
                                    "range": {
                                        "claims.time.timestamp": {
                                            "gte": gte.to_epoch_seconds(),
                                            "lte": lte.to_epoch_seconds(),
                                        }
                                    }
                                },
                            ]
                        }
                    }
                }
            }),
            (None, None) if self.none => json!({
                "bool": {
                    "must_not": [{
                        "nested": {
                            "path": "claims.time",
                            "query": { "term": { "claims.time.prop._id": self.prop } }
                        }
                    }]
                }
            }),
            _ => panic!("compiling an invalid time filter; validate first"),
        }
    }
}

impl StringFilter {
    fn compile(&self) -> Value {
        match &self.str {
            Some(value) => json!({
                "nested": {
                    "path": "claims.string",
                    "query": {
                        "bool": {
                            "must": [
                                { "term": { "claims.string.prop._id": self.prop } },
                                { "term": { "claims.string.string": value } },
                            ]
                        }
                    }
                }
            }),
            None if self.none => json!({
                "bool": {
                    "must_not": [{
                        "nested": {
                            "path": "claims.string",
                            "query": { "term": { "claims.string.prop._id": self.prop } }
                        }
                    }]
                }
            }),
            None => panic!("compiling an invalid str filter; validate first"),
        }
    }
}

impl SizeFilter {
    fn compile(&self) -> Value {
        match (self.gte, self.lte) {
            (Some(gte), Some(lte)) => json!({
                "range": { "_size": { "gte": gte, "lte": lte } }
            }),
            (None, None) if self.none => json!({
                "bool": { "must_not": [{ "exists": { "field": "_size" } }] }
            }),
            _ => panic!("compiling an invalid size filter; validate first"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const P1: &str = "JT9bhAfn5QnDzRyYLh2MV1";
    const T1: &str = "CAfaGKVcf5m1fVfJfB4fhg";

    fn rel_leaf(prop: &str, value: &str) -> Filters {
        Filters {
            rel: Some(RelFilter {
                prop: prop.parse().unwrap(),
                value: Some(value.parse().unwrap()),
                none: false,
            }),
            ..Filters::default()
        }
    }

    #[test]
    fn empty_node_is_invalid() {
        assert_eq!(Filters::default().valid(), Err(FilterError::NotExactlyOne(0)));
    }

    #[test]
    fn multi_populated_node_is_invalid() {
        let mut filters = rel_leaf(P1, T1);
        filters.index = Some(IndexFilter { str: "docs".to_string() });
        assert_eq!(filters.valid(), Err(FilterError::NotExactlyOne(2)));
    }

    #[test]
    fn empty_and_or_are_unpopulated() {
        let filters = Filters { and: Vec::new(), ..Filters::default() };
        assert_eq!(filters.valid(), Err(FilterError::NotExactlyOne(0)));
    }

    #[test]
    fn combinators_recurse() {
        let valid = Filters { and: vec![rel_leaf(P1, T1)], ..Filters::default() };
        assert_eq!(valid.valid(), Ok(()));

        let invalid_child = Filters { or: vec![Filters::default()], ..Filters::default() };
        assert_eq!(invalid_child.valid(), Err(FilterError::NotExactlyOne(0)));

        let not = Filters { not: Some(Box::new(rel_leaf(P1, T1))), ..Filters::default() };
        assert_eq!(not.valid(), Ok(()));
    }

    #[test]
    fn rel_requires_value_or_none() {
        let both = Filters {
            rel: Some(RelFilter {
                prop: P1.parse().unwrap(),
                value: Some(T1.parse().unwrap()),
                none: true,
            }),
            ..Filters::default()
        };
        assert_eq!(both.valid(), Err(FilterError::RelValueOrNone));

        let neither = Filters {
            rel: Some(RelFilter { prop: P1.parse().unwrap(), value: None, none: false }),
            ..Filters::default()
        };
        assert_eq!(neither.valid(), Err(FilterError::RelValueOrNone));
    }

    #[test]
    fn amount_bounds_and_unit_rules() {
        let partial = Filters {
            amount: Some(AmountFilter {
                prop: P1.parse().unwrap(),
                unit: Unit::Kilogram,
                gte: Some(1.0),
                lte: None,
                none: false,
            }),
            ..Filters::default()
        };
        assert_eq!(partial.valid(), Err(FilterError::AmountBounds));

        let custom = Filters {
            amount: Some(AmountFilter {
                prop: P1.parse().unwrap(),
                unit: Unit::Custom,
                gte: Some(1.0),
                lte: Some(2.0),
                none: false,
            }),
            ..Filters::default()
        };
        assert_eq!(custom.valid(), Err(FilterError::AmountCustomUnit));

        let range = Filters {
            amount: Some(AmountFilter {
                prop: P1.parse().unwrap(),
                unit: Unit::Kilogram,
                gte: Some(1.0),
                lte: Some(2.0),
                none: false,
            }),
            ..Filters::default()
        };
        assert_eq!(range.valid(), Ok(()));

        let none = Filters {
            amount: Some(AmountFilter {
                prop: P1.parse().unwrap(),
                unit: Unit::Kilogram,
                gte: None,
                lte: None,
                none: true,
            }),
            ..Filters::default()
        };
        assert_eq!(none.valid(), Ok(()));
    }

    #[test]
    fn strict_json_rejects_unknown_fields() {
        assert!(serde_json::from_str::<Filters>(r#"{"bogus": 1}"#).is_err());
        assert!(serde_json::from_str::<Filters>(
            r#"{"rel": {"prop": "JT9bhAfn5QnDzRyYLh2MV1", "extra": true}}"#
        )
        .is_err());
        // invalid identifiers fail at parse time
        assert!(serde_json::from_str::<Filters>(r#"{"rel": {"prop": "nope", "none": true}}"#)
            .is_err());
    }

    #[test]
    fn realistic_tree_parses_and_validates() {
        let filters: Filters = serde_json::from_str(
            r#"{
                "and": [
                    {"rel": {"prop": "JT9bhAfn5QnDzRyYLh2MV1", "value": "CAfaGKVcf5m1fVfJfB4fhg"}},
                    {"not": {"amount": {"prop": "JT9bhAfn5QnDzRyYLh2MV1", "unit": "kg", "none": true}}},
                    {"time": {"prop": "JT9bhAfn5QnDzRyYLh2MV1",
                              "gte": "1900-01-01T00:00:00Z", "lte": "2000-01-01T00:00:00Z"}},
                    {"size": {"gte": 0.0, "lte": 1024.0}}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(filters.valid(), Ok(()));
        let round: Filters =
            serde_json::from_value(serde_json::to_value(&filters).unwrap()).unwrap();
        assert_eq!(round, filters);
    }

    #[test]
    fn rel_compiles_to_nested_terms() {
        let compiled = rel_leaf(P1, T1).compile();
        assert_eq!(compiled["nested"]["path"], "claims.rel");
        let must = &compiled["nested"]["query"]["bool"]["must"];
        assert_eq!(must[0]["term"]["claims.rel.prop._id"], P1);
        assert_eq!(must[1]["term"]["claims.rel.to._id"], T1);
    }

    #[test]
    fn none_variants_compile_to_must_not_probes() {
        let filters = Filters {
            rel: Some(RelFilter { prop: P1.parse().unwrap(), value: None, none: true }),
            ..Filters::default()
        };
        let compiled = filters.compile();
        assert_eq!(
            compiled["bool"]["must_not"][0]["nested"]["query"]["term"]["claims.rel.prop._id"],
            P1
        );
    }

    #[test]
    fn time_bounds_compile_to_epoch_seconds() {
        let filters = Filters {
            time: Some(TimeFilter {
                prop: P1.parse().unwrap(),
                gte: Some("1970-01-01T00:00:00Z".parse().unwrap()),
                lte: Some("1970-01-02T00:00:00Z".parse().unwrap()),
                none: false,
            }),
            ..Filters::default()
        };
        let range = &filters.compile()["nested"]["query"]["bool"]["must"][1]["range"];
        assert_eq!(range["claims.time.timestamp"]["gte"], 0);
        assert_eq!(range["claims.time.timestamp"]["lte"], 86_400);
    }

    #[test]
    fn deep_equal_trees_compile_identically() {
        let a = Filters {
            and: vec![
                rel_leaf(P1, T1),
                Filters {
                    size: Some(SizeFilter { gte: Some(1.0), lte: Some(2.0), none: false }),
                    ..Filters::default()
                },
            ],
            ..Filters::default()
        };
        let b = a.clone();
        assert_eq!(a.compile().to_string(), b.compile().to_string());
    }

    #[test]
    #[should_panic(expected = "validate first")]
    fn compiling_invalid_tree_panics() {
        Filters::default().compile();
    }
}
