//! Compilation of a search state into index requests.

use serde_json::{json, Value};

use crate::state::SearchState;
use crate::types::MAX_RESULTS_COUNT;

/// Nested claim fields reached by full-text search, as `(path, field)`.
const NESTED_TEXT_FIELDS: [(&str, &str); 4] = [
    ("claims.id", "claims.id.id"),
    ("claims.ref", "claims.ref.iri"),
    ("claims.text", "claims.text.html.en"),
    ("claims.string", "claims.string.string"),
];

/// The boolean query for a state: text clauses (when the text is non-empty)
/// and the compiled filter tree, both under `must`.
pub fn search_query(state: &SearchState) -> Value {
    let mut must: Vec<Value> = Vec::new();
    if !state.text.is_empty() {
        let mut should = vec![
            // exact id match first, as a boost
            json!({ "term": { "_id": state.text } }),
            json!({
                "simple_query_string": {
                    "query": state.text,
                    "fields": ["name.en"],
                    "default_operator": "and",
                }
            }),
        ];
        for (path, field) in NESTED_TEXT_FIELDS {
            should.push(json!({
                "nested": {
                    "path": path,
                    "query": {
                        "simple_query_string": {
                            "query": state.text,
                            "fields": [field],
                            "default_operator": "and",
                        }
                    }
                }
            }));
        }
        must.push(json!({ "bool": { "should": should } }));
    }
    if let Some(filters) = &state.filters {
        must.push(filters.compile());
    }
    if must.is_empty() {
        json!({ "match_all": {} })
    } else {
        json!({ "bool": { "must": must } })
    }
}

/// The full results request: ids only, capped, exact totals tracked.
pub fn results_request(state: &SearchState) -> Value {
    json!({
        "query": search_query(state),
        "from": 0,
        "size": MAX_RESULTS_COUNT,
        "track_total_hits": true,
        "_source": false,
    })
}

/// A `size=0` aggregation-only request over the state's result set.
pub fn aggregation_request(state: &SearchState, aggregations: Value) -> Value {
    json!({
        "query": search_query(state),
        "size": 0,
        "track_total_hits": true,
        "aggs": aggregations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use claimdex_core::Identifier;

    fn state(text: &str, filters: Option<&str>) -> SearchState {
        let id = Identifier::new();
        SearchState {
            id: id.clone(),
            root_id: id,
            parent_id: None,
            text: text.to_string(),
            filters: filters.map(|raw| serde_json::from_str(raw).unwrap()),
        }
    }

    #[test]
    fn empty_state_matches_everything() {
        assert_eq!(search_query(&state("", None)), json!({ "match_all": {} }));
    }

    #[test]
    fn text_expands_to_six_should_clauses() {
        let query = search_query(&state("tesla", None));
        let should = query["bool"]["must"][0]["bool"]["should"].as_array().unwrap();
        assert_eq!(should.len(), 6);
        assert_eq!(should[0]["term"]["_id"], "tesla");
        assert_eq!(should[1]["simple_query_string"]["fields"][0], "name.en");
        let nested_paths: Vec<&str> =
            should[2..].iter().map(|c| c["nested"]["path"].as_str().unwrap()).collect();
        assert_eq!(nested_paths, vec!["claims.id", "claims.ref", "claims.text", "claims.string"]);
        for clause in &should[2..] {
            assert_eq!(
                clause["nested"]["query"]["simple_query_string"]["default_operator"],
                "and"
            );
        }
    }

    #[test]
    fn filters_compile_under_must() {
        let query = search_query(&state(
            "tesla",
            Some(r#"{"rel": {"prop": "JT9bhAfn5QnDzRyYLh2MV1", "none": true}}"#),
        ));
        let must = query["bool"]["must"].as_array().unwrap();
        assert_eq!(must.len(), 2);
        assert!(must[1]["bool"]["must_not"].is_array());

        // filters alone still produce a bool query
        let query = search_query(&state(
            "",
            Some(r#"{"index": {"str": "docs"}}"#),
        ));
        assert_eq!(query["bool"]["must"][0]["term"]["_index"], "docs");
    }

    #[test]
    fn results_request_shape() {
        let request = results_request(&state("x", None));
        assert_eq!(request["size"], 1000);
        assert_eq!(request["from"], 0);
        assert_eq!(request["track_total_hits"], true);
        assert_eq!(request["_source"], false);
    }

    #[test]
    fn compilation_is_deterministic() {
        let a = state("foo", Some(r#"{"and": [{"size": {"gte": 1.0, "lte": 2.0}}]}"#));
        let b = SearchState { text: a.text.clone(), filters: a.filters.clone(), ..state("", None) };
        assert_eq!(search_query(&a).to_string(), search_query(&b).to_string());
    }
}
