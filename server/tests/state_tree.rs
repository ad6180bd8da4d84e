//! Integration tests for the search-state tree.
//!
//! Each test drives the public state functions the handlers use, following
//! the browser flow: submit text, refine it, resubmit the canonical params.

use claimdex_server::state::{get_or_make_search, get_search, make_search, StateForm};
use claimdex_server::types::StateMap;

fn form(s: Option<&str>, q: &str, filters: Option<&str>) -> StateForm {
    StateForm {
        s: s.map(str::to_string),
        q: Some(q.to_string()),
        filters: filters.map(str::to_string),
        at: None,
    }
}

// ---------------------------------------------------------------------------
// The submit / resubmit / refine flow
// ---------------------------------------------------------------------------

#[test]
fn submit_resubmit_refine() {
    let states = StateMap::new();

    // POST /d with q=foo: a root state comes back
    let s1 = make_search(&states, &form(None, "foo", None));
    assert_eq!(s1.text, "foo");
    assert_eq!(s1.root_id, s1.id);
    assert!(s1.parent_id.is_none());

    // POST /d with s=S1, q=foo: the same state, nothing new created
    let before = states.len();
    let (resolved, exact) = get_or_make_search(&states, &form(Some(s1.id.as_str()), "foo", None));
    assert!(exact);
    assert_eq!(resolved.id, s1.id);
    assert_eq!(states.len(), before);

    // POST /d with s=S1, q=bar: a child of S1 sharing its root
    let (s2, exact) = get_or_make_search(&states, &form(Some(s1.id.as_str()), "bar", None));
    assert!(!exact);
    assert_eq!(s2.parent_id.as_ref(), Some(&s1.id));
    assert_eq!(s2.root_id, s1.id);
    assert_eq!(states.len(), before + 1);
}

#[test]
fn refinement_chain_keeps_one_root() {
    let states = StateMap::new();
    let mut current = make_search(&states, &form(None, "a", None));
    let root = current.id.clone();
    for text in ["ab", "abc", "abcd"] {
        let (next, exact) =
            get_or_make_search(&states, &form(Some(current.id.as_str()), text, None));
        assert!(!exact);
        assert_eq!(next.root_id, root);
        assert_eq!(next.parent_id.as_ref(), Some(&current.id));
        current = next;
    }
}

// ---------------------------------------------------------------------------
// Degradation of optional inputs
// ---------------------------------------------------------------------------

#[test]
fn broken_filters_mean_no_filters() {
    let states = StateMap::new();
    for broken in ["not json", r#"{"unknown": 1}"#, "{}", r#"{"rel": {"prop": "bad id"}}"#] {
        let state = make_search(&states, &form(None, "q", Some(broken)));
        assert!(state.filters.is_none(), "{broken:?} must degrade to absent");
    }
    let valid = r#"{"rel": {"prop": "JT9bhAfn5QnDzRyYLh2MV1", "none": true}}"#;
    let state = make_search(&states, &form(None, "q", Some(valid)));
    assert!(state.filters.is_some());
}

#[test]
fn strict_lookup_is_strict() {
    let states = StateMap::new();
    let s1 = make_search(&states, &form(None, "foo", None));

    assert!(get_search(&states, s1.id.as_str()).is_some());
    assert!(get_search(&states, "garbage").is_none());
    // a well-formed but unknown id resolves to nothing and creates nothing
    assert!(get_search(&states, "CAfaGKVcf5m1fVfJfB4fhg").is_none());
    assert_eq!(states.len(), 1);
}

// ---------------------------------------------------------------------------
// Concurrent inserts
// ---------------------------------------------------------------------------

#[test]
fn racing_inserts_only_grow_the_tree() {
    let states = std::sync::Arc::new(StateMap::new());
    let s1 = make_search(&states, &form(None, "foo", None));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let states = std::sync::Arc::clone(&states);
            let parent = s1.id.clone();
            std::thread::spawn(move || {
                let text = format!("refinement {}", i % 2);
                make_search(&states, &form(Some(parent.as_str()), &text, None))
            })
        })
        .collect();
    let children: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    // duplicate siblings are tolerated; every child still links to S1
    for child in &children {
        assert_eq!(child.parent_id.as_ref(), Some(&s1.id));
        assert_eq!(child.root_id, s1.id);
        assert!(get_search(&states, child.id.as_str()).is_some());
    }
}
