//! The search-state tree.
//!
//! A search state materializes a browser URL into a reusable query plan:
//! text, validated filters, and links to its parent and root. States are
//! immutable once inserted into the process-wide map; refining a search
//! extends the tree with a child node, and resubmitting a state's own
//! `(text, filters)` returns that state unchanged. Racing inserts may
//! create duplicate siblings, which the tree tolerates.

use std::sync::Arc;

use serde::Deserialize;

use claimdex_core::{Filters, Identifier};

use crate::types::StateMap;

/// One immutable node of the search-state tree. `root_id` is the node's own
/// id for roots and is inherited from the parent otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchState {
    pub id: Identifier,
    pub root_id: Identifier,
    pub parent_id: Option<Identifier>,
    pub text: String,
    pub filters: Option<Filters>,
}

/// Query or form fields feeding the search-state resolver. All optional;
/// invalid values degrade to absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StateForm {
    /// Parent search state id.
    pub s: Option<String>,
    /// Search text; empty allowed.
    pub q: Option<String>,
    /// Filter tree as strict JSON.
    pub filters: Option<String>,
    /// Opaque UI anchor, passed through on redirects.
    pub at: Option<String>,
}

/// Strict parse plus full validation; any failure means "no filters".
pub fn parse_filters(raw: Option<&str>) -> Option<Filters> {
    let filters: Filters = serde_json::from_str(raw?).ok()?;
    filters.valid().ok()?;
    Some(filters)
}

/// Strict lookup: the stored state or nothing. Never creates states; the
/// filter-distribution endpoints depend on that.
pub fn get_search(states: &StateMap, s: &str) -> Option<Arc<SearchState>> {
    let id: Identifier = s.parse().ok()?;
    states.get(&id).map(|entry| Arc::clone(entry.value()))
}

/// Resolve or create the state described by the form. The boolean reports
/// whether the form matched the stored parent exactly — `false` means a
/// state was created (or the parent was unusable) and the caller should
/// redirect the client to the canonical URL.
pub fn get_or_make_search(states: &StateMap, form: &StateForm) -> (Arc<SearchState>, bool) {
    let text = form.q.clone().unwrap_or_default();
    let filters = parse_filters(form.filters.as_deref());
    let parent = form.s.as_deref().and_then(|s| get_search(states, s));

    if let Some(parent) = parent {
        if parent.text == text && parent.filters == filters {
            return (parent, true);
        }
        let id = Identifier::new();
        let state = Arc::new(SearchState {
            id: id.clone(),
            root_id: parent.root_id.clone(),
            parent_id: Some(parent.id.clone()),
            text,
            filters,
        });
        states.insert(id, Arc::clone(&state));
        return (state, false);
    }

    let id = Identifier::new();
    let state = Arc::new(SearchState {
        id: id.clone(),
        root_id: id.clone(),
        parent_id: None,
        text,
        filters,
    });
    states.insert(id, Arc::clone(&state));
    (state, false)
}

/// [`get_or_make_search`] without the exactness report.
pub fn make_search(states: &StateMap, form: &StateForm) -> Arc<SearchState> {
    get_or_make_search(states, form).0
}
