//! Shared server types and constants.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;

use claimdex_core::Identifier;

use crate::index::IndexClient;
use crate::site::SiteTable;
use crate::state::SearchState;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum number of results (and aggregation buckets) returned per request.
pub const MAX_RESULTS_COUNT: usize = 1000;

/// Bin count targeted by the continuous histograms.
pub const BUCKETS_COUNT: usize = 100;

/// The index's cap on cardinality precision thresholds.
pub const CARDINALITY_PRECISION_MAX: i64 = 40_000;

/// Response bodies below this size are not worth compressing.
pub const COMPRESSION_MIN_SIZE: u16 = 1024;

/// Cache lifetime for immutable document JSON (one week, seconds).
pub const DOCUMENT_CACHE_MAX_AGE: u64 = 604_800;

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// Process-wide map of search states. Nodes are immutable once inserted;
/// racing inserts for the same parent may yield duplicate siblings, which
/// the tree semantics tolerate.
pub type StateMap = DashMap<Identifier, Arc<SearchState>>;

/// Axum application state shared by all handlers.
#[derive(Clone)]
pub struct AppContext {
    pub index: Arc<IndexClient>,
    pub sites: Arc<SiteTable>,
    pub states: Arc<StateMap>,
    /// The SPA shell served on the HTML routes.
    pub shell: Arc<String>,
    pub start_time: Instant,
}
