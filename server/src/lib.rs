//! claimdex server — a faceted search gateway over an Elasticsearch-
//! compatible document index.
//!
//! The binary in `main.rs` wires these modules into an axum router; the
//! modules themselves stay testable without a running index.

pub mod aggregate;
pub mod api;
pub mod error;
pub mod index;
pub mod query;
pub mod respond;
pub mod site;
pub mod state;
pub mod types;
