//! Core library for claimdex — the claim document model, visitor traversal,
//! and filter algebra.
//!
//! Everything here is pure and synchronous: documents are owned values, the
//! visitor kernel filters claim containers in place, and filter trees
//! validate and compile to index-query JSON without touching the network.

pub mod claim;
pub mod document;
pub mod error;
pub mod filter;
pub mod identifier;
pub mod time;
pub mod unit;
pub mod visitor;

pub use claim::{Claim, ClaimTypes, CoreClaim, DocRef};
pub use document::{Document, DocumentClaims};
pub use error::{DocumentError, FilterError, IdentifierError, TimeError};
pub use filter::Filters;
pub use identifier::Identifier;
pub use time::{TimePrecision, Timestamp};
pub use unit::Unit;
pub use visitor::{ClaimMut, VisitResult, Visitor};
