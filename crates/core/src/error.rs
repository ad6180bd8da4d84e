//! Error types shared across the core model.

use thiserror::Error;

use crate::identifier::Identifier;

/// A string failed identifier validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid identifier: {0:?}")]
pub struct IdentifierError(pub String);

/// Timestamp parsing or range failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeError {
    /// Input does not match the signed-year ISO-8601 grammar.
    #[error("invalid timestamp syntax: {0:?}")]
    Syntax(String),

    /// A calendar component is out of range (month 13, day 32, hour 25, ...).
    #[error("timestamp component out of range: {0}")]
    Range(String),

    /// The year does not fit the supported integer range.
    #[error("timestamp year overflows the supported range")]
    YearOverflow,
}

/// A measurement unit tag that is not part of the closed enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown unit tag: {0:?}")]
pub struct UnitError(pub String);

/// A time precision tag that is not part of the closed enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown time precision tag: {0:?}")]
pub struct TimePrecisionError(pub String);

/// Mutation of a document or claim tree failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    /// A claim with this id already exists somewhere in the document tree.
    #[error("duplicate claim id: {0}")]
    DuplicateId(Identifier),
}

/// A filter tree failed validation. Validation runs before compilation; an
/// invalid tree never reaches the query builder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    /// A node populates zero or more than one variant.
    #[error("filter node must populate exactly one variant, found {0}")]
    NotExactlyOne(usize),

    /// A `rel` leaf must set exactly one of `value` or `none`.
    #[error("rel filter must set exactly one of value or none")]
    RelValueOrNone,

    /// An `amount` leaf must set both bounds or `none`, not a mix.
    #[error("amount filter must set both gte and lte, or none")]
    AmountBounds,

    /// The custom unit `@` never participates in numeric filters.
    #[error("amount filter cannot use the custom unit")]
    AmountCustomUnit,

    /// A `time` leaf must set both bounds or `none`, not a mix.
    #[error("time filter must set both gte and lte, or none")]
    TimeBounds,

    /// A `str` leaf must set exactly one of `str` or `none`.
    #[error("str filter must set exactly one of str or none")]
    StrValueOrNone,

    /// An `index` leaf requires a non-empty index name.
    #[error("index filter requires a non-empty index name")]
    EmptyIndex,

    /// A `size` leaf must set both bounds or `none`, not a mix.
    #[error("size filter must set both gte and lte, or none")]
    SizeBounds,
}
