//! The claim type hierarchy.
//!
//! A claim is a typed assertion about a document: a property reference, a
//! confidence, and kind-specific payload. Sixteen concrete kinds exist;
//! [`ClaimTypes`] holds one insertion-ordered array per kind, and every
//! claim can carry further claims through its `meta` container, recursively.
//!
//! The JSON shape uses the stable short keys of the wire format (`rel` for
//! relation, `none` for no-value, and so on); the traversal order across
//! kinds is fixed and part of the contract.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::identifier::Identifier;
use crate::time::{TimePrecision, Timestamp};
use crate::unit::Unit;

/// Language-tagged strings (BCP-47-like tags as keys).
pub type TranslatableString = BTreeMap<String, String>;

/// Language-tagged HTML fragments.
pub type TranslatableHtml = BTreeMap<String, String>;

/// Language-tagged lists of strings.
pub type TranslatableStringList = BTreeMap<String, Vec<String>>;

/// A denormalized reference to another document, embedded inside claims.
/// Cycles live in the data (A refers to B refers to A); in memory each claim
/// holds its own copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocRef {
    #[serde(rename = "_id")]
    pub id: Identifier,
    #[serde(default, skip_serializing_if = "TranslatableString::is_empty")]
    pub name: TranslatableString,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scores: Option<BTreeMap<String, f64>>,
}

impl DocRef {
    /// A bare reference carrying only the id, as used in compact payloads.
    pub fn new(id: Identifier) -> Self {
        DocRef { id, name: TranslatableString::new(), score: 0.0, scores: None }
    }
}

/// Fields shared by every claim kind: the claim id, the confidence in
/// `[-1, 1]`, and the optional meta container of nested claims.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreClaim {
    #[serde(rename = "_id")]
    pub id: Identifier,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Box<ClaimTypes>>,
}

impl CoreClaim {
    /// A fresh core with a random id and no meta claims.
    pub fn new(confidence: f64) -> Self {
        CoreClaim { id: Identifier::new(), confidence, meta: None }
    }
}

// ---------------------------------------------------------------------------
// The sixteen claim kinds
// ---------------------------------------------------------------------------

/// External identifier for the document in some other system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentifierClaim {
    #[serde(flatten)]
    pub core: CoreClaim,
    pub prop: DocRef,
    pub id: String,
}

/// Reference to an external IRI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceClaim {
    #[serde(flatten)]
    pub core: CoreClaim,
    pub prop: DocRef,
    pub iri: String,
}

/// Translatable rich-text value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextClaim {
    #[serde(flatten)]
    pub core: CoreClaim,
    pub prop: DocRef,
    pub html: TranslatableHtml,
}

/// Plain string value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StringClaim {
    #[serde(flatten)]
    pub core: CoreClaim,
    pub prop: DocRef,
    pub string: String,
}

/// The property applies as a label, with no further payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelClaim {
    #[serde(flatten)]
    pub core: CoreClaim,
    pub prop: DocRef,
}

/// A single measured amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmountClaim {
    #[serde(flatten)]
    pub core: CoreClaim,
    pub prop: DocRef,
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uncertainty: Option<[f64; 2]>,
    pub unit: Unit,
}

/// A measured amount known only as a range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmountRangeClaim {
    #[serde(flatten)]
    pub core: CoreClaim,
    pub prop: DocRef,
    pub lower: f64,
    pub upper: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uncertainty: Option<[f64; 2]>,
    pub unit: Unit,
}

/// A value from a closed per-property vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumerationClaim {
    #[serde(flatten)]
    pub core: CoreClaim,
    pub prop: DocRef,
    pub values: Vec<String>,
}

/// A typed edge to another document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationClaim {
    #[serde(flatten)]
    pub core: CoreClaim,
    pub prop: DocRef,
    pub to: DocRef,
}

/// An attached file with preview renditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileClaim {
    #[serde(flatten)]
    pub core: CoreClaim,
    pub prop: DocRef,
    #[serde(rename = "type")]
    pub media_type: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preview: Vec<String>,
}

/// The property is known to have no value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoValueClaim {
    #[serde(flatten)]
    pub core: CoreClaim,
    pub prop: DocRef,
}

/// The property has some value, but it is unknown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnknownValueClaim {
    #[serde(flatten)]
    pub core: CoreClaim,
    pub prop: DocRef,
}

/// A point in time, with precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeClaim {
    #[serde(flatten)]
    pub core: CoreClaim,
    pub prop: DocRef,
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uncertainty: Option<[Timestamp; 2]>,
    pub precision: TimePrecision,
}

/// A time span, with precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeRangeClaim {
    #[serde(flatten)]
    pub core: CoreClaim,
    pub prop: DocRef,
    pub lower: Timestamp,
    pub upper: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uncertainty: Option<[Timestamp; 2]>,
    pub precision: TimePrecision,
}

/// The document is an instance of the property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsClaim {
    #[serde(flatten)]
    pub core: CoreClaim,
    pub prop: DocRef,
}

/// Child relationship inside a [`ListClaim`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListChild {
    pub prop: DocRef,
    pub child: Identifier,
}

/// Membership of a document in an ordered list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListClaim {
    #[serde(flatten)]
    pub core: CoreClaim,
    pub prop: DocRef,
    pub element: DocRef,
    pub list: Identifier,
    pub order: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<ListChild>>,
}

// ---------------------------------------------------------------------------
// Kind dispatch
// ---------------------------------------------------------------------------

/// Invokes `$mac!` with the full `(field, variant, claim type, visitor
/// method)` list, in the fixed traversal order. Single source of truth for
/// everything that dispatches over the sixteen kinds.
macro_rules! with_claim_kinds {
    ($mac:ident) => {
        $mac! {
            (identifier, Identifier, IdentifierClaim, visit_identifier),
            (reference, Reference, ReferenceClaim, visit_reference),
            (text, Text, TextClaim, visit_text),
            (string, String, StringClaim, visit_string),
            (label, Label, LabelClaim, visit_label),
            (amount, Amount, AmountClaim, visit_amount),
            (amount_range, AmountRange, AmountRangeClaim, visit_amount_range),
            (enumeration, Enumeration, EnumerationClaim, visit_enumeration),
            (relation, Relation, RelationClaim, visit_relation),
            (file, File, FileClaim, visit_file),
            (no_value, NoValue, NoValueClaim, visit_no_value),
            (unknown_value, UnknownValue, UnknownValueClaim, visit_unknown_value),
            (time, Time, TimeClaim, visit_time),
            (time_range, TimeRange, TimeRangeClaim, visit_time_range),
            (is, Is, IsClaim, visit_is),
            (list, List, ListClaim, visit_list),
        }
    };
}
pub(crate) use with_claim_kinds;

/// A claim of any kind, owned. Used to move claims in and out of containers;
/// storage inside [`ClaimTypes`] stays concretely typed per kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Claim {
    Identifier(IdentifierClaim),
    Reference(ReferenceClaim),
    Text(TextClaim),
    String(StringClaim),
    Label(LabelClaim),
    Amount(AmountClaim),
    AmountRange(AmountRangeClaim),
    Enumeration(EnumerationClaim),
    Relation(RelationClaim),
    File(FileClaim),
    NoValue(NoValueClaim),
    UnknownValue(UnknownValueClaim),
    Time(TimeClaim),
    TimeRange(TimeRangeClaim),
    Is(IsClaim),
    List(ListClaim),
}

macro_rules! claim_accessor {
    ($self:ident, $claim:ident => $body:expr) => {
        match $self {
            Claim::Identifier($claim) => $body,
            Claim::Reference($claim) => $body,
            Claim::Text($claim) => $body,
            Claim::String($claim) => $body,
            Claim::Label($claim) => $body,
            Claim::Amount($claim) => $body,
            Claim::AmountRange($claim) => $body,
            Claim::Enumeration($claim) => $body,
            Claim::Relation($claim) => $body,
            Claim::File($claim) => $body,
            Claim::NoValue($claim) => $body,
            Claim::UnknownValue($claim) => $body,
            Claim::Time($claim) => $body,
            Claim::TimeRange($claim) => $body,
            Claim::Is($claim) => $body,
            Claim::List($claim) => $body,
        }
    };
}

impl Claim {
    pub fn core(&self) -> &CoreClaim {
        claim_accessor!(self, c => &c.core)
    }

    pub fn core_mut(&mut self) -> &mut CoreClaim {
        claim_accessor!(self, c => &mut c.core)
    }

    pub fn id(&self) -> &Identifier {
        claim_accessor!(self, c => &c.core.id)
    }

    pub fn confidence(&self) -> f64 {
        claim_accessor!(self, c => c.core.confidence)
    }

    pub fn prop(&self) -> &DocRef {
        claim_accessor!(self, c => &c.prop)
    }

    /// Whether this is an amount-kind claim carrying the custom unit `@`.
    /// Such claims never participate in numeric search and rank as inactive.
    pub fn has_custom_unit(&self) -> bool {
        match self {
            Claim::Amount(c) => c.unit == Unit::Custom,
            Claim::AmountRange(c) => c.unit == Unit::Custom,
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// ClaimTypes container
// ---------------------------------------------------------------------------

/// One insertion-ordered array per claim kind. The serialized field names
/// are the wire format's short keys; empty arrays are omitted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClaimTypes {
    #[serde(rename = "id", default, skip_serializing_if = "Vec::is_empty")]
    pub identifier: Vec<IdentifierClaim>,
    #[serde(rename = "ref", default, skip_serializing_if = "Vec::is_empty")]
    pub reference: Vec<ReferenceClaim>,
    #[serde(rename = "text", default, skip_serializing_if = "Vec::is_empty")]
    pub text: Vec<TextClaim>,
    #[serde(rename = "string", default, skip_serializing_if = "Vec::is_empty")]
    pub string: Vec<StringClaim>,
    #[serde(rename = "label", default, skip_serializing_if = "Vec::is_empty")]
    pub label: Vec<LabelClaim>,
    #[serde(rename = "amount", default, skip_serializing_if = "Vec::is_empty")]
    pub amount: Vec<AmountClaim>,
    #[serde(rename = "amountRange", default, skip_serializing_if = "Vec::is_empty")]
    pub amount_range: Vec<AmountRangeClaim>,
    #[serde(rename = "enum", default, skip_serializing_if = "Vec::is_empty")]
    pub enumeration: Vec<EnumerationClaim>,
    #[serde(rename = "rel", default, skip_serializing_if = "Vec::is_empty")]
    pub relation: Vec<RelationClaim>,
    #[serde(rename = "file", default, skip_serializing_if = "Vec::is_empty")]
    pub file: Vec<FileClaim>,
    #[serde(rename = "none", default, skip_serializing_if = "Vec::is_empty")]
    pub no_value: Vec<NoValueClaim>,
    #[serde(rename = "unknown", default, skip_serializing_if = "Vec::is_empty")]
    pub unknown_value: Vec<UnknownValueClaim>,
    #[serde(rename = "time", default, skip_serializing_if = "Vec::is_empty")]
    pub time: Vec<TimeClaim>,
    #[serde(rename = "timeRange", default, skip_serializing_if = "Vec::is_empty")]
    pub time_range: Vec<TimeRangeClaim>,
    #[serde(rename = "is", default, skip_serializing_if = "Vec::is_empty")]
    pub is: Vec<IsClaim>,
    #[serde(rename = "list", default, skip_serializing_if = "Vec::is_empty")]
    pub list: Vec<ListClaim>,
}

impl ClaimTypes {
    pub fn new() -> Self {
        ClaimTypes::default()
    }

    /// Total number of claims across all sixteen arrays (top level only;
    /// nested meta claims are not counted).
    pub fn size(&self) -> usize {
        macro_rules! sum_len {
            ($(($field:ident, $variant:ident, $ty:ty, $visit:ident)),* $(,)?) => {
                0 $(+ self.$field.len())*
            };
        }
        with_claim_kinds!(sum_len)
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Append a claim to the array of its kind, preserving insertion order.
    pub fn push(&mut self, claim: Claim) {
        macro_rules! push_kind {
            ($(($field:ident, $variant:ident, $ty:ty, $visit:ident)),* $(,)?) => {
                match claim {
                    $(Claim::$variant(c) => self.$field.push(c),)*
                }
            };
        }
        with_claim_kinds!(push_kind)
    }
}
