//! The document envelope.
//!
//! A document carries translatable names, ranking scores, and two claim
//! partitions: `active` claims participate in search ranking and
//! aggregation, `inactive` claims are retained for provenance only. Adding
//! a claim routes it by confidence and unit; emptied partitions are
//! unlinked so the serialized form never carries empty containers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::claim::{Claim, ClaimTypes, TranslatableString, TranslatableStringList};
use crate::error::DocumentError;
use crate::identifier::Identifier;
use crate::visitor::Visitor;

/// The two claim partitions, under the `claims` container key.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DocumentClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<ClaimTypes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inactive: Option<ClaimTypes>,
}

/// A document: id, names, scores, mnemonic, and the claim partitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_id")]
    pub id: Identifier,
    #[serde(default, skip_serializing_if = "TranslatableString::is_empty")]
    pub name: TranslatableString,
    #[serde(rename = "otherNames", default, skip_serializing_if = "Option::is_none")]
    pub other_names: Option<TranslatableStringList>,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scores: Option<BTreeMap<String, f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mnemonic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claims: Option<DocumentClaims>,
}

impl Document {
    /// An empty document with the given id and no claims.
    pub fn new(id: Identifier) -> Self {
        Document {
            id,
            name: TranslatableString::new(),
            other_names: None,
            score: 0.0,
            scores: None,
            mnemonic: None,
            claims: None,
        }
    }

    pub fn active(&self) -> Option<&ClaimTypes> {
        self.claims.as_ref()?.active.as_ref()
    }

    pub fn inactive(&self) -> Option<&ClaimTypes> {
        self.claims.as_ref()?.inactive.as_ref()
    }

    /// Insert a claim. Routes to `active` iff `confidence >= 0` and the
    /// claim is not an amount kind with the custom unit; else to `inactive`.
    /// Fails if a claim with the same id exists anywhere in the tree.
    pub fn add(&mut self, claim: Claim) -> Result<(), DocumentError> {
        let id = claim.id().clone();
        if self.get_by_id(&id).is_some() {
            return Err(DocumentError::DuplicateId(id));
        }
        let active = claim.confidence() >= 0.0 && !claim.has_custom_unit();
        let claims = self.claims.get_or_insert_with(DocumentClaims::default);
        let partition = if active { &mut claims.active } else { &mut claims.inactive };
        partition.get_or_insert_with(ClaimTypes::new).push(claim);
        Ok(())
    }

    /// The first claim with this id anywhere in the tree (active, then
    /// inactive, including nested meta claims). Returns a clone.
    pub fn get_by_id(&mut self, id: &Identifier) -> Option<Claim> {
        let claims = self.claims.as_mut()?;
        if let Some(found) = claims.active.as_mut().and_then(|c| c.get_by_id(id)) {
            return Some(found);
        }
        claims.inactive.as_mut().and_then(|c| c.get_by_id(id))
    }

    /// Remove and return the first claim with this id anywhere in the tree,
    /// unlinking partitions that became empty.
    pub fn remove_by_id(&mut self, id: &Identifier) -> Option<Claim> {
        let removed = {
            let claims = self.claims.as_mut()?;
            let from_active = claims.active.as_mut().and_then(|c| c.remove_by_id(id));
            match from_active {
                Some(claim) => Some(claim),
                None => claims.inactive.as_mut().and_then(|c| c.remove_by_id(id)),
            }
        };
        self.normalize();
        removed
    }

    /// All top-level claims with this property: active first, then
    /// inactive, each in the fixed kind-then-insertion order.
    pub fn get(&mut self, prop_id: &Identifier) -> Vec<Claim> {
        let Some(claims) = self.claims.as_mut() else {
            return Vec::new();
        };
        let mut matches = Vec::new();
        if let Some(active) = claims.active.as_mut() {
            matches.extend(active.get_by_prop(prop_id));
        }
        if let Some(inactive) = claims.inactive.as_mut() {
            matches.extend(inactive.get_by_prop(prop_id));
        }
        matches
    }

    /// Visit both partitions with one visitor (active first), then unlink
    /// whatever the visitor emptied.
    pub fn visit<V: Visitor>(&mut self, visitor: &mut V) {
        if let Some(claims) = self.claims.as_mut() {
            if let Some(active) = claims.active.as_mut() {
                active.visit(visitor);
            }
            if let Some(inactive) = claims.inactive.as_mut() {
                inactive.visit(visitor);
            }
        }
        self.normalize();
    }

    fn normalize(&mut self) {
        let Some(claims) = self.claims.as_mut() else {
            return;
        };
        if claims.active.as_ref().is_some_and(ClaimTypes::is_empty) {
            claims.active = None;
        }
        if claims.inactive.as_ref().is_some_and(ClaimTypes::is_empty) {
            claims.inactive = None;
        }
        if claims.active.is_none() && claims.inactive.is_none() {
            self.claims = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim::{AmountClaim, CoreClaim, DocRef, RelationClaim, StringClaim};
    use crate::unit::Unit;
    use crate::visitor::{ClaimMut, VisitResult};

    fn doc_ref(id: &Identifier) -> DocRef {
        DocRef::new(id.clone())
    }

    fn relation(prop: &Identifier, to: &Identifier, confidence: f64) -> RelationClaim {
        RelationClaim { core: CoreClaim::new(confidence), prop: doc_ref(prop), to: doc_ref(to) }
    }

    #[test]
    fn add_then_get_by_id() {
        let mut doc = Document::new(Identifier::new());
        let claim = relation(&Identifier::new(), &Identifier::new(), 0.9);
        let id = claim.core.id.clone();
        doc.add(Claim::Relation(claim.clone())).unwrap();
        assert_eq!(doc.get_by_id(&id), Some(Claim::Relation(claim)));
    }

    #[test]
    fn add_then_remove_round_trip() {
        let mut doc = Document::new(Identifier::new());
        let claim = Claim::Relation(relation(&Identifier::new(), &Identifier::new(), 0.9));
        let id = claim.id().clone();
        doc.add(claim.clone()).unwrap();
        assert_eq!(doc.remove_by_id(&id), Some(claim));
        assert_eq!(doc.get_by_id(&id), None);
        assert!(doc.claims.is_none(), "emptied partitions are unlinked");
    }

    #[test]
    fn duplicate_add_fails_and_leaves_document_unchanged() {
        let mut doc = Document::new(Identifier::new());
        let claim = Claim::Relation(relation(&Identifier::new(), &Identifier::new(), 0.9));
        doc.add(claim.clone()).unwrap();
        let before = doc.clone();
        assert_eq!(doc.add(claim.clone()), Err(DocumentError::DuplicateId(claim.id().clone())));
        assert_eq!(doc, before);
    }

    #[test]
    fn duplicate_detection_reaches_meta_claims() {
        let mut doc = Document::new(Identifier::new());
        let prop = Identifier::new();
        let mut outer = relation(&prop, &prop, 0.9);
        let nested = Claim::Relation(relation(&prop, &prop, 1.0));
        let nested_id = nested.id().clone();
        outer.core.add_meta(nested.clone()).unwrap();
        doc.add(Claim::Relation(outer)).unwrap();
        assert_eq!(doc.add(nested), Err(DocumentError::DuplicateId(nested_id)));
    }

    #[test]
    fn confidence_routes_partitions() {
        let mut doc = Document::new(Identifier::new());
        let prop = Identifier::new();
        let to = Identifier::new();
        doc.add(Claim::Relation(relation(&prop, &to, 0.9))).unwrap();
        doc.add(Claim::Relation(relation(&prop, &to, 0.0))).unwrap();
        doc.add(Claim::Relation(relation(&prop, &to, -0.5))).unwrap();
        assert_eq!(doc.active().unwrap().relation.len(), 2, "confidence >= 0 is active");
        assert_eq!(doc.inactive().unwrap().relation.len(), 1);
    }

    #[test]
    fn custom_unit_amounts_are_inactive() {
        let mut doc = Document::new(Identifier::new());
        let claim = AmountClaim {
            core: CoreClaim::new(1.0),
            prop: doc_ref(&Identifier::new()),
            amount: 3.14,
            uncertainty: None,
            unit: Unit::Custom,
        };
        doc.add(Claim::Amount(claim)).unwrap();
        assert!(doc.active().is_none());
        assert_eq!(doc.inactive().unwrap().amount.len(), 1);
    }

    #[test]
    fn single_relation_claim_scenario() {
        // Document with one high-confidence relation claim: get by property
        // returns it, it lives in active, and inactive stays absent.
        let mut doc = Document::new(Identifier::new());
        let p1 = Identifier::new();
        let t1 = Identifier::new();
        let c1 = relation(&p1, &t1, 0.9);
        doc.add(Claim::Relation(c1.clone())).unwrap();
        assert_eq!(doc.get(&p1), vec![Claim::Relation(c1.clone())]);
        assert_eq!(doc.active().unwrap().relation, vec![c1]);
        assert!(doc.inactive().is_none());
    }

    #[test]
    fn get_returns_active_before_inactive() {
        let mut doc = Document::new(Identifier::new());
        let prop = Identifier::new();
        let to = Identifier::new();
        let inactive = relation(&prop, &to, -1.0);
        let active = Claim::String(StringClaim {
            core: CoreClaim::new(1.0),
            prop: doc_ref(&prop),
            string: "x".to_string(),
        });
        doc.add(Claim::Relation(inactive.clone())).unwrap();
        doc.add(active.clone()).unwrap();
        assert_eq!(doc.get(&prop), vec![active, Claim::Relation(inactive)]);
    }

    #[test]
    fn visiting_away_everything_unlinks_claims() {
        struct DropAll;
        impl Visitor for DropAll {
            fn visit_claim(&mut self, _claim: ClaimMut<'_>) -> VisitResult {
                VisitResult::Drop
            }
        }
        let mut doc = Document::new(Identifier::new());
        let prop = Identifier::new();
        doc.add(Claim::Relation(relation(&prop, &prop, 1.0))).unwrap();
        doc.add(Claim::Relation(relation(&prop, &prop, -1.0))).unwrap();
        doc.visit(&mut DropAll);
        assert!(doc.claims.is_none());
    }

    #[test]
    fn document_json_shape() {
        let mut doc = Document::new("CAfaGKVcf5m1fVfJfB4fhg".parse().unwrap());
        doc.name.insert("en".to_string(), "Example".to_string());
        doc.score = 0.5;
        let prop = Identifier::new();
        doc.add(Claim::Relation(relation(&prop, &prop, 1.0))).unwrap();
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["_id"], "CAfaGKVcf5m1fVfJfB4fhg");
        assert_eq!(value["name"]["en"], "Example");
        assert!(value["claims"]["active"]["rel"].is_array());
        assert!(value["claims"].get("inactive").is_none());
        let back: Document = serde_json::from_value(value).unwrap();
        assert_eq!(back, doc);
    }
}
