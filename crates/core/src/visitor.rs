//! Visitor traversal over claim containers.
//!
//! A [`Visitor`] sees every claim in a [`ClaimTypes`] container, kind array
//! by kind array in the fixed traversal order, and decides per claim whether
//! it stays. Filtering happens in place: kept claims are compacted toward
//! the front, dropped claims are discarded, and a `*AndStop` result freezes
//! the rest of the traversal (remaining claims stay, unvisited).
//!
//! After visiting a container, callers unlink it if it became empty; the
//! meta helpers on [`CoreClaim`] do this for nested containers.

use crate::claim::{with_claim_kinds, Claim, ClaimTypes, CoreClaim, DocRef};
use crate::claim::{
    AmountClaim, AmountRangeClaim, EnumerationClaim, FileClaim, IdentifierClaim, IsClaim,
    LabelClaim, ListClaim, NoValueClaim, ReferenceClaim, RelationClaim, StringClaim, TextClaim,
    TimeClaim, TimeRangeClaim, UnknownValueClaim,
};
use crate::error::DocumentError;
use crate::identifier::Identifier;

/// Per-claim decision of a visitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitResult {
    /// Retain the claim and continue.
    Keep,
    /// Retain the claim and stop the traversal.
    KeepAndStop,
    /// Discard the claim and continue.
    Drop,
    /// Discard the claim and stop the traversal.
    DropAndStop,
}

impl VisitResult {
    fn keeps(self) -> bool {
        matches!(self, VisitResult::Keep | VisitResult::KeepAndStop)
    }

    fn stops(self) -> bool {
        matches!(self, VisitResult::KeepAndStop | VisitResult::DropAndStop)
    }
}

macro_rules! claim_mut_enum {
    ($(($field:ident, $variant:ident, $ty:ty, $visit:ident)),* $(,)?) => {
        /// A mutable borrow of a claim of any kind, handed to the catch-all
        /// [`Visitor::visit_claim`] method.
        #[derive(Debug)]
        pub enum ClaimMut<'a> {
            $($variant(&'a mut $ty),)*
        }

        impl ClaimMut<'_> {
            pub fn core(&self) -> &CoreClaim {
                match self { $(ClaimMut::$variant(c) => &c.core,)* }
            }

            pub fn core_mut(&mut self) -> &mut CoreClaim {
                match self { $(ClaimMut::$variant(c) => &mut c.core,)* }
            }

            pub fn id(&self) -> &Identifier {
                &self.core().id
            }

            pub fn prop(&self) -> &DocRef {
                match self { $(ClaimMut::$variant(c) => &c.prop,)* }
            }

            /// Clone into an owned [`Claim`].
            pub fn to_claim(&self) -> Claim {
                match self { $(ClaimMut::$variant(c) => Claim::$variant((**c).clone()),)* }
            }
        }
    };
}
with_claim_kinds!(claim_mut_enum);

macro_rules! visitor_trait {
    ($(($field:ident, $variant:ident, $ty:ty, $visit:ident)),* $(,)?) => {
        /// One method per claim kind. Kind methods default to the catch-all
        /// [`Visitor::visit_claim`], so uniform visitors implement a single
        /// method while kind-aware visitors override what they need.
        pub trait Visitor {
            /// Fallback for every kind without a dedicated override.
            fn visit_claim(&mut self, claim: ClaimMut<'_>) -> VisitResult;

            $(
                fn $visit(&mut self, claim: &mut $ty) -> VisitResult {
                    self.visit_claim(ClaimMut::$variant(claim))
                }
            )*
        }
    };
}
with_claim_kinds!(visitor_trait);

/// Walk one kind array in index order, compacting kept claims in place.
/// Once `stopped` is set, the rest of the array is retained unvisited.
fn visit_array<V: Visitor, T>(
    claims: &mut Vec<T>,
    stopped: &mut bool,
    visitor: &mut V,
    visit: fn(&mut V, &mut T) -> VisitResult,
) {
    if *stopped {
        return;
    }
    let mut write = 0;
    for read in 0..claims.len() {
        let keep = if *stopped {
            true
        } else {
            let result = visit(visitor, &mut claims[read]);
            if result.stops() {
                *stopped = true;
            }
            result.keeps()
        };
        if keep {
            if write != read {
                claims.swap(write, read);
            }
            write += 1;
        }
    }
    claims.truncate(write);
}

impl ClaimTypes {
    /// Traverse all sixteen kind arrays in the fixed order, filtering in
    /// place per the visitor's decisions. Callers unlink the container if
    /// [`ClaimTypes::is_empty`] afterwards.
    pub fn visit<V: Visitor>(&mut self, visitor: &mut V) {
        let mut stopped = false;
        macro_rules! visit_fields {
            ($(($field:ident, $variant:ident, $ty:ty, $visit:ident)),* $(,)?) => {
                $(visit_array(&mut self.$field, &mut stopped, visitor, V::$visit);)*
            };
        }
        with_claim_kinds!(visit_fields);
    }

    /// The first claim with this id, searching nested meta claims too.
    /// Returns a clone; the container is left unchanged.
    pub fn get_by_id(&mut self, id: &Identifier) -> Option<Claim> {
        let mut visitor = GetByIdVisitor { id, found: None };
        self.visit(&mut visitor);
        visitor.found
    }

    /// Remove and return the first claim with this id, searching nested
    /// meta claims too.
    pub fn remove_by_id(&mut self, id: &Identifier) -> Option<Claim> {
        let mut visitor = RemoveByIdVisitor { id, removed: None };
        self.visit(&mut visitor);
        visitor.removed
    }

    /// All top-level claims whose property is `prop_id`, in traversal order.
    pub fn get_by_prop(&mut self, prop_id: &Identifier) -> Vec<Claim> {
        let mut visitor = CollectByPropVisitor { prop_id, collected: Vec::new() };
        self.visit(&mut visitor);
        visitor.collected
    }
}

impl CoreClaim {
    /// Add a nested meta claim, creating the container on first use.
    /// Fails if the id already exists anywhere under this claim.
    pub fn add_meta(&mut self, claim: Claim) -> Result<(), DocumentError> {
        let id = claim.id().clone();
        if self.get_meta_by_id(&id).is_some() {
            return Err(DocumentError::DuplicateId(id));
        }
        self.meta.get_or_insert_with(Default::default).push(claim);
        Ok(())
    }

    /// The first meta claim with this id, at any nesting depth.
    pub fn get_meta_by_id(&mut self, id: &Identifier) -> Option<Claim> {
        self.meta.as_mut()?.get_by_id(id)
    }

    /// Remove and return the first meta claim with this id, at any nesting
    /// depth, unlinking the container if it became empty.
    pub fn remove_meta_by_id(&mut self, id: &Identifier) -> Option<Claim> {
        let meta = self.meta.as_mut()?;
        let removed = meta.remove_by_id(id);
        if meta.is_empty() {
            self.meta = None;
        }
        removed
    }
}

// ---------------------------------------------------------------------------
// Canonical visitors
// ---------------------------------------------------------------------------

struct GetByIdVisitor<'a> {
    id: &'a Identifier,
    found: Option<Claim>,
}

impl Visitor for GetByIdVisitor<'_> {
    fn visit_claim(&mut self, mut claim: ClaimMut<'_>) -> VisitResult {
        if claim.id() == self.id {
            self.found = Some(claim.to_claim());
            return VisitResult::KeepAndStop;
        }
        if let Some(found) = claim.core_mut().get_meta_by_id(self.id) {
            self.found = Some(found);
            return VisitResult::KeepAndStop;
        }
        VisitResult::Keep
    }
}

struct RemoveByIdVisitor<'a> {
    id: &'a Identifier,
    removed: Option<Claim>,
}

impl Visitor for RemoveByIdVisitor<'_> {
    fn visit_claim(&mut self, mut claim: ClaimMut<'_>) -> VisitResult {
        if claim.id() == self.id {
            self.removed = Some(claim.to_claim());
            return VisitResult::DropAndStop;
        }
        // A match inside meta removes there but keeps the enclosing claim.
        if let Some(removed) = claim.core_mut().remove_meta_by_id(self.id) {
            self.removed = Some(removed);
            return VisitResult::KeepAndStop;
        }
        VisitResult::Keep
    }
}

struct CollectByPropVisitor<'a> {
    prop_id: &'a Identifier,
    collected: Vec<Claim>,
}

impl Visitor for CollectByPropVisitor<'_> {
    fn visit_claim(&mut self, claim: ClaimMut<'_>) -> VisitResult {
        if &claim.prop().id == self.prop_id {
            self.collected.push(claim.to_claim());
        }
        VisitResult::Keep
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim::{LabelClaim, RelationClaim, StringClaim};

    fn prop(id: &Identifier) -> DocRef {
        DocRef::new(id.clone())
    }

    fn sample() -> (ClaimTypes, Identifier, Identifier) {
        let p = Identifier::new();
        let other = Identifier::new();
        let mut claims = ClaimTypes::new();
        claims.push(Claim::String(StringClaim {
            core: CoreClaim::new(1.0),
            prop: prop(&p),
            string: "a".to_string(),
        }));
        claims.push(Claim::String(StringClaim {
            core: CoreClaim::new(1.0),
            prop: prop(&other),
            string: "b".to_string(),
        }));
        claims.push(Claim::Relation(RelationClaim {
            core: CoreClaim::new(1.0),
            prop: prop(&p),
            to: prop(&other),
        }));
        claims.push(Claim::Label(LabelClaim { core: CoreClaim::new(1.0), prop: prop(&p) }));
        (claims, p, other)
    }

    struct DropAll;

    impl Visitor for DropAll {
        fn visit_claim(&mut self, _claim: ClaimMut<'_>) -> VisitResult {
            VisitResult::Drop
        }
    }

    struct Trace {
        seen: Vec<Identifier>,
        result: VisitResult,
    }

    impl Visitor for Trace {
        fn visit_claim(&mut self, claim: ClaimMut<'_>) -> VisitResult {
            self.seen.push(claim.id().clone());
            self.result
        }
    }

    #[test]
    fn drop_all_empties_the_container() {
        let (mut claims, _, _) = sample();
        claims.visit(&mut DropAll);
        assert!(claims.is_empty());
        assert_eq!(claims.size(), 0);
    }

    #[test]
    fn traversal_order_is_kind_then_insertion() {
        let (mut claims, _, _) = sample();
        let string_a = claims.string[0].core.id.clone();
        let string_b = claims.string[1].core.id.clone();
        let label = claims.label[0].core.id.clone();
        let relation = claims.relation[0].core.id.clone();
        let mut trace = Trace { seen: Vec::new(), result: VisitResult::Keep };
        claims.visit(&mut trace);
        // string before label before relation; within string, insertion order
        assert_eq!(trace.seen, vec![string_a, string_b, label, relation]);
        assert_eq!(claims.size(), 4, "Keep retains everything");
    }

    #[test]
    fn stop_freezes_the_rest_of_the_traversal() {
        let (mut claims, _, _) = sample();
        let mut trace = Trace { seen: Vec::new(), result: VisitResult::KeepAndStop };
        claims.visit(&mut trace);
        assert_eq!(trace.seen.len(), 1, "only the first claim is visited");
        assert_eq!(claims.size(), 4, "unvisited claims are retained");
    }

    #[test]
    fn drop_and_stop_drops_only_the_first() {
        let (mut claims, _, _) = sample();
        let mut trace = Trace { seen: Vec::new(), result: VisitResult::DropAndStop };
        claims.visit(&mut trace);
        assert_eq!(trace.seen.len(), 1);
        assert_eq!(claims.size(), 3);
        assert_eq!(claims.string.len(), 1, "first string claim dropped");
        assert_eq!(claims.string[0].string, "b", "compaction preserves order");
    }

    #[test]
    fn get_by_id_finds_without_mutating() {
        let (mut claims, _, _) = sample();
        let id = claims.relation[0].core.id.clone();
        let found = claims.get_by_id(&id).unwrap();
        assert_eq!(found.id(), &id);
        assert_eq!(claims.size(), 4);
        assert!(claims.get_by_id(&Identifier::new()).is_none());
    }

    #[test]
    fn remove_by_id_extracts_the_claim() {
        let (mut claims, _, _) = sample();
        let id = claims.string[0].core.id.clone();
        let removed = claims.remove_by_id(&id).unwrap();
        assert_eq!(removed.id(), &id);
        assert_eq!(claims.size(), 3);
        assert!(claims.get_by_id(&id).is_none());
        assert!(claims.remove_by_id(&id).is_none());
    }

    #[test]
    fn get_by_prop_collects_in_traversal_order() {
        let (mut claims, p, other) = sample();
        let matches = claims.get_by_prop(&p);
        assert_eq!(matches.len(), 3);
        assert!(matches!(matches[0], Claim::String(_)));
        assert!(matches!(matches[1], Claim::Label(_)));
        assert!(matches!(matches[2], Claim::Relation(_)));
        assert_eq!(claims.get_by_prop(&other).len(), 1);
    }

    #[test]
    fn meta_claims_are_reachable_and_removable() {
        let (mut claims, p, _) = sample();
        let nested = LabelClaim { core: CoreClaim::new(0.5), prop: prop(&p) };
        let nested_id = nested.core.id.clone();
        claims.string[0].core.add_meta(Claim::Label(nested)).unwrap();

        assert_eq!(claims.get_by_id(&nested_id).unwrap().id(), &nested_id);

        let removed = claims.remove_by_id(&nested_id).unwrap();
        assert_eq!(removed.id(), &nested_id);
        assert_eq!(claims.size(), 4, "enclosing claim is kept");
        assert!(claims.string[0].core.meta.is_none(), "emptied meta container is unlinked");
    }

    #[test]
    fn add_meta_rejects_duplicate_ids() {
        let (mut claims, p, _) = sample();
        let nested = LabelClaim { core: CoreClaim::new(0.5), prop: prop(&p) };
        let nested_id = nested.core.id.clone();
        claims.string[0].core.add_meta(Claim::Label(nested.clone())).unwrap();
        assert_eq!(
            claims.string[0].core.add_meta(Claim::Label(nested)),
            Err(DocumentError::DuplicateId(nested_id))
        );
    }
}
