use std::fmt;

use indexmap::IndexSet;
use serde::Serialize;
use vestigia_core::{EventType, Relation};

/// The three temporal invariant families mined over totally-ordered
/// traces.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize)]
pub enum InvariantKind {
    /// `AFby(a, b)`: every `a` is followed, at some later point of the
    /// same trace, by a `b`.
    AlwaysFollowedBy,
    /// `AP(a, b)`: every `b` is preceded, somewhere earlier in the same
    /// trace, by an `a`.
    AlwaysPrecedes,
    /// `NFby(a, b)`: no `a` is ever followed by a `b` in the same trace.
    NeverFollowedBy,
}

impl InvariantKind {
    pub const ALL: [InvariantKind; 3] = [
        InvariantKind::AlwaysFollowedBy,
        InvariantKind::AlwaysPrecedes,
        InvariantKind::NeverFollowedBy,
    ];

    pub fn name(self) -> &'static str {
        match self {
            InvariantKind::AlwaysFollowedBy => "AlwaysFollowedBy",
            InvariantKind::AlwaysPrecedes => "AlwaysPrecedes",
            InvariantKind::NeverFollowedBy => "NeverFollowedBy",
        }
    }
}

impl fmt::Display for InvariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A binary temporal invariant over an ordered pair of event types,
/// relative to one ordering relation.
///
/// Equality is structural; the pair `(first, second)` is ordered and
/// `first == second` is legal (`x NFby x` says `x` occurs at most once
/// per trace).
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct BinaryInvariant {
    kind: InvariantKind,
    first: EventType,
    second: EventType,
    relation: Relation,
}

impl BinaryInvariant {
    pub fn new(
        kind: InvariantKind,
        first: EventType,
        second: EventType,
        relation: Relation,
    ) -> Self {
        Self {
            kind,
            first,
            second,
            relation,
        }
    }

    pub fn kind(&self) -> InvariantKind {
        self.kind
    }

    pub fn first(&self) -> &EventType {
        &self.first
    }

    pub fn second(&self) -> &EventType {
        &self.second
    }

    pub fn relation(&self) -> &Relation {
        &self.relation
    }

    /// How much of a candidate violation path is informative.
    ///
    /// Given the event types along the path, returns the number of leading
    /// elements worth reporting. `AlwaysFollowedBy` keeps the whole path
    /// (the violation is the *absence* of `second` up to the end);
    /// `AlwaysPrecedes` cuts after the first `second` that lacks a
    /// preceding `first`; `NeverFollowedBy` cuts after the first `second`
    /// that follows a `first`.
    pub fn shorten_prefix(&self, types: &[EventType]) -> usize {
        match self.kind {
            InvariantKind::AlwaysFollowedBy => types.len(),
            InvariantKind::AlwaysPrecedes => {
                let mut seen_first = false;
                for (i, ty) in types.iter().enumerate() {
                    if *ty == self.second && !seen_first {
                        return i + 1;
                    }
                    if *ty == self.first {
                        seen_first = true;
                    }
                }
                types.len()
            }
            InvariantKind::NeverFollowedBy => {
                let mut seen_first = false;
                for (i, ty) in types.iter().enumerate() {
                    if seen_first && *ty == self.second {
                        return i + 1;
                    }
                    if *ty == self.first {
                        seen_first = true;
                    }
                }
                types.len()
            }
        }
    }
}

impl fmt::Display for BinaryInvariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}({}) {}",
            self.first, self.kind, self.relation, self.second
        )
    }
}

/// A deduplicated set of invariants with stable insertion order.
///
/// The miners emit invariants in a canonical sorted order, so iterating
/// this set is deterministic run over run; regression output and the
/// refinement loop both depend on that.
#[derive(Default, Clone, Debug)]
pub struct InvariantSet {
    invariants: IndexSet<BinaryInvariant>,
}

impl InvariantSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts, returning false if an equal invariant was already present.
    pub fn add(&mut self, invariant: BinaryInvariant) -> bool {
        self.invariants.insert(invariant)
    }

    pub fn remove(&mut self, invariant: &BinaryInvariant) -> bool {
        // shift_remove keeps the iteration order of the remainder stable
        self.invariants.shift_remove(invariant)
    }

    pub fn contains(&self, invariant: &BinaryInvariant) -> bool {
        self.invariants.contains(invariant)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BinaryInvariant> {
        self.invariants.iter()
    }

    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }

    pub fn count_of_kind(&self, kind: InvariantKind) -> usize {
        self.invariants.iter().filter(|i| i.kind() == kind).count()
    }

    /// True iff every invariant of `self` is present in `other`.
    pub fn is_subset(&self, other: &InvariantSet) -> bool {
        self.invariants.iter().all(|i| other.contains(i))
    }
}

impl fmt::Display for InvariantSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for invariant in &self.invariants {
            writeln!(f, "{invariant}")?;
        }
        Ok(())
    }
}

impl<'s> IntoIterator for &'s InvariantSet {
    type Item = &'s BinaryInvariant;
    type IntoIter = indexmap::set::Iter<'s, BinaryInvariant>;

    fn into_iter(self) -> Self::IntoIter {
        self.invariants.iter()
    }
}

impl FromIterator<BinaryInvariant> for InvariantSet {
    fn from_iter<I: IntoIterator<Item = BinaryInvariant>>(iter: I) -> Self {
        let mut set = InvariantSet::new();
        for invariant in iter {
            set.add(invariant);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inv(kind: InvariantKind, a: &str, b: &str) -> BinaryInvariant {
        BinaryInvariant::new(
            kind,
            EventType::label(a),
            EventType::label(b),
            Relation::time(),
        )
    }

    fn types(labels: &[&str]) -> Vec<EventType> {
        labels.iter().map(EventType::label).collect()
    }

    #[test]
    fn display_names_relation_and_pair() {
        assert_eq!(
            inv(InvariantKind::AlwaysFollowedBy, "open", "close").to_string(),
            "open AlwaysFollowedBy(t) close"
        );
    }

    #[test]
    fn set_dedups_and_keeps_insertion_order() {
        let mut set = InvariantSet::new();
        assert!(set.add(inv(InvariantKind::NeverFollowedBy, "b", "a")));
        assert!(set.add(inv(InvariantKind::AlwaysFollowedBy, "a", "b")));
        assert!(!set.add(inv(InvariantKind::NeverFollowedBy, "b", "a")));

        assert_eq!(set.len(), 2);
        assert_eq!(set.count_of_kind(InvariantKind::NeverFollowedBy), 1);
        let order: Vec<String> = set.iter().map(|i| i.to_string()).collect();
        assert_eq!(
            order,
            vec!["b NeverFollowedBy(t) a", "a AlwaysFollowedBy(t) b"]
        );
    }

    #[test]
    fn afby_keeps_whole_path() {
        let i = inv(InvariantKind::AlwaysFollowedBy, "a", "b");
        let path = types(&["a", "c", "c"]);
        assert_eq!(i.shorten_prefix(&path), 3);
    }

    #[test]
    fn ap_cuts_after_unpreceded_witness() {
        let i = inv(InvariantKind::AlwaysPrecedes, "login", "read");
        let path = types(&["boot", "read", "login", "read"]);
        assert_eq!(i.shorten_prefix(&path), 2);

        // Once a `login` came first there is nothing to cut.
        let fine = types(&["login", "read", "read"]);
        assert_eq!(i.shorten_prefix(&fine), 3);
    }

    #[test]
    fn nfby_cuts_after_first_forbidden_follower() {
        let i = inv(InvariantKind::NeverFollowedBy, "close", "write");
        let path = types(&["write", "close", "write", "close"]);
        assert_eq!(i.shorten_prefix(&path), 3);
    }

    #[test]
    fn nfby_self_pair_witnesses_second_occurrence() {
        let i = inv(InvariantKind::NeverFollowedBy, "x", "x");
        let path = types(&["y", "x", "y", "x", "x"]);
        assert_eq!(i.shorten_prefix(&path), 4);
    }
}
