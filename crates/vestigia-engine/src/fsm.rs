//! Finite-state invariant checking over the partition graph.
//!
//! Each invariant kind has a small tracing state set that consumes
//! partitions along a path. A worklist walk from the initial partition
//! accumulates, per partition, the join of every state set that can reach
//! it; the walk stops when no accumulator grows (`is_subset` is the
//! monotone fixed-point test). Every occupied substate carries the
//! shortest history that witnesses reaching it, so a failing substate
//! yields a shortest violating partition path for refinement to work on.

use std::cmp::Ordering;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};
use vestigia_core::EventType;

use crate::invariant::{BinaryInvariant, InvariantKind, InvariantSet};
use crate::partition::{PartitionGraph, PartitionId};

const LOG_TARGET: &str = "vestigia::engine::fsm";

/// A node of a persistent, structurally-shared partition path.
///
/// Chains are append-only: extending shares the whole prefix, and nothing
/// ever mutates a node after construction.
#[derive(Debug)]
struct HistoryNode {
    partition: PartitionId,
    prev: Option<Arc<HistoryNode>>,
    len: u32,
}

/// A non-empty persistent path of partitions, newest element at the head.
#[derive(Clone, Debug)]
pub struct HistoryChain {
    head: Arc<HistoryNode>,
}

impl HistoryChain {
    fn root(partition: PartitionId) -> Self {
        Self {
            head: Arc::new(HistoryNode {
                partition,
                prev: None,
                len: 1,
            }),
        }
    }

    fn extend(&self, partition: PartitionId) -> Self {
        Self {
            head: Arc::new(HistoryNode {
                partition,
                prev: Some(self.head.clone()),
                len: self.head.len + 1,
            }),
        }
    }

    pub fn len(&self) -> u32 {
        self.head.len
    }

    /// The path from its start to the newest partition.
    pub fn to_path(&self) -> Vec<PartitionId> {
        let mut path = Vec::with_capacity(self.head.len as usize);
        let mut cursor = Some(&self.head);
        while let Some(node) = cursor {
            path.push(node.partition);
            cursor = node.prev.as_ref();
        }
        path.reverse();
        path
    }

    /// Shortest-first, then lexicographic on the partition sequence; the
    /// deterministic tie-break used whenever two histories converge on
    /// one substate.
    fn shortlex_cmp(&self, other: &HistoryChain) -> Ordering {
        self.len()
            .cmp(&other.len())
            .then_with(|| self.to_path().cmp(&other.to_path()))
    }
}

/// Keeps the better (shortlex-smaller) witness in `slot`.
fn absorb(slot: &mut Option<HistoryChain>, candidate: HistoryChain) {
    match slot {
        None => *slot = Some(candidate),
        Some(existing) => {
            if candidate.shortlex_cmp(existing) == Ordering::Less {
                *slot = Some(candidate);
            }
        }
    }
}

#[derive(Clone, Default, Debug)]
pub struct AfbyStates {
    /// A `first` was consumed and no `second` has followed yet.
    awaiting_second: Option<HistoryChain>,
    /// No `first` pending; terminating here is fine.
    satisfied: Option<HistoryChain>,
}

#[derive(Clone, Default, Debug)]
pub struct ApStates {
    /// No `first` seen yet.
    before_first: Option<HistoryChain>,
    /// A `first` was seen; any `second` is covered. Absorbing.
    after_first: Option<HistoryChain>,
    /// A `second` arrived before any `first`. Absorbing.
    violated: Option<HistoryChain>,
}

#[derive(Clone, Default, Debug)]
pub struct NfbyStates {
    first_unseen: Option<HistoryChain>,
    first_seen: Option<HistoryChain>,
    /// A `second` arrived after a `first`; failing as soon as occupied.
    second_after: Option<HistoryChain>,
}

/// The tracing state set for one invariant: a tagged union whose shape
/// follows the invariant kind.
#[derive(Clone, Debug)]
pub enum TracingStateSet {
    AlwaysFollowedBy(AfbyStates),
    AlwaysPrecedes(ApStates),
    NeverFollowedBy(NfbyStates),
}

impl TracingStateSet {
    /// The state before any event was consumed, positioned at `at`.
    pub fn initial(kind: InvariantKind, at: PartitionId) -> Self {
        let start = HistoryChain::root(at);
        match kind {
            InvariantKind::AlwaysFollowedBy => TracingStateSet::AlwaysFollowedBy(AfbyStates {
                satisfied: Some(start),
                ..AfbyStates::default()
            }),
            InvariantKind::AlwaysPrecedes => TracingStateSet::AlwaysPrecedes(ApStates {
                before_first: Some(start),
                ..ApStates::default()
            }),
            InvariantKind::NeverFollowedBy => TracingStateSet::NeverFollowedBy(NfbyStates {
                first_unseen: Some(start),
                ..NfbyStates::default()
            }),
        }
    }

    /// Consumes the partition `entered` of type `ty`, extending every
    /// occupied substate's history by one step.
    pub fn transition(
        &self,
        invariant: &BinaryInvariant,
        entered: PartitionId,
        ty: &EventType,
    ) -> TracingStateSet {
        let first = ty == invariant.first();
        let second = ty == invariant.second();
        match self {
            TracingStateSet::AlwaysFollowedBy(states) => {
                let mut next = AfbyStates::default();
                if let Some(h) = &states.satisfied {
                    let slot = if first {
                        &mut next.awaiting_second
                    } else {
                        &mut next.satisfied
                    };
                    absorb(slot, h.extend(entered));
                }
                if let Some(h) = &states.awaiting_second {
                    let slot = if second {
                        &mut next.satisfied
                    } else {
                        &mut next.awaiting_second
                    };
                    absorb(slot, h.extend(entered));
                }
                TracingStateSet::AlwaysFollowedBy(next)
            }
            TracingStateSet::AlwaysPrecedes(states) => {
                let mut next = ApStates::default();
                if let Some(h) = &states.before_first {
                    let slot = if first {
                        &mut next.after_first
                    } else if second {
                        &mut next.violated
                    } else {
                        &mut next.before_first
                    };
                    absorb(slot, h.extend(entered));
                }
                if let Some(h) = &states.after_first {
                    absorb(&mut next.after_first, h.extend(entered));
                }
                if let Some(h) = &states.violated {
                    absorb(&mut next.violated, h.extend(entered));
                }
                TracingStateSet::AlwaysPrecedes(next)
            }
            TracingStateSet::NeverFollowedBy(states) => {
                let mut next = NfbyStates::default();
                if let Some(h) = &states.first_unseen {
                    let slot = if first {
                        &mut next.first_seen
                    } else {
                        &mut next.first_unseen
                    };
                    absorb(slot, h.extend(entered));
                }
                if let Some(h) = &states.first_seen {
                    // For a self-pair the `second` test wins: a repeated
                    // occurrence is exactly the forbidden follower.
                    let slot = if second {
                        &mut next.second_after
                    } else {
                        &mut next.first_seen
                    };
                    absorb(slot, h.extend(entered));
                }
                if let Some(h) = &states.second_after {
                    absorb(&mut next.second_after, h.extend(entered));
                }
                TracingStateSet::NeverFollowedBy(next)
            }
        }
    }

    /// Joins `other` into `self`, keeping the shortlex-smaller witness
    /// per substate. Whether the join *grew* is a separate question,
    /// answered by [`TracingStateSet::is_subset`] before merging.
    pub fn merge_with(&mut self, other: &TracingStateSet) {
        fn join(into: &mut Option<HistoryChain>, from: &Option<HistoryChain>) {
            if let Some(h) = from {
                absorb(into, h.clone());
            }
        }
        match (self, other) {
            (TracingStateSet::AlwaysFollowedBy(a), TracingStateSet::AlwaysFollowedBy(b)) => {
                join(&mut a.awaiting_second, &b.awaiting_second);
                join(&mut a.satisfied, &b.satisfied);
            }
            (TracingStateSet::AlwaysPrecedes(a), TracingStateSet::AlwaysPrecedes(b)) => {
                join(&mut a.before_first, &b.before_first);
                join(&mut a.after_first, &b.after_first);
                join(&mut a.violated, &b.violated);
            }
            (TracingStateSet::NeverFollowedBy(a), TracingStateSet::NeverFollowedBy(b)) => {
                join(&mut a.first_unseen, &b.first_unseen);
                join(&mut a.first_seen, &b.first_seen);
                join(&mut a.second_after, &b.second_after);
            }
            _ => unreachable!("state sets of one invariant share a kind"),
        }
    }

    /// True iff every occupied substate of `self` is occupied in `other`.
    pub fn is_subset(&self, other: &TracingStateSet) -> bool {
        fn le(a: &Option<HistoryChain>, b: &Option<HistoryChain>) -> bool {
            a.is_none() || b.is_some()
        }
        match (self, other) {
            (TracingStateSet::AlwaysFollowedBy(a), TracingStateSet::AlwaysFollowedBy(b)) => {
                le(&a.awaiting_second, &b.awaiting_second) && le(&a.satisfied, &b.satisfied)
            }
            (TracingStateSet::AlwaysPrecedes(a), TracingStateSet::AlwaysPrecedes(b)) => {
                le(&a.before_first, &b.before_first)
                    && le(&a.after_first, &b.after_first)
                    && le(&a.violated, &b.violated)
            }
            (TracingStateSet::NeverFollowedBy(a), TracingStateSet::NeverFollowedBy(b)) => {
                le(&a.first_unseen, &b.first_unseen)
                    && le(&a.first_seen, &b.first_seen)
                    && le(&a.second_after, &b.second_after)
            }
            _ => unreachable!("state sets of one invariant share a kind"),
        }
    }

    /// The witness history of the failing substate, if occupied.
    ///
    /// `NeverFollowedBy` fails wherever its absorbing substate is
    /// occupied; the other two kinds fail only at the TERMINAL partition.
    fn failing_history(&self, at_terminal: bool) -> Option<&HistoryChain> {
        match self {
            TracingStateSet::AlwaysFollowedBy(states) => {
                at_terminal.then_some(states.awaiting_second.as_ref()).flatten()
            }
            TracingStateSet::AlwaysPrecedes(states) => {
                at_terminal.then_some(states.violated.as_ref()).flatten()
            }
            TracingStateSet::NeverFollowedBy(states) => states.second_after.as_ref(),
        }
    }
}

/// A partition path witnessing one invariant violation, already shortened
/// to its informative prefix.
#[derive(Clone, Debug)]
pub struct CounterExample {
    pub invariant: BinaryInvariant,
    pub path: Vec<PartitionId>,
}

impl fmt::Display for CounterExample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} violated along", self.invariant)?;
        for partition in &self.path {
            write!(f, " {partition}")?;
        }
        Ok(())
    }
}

/// Checks one invariant against the partition graph.
///
/// Returns the shortest violating partition path (shortlex-deterministic)
/// or `None` when the graph satisfies the invariant.
pub fn check_invariant(
    partitions: &PartitionGraph,
    invariant: &BinaryInvariant,
) -> Option<CounterExample> {
    let initial = partitions.initial_partition();
    let terminal = partitions.terminal_partition();

    let mut accum: BTreeMap<PartitionId, TracingStateSet> = BTreeMap::new();
    accum.insert(initial, TracingStateSet::initial(invariant.kind(), initial));
    let mut worklist: VecDeque<PartitionId> = VecDeque::from([initial]);

    while let Some(current) = worklist.pop_front() {
        let state = accum
            .get(&current)
            .expect("worklist entries have accumulators")
            .clone();
        let successors: Vec<PartitionId> = partitions
            .successors_via(current, invariant.relation())
            .collect();
        for target in successors {
            let entered_ty = partitions.partition(target).ty().clone();
            let next = state.transition(invariant, target, &entered_ty);
            match accum.get_mut(&target) {
                Some(existing) => {
                    // Joining may still shorten a witness, but only
                    // growth in the monotone subset order re-enters the
                    // worklist; FIFO order settles same-depth ties
                    // before their partition is processed.
                    let grew = !next.is_subset(existing);
                    existing.merge_with(&next);
                    if grew {
                        worklist.push_back(target);
                    }
                }
                None => {
                    accum.insert(target, next);
                    worklist.push_back(target);
                }
            }
        }
    }

    let mut best: Option<&HistoryChain> = None;
    for (partition, state) in &accum {
        if let Some(history) = state.failing_history(*partition == terminal) {
            let better = match best {
                None => true,
                Some(current) => history.shortlex_cmp(current) == Ordering::Less,
            };
            if better {
                best = Some(history);
            }
        }
    }

    let history = best?;
    let full_path = history.to_path();
    let types: Vec<EventType> = full_path
        .iter()
        .map(|p| partitions.partition(*p).ty().clone())
        .collect();
    let keep = invariant.shorten_prefix(&types);
    let mut path = full_path;
    path.truncate(keep);

    let counter_example = CounterExample {
        invariant: invariant.clone(),
        path,
    };
    debug!(target: LOG_TARGET, %counter_example, "invariant violated");
    Some(counter_example)
}

/// Checks every invariant in set order; returns all violations found.
pub fn check_all(partitions: &PartitionGraph, invariants: &InvariantSet) -> Vec<CounterExample> {
    let mut violations = Vec::new();
    for invariant in invariants {
        trace!(target: LOG_TARGET, %invariant, "checking");
        if let Some(ce) = check_invariant(partitions, invariant) {
            violations.push(ce);
        }
    }
    violations
}

#[cfg(test)]
mod tests {
    use vestigia_core::{Event, Relation, TraceGraph};

    use super::*;

    fn log(traces: &[&[&str]]) -> TraceGraph {
        let mut graph = TraceGraph::default();
        for labels in traces {
            graph.add_trace(
                labels
                    .iter()
                    .map(|l| Event::new(EventType::label(l)))
                    .collect(),
            );
        }
        graph
    }

    fn inv(kind: InvariantKind, a: &str, b: &str) -> BinaryInvariant {
        BinaryInvariant::new(
            kind,
            EventType::label(a),
            EventType::label(b),
            Relation::time(),
        )
    }

    fn path_types(pg: &PartitionGraph, path: &[PartitionId]) -> Vec<String> {
        path.iter()
            .map(|p| pg.partition(*p).ty().to_string())
            .collect()
    }

    #[test]
    fn history_chain_shares_prefixes() {
        let root = HistoryChain::root(PartitionId(0));
        let left = root.extend(PartitionId(1));
        let right = root.extend(PartitionId(2));

        assert_eq!(left.len(), 2);
        assert_eq!(left.to_path(), vec![PartitionId(0), PartitionId(1)]);
        assert_eq!(right.to_path(), vec![PartitionId(0), PartitionId(2)]);
        // Both extensions share the root allocation.
        assert!(Arc::ptr_eq(
            left.head.prev.as_ref().expect("has prev"),
            right.head.prev.as_ref().expect("has prev"),
        ));
    }

    #[test]
    fn shortlex_prefers_shorter_then_smaller() {
        let short = HistoryChain::root(PartitionId(9));
        let long = HistoryChain::root(PartitionId(0)).extend(PartitionId(1));
        assert_eq!(short.shortlex_cmp(&long), Ordering::Less);

        let a = HistoryChain::root(PartitionId(0)).extend(PartitionId(1));
        let b = HistoryChain::root(PartitionId(0)).extend(PartitionId(2));
        assert_eq!(a.shortlex_cmp(&b), Ordering::Less);
    }

    #[test]
    fn subset_order_tracks_occupancy_not_witnesses() {
        let invariant = inv(InvariantKind::AlwaysFollowedBy, "a", "b");
        let a = EventType::label("a");

        let start = TracingStateSet::initial(invariant.kind(), PartitionId(0));
        let mut advanced = start.transition(&invariant, PartitionId(2), &a);

        // Consuming an `a` moved the occupancy to `awaiting_second`, so
        // neither set contains the other.
        assert!(start.is_subset(&start));
        assert!(!advanced.is_subset(&start));
        assert!(!start.is_subset(&advanced));

        // After joining, the accumulator covers both; the join is the
        // least upper bound, so merging again adds nothing.
        advanced.merge_with(&start);
        assert!(start.is_subset(&advanced));
        let before = format!("{advanced:?}");
        advanced.merge_with(&start);
        assert_eq!(format!("{advanced:?}"), before);
    }

    #[test]
    fn merge_keeps_the_shortlex_smaller_witness() {
        let invariant = inv(InvariantKind::AlwaysPrecedes, "a", "b");
        let c = EventType::label("c");

        let short = TracingStateSet::initial(invariant.kind(), PartitionId(0))
            .transition(&invariant, PartitionId(3), &c);
        let mut long = TracingStateSet::initial(invariant.kind(), PartitionId(0))
            .transition(&invariant, PartitionId(4), &c)
            .transition(&invariant, PartitionId(3), &c);

        assert!(long.is_subset(&short));
        long.merge_with(&short);
        let TracingStateSet::AlwaysPrecedes(states) = &long else {
            panic!("kind is preserved");
        };
        let witness = states.before_first.as_ref().expect("occupied");
        assert_eq!(witness.to_path(), vec![PartitionId(0), PartitionId(3)]);
    }

    #[test]
    fn satisfied_graph_has_no_counter_example() {
        let graph = log(&[&["a", "b"], &["a", "c", "b"]]);
        let pg = PartitionGraph::initial_from(&graph, &InvariantSet::new());

        assert!(check_invariant(&pg, &inv(InvariantKind::AlwaysFollowedBy, "a", "b")).is_none());
        assert!(check_invariant(&pg, &inv(InvariantKind::AlwaysPrecedes, "a", "b")).is_none());
        assert!(check_invariant(&pg, &inv(InvariantKind::NeverFollowedBy, "b", "a")).is_none());
    }

    #[test]
    fn afby_counter_example_runs_to_terminal() {
        // Merging both `b`s lets `a b e` through, which never reaches `c`.
        let graph = log(&[&["a", "b", "c"], &["d", "b", "e"]]);
        let pg = PartitionGraph::initial_from(&graph, &InvariantSet::new());

        let ce = check_invariant(&pg, &inv(InvariantKind::AlwaysFollowedBy, "a", "c"))
            .expect("merged b admits a path that skips c");
        let types = path_types(&pg, &ce.path);
        assert_eq!(types.first().map(String::as_str), Some("INITIAL"));
        assert_eq!(types.last().map(String::as_str), Some("TERMINAL"));
        assert!(types.contains(&"a".to_string()));
        assert!(!types.contains(&"c".to_string()));
    }

    #[test]
    fn ap_counter_example_stops_at_witness() {
        // Merging both `b`s admits `d b c`: a `c` with no preceding `a`.
        let graph = log(&[&["a", "b", "c"], &["d", "b", "c"]]);
        let pg = PartitionGraph::initial_from(&graph, &InvariantSet::new());

        let ce = check_invariant(&pg, &inv(InvariantKind::AlwaysPrecedes, "a", "c"))
            .expect("d-path reaches c without a");
        let types = path_types(&pg, &ce.path);
        assert_eq!(types.last().map(String::as_str), Some("c"));
        assert!(!types.contains(&"a".to_string()));
    }

    #[test]
    fn nfby_counter_example_stops_at_forbidden_follower() {
        let graph = log(&[&["x", "y", "x"]]);
        let pg = PartitionGraph::initial_from(&graph, &InvariantSet::new());

        let ce = check_invariant(&pg, &inv(InvariantKind::NeverFollowedBy, "x", "x"))
            .expect("x repeats");
        let types = path_types(&pg, &ce.path);
        // INITIAL x y x — shortened at the second x.
        assert_eq!(types, vec!["INITIAL", "x", "y", "x"]);
    }

    #[test]
    fn checker_handles_cycles() {
        // One partition per type gives b a self-loop through c: b c b.
        let graph = log(&[&["a", "b", "c", "b"]]);
        let pg = PartitionGraph::initial_from(&graph, &InvariantSet::new());

        // NFby(b, b) is genuinely violated; the checker must terminate on
        // the cyclic graph and report the loop.
        let ce = check_invariant(&pg, &inv(InvariantKind::NeverFollowedBy, "b", "b"))
            .expect("b repeats through the loop");
        let types = path_types(&pg, &ce.path);
        assert_eq!(types, vec!["INITIAL", "a", "b", "c", "b"]);

        // And an invariant the loop cannot break stays clean.
        assert!(check_invariant(&pg, &inv(InvariantKind::AlwaysPrecedes, "a", "b")).is_none());
    }

    #[test]
    fn check_all_reports_in_set_order() {
        let graph = log(&[&["x", "y", "x"]]);
        let pg = PartitionGraph::initial_from(&graph, &InvariantSet::new());

        let mut set = InvariantSet::new();
        set.add(inv(InvariantKind::NeverFollowedBy, "x", "x"));
        set.add(inv(InvariantKind::AlwaysPrecedes, "x", "y"));
        set.add(inv(InvariantKind::NeverFollowedBy, "y", "y"));

        let violations = check_all(&pg, &set);
        // The quotient admits INITIAL x (y x)* TERMINAL, so both
        // self-pair invariants break while AP(x, y) survives.
        let names: Vec<String> = violations.iter().map(|v| v.invariant.to_string()).collect();
        assert_eq!(
            names,
            vec!["x NeverFollowedBy(t) x", "y NeverFollowedBy(t) y"]
        );
    }
}
