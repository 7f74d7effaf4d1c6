//! Single-pass chain-walking miner.

use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools as _;
use tracing::debug;
use vestigia_core::{EventType, TraceGraph};

use super::LOG_TARGET;
use crate::invariant::{BinaryInvariant, InvariantKind, InvariantSet};

/// Counters for one totally-ordered trace, filled by a forward walk.
#[derive(Default)]
struct TraceCounters {
    /// Event types encountered so far in this trace.
    seen: BTreeSet<EventType>,
    /// Occurrences of each type in this trace.
    count: BTreeMap<EventType, u64>,
    /// `followed_by[(a, b)]`: at each `b`, the number of `a`s that
    /// appeared before it. The final value is the count of `a`s before
    /// the *last* `b` of the trace.
    followed_by: BTreeMap<(EventType, EventType), u64>,
    /// `precedes[(a, b)]`: the number of `b`s that occurred after at
    /// least one `a`.
    precedes: BTreeMap<(EventType, EventType), u64>,
}

impl TraceCounters {
    fn observe(&mut self, ty: &EventType) {
        // Update pair counters before counting this occurrence, so a
        // self-pair (a == b) relates this event only to strictly earlier
        // occurrences of the same type.
        for earlier in &self.seen {
            let count_earlier = self.count.get(earlier).copied().unwrap_or(0);
            self.followed_by
                .insert((earlier.clone(), ty.clone()), count_earlier);
            *self
                .precedes
                .entry((earlier.clone(), ty.clone()))
                .or_insert(0) += 1;
        }
        *self.count.entry(ty.clone()).or_insert(0) += 1;
        self.seen.insert(ty.clone());
    }

    fn count(&self, ty: &EventType) -> u64 {
        self.count.get(ty).copied().unwrap_or(0)
    }

    fn followed_by(&self, a: &EventType, b: &EventType) -> u64 {
        self.followed_by
            .get(&(a.clone(), b.clone()))
            .copied()
            .unwrap_or(0)
    }

    fn precedes(&self, a: &EventType, b: &EventType) -> u64 {
        self.precedes
            .get(&(a.clone(), b.clone()))
            .copied()
            .unwrap_or(0)
    }
}

/// Mines all three invariant families in one forward walk per trace.
///
/// Candidate pairs are drawn from the event types that actually occur in
/// the log; sentinels anchor the walk but are never invariant operands.
/// Output order is canonical (kind-major, then sorted pairs), identical to
/// the transitive-closure miner's.
pub fn mine_invariants(graph: &TraceGraph) -> InvariantSet {
    let alphabet = graph.alphabet();
    let pairs: Vec<(EventType, EventType)> = alphabet
        .iter()
        .cartesian_product(alphabet.iter())
        .map(|(a, b)| (a.clone(), b.clone()))
        .collect();

    // Every candidate holds until some trace falsifies it.
    let mut afby_holds: BTreeMap<(EventType, EventType), bool> =
        pairs.iter().cloned().map(|p| (p, true)).collect();
    let mut ap_holds = afby_holds.clone();
    let mut nfby_holds = afby_holds.clone();

    for start in graph.trace_starts() {
        let mut counters = TraceCounters::default();
        for node in graph.walk_trace(start) {
            counters.observe(graph.ty(node));
        }

        for (a, b) in &pairs {
            // All `a`s followed by a `b` iff the count of `a`s before the
            // last `b` is the full per-trace count of `a`.
            if counters.count(a) != counters.followed_by(a, b) {
                afby_holds.insert((a.clone(), b.clone()), false);
            }
            // Every `b` preceded by an `a` iff each of the trace's `b`s
            // occurred after at least one `a`.
            if counters.precedes(a, b) != counters.count(b) {
                ap_holds.insert((a.clone(), b.clone()), false);
            }
            if counters.followed_by(a, b) != 0 {
                nfby_holds.insert((a.clone(), b.clone()), false);
            }
        }
    }

    let relation = graph.time_relation().clone();
    let mut set = InvariantSet::new();
    for kind in InvariantKind::ALL {
        let holds = match kind {
            InvariantKind::AlwaysFollowedBy => &afby_holds,
            InvariantKind::AlwaysPrecedes => &ap_holds,
            InvariantKind::NeverFollowedBy => &nfby_holds,
        };
        for ((a, b), holds) in holds {
            if *holds {
                set.add(BinaryInvariant::new(
                    kind,
                    a.clone(),
                    b.clone(),
                    relation.clone(),
                ));
            }
        }
    }

    debug!(
        target: LOG_TARGET,
        traces = graph.trace_count(),
        alphabet = alphabet.len(),
        mined = set.len(),
        "chain miner done"
    );
    set
}
