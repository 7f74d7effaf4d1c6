//! Transitive-closure reference miner.
//!
//! Re-derives the invariant families from per-instance reachability over
//! the time relation instead of walk counters. On a finite chain graph it
//! produces exactly the chain miner's set; the engine uses it for
//! cross-validation and exposes it behind a configuration flag.

use std::collections::BTreeMap;

use tracing::debug;
use vestigia_core::{EventType, TraceGraph};

use super::{ClosureCapacitySnafu, LOG_TARGET, MineResult};
use crate::invariant::{BinaryInvariant, InvariantKind, InvariantSet};

/// Hard cap on per-trace closure size; a trace longer than this would make
/// the per-instance reachability sets a memory hazard, so mining refuses
/// instead of crashing the process.
pub const CLOSURE_EVENT_CAP: usize = 1 << 16;

/// Fixed-width bitset over interned type indices.
#[derive(Clone, PartialEq, Eq, Debug)]
struct TypeSet {
    words: Vec<u64>,
}

impl TypeSet {
    fn new(width: usize) -> Self {
        Self {
            words: vec![0; width.div_ceil(64)],
        }
    }

    fn insert(&mut self, index: usize) {
        self.words[index / 64] |= 1 << (index % 64);
    }

    fn contains(&self, index: usize) -> bool {
        self.words[index / 64] & (1 << (index % 64)) != 0
    }
}

/// Mines by transitively closing each trace over the time relation.
///
/// For a chain, the closure of instance `i` is the set of types occurring
/// strictly after (resp. before) position `i`; the families follow by
/// quantifying over instances:
/// - `AFby(a, b)`: every instance of `a` reaches an instance of `b`;
/// - `AP(a, b)`: every instance of `b` is reached from an instance of `a`;
/// - `NFby(a, b)`: no instance of `a` reaches an instance of `b`;
/// each across all traces.
pub fn mine_invariants(graph: &TraceGraph) -> MineResult<InvariantSet> {
    let alphabet = graph.alphabet();
    let type_index: BTreeMap<&EventType, usize> =
        alphabet.iter().enumerate().map(|(i, t)| (t, i)).collect();
    let width = alphabet.len();

    let mut afby_holds: BTreeMap<(EventType, EventType), bool> = alphabet
        .iter()
        .flat_map(|a| alphabet.iter().map(move |b| ((a.clone(), b.clone()), true)))
        .collect();
    let mut ap_holds = afby_holds.clone();
    let mut nfby_holds = afby_holds.clone();

    for start in graph.trace_starts() {
        let instances: Vec<usize> = graph
            .walk_trace(start)
            .map(|node| type_index[graph.ty(node)])
            .collect();
        let len = instances.len();
        if len > CLOSURE_EVENT_CAP {
            return ClosureCapacitySnafu {
                nodes: len,
                cap: CLOSURE_EVENT_CAP,
            }
            .fail();
        }

        // Closure of the chain: types reachable after / before each
        // instance, propagated from the far end.
        let mut after = vec![TypeSet::new(width); len];
        for i in (0..len.saturating_sub(1)).rev() {
            after[i] = after[i + 1].clone();
            after[i].insert(instances[i + 1]);
        }
        let mut before = vec![TypeSet::new(width); len];
        for i in 1..len {
            before[i] = before[i - 1].clone();
            before[i].insert(instances[i - 1]);
        }

        for (a, b) in afby_holds.keys().cloned().collect::<Vec<_>>() {
            let ai = type_index[&a];
            let bi = type_index[&b];
            let a_instances = (0..len).filter(|&i| instances[i] == ai);
            let mut b_instances = (0..len).filter(|&i| instances[i] == bi);

            for i in a_instances {
                if !after[i].contains(bi) {
                    afby_holds.insert((a.clone(), b.clone()), false);
                }
                if after[i].contains(bi) {
                    nfby_holds.insert((a.clone(), b.clone()), false);
                }
            }
            if b_instances.any(|i| !before[i].contains(ai)) {
                ap_holds.insert((a.clone(), b.clone()), false);
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
        alphabet = width,
        mined = set.len(),
        "closure miner done"
    );
    Ok(set)
}
