//! k-equivalence coarsening.
//!
//! Merges partitions that the refined graph cannot tell apart: same event
//! type and, recursively, the same number of successors per relation into
//! every equivalence class of targets. A merge is kept only if the FSM
//! checker still accepts every invariant, otherwise it is reverted by
//! splitting along the saved member sets.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use itertools::Itertools as _;
use tracing::{debug, trace};
use vestigia_core::{NodeId, Relation, TraceGraph};

use crate::fsm::check_all;
use crate::invariant::InvariantSet;
use crate::partition::{PartitionGraph, PartitionId, PartitionOpResult};

const LOG_TARGET: &str = "vestigia::engine::coarsen";

/// What the coarsening loop did.
#[derive(Default, Debug)]
pub struct CoarsenOutcome {
    pub merges: usize,
    /// Merge attempts reverted because they broke an invariant.
    pub reverted: usize,
}

/// ∞-equivalence classes by signature refinement.
///
/// k = 0 groups by event type; each round re-groups by (own class, number
/// of successors per relation and target class) until stable. Class
/// numbers are assigned by first occurrence in id order, so an unchanged
/// partitioning yields an identical map and the fixed point is a plain
/// equality test.
fn equivalence_classes(partitions: &PartitionGraph) -> BTreeMap<PartitionId, usize> {
    let ids = partitions.ids();

    let mut class: BTreeMap<PartitionId, usize> = BTreeMap::new();
    let mut type_class: Vec<(&vestigia_core::EventType, usize)> = Vec::new();
    for id in &ids {
        let ty = partitions.partition(*id).ty();
        let number = match type_class.iter().find(|(t, _)| *t == ty) {
            Some((_, number)) => *number,
            None => {
                let number = type_class.len();
                type_class.push((ty, number));
                number
            }
        };
        class.insert(*id, number);
    }

    loop {
        type Signature = (usize, Vec<((Relation, usize), usize)>);
        let mut numbering: BTreeMap<Signature, usize> = BTreeMap::new();
        let mut next: BTreeMap<PartitionId, usize> = BTreeMap::new();

        for id in &ids {
            let mut successor_counts: BTreeMap<(Relation, usize), usize> = BTreeMap::new();
            for edge in partitions.successors(*id) {
                *successor_counts
                    .entry((edge.relation.clone(), class[&edge.target]))
                    .or_insert(0) += 1;
            }
            let signature: Signature = (class[id], successor_counts.into_iter().collect());
            let fresh = numbering.len();
            let number = *numbering.entry(signature).or_insert(fresh);
            next.insert(*id, number);
        }

        if next == class {
            return class;
        }
        class = next;
    }
}

/// Merges ∞-equivalent partitions for as long as every invariant
/// survives the merge.
///
/// Failed pairs are remembered by member fingerprints (stable across the
/// revert) and never retried: a later merge elsewhere only widens the
/// graph's language, so a violation cannot disappear.
pub fn coarsen(
    graph: &TraceGraph,
    partitions: &mut PartitionGraph,
    invariants: &InvariantSet,
) -> PartitionOpResult<CoarsenOutcome> {
    let mut outcome = CoarsenOutcome::default();
    let mut failed: BTreeSet<(NodeId, NodeId)> = BTreeSet::new();

    'merged: loop {
        let class = equivalence_classes(partitions);
        let mut groups: BTreeMap<usize, Vec<PartitionId>> = BTreeMap::new();
        for (id, number) in &class {
            groups.entry(*number).or_default().push(*id);
        }

        for group in groups.values().filter(|g| g.len() >= 2) {
            for (p, q) in group.iter().copied().tuple_combinations() {
                let fingerprint = pair_fingerprint(partitions, p, q);
                if failed.contains(&fingerprint) {
                    continue;
                }

                let p_members: BTreeSet<NodeId> =
                    partitions.partition(p).members().iter().copied().collect();
                let q_members: BTreeSet<NodeId> =
                    partitions.partition(q).members().iter().copied().collect();

                let merged = partitions.merge(graph, p, q)?;
                if check_all(partitions, invariants).is_empty() {
                    trace!(target: LOG_TARGET, %p, %q, %merged, "kept merge");
                    outcome.merges += 1;
                    continue 'merged;
                }

                partitions.split(graph, merged, &p_members, &q_members)?;
                failed.insert(fingerprint);
                outcome.reverted += 1;
                trace!(target: LOG_TARGET, %p, %q, "merge broke an invariant, reverted");
                // The revert consumed `p` and `q` (the split minted fresh
                // ids), so the rest of this sweep holds stale ids.
                continue 'merged;
            }
        }
        break;
    }

    debug!(
        target: LOG_TARGET,
        merges = outcome.merges,
        reverted = outcome.reverted,
        partitions = partitions.partition_count(),
        "coarsening converged"
    );
    Ok(outcome)
}

fn pair_fingerprint(
    partitions: &PartitionGraph,
    p: PartitionId,
    q: PartitionId,
) -> (NodeId, NodeId) {
    let a = partitions.partition(p).fingerprint();
    let b = partitions.partition(q).fingerprint();
    if a <= b { (a, b) } else { (b, a) }
}
