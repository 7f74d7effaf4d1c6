//! Counter-example guided refinement.
//!
//! Splits partitions until the FSM checker accepts every mined invariant.
//! Each round re-checks the whole working set, picks the deterministically
//! first violation, and eliminates its counter-example path by splitting
//! the latest partition on the path whose members disagree about following
//! the path's next hop.

use std::collections::BTreeSet;

use snafu::Snafu;
use tracing::{debug, warn};
use vestigia_core::{NodeId, TraceGraph};

use crate::config::{EngineConfig, UnrefinablePolicy};
use crate::fsm::{CounterExample, check_all};
use crate::invariant::{BinaryInvariant, InvariantSet};
use crate::partition::{PartitionGraph, PartitionId, PartitionOpError};

const LOG_TARGET: &str = "vestigia::engine::refine";

#[derive(Debug, Snafu)]
pub enum RefineError {
    #[snafu(display("counter-example for `{invariant}` admits no partition split"))]
    Unrefinable { invariant: BinaryInvariant },
    #[snafu(transparent)]
    PartitionOp { source: PartitionOpError },
}

pub type RefineResult<T> = std::result::Result<T, RefineError>;

/// What the refinement loop did.
#[derive(Default, Debug)]
pub struct RefineOutcome {
    pub splits: usize,
    /// Invariants dropped as unrefinable under
    /// [`UnrefinablePolicy::Drop`].
    pub dropped: Vec<BinaryInvariant>,
    /// The invariants still standing after drops.
    pub working: InvariantSet,
}

/// Refines `partitions` until no invariant of `invariants` is violated.
///
/// Terminates because every split strictly increases the partition count
/// (bounded by the node count) and every drop strictly shrinks the
/// working set.
pub fn refine(
    graph: &TraceGraph,
    partitions: &mut PartitionGraph,
    invariants: &InvariantSet,
    config: &EngineConfig,
) -> RefineResult<RefineOutcome> {
    let mut outcome = RefineOutcome {
        working: invariants.clone(),
        ..RefineOutcome::default()
    };

    loop {
        let mut violations = check_all(partitions, &outcome.working);
        // Deterministic processing order: lexicographic on the
        // invariant's serialized form.
        violations.sort_by_key(|ce| ce.invariant.to_string());
        let Some(ce) = violations.into_iter().next() else {
            break;
        };

        match split_for(graph, partitions, &ce)? {
            Some((position, left, right)) => {
                debug!(
                    target: LOG_TARGET,
                    invariant = %ce.invariant,
                    %position,
                    %left,
                    %right,
                    "split to eliminate counter-example"
                );
                outcome.splits += 1;
            }
            None => match config.unrefinable {
                UnrefinablePolicy::Drop => {
                    warn!(
                        target: LOG_TARGET,
                        invariant = %ce.invariant,
                        "counter-example is unrefinable; dropping invariant"
                    );
                    outcome.working.remove(&ce.invariant);
                    outcome.dropped.push(ce.invariant);
                }
                UnrefinablePolicy::Fail => {
                    return UnrefinableSnafu {
                        invariant: ce.invariant,
                    }
                    .fail();
                }
            },
        }
    }

    debug!(
        target: LOG_TARGET,
        splits = outcome.splits,
        dropped = outcome.dropped.len(),
        partitions = partitions.partition_count(),
        "refinement converged"
    );
    Ok(outcome)
}

/// Splits the latest partition on the counter-example path whose members
/// disagree about following the path's next hop.
///
/// Walks `i` from the end of the path backwards; at each position the
/// candidate halves are the members with a transition (over the
/// invariant's relation) into the path's next partition, and the rest.
/// Returns the split position and new ids, or `None` when no position
/// separates.
fn split_for(
    graph: &TraceGraph,
    partitions: &mut PartitionGraph,
    ce: &CounterExample,
) -> RefineResult<Option<(PartitionId, PartitionId, PartitionId)>> {
    let relation = ce.invariant.relation();
    for i in (0..ce.path.len().saturating_sub(1)).rev() {
        let position = ce.path[i];
        let next_hop = ce.path[i + 1];

        let members = partitions.partition(position).members();
        let stays_on_path: BTreeSet<NodeId> = members
            .iter()
            .copied()
            .filter(|member| {
                graph
                    .node(*member)
                    .outgoing(relation)
                    .any(|t| partitions.node_partition(t.target()) == next_hop)
            })
            .collect();
        let leaves_path: BTreeSet<NodeId> = members
            .iter()
            .copied()
            .filter(|member| !stays_on_path.contains(member))
            .collect();

        if !stays_on_path.is_empty() && !leaves_path.is_empty() {
            let (left, right) = partitions.split(graph, position, &stays_on_path, &leaves_path)?;
            return Ok(Some((position, left, right)));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use vestigia_core::{Event, EventType};

    use super::*;
    use crate::fsm::check_invariant;
    use crate::mine;

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

    #[test_log::test]
    fn context_dependent_follower_forces_a_split() {
        // One b partition admits `a b e`, breaking mined AFby(a, c).
        let graph = log(&[&["a", "b", "c"], &["d", "b", "e"]]);
        let invariants = mine::chain::mine_invariants(&graph);
        let mut partitions = PartitionGraph::initial_from(&graph, &invariants);
        let config = EngineConfig::default();

        let before = partitions.partition_count();
        let outcome = refine(&graph, &mut partitions, &invariants, &config).expect("refinable");

        assert!(outcome.dropped.is_empty());
        assert!(outcome.splits >= 1);
        assert!(partitions.partition_count() > before);
        assert!(partitions.check_consistency(&graph));
        // The b occurrences now live in distinct partitions.
        assert_eq!(
            partitions
                .partitions_of_type(&EventType::label("b"))
                .count(),
            2
        );
        // And every mined invariant passes.
        for invariant in &outcome.working {
            assert!(check_invariant(&partitions, invariant).is_none());
        }
    }

    #[test]
    fn satisfied_graph_refines_to_itself() {
        // The type-partitioned graph of these traces accepts exactly the
        // input language, so nothing splits.
        let graph = log(&[&["a", "b", "c"], &["a", "b", "d"]]);
        let invariants = mine::chain::mine_invariants(&graph);
        let mut partitions = PartitionGraph::initial_from(&graph, &invariants);
        let config = EngineConfig::default();

        let before = partitions.partition_count();
        let outcome = refine(&graph, &mut partitions, &invariants, &config).expect("no work");

        assert_eq!(outcome.splits, 0);
        assert!(outcome.dropped.is_empty());
        assert_eq!(partitions.partition_count(), before);
    }

    #[test_log::test]
    fn unrefinable_counter_example_follows_policy() {
        use crate::invariant::InvariantKind;
        use vestigia_core::Relation;

        // NFby(a, b) is plainly false of the lone trace `a b`; its
        // counter-example runs along fully-concrete partitions, so no
        // split can eliminate it.
        let graph = log(&[&["a", "b"]]);
        let mut set = InvariantSet::new();
        let bogus = BinaryInvariant::new(
            InvariantKind::NeverFollowedBy,
            EventType::label("a"),
            EventType::label("b"),
            Relation::time(),
        );
        set.add(bogus.clone());

        let mut partitions = PartitionGraph::initial_from(&graph, &set);
        let config = EngineConfig::default();
        let outcome = refine(&graph, &mut partitions, &set, &config).expect("drop policy");
        assert_eq!(outcome.dropped, vec![bogus.clone()]);
        assert!(outcome.working.is_empty());

        let mut partitions = PartitionGraph::initial_from(&graph, &set);
        let strict = EngineConfig::builder()
            .unrefinable(UnrefinablePolicy::Fail)
            .build();
        assert!(matches!(
            refine(&graph, &mut partitions, &set, &strict),
            Err(RefineError::Unrefinable { .. })
        ));
    }

    #[test]
    fn refinement_preserves_partition_invariants() {
        let graph = log(&[
            &["open", "read", "close"],
            &["open", "write", "close"],
            &["probe", "read", "reset"],
        ]);
        let invariants = mine::chain::mine_invariants(&graph);
        let mut partitions = PartitionGraph::initial_from(&graph, &invariants);
        let config = EngineConfig::default();

        refine(&graph, &mut partitions, &invariants, &config).expect("refinable");
        assert!(partitions.check_consistency(&graph));
    }
}
