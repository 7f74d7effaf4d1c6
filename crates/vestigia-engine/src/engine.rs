//! Pipeline orchestration: build → validate → mine → partition → refine →
//! coarsen.

use std::collections::BTreeMap;

use serde::Serialize;
use snafu::{ResultExt as _, Snafu};
use tracing::info;
use vestigia_core::{Event, NodeId, TraceGraph, TraceStructureError};

use crate::coarsen;
use crate::config::EngineConfig;
use crate::fsm;
use crate::invariant::{BinaryInvariant, InvariantKind, InvariantSet};
use crate::mine::{self, MineError};
use crate::partition::{PartitionGraph, PartitionId, PartitionOpError};
use crate::refine::{self, RefineError};

const LOG_TARGET: &str = "vestigia::engine";

#[derive(Debug, Snafu)]
pub enum EngineError {
    #[snafu(display("invalid trace structure: {source}"))]
    Structure { source: TraceStructureError },
    #[snafu(transparent)]
    Mine { source: MineError },
    #[snafu(transparent)]
    Refine { source: RefineError },
    #[snafu(transparent)]
    Coarsen { source: PartitionOpError },
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// The inference output: the final model plus everything needed to
/// explain it.
#[derive(Debug)]
pub struct Inference {
    pub graph: TraceGraph,
    pub model: PartitionGraph,
    /// The full mined set, before any unrefinable drops.
    pub invariants: InvariantSet,
    /// Invariants dropped as unrefinable.
    pub dropped: Vec<BinaryInvariant>,
    pub splits: usize,
    pub merges: usize,
}

/// Machine-readable run summary for the CLI.
#[derive(Serialize, Debug)]
pub struct InferenceSummary {
    pub traces: usize,
    pub events: usize,
    pub states: usize,
    pub transitions: usize,
    pub invariants: BTreeMap<InvariantKind, usize>,
    pub dropped_invariants: Vec<String>,
    pub splits: usize,
    pub merges: usize,
}

impl Inference {
    /// Counts honoring the sentinel visibility flags.
    pub fn summary(&self, config: &EngineConfig) -> InferenceSummary {
        let hidden = |id: PartitionId| {
            (!config.show_initial && id == self.model.initial_partition())
                || (!config.show_terminal && id == self.model.terminal_partition())
        };
        let states = self
            .model
            .partitions()
            .filter(|(id, _)| !hidden(*id))
            .count();
        let transitions = self
            .model
            .partitions()
            .filter(|(id, _)| !hidden(*id))
            .flat_map(|(_, p)| p.edges())
            .filter(|e| !hidden(e.target))
            .count();

        let mut invariants: BTreeMap<InvariantKind, usize> = BTreeMap::new();
        for kind in InvariantKind::ALL {
            invariants.insert(kind, self.invariants.count_of_kind(kind));
        }

        InferenceSummary {
            traces: self.graph.trace_count(),
            events: self.graph.node_count() - 2,
            states,
            transitions,
            invariants,
            dropped_invariants: self.dropped.iter().map(|i| i.to_string()).collect(),
            splits: self.splits,
            merges: self.merges,
        }
    }

    /// The constituent event nodes of one model state, with their events,
    /// for explanation output.
    pub fn partition_members(&self, id: PartitionId) -> Vec<(NodeId, &Event)> {
        self.model
            .partition(id)
            .members()
            .iter()
            .map(|node| (*node, self.graph.node(*node).event()))
            .collect()
    }
}

/// Runs the whole pipeline over already-parsed traces.
pub fn infer(traces: Vec<Vec<Event>>, config: &EngineConfig) -> EngineResult<Inference> {
    let mut graph = TraceGraph::new(config.time_relation.clone());
    for events in traces {
        graph.add_trace(events);
    }
    infer_graph(graph, config)
}

/// Runs the pipeline over a pre-built trace graph.
pub fn infer_graph(graph: TraceGraph, config: &EngineConfig) -> EngineResult<Inference> {
    graph.validate_total_order().context(StructureSnafu)?;

    let invariants = mine::mine(&graph, config)?;
    info!(
        target: LOG_TARGET,
        traces = graph.trace_count(),
        mined = invariants.len(),
        "mined invariant set"
    );

    let mut model = PartitionGraph::initial_from(&graph, &invariants);
    let (splits, dropped, working) = if config.refine_enabled {
        let outcome = refine::refine(&graph, &mut model, &invariants, config)?;
        (outcome.splits, outcome.dropped, outcome.working)
    } else {
        (0, Vec::new(), invariants.clone())
    };

    let merges = if config.coarsen_enabled {
        // Coarsening preserves only what the current graph satisfies;
        // with refinement disabled, pre-violated invariants cannot
        // constrain merging.
        let preserved: InvariantSet = working
            .iter()
            .filter(|i| fsm::check_invariant(&model, i).is_none())
            .cloned()
            .collect();
        coarsen::coarsen(&graph, &mut model, &preserved)?.merges
    } else {
        0
    };

    info!(
        target: LOG_TARGET,
        states = model.partition_count(),
        splits,
        merges,
        "inference done"
    );
    Ok(Inference {
        graph,
        model,
        invariants,
        dropped,
        splits,
        merges,
    })
}
