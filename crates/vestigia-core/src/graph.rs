use std::collections::BTreeSet;
use std::fmt;

use snafu::Snafu;

use crate::event::{Event, EventType, Relation};

/// Index of an [`EventNode`] in a [`TraceGraph`] arena.
///
/// Node ids are dense, assigned in insertion order, and never reused.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn from_index(index: usize) -> Self {
        NodeId(u32::try_from(index).expect("node arena exceeds u32 range"))
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// A directed edge between two event nodes, tagged by its relation.
///
/// Immutable after construction.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Transition {
    source: NodeId,
    target: NodeId,
    relation: Relation,
}

impl Transition {
    pub fn new(source: NodeId, target: NodeId, relation: Relation) -> Self {
        Self {
            source,
            target,
            relation,
        }
    }

    pub fn source(&self) -> NodeId {
        self.source
    }

    pub fn target(&self) -> NodeId {
        self.target
    }

    pub fn relation(&self) -> &Relation {
        &self.relation
    }
}

/// A node of the trace graph: one event occurrence plus its outgoing
/// transitions, in insertion order.
#[derive(Clone, Debug)]
pub struct EventNode {
    event: Event,
    transitions: Vec<Transition>,
}

impl EventNode {
    fn new(event: Event) -> Self {
        Self {
            event,
            transitions: Vec::new(),
        }
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn ty(&self) -> &EventType {
        self.event.ty()
    }

    /// All outgoing transitions, every relation, insertion order.
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Outgoing transitions restricted to one relation.
    pub fn outgoing<'n>(&'n self, relation: &'n Relation) -> impl Iterator<Item = &'n Transition> {
        self.transitions
            .iter()
            .filter(move |t| t.relation() == relation)
    }
}

/// Structural problems detected in a supposedly totally-ordered graph.
#[derive(Debug, Snafu)]
pub enum TraceStructureError {
    #[snafu(display("node {node} has no outgoing {relation} transition"))]
    MissingTimeSuccessor { node: NodeId, relation: Relation },
    #[snafu(display("node {node} has {found} outgoing {relation} transitions, expected one"))]
    MultipleTimeSuccessors {
        node: NodeId,
        relation: Relation,
        found: usize,
    },
    #[snafu(display("TERMINAL node {node} has {found} outgoing transitions"))]
    TerminalSuccessors { node: NodeId, found: usize },
    #[snafu(display(
        "INITIAL node {node} starts {found} chains but the graph holds {expected} traces"
    ))]
    InitialFanoutMismatch {
        node: NodeId,
        found: usize,
        expected: usize,
    },
}

pub type TraceStructureResult<T> = std::result::Result<T, TraceStructureError>;

/// The union of all observed traces.
///
/// Each trace is a chain `INITIAL → e₁ → … → eₙ → TERMINAL` over the time
/// relation; every trace shares the single `INITIAL` source and `TERMINAL`
/// sink. Nodes live in an arena and are addressed by [`NodeId`], so the
/// graph owns every node for the program's duration and cycles of
/// references never arise.
#[derive(Clone, Debug)]
pub struct TraceGraph {
    nodes: Vec<EventNode>,
    initial: NodeId,
    terminal: NodeId,
    time_relation: Relation,
    trace_count: usize,
}

impl Default for TraceGraph {
    fn default() -> Self {
        Self::new(Relation::time())
    }
}

impl TraceGraph {
    pub fn new(time_relation: Relation) -> Self {
        let nodes = vec![
            EventNode::new(Event::new(EventType::Initial)),
            EventNode::new(Event::new(EventType::Terminal)),
        ];
        Self {
            nodes,
            initial: NodeId(0),
            terminal: NodeId(1),
            time_relation,
            trace_count: 0,
        }
    }

    pub fn initial(&self) -> NodeId {
        self.initial
    }

    pub fn terminal(&self) -> NodeId {
        self.terminal
    }

    pub fn time_relation(&self) -> &Relation {
        &self.time_relation
    }

    pub fn trace_count(&self) -> usize {
        self.trace_count
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: NodeId) -> &EventNode {
        &self.nodes[id.index()]
    }

    pub fn ty(&self, id: NodeId) -> &EventType {
        self.nodes[id.index()].ty()
    }

    /// All nodes, sentinels included, in id order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &EventNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeId::from_index(i), n))
    }

    /// The set of domain event types occurring in the graph, sorted.
    pub fn alphabet(&self) -> BTreeSet<EventType> {
        self.nodes
            .iter()
            .filter(|n| !n.ty().is_sentinel())
            .map(|n| n.ty().clone())
            .collect()
    }

    /// Appends one trace as a chain through the shared sentinels.
    ///
    /// An empty trace contributes a bare `INITIAL → TERMINAL` edge.
    pub fn add_trace(&mut self, events: Vec<Event>) {
        let ids: Vec<NodeId> = events
            .into_iter()
            .map(|event| {
                let id = NodeId::from_index(self.nodes.len());
                self.nodes.push(EventNode::new(event));
                id
            })
            .collect();

        let rel = self.time_relation.clone();
        match ids.first().copied() {
            Some(first) => {
                self.link(self.initial, first, rel.clone());
                for window in ids.windows(2) {
                    self.link(window[0], window[1], rel.clone());
                }
                self.link(*ids.last().expect("non-empty"), self.terminal, rel);
            }
            None => {
                self.link(self.initial, self.terminal, rel);
            }
        }
        self.trace_count += 1;
    }

    /// Adds an auxiliary-relation transition between two existing nodes.
    pub fn add_relation(&mut self, source: NodeId, target: NodeId, relation: Relation) {
        self.link(source, target, relation);
    }

    fn link(&mut self, source: NodeId, target: NodeId, relation: Relation) {
        let transition = Transition::new(source, target, relation);
        self.nodes[source.index()].transitions.push(transition);
    }

    /// First node of each trace (or `TERMINAL` for an empty trace), in the
    /// order the traces were added.
    pub fn trace_starts(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.node(self.initial)
            .outgoing(&self.time_relation)
            .map(|t| t.target())
    }

    /// Walks one chain in time order, yielding domain nodes only.
    ///
    /// Stops at `TERMINAL` (exclusive) or at the first node without a time
    /// successor; [`TraceGraph::validate_total_order`] reports the latter
    /// as a structure error.
    pub fn walk_trace(&self, start: NodeId) -> TraceWalk<'_> {
        TraceWalk {
            graph: self,
            next: Some(start),
        }
    }

    /// Checks the total-order invariants.
    ///
    /// Every non-`TERMINAL` node must have exactly one outgoing time
    /// transition, `TERMINAL` none, and `INITIAL` one per trace.
    pub fn validate_total_order(&self) -> TraceStructureResult<()> {
        for (id, node) in self.nodes() {
            let time_out = node.outgoing(&self.time_relation).count();
            if id == self.terminal {
                if !node.transitions().is_empty() {
                    return TerminalSuccessorsSnafu {
                        node: id,
                        found: node.transitions().len(),
                    }
                    .fail();
                }
            } else if id == self.initial {
                if time_out != self.trace_count {
                    return InitialFanoutMismatchSnafu {
                        node: id,
                        found: time_out,
                        expected: self.trace_count,
                    }
                    .fail();
                }
            } else if time_out == 0 {
                return MissingTimeSuccessorSnafu {
                    node: id,
                    relation: self.time_relation.clone(),
                }
                .fail();
            } else if time_out > 1 {
                return MultipleTimeSuccessorsSnafu {
                    node: id,
                    relation: self.time_relation.clone(),
                    found: time_out,
                }
                .fail();
            }
        }
        Ok(())
    }
}

/// Iterator over one trace's domain nodes in time order.
pub struct TraceWalk<'g> {
    graph: &'g TraceGraph,
    next: Option<NodeId>,
}

impl Iterator for TraceWalk<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        if current == self.graph.terminal {
            self.next = None;
            return None;
        }
        self.next = self
            .graph
            .node(current)
            .outgoing(&self.graph.time_relation)
            .next()
            .map(|t| t.target());
        Some(current)
    }
}
