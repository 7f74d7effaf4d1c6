//! The quotient graph over the trace graph.
//!
//! Partitions group event nodes of one type; the partition graph is the
//! engine's mutable working model, refined by splitting and coarsened by
//! merging. Nodes and partitions reference each other through arena
//! indices: a partition holds member [`NodeId`]s, and the graph holds a
//! dense `NodeId → PartitionId` map, so both directions update atomically
//! inside each operation and no reference cycles exist.

use std::collections::BTreeSet;
use std::fmt;

use indexmap::IndexSet;
use snafu::Snafu;
use tracing::{debug, trace};
use vestigia_core::{EventType, NodeId, Relation, TraceGraph};

use crate::invariant::InvariantSet;

const LOG_TARGET: &str = "vestigia::engine::partition";

/// Index of a partition in the [`PartitionGraph`] arena.
///
/// Ids are assigned in creation order and never reused; consumed
/// partitions leave tombstones behind. Id-ordered iteration is therefore
/// deterministic across runs.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct PartitionId(pub(crate) u32);

impl PartitionId {
    fn from_index(index: usize) -> Self {
        PartitionId(u32::try_from(index).expect("partition arena exceeds u32 range"))
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// One outgoing edge of a partition: some member node has a transition to
/// a node of `target` over `relation`.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct PartitionEdge {
    pub target: PartitionId,
    pub relation: Relation,
}

/// A non-empty set of event nodes sharing one event type.
#[derive(Clone, Debug, PartialEq)]
pub struct Partition {
    ty: EventType,
    members: Vec<NodeId>,
    /// Derived from member transitions, deduplicated per
    /// `(target, relation)`, insertion order preserved. Recomputed after
    /// every structural change that can affect it.
    edges: Vec<PartitionEdge>,
}

impl Partition {
    pub fn ty(&self) -> &EventType {
        &self.ty
    }

    pub fn members(&self) -> &[NodeId] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn edges(&self) -> &[PartitionEdge] {
        &self.edges
    }

    /// Smallest member node id. Stable across split/merge round-trips,
    /// which makes it usable as a memo key where partition ids are not.
    pub fn fingerprint(&self) -> NodeId {
        self.members
            .iter()
            .copied()
            .min()
            .expect("partitions are non-empty")
    }
}

#[derive(Debug, Snafu)]
pub enum PartitionOpError {
    #[snafu(display("partition {id} was already consumed by a split or merge"))]
    StalePartition { id: PartitionId },
    #[snafu(display("split of {partition} has an empty side"))]
    EmptySplitSide { partition: PartitionId },
    #[snafu(display("split sides do not partition the members of {partition}"))]
    SplitNotPartitioning { partition: PartitionId },
    #[snafu(display("cannot merge {left} with itself"))]
    MergeSelf { left: PartitionId },
    #[snafu(display("cannot merge {left} ({left_ty}) with {right} ({right_ty})"))]
    MergeTypeMismatch {
        left: PartitionId,
        left_ty: EventType,
        right: PartitionId,
        right_ty: EventType,
    },
}

pub type PartitionOpResult<T> = std::result::Result<T, PartitionOpError>;

/// The quotient graph. Owns the partitions; node data stays in the
/// [`TraceGraph`], which every structure-changing operation receives
/// explicitly.
#[derive(Clone, Debug)]
pub struct PartitionGraph {
    slots: Vec<Option<Partition>>,
    node_partition: Vec<PartitionId>,
    initial: PartitionId,
    terminal: PartitionId,
}

impl PartitionGraph {
    /// The maximally-refined initial partitioning: one partition per
    /// event type, holding every node of that type, in first-occurrence
    /// order. The sentinels land in their own distinguished partitions.
    ///
    /// `invariants` is the working set this graph will be checked
    /// against; partitioning by type needs no invariant input, so it is
    /// only reported alongside the graph's size.
    pub fn initial_from(graph: &TraceGraph, invariants: &InvariantSet) -> Self {
        let mut slots: Vec<Option<Partition>> = Vec::new();
        let mut by_type: Vec<(EventType, usize)> = Vec::new();
        let mut node_partition = vec![PartitionId(0); graph.node_count()];

        for (node, data) in graph.nodes() {
            let slot = match by_type.iter().find(|(ty, _)| ty == data.ty()) {
                Some((_, slot)) => *slot,
                None => {
                    let slot = slots.len();
                    slots.push(Some(Partition {
                        ty: data.ty().clone(),
                        members: Vec::new(),
                        edges: Vec::new(),
                    }));
                    by_type.push((data.ty().clone(), slot));
                    slot
                }
            };
            slots[slot]
                .as_mut()
                .expect("fresh slot")
                .members
                .push(node);
            node_partition[node.index()] = PartitionId::from_index(slot);
        }

        let mut this = Self {
            slots,
            node_partition,
            initial: PartitionId(0),
            terminal: PartitionId(0),
        };
        this.initial = this.node_partition(graph.initial());
        this.terminal = this.node_partition(graph.terminal());
        for id in this.ids() {
            this.recompute_edges(graph, id);
        }
        debug!(
            target: LOG_TARGET,
            partitions = this.partition_count(),
            nodes = graph.node_count(),
            invariants = invariants.len(),
            "built initial partitioning"
        );
        this
    }

    pub fn initial_partition(&self) -> PartitionId {
        self.initial
    }

    pub fn terminal_partition(&self) -> PartitionId {
        self.terminal
    }

    /// Alive partition ids in creation order.
    pub fn ids(&self) -> Vec<PartitionId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(i, _)| PartitionId::from_index(i))
            .collect()
    }

    pub fn partitions(&self) -> impl Iterator<Item = (PartitionId, &Partition)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|p| (PartitionId::from_index(i), p)))
    }

    pub fn partition_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn edge_count(&self) -> usize {
        self.partitions().map(|(_, p)| p.edges.len()).sum()
    }

    /// The partition a node currently belongs to.
    pub fn node_partition(&self, node: NodeId) -> PartitionId {
        self.node_partition[node.index()]
    }

    /// Panics on a stale id; every alive id handed out by this graph
    /// stays valid until a split or merge consumes it.
    pub fn partition(&self, id: PartitionId) -> &Partition {
        self.slots[id.index()]
            .as_ref()
            .unwrap_or_else(|| panic!("stale partition id {id}"))
    }

    pub fn get(&self, id: PartitionId) -> Option<&Partition> {
        self.slots.get(id.index()).and_then(|s| s.as_ref())
    }

    pub fn partitions_of_type<'s>(
        &'s self,
        ty: &'s EventType,
    ) -> impl Iterator<Item = PartitionId> + 's {
        self.partitions()
            .filter(move |(_, p)| p.ty() == ty)
            .map(|(id, _)| id)
    }

    /// Outgoing edges of `id`, deduplicated, derivation order.
    pub fn successors(&self, id: PartitionId) -> &[PartitionEdge] {
        &self.partition(id).edges
    }

    pub fn successors_via<'s>(
        &'s self,
        id: PartitionId,
        relation: &'s Relation,
    ) -> impl Iterator<Item = PartitionId> + 's {
        self.partition(id)
            .edges
            .iter()
            .filter(move |e| &e.relation == relation)
            .map(|e| e.target)
    }

    /// Partitions with an edge into `id`, in id order.
    pub fn predecessors(&self, id: PartitionId) -> Vec<PartitionId> {
        self.partitions()
            .filter(|(_, p)| p.edges.iter().any(|e| e.target == id))
            .map(|(pid, _)| pid)
            .collect()
    }

    /// Partitions with an edge into `id` over one relation, in id order.
    pub fn predecessors_via(&self, id: PartitionId, relation: &Relation) -> Vec<PartitionId> {
        self.partitions()
            .filter(|(_, p)| {
                p.edges
                    .iter()
                    .any(|e| e.target == id && &e.relation == relation)
            })
            .map(|(pid, _)| pid)
            .collect()
    }

    /// Re-derives the outgoing edges of `id` from its members'
    /// transitions.
    pub fn recompute_edges(&mut self, graph: &TraceGraph, id: PartitionId) {
        let members = self.partition(id).members.clone();
        let mut edges: IndexSet<PartitionEdge> = IndexSet::new();
        for member in members {
            for transition in graph.node(member).transitions() {
                edges.insert(PartitionEdge {
                    target: self.node_partition(transition.target()),
                    relation: transition.relation().clone(),
                });
            }
        }
        self.slots[id.index()]
            .as_mut()
            .expect("recompute_edges on live partition")
            .edges = edges.into_iter().collect();
    }

    fn alive(&self, id: PartitionId) -> PartitionOpResult<()> {
        if self.get(id).is_none() {
            return StalePartitionSnafu { id }.fail();
        }
        Ok(())
    }

    fn insert(&mut self, partition: Partition) -> PartitionId {
        let id = PartitionId::from_index(self.slots.len());
        for member in &partition.members {
            self.node_partition[member.index()] = id;
        }
        self.slots.push(Some(partition));
        id
    }

    /// Partitions whose edges point into any of `targets`; their caches
    /// go stale when those targets are consumed.
    fn edge_sources_into(&self, targets: &[PartitionId]) -> Vec<PartitionId> {
        self.partitions()
            .filter(|(_, p)| p.edges.iter().any(|e| targets.contains(&e.target)))
            .map(|(id, _)| id)
            .collect()
    }

    /// Replaces `id` by two partitions holding exactly `left` and
    /// `right`.
    ///
    /// Refuses (leaving the graph untouched) unless the two sides are
    /// non-empty, disjoint, and together exactly the members of `id`.
    /// Member order within each side follows the original partition, so
    /// a later split with the same sets reproduces the same graph.
    pub fn split(
        &mut self,
        graph: &TraceGraph,
        id: PartitionId,
        left: &BTreeSet<NodeId>,
        right: &BTreeSet<NodeId>,
    ) -> PartitionOpResult<(PartitionId, PartitionId)> {
        self.alive(id)?;
        let source = self.partition(id);
        if left.is_empty() || right.is_empty() {
            return EmptySplitSideSnafu { partition: id }.fail();
        }
        let member_set: BTreeSet<NodeId> = source.members.iter().copied().collect();
        let disjoint = left.intersection(right).next().is_none();
        let covering = left.len() + right.len() == member_set.len()
            && left.union(right).all(|n| member_set.contains(n));
        if !disjoint || !covering {
            return SplitNotPartitioningSnafu { partition: id }.fail();
        }

        let ty = source.ty.clone();
        let left_members: Vec<NodeId> = source
            .members
            .iter()
            .copied()
            .filter(|n| left.contains(n))
            .collect();
        let right_members: Vec<NodeId> = source
            .members
            .iter()
            .copied()
            .filter(|n| right.contains(n))
            .collect();

        let mut stale = self.edge_sources_into(&[id]);
        self.slots[id.index()] = None;
        let left_id = self.insert(Partition {
            ty: ty.clone(),
            members: left_members,
            edges: Vec::new(),
        });
        let right_id = self.insert(Partition {
            ty,
            members: right_members,
            edges: Vec::new(),
        });

        stale.retain(|s| *s != id);
        stale.push(left_id);
        stale.push(right_id);
        for s in stale {
            self.recompute_edges(graph, s);
        }
        trace!(target: LOG_TARGET, %id, %left_id, %right_id, "split partition");
        Ok((left_id, right_id))
    }

    /// Replaces `p` and `q` by one partition holding their union; both
    /// must carry the same event type.
    pub fn merge(
        &mut self,
        graph: &TraceGraph,
        p: PartitionId,
        q: PartitionId,
    ) -> PartitionOpResult<PartitionId> {
        self.alive(p)?;
        self.alive(q)?;
        if p == q {
            return MergeSelfSnafu { left: p }.fail();
        }
        let (p_ty, q_ty) = (self.partition(p).ty.clone(), self.partition(q).ty.clone());
        if p_ty != q_ty {
            return MergeTypeMismatchSnafu {
                left: p,
                left_ty: p_ty,
                right: q,
                right_ty: q_ty,
            }
            .fail();
        }

        let mut members = self.partition(p).members.clone();
        members.extend_from_slice(&self.partition(q).members);

        let mut stale = self.edge_sources_into(&[p, q]);
        self.slots[p.index()] = None;
        self.slots[q.index()] = None;
        let merged = self.insert(Partition {
            ty: p_ty,
            members,
            edges: Vec::new(),
        });

        stale.retain(|s| *s != p && *s != q);
        stale.push(merged);
        for s in stale {
            self.recompute_edges(graph, s);
        }
        trace!(target: LOG_TARGET, %p, %q, %merged, "merged partitions");
        Ok(merged)
    }

    /// Debug-check of the §structural invariants: every node in exactly
    /// one alive partition, type-homogeneous members, edges exactly the
    /// derivation from member transitions. Used by tests after every
    /// mutation.
    pub fn check_consistency(&self, graph: &TraceGraph) -> bool {
        let mut seen = vec![false; graph.node_count()];
        for (id, partition) in self.partitions() {
            if partition.is_empty() {
                return false;
            }
            for member in partition.members() {
                if seen[member.index()] || self.node_partition(*member) != id {
                    return false;
                }
                seen[member.index()] = true;
                if graph.ty(*member) != partition.ty() {
                    return false;
                }
            }
            let mut expect: IndexSet<PartitionEdge> = IndexSet::new();
            for member in partition.members() {
                for transition in graph.node(*member).transitions() {
                    expect.insert(PartitionEdge {
                        target: self.node_partition(transition.target()),
                        relation: transition.relation().clone(),
                    });
                }
            }
            let expect: Vec<PartitionEdge> = expect.into_iter().collect();
            if expect != partition.edges {
                return false;
            }
        }
        seen.into_iter().all(|s| s)
    }
}
