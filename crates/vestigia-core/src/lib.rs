//! Core event model and trace graphs for Vestigia.
//!
//! This crate defines the value objects shared by every other crate in the
//! workspace: event types (with the synthetic `INITIAL`/`TERMINAL`
//! sentinels), events and their source metadata, ordering relations, and
//! the arena-indexed [`TraceGraph`] that stitches all observed traces
//! together through the shared sentinels.

pub mod event;
pub mod graph;

pub use event::{Event, EventMeta, EventType, LabelInterner, Relation};
pub use graph::{
    EventNode, NodeId, TraceGraph, TraceStructureError, TraceStructureResult, Transition,
};

#[cfg(test)]
mod tests;
