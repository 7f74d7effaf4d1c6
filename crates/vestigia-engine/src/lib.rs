//! The Vestigia inference engine.
//!
//! Takes the trace graph assembled by `vestigia-core`, mines binary
//! temporal invariants from it, and drives a counter-example guided
//! refinement/coarsening cycle over a quotient partition graph until the
//! inferred model satisfies every mined invariant.
//!
//! Entry point: [`engine::infer`] with an [`EngineConfig`].

pub mod coarsen;
pub mod config;
pub mod engine;
pub mod fsm;
pub mod invariant;
pub mod mine;
pub mod partition;
pub mod refine;

pub use config::{EngineConfig, UnrefinablePolicy};
pub use engine::{EngineError, EngineResult, Inference, InferenceSummary, infer, infer_graph};
pub use fsm::{CounterExample, check_all, check_invariant};
pub use invariant::{BinaryInvariant, InvariantKind, InvariantSet};
pub use mine::{MineError, MineResult};
pub use partition::{Partition, PartitionGraph, PartitionId, PartitionOpError};
