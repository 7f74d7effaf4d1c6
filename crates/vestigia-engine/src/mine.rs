//! Temporal invariant mining over chain trace graphs.
//!
//! Two miners produce the same [`InvariantSet`]: the chain-walking miner
//! ([`chain`]) decides every invariant family from counters collected in a
//! single forward walk per trace, and the transitive-closure miner
//! ([`closure`]) re-derives them from per-instance reachability. The
//! latter is the reference used for cross-validation and is selected via
//! [`EngineConfig::use_transitive_closure`](crate::EngineConfig).

pub mod chain;
pub mod closure;

use snafu::Snafu;
use vestigia_core::TraceGraph;

use crate::config::EngineConfig;
use crate::invariant::InvariantSet;

pub(crate) const LOG_TARGET: &str = "vestigia::engine::mine";

#[derive(Debug, Snafu)]
pub enum MineError {
    #[snafu(display(
        "trace of {nodes} events exceeds the transitive-closure capacity of {cap} events"
    ))]
    ClosureCapacity { nodes: usize, cap: usize },
}

pub type MineResult<T> = std::result::Result<T, MineError>;

/// Mines the invariant set with the miner selected by `config`.
pub fn mine(graph: &TraceGraph, config: &EngineConfig) -> MineResult<InvariantSet> {
    if config.use_transitive_closure {
        closure::mine_invariants(graph)
    } else {
        Ok(chain::mine_invariants(graph))
    }
}
