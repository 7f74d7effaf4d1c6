use bon::Builder;
use vestigia_core::Relation;

/// What to do when a counter-example admits no partition split.
#[derive(Copy, Clone, Default, PartialEq, Eq, Debug)]
pub enum UnrefinablePolicy {
    /// Drop the invariant from the working set, log a warning, and keep
    /// refining against the rest.
    #[default]
    Drop,
    /// Abort the refinement with an error.
    Fail,
}

/// Engine configuration.
///
/// There is no process-wide state: every entry point receives one of
/// these explicitly. Defaults match the plain `infer` pipeline; the CLI
/// maps its flags onto the builder.
#[derive(Clone, Debug, Builder)]
pub struct EngineConfig {
    /// Mine with the transitive-closure reference miner instead of the
    /// chain-walking miner.
    #[builder(default = false)]
    pub use_transitive_closure: bool,

    /// Run counter-example guided refinement. When off, the output is the
    /// maximally-refined initial partition graph.
    #[builder(default = true)]
    pub refine_enabled: bool,

    /// Run k-equivalence coarsening after refinement.
    #[builder(default = true)]
    pub coarsen_enabled: bool,

    /// Include the INITIAL sentinel in exported/summarised output.
    #[builder(default = true)]
    pub show_initial: bool,

    /// Include the TERMINAL sentinel in exported/summarised output.
    #[builder(default = true)]
    pub show_terminal: bool,

    /// Reserved for deterministic tie-breaking that would use randomness.
    /// No such tie-break exists today; accepted and ignored.
    pub rng_seed: Option<u64>,

    #[builder(default)]
    pub unrefinable: UnrefinablePolicy,

    /// The ordering relation that chains each trace.
    #[builder(default = Relation::time())]
    pub time_relation: Relation,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig::builder().build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_the_plain_pipeline() {
        let config = EngineConfig::default();
        assert!(!config.use_transitive_closure);
        assert!(config.refine_enabled);
        assert!(config.coarsen_enabled);
        assert!(config.show_initial);
        assert!(config.show_terminal);
        assert_eq!(config.rng_seed, None);
        assert_eq!(config.unrefinable, UnrefinablePolicy::Drop);
        assert_eq!(config.time_relation, Relation::time());
    }

    #[test]
    fn builder_overrides_stick() {
        let config = EngineConfig::builder()
            .use_transitive_closure(true)
            .coarsen_enabled(false)
            .unrefinable(UnrefinablePolicy::Fail)
            .build();
        assert!(config.use_transitive_closure);
        assert!(!config.coarsen_enabled);
        assert_eq!(config.unrefinable, UnrefinablePolicy::Fail);
    }
}
