use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Command line options for the Vestigia CLI.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Opts {
    /// The specific command to execute
    #[command(subcommand)]
    pub cmd: OptsCmd,
}

#[derive(Debug, Subcommand)]
pub enum OptsCmd {
    /// Infer a finite-state model from log files
    Infer(InferOpts),

    /// Mine and print the temporal invariants only
    Mine(MineOpts),
}

/// How the raw logs are read and split into traces.
#[derive(Debug, Args)]
pub struct InputOpts {
    /// Log file to read; `-` reads stdin. Repeatable.
    #[arg(long = "log", short = 'l', required = true)]
    pub logs: Vec<PathBuf>,

    /// Event pattern with a (?P<TYPE>...) capture group; first match
    /// wins. Repeatable. Defaults to matching the whole line as the type.
    #[arg(long = "regex", short = 'r')]
    pub regexes: Vec<String>,

    /// Trace separator pattern; a matching line starts a new trace.
    /// Without it, blank lines separate traces.
    #[arg(long, short = 's')]
    pub separator: Option<String>,

    /// Skip lines matching no event pattern instead of failing.
    #[arg(long)]
    pub ignore_unmatched: bool,

    /// Label of the ordering relation chaining each trace.
    #[arg(long, default_value = "t", env = "VESTIGIA_TIME_RELATION")]
    pub time_relation: String,
}

#[derive(Debug, Args)]
pub struct InferOpts {
    #[command(flatten)]
    pub input: InputOpts,

    /// Mine with the transitive-closure reference miner.
    #[arg(long)]
    pub use_tc: bool,

    /// Skip counter-example guided refinement.
    #[arg(long)]
    pub no_refine: bool,

    /// Skip k-equivalence coarsening.
    #[arg(long)]
    pub no_coarsen: bool,

    /// Abort on an unrefinable counter-example instead of dropping the
    /// invariant.
    #[arg(long)]
    pub fail_unrefinable: bool,

    /// Leave the INITIAL sentinel out of the output.
    #[arg(long)]
    pub hide_initial: bool,

    /// Leave the TERMINAL sentinel out of the output.
    #[arg(long)]
    pub hide_terminal: bool,

    /// Write the model as Graphviz DOT to this path.
    #[arg(long)]
    pub dot: Option<PathBuf>,

    /// Write the model as GML to this path.
    #[arg(long)]
    pub gml: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct MineOpts {
    #[command(flatten)]
    pub input: InputOpts,

    /// Mine with the transitive-closure reference miner.
    #[arg(long)]
    pub use_tc: bool,
}
