mod cli;

use std::fs::File;
use std::io::{self, Read as _};
use std::path::Path;

use clap::Parser as _;
use cli::{InferOpts, InputOpts, MineOpts, Opts};
use snafu::{ResultExt as _, Snafu};
use tracing::{debug, info};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use vestigia_core::{Event, LabelInterner, Relation, TraceGraph};
use vestigia_engine::{EngineConfig, EngineError, UnrefinablePolicy, mine};
use vestigia_export::ExportError;
use vestigia_parse::{LineParser, ParseError};
use vestigia_util_error::FmtCompact as _;

pub const LOG_TARGET: &str = "vestigia::cli";

#[derive(Debug, Snafu)]
pub enum CliError {
    #[snafu(display("Parse error: {source}"))]
    Parse { source: ParseError },
    #[snafu(display("Inference error: {source}"))]
    Engine { source: EngineError },
    #[snafu(display("Mining error: {source}"))]
    Mining { source: vestigia_engine::MineError },
    #[snafu(display("Export error: {source}"))]
    Export { source: ExportError },
    #[snafu(display("Failed to read {path}: {source}"))]
    ReadInput { path: String, source: io::Error },
    #[snafu(display("Failed to write {path}: {source}"))]
    WriteOutput { path: String, source: io::Error },
}

pub type CliResult<T> = std::result::Result<T, CliError>;

#[snafu::report]
fn main() -> CliResult<()> {
    init_logging();

    let opts = Opts::parse();
    let value = handle_cmd(opts)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&value).expect("Can't fail")
    );
    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn handle_cmd(opts: Opts) -> CliResult<serde_json::Value> {
    match opts.cmd {
        cli::OptsCmd::Infer(opts) => handle_infer(opts),
        cli::OptsCmd::Mine(opts) => handle_mine(opts),
    }
}

fn parse_traces(input: &InputOpts) -> CliResult<Vec<Vec<Event>>> {
    let parser = LineParser::new(
        &input.regexes,
        input.separator.as_deref(),
        input.ignore_unmatched,
    )
    .context(ParseSnafu)?;

    let mut interner = LabelInterner::new();
    let mut traces = Vec::new();
    for path in &input.logs {
        let display = path.display().to_string();
        let (text, source_name) = if path.to_str() == Some("-") {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context(ReadInputSnafu { path: "<stdin>" })?;
            (text, "<stdin>".to_owned())
        } else {
            let text = std::fs::read_to_string(path)
                .context(ReadInputSnafu { path: display.as_str() })?;
            (text, display)
        };
        let parsed = parser
            .parse_str(&text, Some(&source_name), &mut interner)
            .context(ParseSnafu)?;
        debug!(
            target: LOG_TARGET,
            source = %source_name,
            traces = parsed.len(),
            "parsed log"
        );
        traces.extend(parsed);
    }
    info!(
        target: LOG_TARGET,
        traces = traces.len(),
        types = interner.len(),
        "parsed all inputs"
    );
    Ok(traces)
}

fn engine_config(opts: &InferOpts) -> EngineConfig {
    EngineConfig::builder()
        .use_transitive_closure(opts.use_tc)
        .refine_enabled(!opts.no_refine)
        .coarsen_enabled(!opts.no_coarsen)
        .show_initial(!opts.hide_initial)
        .show_terminal(!opts.hide_terminal)
        .unrefinable(if opts.fail_unrefinable {
            UnrefinablePolicy::Fail
        } else {
            UnrefinablePolicy::Drop
        })
        .time_relation(Relation::new(&opts.input.time_relation))
        .build()
}

fn handle_infer(opts: InferOpts) -> CliResult<serde_json::Value> {
    let traces = parse_traces(&opts.input)?;
    let config = engine_config(&opts);
    let inference = vestigia_engine::infer(traces, &config).context(EngineSnafu)?;

    if let Some(path) = &opts.dot {
        write_export(path, |out| {
            vestigia_export::write_dot(out, &inference.model, &config)
        })?;
    }
    if let Some(path) = &opts.gml {
        write_export(path, |out| {
            vestigia_export::write_gml(out, &inference.model, &config)
        })?;
    }

    let summary = inference.summary(&config);
    Ok(serde_json::to_value(summary).expect("Can't fail"))
}

fn write_export(
    path: &Path,
    write: impl FnOnce(&mut File) -> Result<(), ExportError>,
) -> CliResult<()> {
    let path_display = path.display().to_string();
    let mut file = File::create(path).context(WriteOutputSnafu { path: path_display.as_str() })?;
    write(&mut file).context(ExportSnafu)?;
    info!(target: LOG_TARGET, path = %path_display, "wrote model");
    Ok(())
}

fn handle_mine(opts: MineOpts) -> CliResult<serde_json::Value> {
    let traces = parse_traces(&opts.input)?;
    let config = EngineConfig::builder()
        .use_transitive_closure(opts.use_tc)
        .time_relation(Relation::new(&opts.input.time_relation))
        .build();

    let mut graph = TraceGraph::new(config.time_relation.clone());
    for events in traces {
        graph.add_trace(events);
    }
    let invariants = mine::mine(&graph, &config)
        .map_err(|err| {
            debug!(target: LOG_TARGET, err = %err.fmt_compact(), "mining failed");
            err
        })
        .context(MiningSnafu)?;

    let dump: Vec<String> = invariants.iter().map(|i| i.to_string()).collect();
    Ok(serde_json::json!({
        "traces": graph.trace_count(),
        "invariants": dump,
    }))
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use clap::Parser as _;

    use super::*;

    fn write_log(dir: &tempfile::TempDir, name: &str, content: &str) -> String {
        let path = dir.path().join(name);
        let mut file = File::create(&path).expect("create log");
        file.write_all(content.as_bytes()).expect("write log");
        path.display().to_string()
    }

    #[test]
    fn infer_command_produces_a_summary_and_dot_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = write_log(&dir, "app.log", "a\nb\n\na\nc\nb\n");
        let dot = dir.path().join("model.dot").display().to_string();

        let opts = Opts::try_parse_from(["vestigia", "infer", "--log", &log, "--dot", &dot])
            .expect("valid args");
        let value = handle_cmd(opts).expect("inference succeeds");

        assert_eq!(value["traces"], 2);
        assert_eq!(value["events"], 5);
        assert!(value["states"].as_u64().expect("states") >= 4);
        let rendered = std::fs::read_to_string(dir.path().join("model.dot")).expect("dot file");
        assert!(rendered.starts_with("digraph model {"));
        assert!(rendered.contains("label=\"a\""));
    }

    #[test]
    fn mine_command_lists_invariants() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = write_log(&dir, "auth.log", "login\nread\n\nlogin\nread\nread\n");

        let opts =
            Opts::try_parse_from(["vestigia", "mine", "--log", &log]).expect("valid args");
        let value = handle_cmd(opts).expect("mining succeeds");

        let dump: Vec<String> = value["invariants"]
            .as_array()
            .expect("array")
            .iter()
            .map(|v| v.as_str().expect("string").to_owned())
            .collect();
        assert!(dump.contains(&"login AlwaysPrecedes(t) read".to_owned()));
        assert!(dump.contains(&"login AlwaysFollowedBy(t) read".to_owned()));
        assert!(dump.contains(&"read NeverFollowedBy(t) login".to_owned()));
    }

    #[test]
    fn unmatched_lines_surface_as_cli_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = write_log(&dir, "bad.log", "ok\n!!!\n");

        let opts = Opts::try_parse_from([
            "vestigia",
            "infer",
            "--log",
            &log,
            "--regex",
            r"^(?P<TYPE>[a-z]+)$",
        ])
        .expect("valid args");
        assert!(matches!(handle_cmd(opts), Err(CliError::Parse { .. })));
    }
}
