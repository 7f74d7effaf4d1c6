//! DOT and GML serializers for inferred models.
//!
//! Both writers walk the partition graph in id order, so their output is
//! deterministic run over run. Sentinel states are filtered according to
//! the engine configuration's visibility flags; an edge is written only
//! when both of its endpoints are visible.

use std::io;

use snafu::{ResultExt as _, Snafu};
use vestigia_engine::{EngineConfig, PartitionGraph, PartitionId};

#[derive(Debug, Snafu)]
pub enum ExportError {
    #[snafu(display("write failed: {source}"))]
    Io { source: io::Error },
}

pub type ExportResult<T> = std::result::Result<T, ExportError>;

fn is_hidden(model: &PartitionGraph, config: &EngineConfig, id: PartitionId) -> bool {
    (!config.show_initial && id == model.initial_partition())
        || (!config.show_terminal && id == model.terminal_partition())
}

fn is_sentinel(model: &PartitionGraph, id: PartitionId) -> bool {
    model.partition(id).ty().is_sentinel()
}

fn escape(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Writes the model in Graphviz DOT form.
pub fn write_dot(
    out: &mut impl io::Write,
    model: &PartitionGraph,
    config: &EngineConfig,
) -> ExportResult<()> {
    writeln!(out, "digraph model {{").context(IoSnafu)?;
    for (id, partition) in model.partitions() {
        if is_hidden(model, config, id) {
            continue;
        }
        let label = escape(&partition.ty().to_string());
        if is_sentinel(model, id) {
            writeln!(out, "  {id} [label=\"{label}\", shape=diamond];").context(IoSnafu)?;
        } else {
            writeln!(out, "  {id} [label=\"{label}\"];").context(IoSnafu)?;
        }
    }
    for (id, partition) in model.partitions() {
        if is_hidden(model, config, id) {
            continue;
        }
        for edge in partition.edges() {
            if is_hidden(model, config, edge.target) {
                continue;
            }
            writeln!(
                out,
                "  {id} -> {} [label=\"{}\"];",
                edge.target,
                escape(edge.relation.as_str())
            )
            .context(IoSnafu)?;
        }
    }
    writeln!(out, "}}").context(IoSnafu)?;
    Ok(())
}

/// Writes the model in GML form.
pub fn write_gml(
    out: &mut impl io::Write,
    model: &PartitionGraph,
    config: &EngineConfig,
) -> ExportResult<()> {
    writeln!(out, "graph [").context(IoSnafu)?;
    writeln!(out, "  directed 1").context(IoSnafu)?;
    for (id, partition) in model.partitions() {
        if is_hidden(model, config, id) {
            continue;
        }
        writeln!(out, "  node [").context(IoSnafu)?;
        writeln!(out, "    id {}", id.index()).context(IoSnafu)?;
        writeln!(out, "    label \"{}\"", escape(&partition.ty().to_string()))
            .context(IoSnafu)?;
        writeln!(out, "  ]").context(IoSnafu)?;
    }
    for (id, partition) in model.partitions() {
        if is_hidden(model, config, id) {
            continue;
        }
        for edge in partition.edges() {
            if is_hidden(model, config, edge.target) {
                continue;
            }
            writeln!(out, "  edge [").context(IoSnafu)?;
            writeln!(out, "    source {}", id.index()).context(IoSnafu)?;
            writeln!(out, "    target {}", edge.target.index()).context(IoSnafu)?;
            writeln!(out, "    label \"{}\"", escape(edge.relation.as_str())).context(IoSnafu)?;
            writeln!(out, "  ]").context(IoSnafu)?;
        }
    }
    writeln!(out, "]").context(IoSnafu)?;
    Ok(())
}

/// [`write_dot`] into a `String`.
pub fn render_dot_string(model: &PartitionGraph, config: &EngineConfig) -> ExportResult<String> {
    let mut buffer = Vec::new();
    write_dot(&mut buffer, model, config)?;
    Ok(String::from_utf8(buffer).expect("writers emit UTF-8"))
}

/// [`write_gml`] into a `String`.
pub fn render_gml_string(model: &PartitionGraph, config: &EngineConfig) -> ExportResult<String> {
    let mut buffer = Vec::new();
    write_gml(&mut buffer, model, config)?;
    Ok(String::from_utf8(buffer).expect("writers emit UTF-8"))
}

#[cfg(test)]
mod tests {
    use vestigia_core::{Event, EventType};
    use vestigia_engine::{EngineConfig, infer};

    use super::*;

    fn single_trace_model() -> vestigia_engine::Inference {
        let trace = ["a", "b"]
            .iter()
            .map(|l| Event::new(EventType::label(l)))
            .collect();
        infer(vec![trace], &EngineConfig::default()).expect("inference succeeds")
    }

    #[test]
    fn dot_output_is_exact_and_ordered() {
        let inference = single_trace_model();
        let dot = render_dot_string(&inference.model, &EngineConfig::default())
            .expect("rendering succeeds");

        assert_eq!(
            dot,
            "digraph model {\n\
             \x20 p0 [label=\"INITIAL\", shape=diamond];\n\
             \x20 p1 [label=\"TERMINAL\", shape=diamond];\n\
             \x20 p2 [label=\"a\"];\n\
             \x20 p3 [label=\"b\"];\n\
             \x20 p0 -> p2 [label=\"t\"];\n\
             \x20 p2 -> p3 [label=\"t\"];\n\
             \x20 p3 -> p1 [label=\"t\"];\n\
             }\n"
        );
    }

    #[test]
    fn hidden_sentinels_drop_their_edges_too() {
        let inference = single_trace_model();
        let config = EngineConfig::builder()
            .show_initial(false)
            .show_terminal(false)
            .build();
        let dot =
            render_dot_string(&inference.model, &config).expect("rendering succeeds");

        assert!(!dot.contains("INITIAL"));
        assert!(!dot.contains("TERMINAL"));
        assert!(dot.contains("p2 -> p3"));
        assert!(!dot.contains("p0 ->"));
        assert!(!dot.contains("-> p1"));
    }

    #[test]
    fn gml_lists_nodes_before_edges() {
        let inference = single_trace_model();
        let gml = render_gml_string(&inference.model, &EngineConfig::default())
            .expect("rendering succeeds");

        assert!(gml.starts_with("graph [\n  directed 1\n"));
        let first_edge = gml.find("edge [").expect("has edges");
        let last_node = gml.rfind("node [").expect("has nodes");
        assert!(last_node < first_edge);
        assert!(gml.contains("    label \"a\""));
        assert!(gml.trim_end().ends_with(']'));
    }
}
