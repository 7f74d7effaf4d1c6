use crate::{Event, EventType, LabelInterner, Relation, TraceGraph, TraceStructureError};

fn trace(graph: &mut TraceGraph, labels: &[&str]) {
    let events = labels
        .iter()
        .map(|l| Event::new(EventType::label(l)))
        .collect();
    graph.add_trace(events);
}

#[test]
fn event_type_equality_is_structural() {
    assert_eq!(EventType::label("a"), EventType::label("a"));
    assert_ne!(EventType::label("a"), EventType::label("b"));
    assert_ne!(EventType::Initial, EventType::Terminal);
    assert_eq!(EventType::label("INITIAL").to_string(), "INITIAL");
    assert!(!EventType::label("INITIAL").is_sentinel());
}

#[test]
fn interner_shares_allocations() {
    let mut interner = LabelInterner::new();
    let a1 = interner.intern("alloc");
    let a2 = interner.intern("alloc");
    assert!(std::sync::Arc::ptr_eq(&a1, &a2));
    interner.intern("free");
    assert_eq!(interner.len(), 2);
}

#[test_log::test]
fn chains_share_sentinels() {
    let mut graph = TraceGraph::default();
    trace(&mut graph, &["a", "b"]);
    trace(&mut graph, &["a", "c", "b"]);

    assert_eq!(graph.trace_count(), 2);
    // 2 sentinels + 5 events
    assert_eq!(graph.node_count(), 7);
    assert_eq!(graph.trace_starts().count(), 2);

    let walked: Vec<Vec<String>> = graph
        .trace_starts()
        .map(|start| {
            graph
                .walk_trace(start)
                .map(|id| graph.ty(id).to_string())
                .collect()
        })
        .collect();
    assert_eq!(walked, vec![vec!["a", "b"], vec!["a", "c", "b"]]);

    graph.validate_total_order().expect("well-formed chains");
}

#[test]
fn empty_trace_links_sentinels_directly() {
    let mut graph = TraceGraph::default();
    graph.add_trace(vec![]);

    assert_eq!(graph.trace_count(), 1);
    assert_eq!(graph.node_count(), 2);
    let start = graph.trace_starts().next().expect("one start");
    assert_eq!(start, graph.terminal());
    assert_eq!(graph.walk_trace(start).count(), 0);
    graph.validate_total_order().expect("still well-formed");
}

#[test]
fn terminal_has_no_outgoing_time_transitions() {
    let mut graph = TraceGraph::default();
    trace(&mut graph, &["x"]);
    assert_eq!(graph.node(graph.terminal()).transitions().len(), 0);
    assert_eq!(
        graph
            .node(graph.initial())
            .outgoing(graph.time_relation())
            .count(),
        1
    );
}

#[test]
fn validate_rejects_forked_time_order() {
    let mut graph = TraceGraph::default();
    trace(&mut graph, &["a", "b"]);
    let a = graph.trace_starts().next().expect("start");
    // Fork the chain: a now has two time successors.
    graph.add_relation(a, graph.terminal(), Relation::time());

    match graph.validate_total_order() {
        Err(TraceStructureError::MultipleTimeSuccessors { node, found, .. }) => {
            assert_eq!(node, a);
            assert_eq!(found, 2);
        }
        other => panic!("expected MultipleTimeSuccessors, got {other:?}"),
    }
}

#[test]
fn auxiliary_relations_do_not_disturb_time_order() {
    let mut graph = TraceGraph::default();
    trace(&mut graph, &["a", "b", "c"]);
    let nodes: Vec<_> = graph
        .walk_trace(graph.trace_starts().next().expect("start"))
        .collect();
    graph.add_relation(nodes[0], nodes[2], Relation::new("spawns"));

    graph.validate_total_order().expect("aux edges are ignored");
    let spawns = Relation::new("spawns");
    let aux: Vec<_> = graph.node(nodes[0]).outgoing(&spawns).collect();
    assert_eq!(aux.len(), 1);
    assert_eq!(aux[0].target(), nodes[2]);
}

#[test]
fn alphabet_excludes_sentinels() {
    let mut graph = TraceGraph::default();
    trace(&mut graph, &["b", "a", "b"]);
    let alphabet: Vec<String> = graph.alphabet().iter().map(|t| t.to_string()).collect();
    assert_eq!(alphabet, vec!["a", "b"]);
}
