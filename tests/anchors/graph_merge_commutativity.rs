//! Anchor: folding the same chunk edge lists into a graph in any order must
//! produce an identical result — node set, edge set, and aggregated counts.

use crate::anchor_utils::addr;
use supply_graph::extractor::CallEdge;
use supply_graph::graph::CallGraph;
use supply_graph::trace_client::CallKind;

fn edge(from: u8, to: u8, kind: CallKind) -> CallEdge {
    CallEdge {
        from: addr(from),
        to: addr(to),
        kind,
    }
}

fn chunk_lists() -> Vec<Vec<CallEdge>> {
    vec![
        vec![
            edge(1, 2, CallKind::Call),
            edge(2, 3, CallKind::StaticCall),
            edge(1, 2, CallKind::Call),
        ],
        vec![edge(1, 4, CallKind::DelegateCall), edge(1, 2, CallKind::Call)],
        vec![edge(4, 3, CallKind::Call)],
    ]
}

fn merge(order: &[usize]) -> CallGraph {
    let chunks = chunk_lists();
    let mut graph = CallGraph::new(addr(1));
    for &idx in order {
        for e in &chunks[idx] {
            graph.add_edge(e.from, e.to, Some(e.kind.as_str().to_string()));
        }
    }
    graph
}

#[test]
fn test_merge_order_is_irrelevant() {
    let reference = merge(&[0, 1, 2]);
    for order in [[2, 1, 0], [1, 0, 2], [0, 2, 1], [2, 0, 1], [1, 2, 0]] {
        assert_eq!(merge(&order), reference, "order {order:?} diverged");
    }
}

#[test]
fn test_merge_accumulates_expected_counts() {
    let graph = merge(&[0, 1, 2]);
    assert_eq!(graph.node_count(), 4);
    assert_eq!(graph.edge_count(), 4);
    assert_eq!(graph.edge(addr(1), addr(2)).map(|e| e.count), Some(3));
    assert_eq!(graph.edge(addr(2), addr(3)).map(|e| e.count), Some(1));
    assert_eq!(graph.total_calls(), 6);
}
