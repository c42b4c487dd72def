//! Pure call-tree extraction.
//!
//! Flattens a nested [`CallFrame`] into `(from, to, kind)` edges. Two
//! policies exist: unconditional subtree flattening, and a rooted walk that
//! emits the full subtree of every frame originating from a target address.
//! The rooted walk keeps descending after a match, so calls the target makes
//! while re-entered arbitrarily deep under other callers are still captured.

use alloy::primitives::Address;

use crate::trace_client::{CallFrame, CallKind};

/// One observed call, produced transiently during extraction and folded into
/// graph edges with an aggregated count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallEdge {
    pub from: Address,
    pub to: Address,
    pub kind: CallKind,
}

/// Flatten `frame` and all descendants into edges, pre-order.
///
/// A frame without a usable target (e.g. an unfinished CREATE) emits nothing,
/// but its children are still visited.
pub fn extract_subtree(frame: &CallFrame) -> Vec<CallEdge> {
    let mut edges = Vec::new();
    walk_subtree(frame, &mut edges);
    edges
}

fn walk_subtree(frame: &CallFrame, edges: &mut Vec<CallEdge>) {
    if let Some(to) = frame.to {
        edges.push(CallEdge {
            from: frame.from,
            to,
            kind: CallKind::parse(&frame.kind),
        });
    }
    for call in &frame.calls {
        walk_subtree(call, edges);
    }
}

/// Walk the tree; whenever a frame originates from `target`, emit that frame
/// and its entire subtree. The walk recurses into children regardless of
/// match, so a match below an unmatched frame is not missed.
pub fn extract_rooted(frame: &CallFrame, target: Address) -> Vec<CallEdge> {
    let mut edges = Vec::new();
    walk_rooted(frame, target, &mut edges);
    edges
}

fn walk_rooted(frame: &CallFrame, target: Address, edges: &mut Vec<CallEdge>) {
    if frame.from == target {
        walk_subtree(frame, edges);
    }
    for call in &frame.calls {
        walk_rooted(call, target, edges);
    }
}
