//! Anchor: rooted extraction emits the full subtree of every frame the
//! target originates, keeps descending after a match, and never widens to
//! frames the target had no part in.

use crate::anchor_utils::{addr, frame};
use supply_graph::extractor::{extract_rooted, extract_subtree};
use supply_graph::trace_client::CallKind;

#[test]
fn test_no_matching_frame_yields_no_edges() {
    let tree = frame(
        addr(1),
        Some(addr(2)),
        "CALL",
        vec![frame(
            addr(2),
            Some(addr(3)),
            "DELEGATECALL",
            vec![frame(addr(3), Some(addr(4)), "STATICCALL", vec![])],
        )],
    );
    assert!(extract_rooted(&tree, addr(9)).is_empty());
}

#[test]
fn test_matching_root_is_equivalent_to_subtree_flattening() {
    let tree = frame(
        addr(1),
        Some(addr(2)),
        "CALL",
        vec![
            frame(addr(2), Some(addr(3)), "CALL", vec![]),
            frame(addr(2), Some(addr(4)), "STATICCALL", vec![]),
        ],
    );
    let rooted = extract_rooted(&tree, addr(1));
    let flat = extract_subtree(&tree);
    assert_eq!(rooted, flat);
    assert_eq!(rooted.len(), 3);
}

#[test]
fn test_match_depth_does_not_limit_capture() {
    // The target (0x05) is re-entered under two levels of foreign callers;
    // everything beneath its frame must still be captured.
    let tree = frame(
        addr(1),
        Some(addr(2)),
        "CALL",
        vec![frame(
            addr(2),
            Some(addr(5)),
            "CALL",
            vec![frame(
                addr(5),
                Some(addr(6)),
                "DELEGATECALL",
                vec![frame(addr(6), Some(addr(7)), "CALL", vec![])],
            )],
        )],
    );

    let edges = extract_rooted(&tree, addr(5));
    assert_eq!(edges.len(), 2);
    assert_eq!((edges[0].from, edges[0].to), (addr(5), addr(6)));
    assert_eq!(edges[0].kind, CallKind::DelegateCall);
    assert_eq!((edges[1].from, edges[1].to), (addr(6), addr(7)));
}

#[test]
fn test_frame_without_target_is_skipped_but_descended() {
    // An unfinished CREATE has no result address: no edge, but the calls
    // made from inside it still count.
    let tree = frame(
        addr(5),
        None,
        "CREATE",
        vec![frame(addr(5), Some(addr(8)), "CALL", vec![])],
    );
    let edges = extract_rooted(&tree, addr(5));
    assert_eq!(edges.len(), 1);
    assert_eq!((edges[0].from, edges[0].to), (addr(5), addr(8)));
}

#[test]
fn test_multiple_disjoint_matches_are_all_captured() {
    let tree = frame(
        addr(1),
        Some(addr(5)),
        "CALL",
        vec![
            frame(addr(5), Some(addr(6)), "CALL", vec![]),
            frame(
                addr(1),
                Some(addr(5)),
                "CALL",
                vec![frame(addr(5), Some(addr(7)), "STATICCALL", vec![])],
            ),
        ],
    );
    let edges = extract_rooted(&tree, addr(5));
    let targets: Vec<_> = edges.iter().map(|e| e.to).collect();
    assert!(targets.contains(&addr(6)));
    assert!(targets.contains(&addr(7)));
}
