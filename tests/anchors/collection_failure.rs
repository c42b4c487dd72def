//! Anchor: a trace RPC failure during collection fails the whole request —
//! no partial graph is returned and the orchestrator lands in the failed
//! phase once in-flight workers have drained.

use std::sync::Arc;

use crate::anchor_utils::{addr, frame, tx, MockTraceSource};
use supply_graph::error::SupplyError;
use supply_graph::supply_chain::{
    AnalysisPhase, AnalysisRequest, SupplyChain, SupplyChainOptions,
};

fn options() -> SupplyChainOptions {
    SupplyChainOptions {
        max_block_range: 7_000,
        chunk_size: 2,
        collect_workers: 2,
        default_block_offset: 10,
        contracts_only: false,
    }
}

fn request() -> AnalysisRequest {
    AnalysisRequest {
        address: format!("{:#x}", addr(0xaa)),
        from_block: Some("100".to_string()),
        to_block: Some("105".to_string()),
    }
}

#[tokio::test]
async fn test_rpc_failure_aborts_the_request() {
    let mut mock = MockTraceSource::default();
    // A healthy chunk with real data and one chunk that dies on the filter
    // call; the healthy result must not leak out as a partial graph.
    mock.transactions.push((100, tx(0x01)));
    mock.traces.insert(
        tx(0x01),
        frame(addr(0xaa), Some(addr(0xbb)), "CALL", vec![]),
    );
    mock.failing_from_blocks.insert(104);

    let chain = SupplyChain::new(Arc::new(mock), None, options());
    let err = chain.analyze(&request()).await.expect_err("must fail");
    assert!(matches!(err, SupplyError::Rpc(_)));
    assert_eq!(chain.phase(), AnalysisPhase::Failed);
}

#[tokio::test]
async fn test_missing_trace_surfaces_as_rpc_error() {
    let mut mock = MockTraceSource::default();
    // The filter advertises a transaction the tracer has no trace for; the
    // client must not fabricate a placeholder tree.
    mock.transactions.push((101, tx(0x02)));

    let chain = SupplyChain::new(Arc::new(mock), None, options());
    let err = chain.analyze(&request()).await.expect_err("must fail");
    assert!(matches!(err, SupplyError::Rpc(_)));
    assert_eq!(chain.phase(), AnalysisPhase::Failed);
}
