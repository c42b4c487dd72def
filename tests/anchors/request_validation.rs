//! Anchor: request validation fails fast — malformed addresses and block
//! bounds are rejected before a single RPC call is attempted, and block
//! text is accepted in both decimal and hexadecimal form.

use std::sync::Arc;

use crate::anchor_utils::{addr, frame, tx, MockTraceSource};
use supply_graph::error::SupplyError;
use supply_graph::supply_chain::{
    AnalysisPhase, AnalysisRequest, SupplyChain, SupplyChainOptions,
};

fn options() -> SupplyChainOptions {
    SupplyChainOptions {
        max_block_range: 7_000,
        chunk_size: 200,
        collect_workers: 4,
        default_block_offset: 10,
        contracts_only: false,
    }
}

fn request(address: &str, from_block: Option<&str>, to_block: Option<&str>) -> AnalysisRequest {
    AnalysisRequest {
        address: address.to_string(),
        from_block: from_block.map(str::to_string),
        to_block: to_block.map(str::to_string),
    }
}

#[tokio::test]
async fn test_invalid_address_fails_without_rpc_traffic() {
    let mock = Arc::new(MockTraceSource::default());
    let chain = SupplyChain::new(mock.clone(), None, options());

    let err = chain
        .analyze(&request("0xdeadbeef", Some("100"), Some("105")))
        .await
        .expect_err("short address must fail");
    assert!(matches!(err, SupplyError::InvalidAddress(_)));
    assert_eq!(mock.rpc_call_count(), 0);
    assert_eq!(chain.phase(), AnalysisPhase::Failed);
}

#[tokio::test]
async fn test_unparsable_block_text_fails_without_rpc_traffic() {
    let mock = Arc::new(MockTraceSource::default());
    let chain = SupplyChain::new(mock.clone(), None, options());

    let target = format!("{:#x}", addr(0xaa));
    let err = chain
        .analyze(&request(&target, Some("latest"), Some("105")))
        .await
        .expect_err("non-numeric block must fail");
    assert!(matches!(err, SupplyError::InvalidBlockNumber(_)));
    assert_eq!(mock.rpc_call_count(), 0);
}

#[tokio::test]
async fn test_inverted_and_oversized_ranges_are_rejected() {
    let mock = Arc::new(MockTraceSource::default());
    let chain = SupplyChain::new(mock.clone(), None, options());
    let target = format!("{:#x}", addr(0xaa));

    let err = chain
        .analyze(&request(&target, Some("105"), Some("100")))
        .await
        .expect_err("inverted range must fail");
    assert!(matches!(err, SupplyError::BlockRange(_)));

    let err = chain
        .analyze(&request(&target, Some("0"), Some("8000")))
        .await
        .expect_err("oversized range must fail");
    assert!(matches!(err, SupplyError::BlockRange(_)));

    assert_eq!(mock.rpc_call_count(), 0);
}

#[tokio::test]
async fn test_hex_block_bounds_are_accepted() {
    let mut mock = MockTraceSource::default();
    mock.transactions.push((100, tx(0x11)));
    mock.traces.insert(
        tx(0x11),
        frame(addr(0xaa), Some(addr(0xbb)), "CALL", vec![]),
    );
    let chain = SupplyChain::new(Arc::new(mock), None, options());

    let target = format!("{:#x}", addr(0xaa));
    // 0x64..0x69 is 100..105.
    let report = chain
        .analyze(&request(&target, Some("0x64"), Some("0x69")))
        .await
        .expect("hex bounds analyze");
    assert_eq!(report.from_block, 100);
    assert_eq!(report.to_block, 105);
    assert_eq!(report.total_calls, 1);
    assert_eq!(chain.phase(), AnalysisPhase::Done);
}

#[tokio::test]
async fn test_omitted_bounds_default_to_chain_head_window() {
    let mock = Arc::new(MockTraceSource {
        head: 1_000,
        ..Default::default()
    });
    let chain = SupplyChain::new(mock.clone(), None, options());

    let target = format!("{:#x}", addr(0xaa));
    let report = chain
        .analyze(&request(&target, None, None))
        .await
        .expect("defaulted analyze");
    assert_eq!(report.to_block, 1_000);
    assert_eq!(report.from_block, 990);
    // Head fetch plus one filter call per chunk.
    assert!(mock.rpc_call_count() >= 1);
}
