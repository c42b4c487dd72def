//! Supply-chain analysis orchestrator.
//!
//! Drives one analysis request through validation, chunked concurrent trace
//! collection, merge into a rooted call graph, and label enrichment. Workers
//! never touch the graph; they hand back local edge lists and a single
//! aggregator folds them in, so merging needs no locking and chunk completion
//! order does not matter.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use alloy::primitives::Address;

use crate::enrich::LabelEnricher;
use crate::error::{Result, SupplyError};
use crate::extractor::{extract_rooted, CallEdge};
use crate::graph::CallGraph;
use crate::trace_client::TraceSource;
use crate::utils::config::Config;
use crate::utils::hex::parse_block_number;

/// Phases of one analysis request. `Failed` absorbs from any non-terminal
/// phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisPhase {
    Validating,
    Collecting,
    Merging,
    Enriching,
    Done,
    Failed,
}

impl AnalysisPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisPhase::Validating => "validating",
            AnalysisPhase::Collecting => "collecting",
            AnalysisPhase::Merging => "merging",
            AnalysisPhase::Enriching => "enriching",
            AnalysisPhase::Done => "done",
            AnalysisPhase::Failed => "failed",
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => AnalysisPhase::Validating,
            1 => AnalysisPhase::Collecting,
            2 => AnalysisPhase::Merging,
            3 => AnalysisPhase::Enriching,
            4 => AnalysisPhase::Done,
            _ => AnalysisPhase::Failed,
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            AnalysisPhase::Validating => 0,
            AnalysisPhase::Collecting => 1,
            AnalysisPhase::Merging => 2,
            AnalysisPhase::Enriching => 3,
            AnalysisPhase::Done => 4,
            AnalysisPhase::Failed => 5,
        }
    }
}

/// An inclusive block interval, already validated: ordered and within the
/// configured span cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub from_block: u64,
    pub to_block: u64,
}

impl BlockRange {
    pub fn new(from_block: u64, to_block: u64, max_span: u64) -> Result<Self> {
        if from_block > to_block {
            return Err(SupplyError::BlockRange(format!(
                "from_block {from_block} is after to_block {to_block}"
            )));
        }
        let span = to_block - from_block;
        if span > max_span {
            return Err(SupplyError::BlockRange(format!(
                "span {span} exceeds maximum of {max_span} blocks"
            )));
        }
        Ok(Self {
            from_block,
            to_block,
        })
    }

    pub fn span(self) -> u64 {
        self.to_block - self.from_block
    }

    /// Partition into fixed-size inclusive chunks covering the whole range.
    pub fn chunks(self, chunk_size: u64) -> Vec<BlockRange> {
        let size = chunk_size.max(1);
        let mut chunks = Vec::new();
        let mut start = self.from_block;
        loop {
            let end = start.saturating_add(size - 1).min(self.to_block);
            chunks.push(BlockRange {
                from_block: start,
                to_block: end,
            });
            if end == self.to_block {
                break;
            }
            start = end + 1;
        }
        chunks
    }
}

/// What the (external) request surface hands us. Block bounds are
/// decimal-or-hex text; omitting them analyzes a window ending at the chain
/// head.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisRequest {
    pub address: String,
    #[serde(default)]
    pub from_block: Option<String>,
    #[serde(default)]
    pub to_block: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportEdge {
    pub from: String,
    pub to: String,
    pub data: Option<String>,
    pub count: u64,
}

/// The assembled result of one analysis: the graph plus the wire-facing
/// summary the HTTP layer serializes.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub address: String,
    pub from_block: u64,
    pub to_block: u64,
    pub node_count: usize,
    pub nodes: BTreeMap<String, String>,
    pub edges: Vec<ReportEdge>,
    pub total_calls: u64,
    pub unique_contracts: usize,
    #[serde(skip)]
    pub graph: CallGraph,
}

/// Tunables for one orchestrator instance, normally derived from [`Config`].
#[derive(Debug, Clone)]
pub struct SupplyChainOptions {
    pub max_block_range: u64,
    pub chunk_size: u64,
    pub collect_workers: usize,
    pub default_block_offset: u64,
    /// Keep only addresses with deployed bytecode (plus the root).
    pub contracts_only: bool,
}

impl SupplyChainOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_block_range: config.max_block_range,
            chunk_size: config.chunk_size,
            collect_workers: config.collect_workers,
            default_block_offset: config.default_block_offset,
            contracts_only: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct CollectProgress {
    completed: AtomicUsize,
    total: AtomicUsize,
}

impl CollectProgress {
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    fn reset(&self, total: usize) {
        self.completed.store(0, Ordering::Relaxed);
        self.total.store(total, Ordering::Relaxed);
    }

    fn mark_chunk_done(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct SupplyChain {
    trace: Arc<dyn TraceSource>,
    enricher: Option<Arc<LabelEnricher>>,
    options: SupplyChainOptions,
    phase: AtomicU8,
    progress: CollectProgress,
}

/// Normalize a textual address to its canonical form. Uniform-case inputs
/// are accepted as-is; mixed-case inputs must carry a valid EIP-55 checksum.
/// Anything else is `InvalidAddress`.
pub fn normalize_address(raw: &str) -> Result<Address> {
    let trimmed = raw.trim();
    let invalid = || SupplyError::InvalidAddress(trimmed.to_string());

    let digits = trimmed.strip_prefix("0x").ok_or_else(invalid)?;
    if digits.len() != 40 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }

    let has_upper = digits.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = digits.chars().any(|c| c.is_ascii_lowercase());
    if has_upper && has_lower {
        Address::parse_checksummed(trimmed, None).map_err(|_| invalid())
    } else {
        Address::from_str(trimmed).map_err(|_| invalid())
    }
}

impl SupplyChain {
    pub fn new(
        trace: Arc<dyn TraceSource>,
        enricher: Option<Arc<LabelEnricher>>,
        options: SupplyChainOptions,
    ) -> Self {
        Self {
            trace,
            enricher,
            options,
            phase: AtomicU8::new(AnalysisPhase::Validating.to_u8()),
            progress: CollectProgress::default(),
        }
    }

    pub fn phase(&self) -> AnalysisPhase {
        AnalysisPhase::from_u8(self.phase.load(Ordering::Relaxed))
    }

    pub fn progress(&self) -> &CollectProgress {
        &self.progress
    }

    fn set_phase(&self, phase: AnalysisPhase) {
        self.phase.store(phase.to_u8(), Ordering::Relaxed);
    }

    /// Run one analysis request to completion. Any failure before `Done`
    /// lands in `Failed` and discards partial progress; there is no degraded
    /// partial-graph result.
    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisReport> {
        match self.run(request).await {
            Ok(report) => {
                self.set_phase(AnalysisPhase::Done);
                Ok(report)
            }
            Err(err) => {
                self.set_phase(AnalysisPhase::Failed);
                Err(err)
            }
        }
    }

    async fn run(&self, request: &AnalysisRequest) -> Result<AnalysisReport> {
        self.set_phase(AnalysisPhase::Validating);
        let target = normalize_address(&request.address)?;
        let range = self.resolve_range(request).await?;

        tracing::info!(
            "[CHAIN] analyzing supply chain of {} over blocks {}..{}",
            target.to_checksum(None),
            range.from_block,
            range.to_block
        );

        self.set_phase(AnalysisPhase::Collecting);
        let chunk_edges = self.collect(range, target).await?;

        self.set_phase(AnalysisPhase::Merging);
        let mut edges: Vec<CallEdge> = chunk_edges.into_iter().flatten().collect();
        if self.options.contracts_only {
            edges = self.filter_contract_edges(edges, target).await?;
        }
        let mut graph = CallGraph::new(target);
        for edge in &edges {
            graph.add_edge(edge.from, edge.to, Some(edge.kind.as_str().to_string()));
        }

        self.set_phase(AnalysisPhase::Enriching);
        let labels = self.enrich(&mut graph, target).await;

        let report = build_report(target, range, graph, labels);
        tracing::info!(
            "[CHAIN] analysis of {} complete: {} contracts, {} calls",
            report.address,
            report.unique_contracts,
            report.total_calls
        );
        Ok(report)
    }

    /// Parse the requested bounds, defaulting a missing end to the chain
    /// head and a missing start to a configured offset below the end.
    /// Provided text is validated before any network call is made.
    async fn resolve_range(&self, request: &AnalysisRequest) -> Result<BlockRange> {
        let parse = |raw: &str| -> Result<u64> {
            parse_block_number(raw).ok_or_else(|| SupplyError::InvalidBlockNumber(raw.to_string()))
        };

        let from_raw = request
            .from_block
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let to_raw = request
            .to_block
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        let parsed_from = from_raw.map(parse).transpose()?;
        let parsed_to = to_raw.map(parse).transpose()?;

        let to_block = match parsed_to {
            Some(value) => value,
            None => self.trace.latest_block_number().await?,
        };
        let from_block = parsed_from
            .unwrap_or_else(|| to_block.saturating_sub(self.options.default_block_offset));

        BlockRange::new(from_block, to_block, self.options.max_block_range)
    }

    /// Fan the range out over a bounded worker pool. Each worker processes
    /// one chunk sequentially and returns its local edge list; the first
    /// failure stops further chunks from starting and is surfaced once all
    /// in-flight workers have drained.
    async fn collect(&self, range: BlockRange, target: Address) -> Result<Vec<Vec<CallEdge>>> {
        let chunks = range.chunks(self.options.chunk_size);
        self.progress.reset(chunks.len());
        tracing::debug!(
            "[CHAIN] collecting {} chunk(s) with {} worker(s)",
            chunks.len(),
            self.options.collect_workers
        );

        let semaphore = Arc::new(Semaphore::new(self.options.collect_workers.max(1)));
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut join_set: JoinSet<Result<Option<Vec<CallEdge>>>> = JoinSet::new();

        for chunk in chunks {
            let trace = Arc::clone(&self.trace);
            let semaphore = Arc::clone(&semaphore);
            let cancelled = Arc::clone(&cancelled);
            join_set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| SupplyError::Internal("collection pool closed".to_string()))?;
                if cancelled.load(Ordering::SeqCst) {
                    return Ok(None);
                }
                match collect_chunk(trace.as_ref(), chunk, target).await {
                    Ok(edges) => Ok(Some(edges)),
                    Err(err) => {
                        cancelled.store(true, Ordering::SeqCst);
                        Err(err)
                    }
                }
            });
        }

        let mut chunk_edges = Vec::new();
        let mut first_error: Option<SupplyError> = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Ok(Some(edges))) => {
                    self.progress.mark_chunk_done();
                    chunk_edges.push(edges);
                }
                Ok(Ok(None)) => {}
                Ok(Err(err)) => {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
                Err(err) => {
                    cancelled.store(true, Ordering::SeqCst);
                    if first_error.is_none() {
                        first_error = Some(SupplyError::Internal(format!(
                            "collection worker panicked: {err}"
                        )));
                    }
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(chunk_edges),
        }
    }

    /// Drop edges touching addresses without deployed bytecode. The root is
    /// always kept regardless of its code.
    async fn filter_contract_edges(
        &self,
        edges: Vec<CallEdge>,
        root: Address,
    ) -> Result<Vec<CallEdge>> {
        let mut candidates: BTreeSet<Address> = edges
            .iter()
            .flat_map(|edge| [edge.from, edge.to])
            .collect();
        candidates.remove(&root);

        let mut contracts: HashSet<Address> = HashSet::new();
        contracts.insert(root);
        for address in candidates {
            let code = self.trace.get_code(address).await?;
            if !code.is_empty() {
                contracts.insert(address);
            }
        }

        Ok(edges
            .into_iter()
            .filter(|edge| contracts.contains(&edge.from) && contracts.contains(&edge.to))
            .collect())
    }

    /// Attach labels as node metadata and return the address→label mapping
    /// for the report. With no enricher configured every node maps to its
    /// own checksummed address.
    async fn enrich(&self, graph: &mut CallGraph, root: Address) -> BTreeMap<String, String> {
        let mut labels: BTreeMap<String, String> = BTreeMap::new();

        let wanted: HashSet<Address> = graph
            .nodes()
            .map(|(address, _)| address)
            .filter(|address| *address != root)
            .collect();

        let resolved = match self.enricher.as_deref() {
            Some(enricher) if !wanted.is_empty() => enricher.resolve(&wanted).await,
            _ => wanted
                .iter()
                .map(|address| (*address, address.to_checksum(None)))
                .collect(),
        };

        labels.insert(root.to_checksum(None), root.to_checksum(None));
        for (address, label) in resolved {
            let data = graph.node(address).and_then(|info| info.data.clone());
            graph.add_node(
                address,
                data,
                Some(serde_json::json!({ "label": label })),
            );
            labels.insert(address.to_checksum(None), label);
        }
        labels
    }
}

async fn collect_chunk(
    trace: &dyn TraceSource,
    chunk: BlockRange,
    target: Address,
) -> Result<Vec<CallEdge>> {
    let hashes = trace.list_transactions_calling(chunk, target).await?;
    let tx_count = hashes.len();

    let mut edges = Vec::new();
    for hash in hashes {
        let frame = trace.trace_transaction(hash).await?;
        edges.extend(extract_rooted(&frame, target));
    }

    tracing::debug!(
        "[CHAIN] chunk {}..{}: {} matching tx, {} edges",
        chunk.from_block,
        chunk.to_block,
        tx_count,
        edges.len()
    );
    Ok(edges)
}

fn build_report(
    target: Address,
    range: BlockRange,
    graph: CallGraph,
    nodes: BTreeMap<String, String>,
) -> AnalysisReport {
    let edges = graph
        .edges()
        .map(|(from, to, info)| ReportEdge {
            from: from.to_checksum(None),
            to: to.to_checksum(None),
            data: info.data.clone(),
            count: info.count,
        })
        .collect();

    AnalysisReport {
        address: target.to_checksum(None),
        from_block: range.from_block,
        to_block: range.to_block,
        node_count: graph.node_count(),
        nodes,
        edges,
        total_calls: graph.total_calls(),
        unique_contracts: graph.node_count().saturating_sub(1),
        graph,
    }
}
