//! JSON-RPC trace client.
//!
//! Thin pass-through over the node's introspection endpoints: `trace_filter`
//! to list transactions originating from an address inside a block range, and
//! `debug_traceTransaction` (callTracer) to fetch one transaction's nested
//! call tree. No retry lives here; callers own that policy.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::timeout;

use alloy::primitives::{Address, Bytes, B256};

use crate::error::RpcError;
use crate::supply_chain::BlockRange;
use crate::utils::error::compact_error_message;
use crate::utils::hex::{block_tag, clean_hex};

const RPC_ERR_MAX_LEN: usize = 260;

pub type TxHash = B256;

/// EVM call categories as reported by the callTracer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Call,
    CallCode,
    DelegateCall,
    StaticCall,
    Create,
    Create2,
    SelfDestruct,
    Other,
}

impl CallKind {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "CALL" => CallKind::Call,
            "CALLCODE" => CallKind::CallCode,
            "DELEGATECALL" => CallKind::DelegateCall,
            "STATICCALL" => CallKind::StaticCall,
            "CREATE" => CallKind::Create,
            "CREATE2" => CallKind::Create2,
            "SELFDESTRUCT" => CallKind::SelfDestruct,
            _ => CallKind::Other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CallKind::Call => "CALL",
            CallKind::CallCode => "CALLCODE",
            CallKind::DelegateCall => "DELEGATECALL",
            CallKind::StaticCall => "STATICCALL",
            CallKind::Create => "CREATE",
            CallKind::Create2 => "CREATE2",
            CallKind::SelfDestruct => "SELFDESTRUCT",
            CallKind::Other => "OTHER",
        }
    }
}

/// One frame of a callTracer trace. Children are the calls made from within
/// this frame. Deserialized once at the RPC boundary; read-only afterwards.
///
/// `to` is absent for frames the tracer could not attribute a target to
/// (e.g. a CREATE whose deployment never completed); such frames emit no
/// edge but their children are still walked.
#[derive(Debug, Clone, Deserialize)]
pub struct CallFrame {
    pub from: Address,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub calls: Vec<CallFrame>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TraceFilterEntry {
    #[serde(default)]
    transaction_hash: Option<B256>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcFailure {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    error: Option<JsonRpcFailure>,
}

/// The two introspection primitives the collection pipeline depends on, plus
/// the small helpers the orchestrator needs for head defaulting and the
/// contracts-only filter. Implemented by [`RpcTraceClient`]; tests substitute
/// in-memory sources.
#[async_trait]
pub trait TraceSource: Send + Sync {
    /// Transactions within `range` whose top-level call originates from
    /// `address`. An endpoint reporting no matches yields an empty set.
    async fn list_transactions_calling(
        &self,
        range: BlockRange,
        address: Address,
    ) -> Result<HashSet<TxHash>, RpcError>;

    /// The nested call tree of one transaction. Never fabricates a
    /// placeholder tree: a missing trace is an error.
    async fn trace_transaction(&self, hash: TxHash) -> Result<CallFrame, RpcError>;

    /// Deployed bytecode at `address` (latest block). Empty for EOAs.
    async fn get_code(&self, address: Address) -> Result<Bytes, RpcError>;

    async fn latest_block_number(&self) -> Result<u64, RpcError>;
}

/// Concrete JSON-RPC 2.0 client over HTTP. Every call carries a bounded
/// deadline; a timeout surfaces as a transport failure.
pub struct RpcTraceClient {
    url: String,
    client: reqwest::Client,
    timeout_ms: u64,
    next_id: AtomicU64,
}

impl RpcTraceClient {
    pub fn new(url: impl Into<String>, timeout_ms: u64) -> Result<Self, RpcError> {
        let url = url.into();
        let parsed = url.parse::<reqwest::Url>().map_err(|e| RpcError::InvalidUrl {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => {
                return Err(RpcError::InvalidUrl {
                    url,
                    reason: format!("unsupported scheme `{other}`"),
                })
            }
        }

        let client = match reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
        {
            Ok(client) => client,
            Err(err) => {
                tracing::warn!(
                    "[TRACE] failed to construct timeout HTTP client: {err}; falling back to default client"
                );
                reqwest::Client::new()
            }
        };

        Ok(Self {
            url,
            client,
            timeout_ms,
            next_id: AtomicU64::new(1),
        })
    }

    async fn request_opt<T, P>(&self, method: &str, params: P) -> Result<Option<T>, RpcError>
    where
        T: serde::de::DeserializeOwned,
        P: Serialize,
    {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });

        let resp = timeout(
            Duration::from_millis(self.timeout_ms),
            self.client.post(&self.url).json(&payload).send(),
        )
        .await
        .map_err(|_| {
            RpcError::Transport(format!(
                "`{method}` timed out after {}ms",
                self.timeout_ms
            ))
        })?
        .map_err(|err| RpcError::Transport(compact(&err.to_string())))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RpcError::Transport(format!("`{method}` failed: HTTP {status}")));
        }

        let body: JsonRpcResponse<T> = timeout(Duration::from_millis(self.timeout_ms), resp.json())
            .await
            .map_err(|_| {
                RpcError::Transport(format!(
                    "`{method}` response read timed out after {}ms",
                    self.timeout_ms
                ))
            })?
            .map_err(|err| RpcError::Protocol(compact(&err.to_string())))?;

        if let Some(failure) = body.error {
            return Err(RpcError::Protocol(compact(&format!(
                "`{method}` rejected: code {} {}",
                failure.code, failure.message
            ))));
        }
        Ok(body.result)
    }
}

fn compact(message: &str) -> String {
    compact_error_message(message, RPC_ERR_MAX_LEN)
}

#[async_trait]
impl TraceSource for RpcTraceClient {
    async fn list_transactions_calling(
        &self,
        range: BlockRange,
        address: Address,
    ) -> Result<HashSet<TxHash>, RpcError> {
        let params = serde_json::json!([{
            "fromBlock": block_tag(range.from_block),
            "toBlock": block_tag(range.to_block),
            "fromAddress": [address],
        }]);
        let entries: Option<Vec<TraceFilterEntry>> =
            self.request_opt("trace_filter", params).await?;

        let mut hashes = HashSet::new();
        for entry in entries.unwrap_or_default() {
            if entry.kind.as_deref() != Some("call") {
                continue;
            }
            if let Some(hash) = entry.transaction_hash {
                hashes.insert(hash);
            }
        }
        Ok(hashes)
    }

    async fn trace_transaction(&self, hash: TxHash) -> Result<CallFrame, RpcError> {
        let params = serde_json::json!([hash, {"tracer": "callTracer"}]);
        let frame: Option<CallFrame> = self.request_opt("debug_traceTransaction", params).await?;
        frame.ok_or_else(|| {
            RpcError::Protocol(format!(
                "debug_traceTransaction returned no trace for {hash:#x}"
            ))
        })
    }

    async fn get_code(&self, address: Address) -> Result<Bytes, RpcError> {
        let raw: Option<String> = self
            .request_opt("eth_getCode", serde_json::json!([address, "latest"]))
            .await?;
        let raw = raw
            .ok_or_else(|| RpcError::Protocol(format!("eth_getCode returned no result for {address:#x}")))?;
        let bytes = hex::decode(clean_hex(&raw))
            .map_err(|err| RpcError::Protocol(format!("eth_getCode returned invalid hex: {err}")))?;
        Ok(Bytes::from(bytes))
    }

    async fn latest_block_number(&self) -> Result<u64, RpcError> {
        let raw: Option<String> = self
            .request_opt("eth_blockNumber", serde_json::json!([]))
            .await?;
        let raw =
            raw.ok_or_else(|| RpcError::Protocol("eth_blockNumber returned no result".to_string()))?;
        u64::from_str_radix(clean_hex(&raw), 16)
            .map_err(|err| RpcError::Protocol(format!("eth_blockNumber returned `{raw}`: {err}")))
    }
}
