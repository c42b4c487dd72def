use thiserror::Error;

pub type Result<T> = std::result::Result<T, SupplyError>;

/// Top-level error taxonomy for an analysis request. Every externally visible
/// failure maps onto exactly one of these kinds.
#[derive(Debug, Error)]
pub enum SupplyError {
    #[error("invalid address `{0}`")]
    InvalidAddress(String),
    #[error("invalid block number `{0}`")]
    InvalidBlockNumber(String),
    #[error("invalid block range: {0}")]
    BlockRange(String),
    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),
    #[error("label service error: {0}")]
    LabelService(String),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
}

/// Failures talking to the blockchain node. A timed-out call surfaces as
/// `Transport` like any other dead connection; callers must not assume a
/// retry happened underneath.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("invalid URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("protocol error: {0}")]
    Protocol(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    Missing(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
