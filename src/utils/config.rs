use crate::error::{ConfigError, Result};
use std::env;
use std::path::PathBuf;

const DEFAULT_MAX_BLOCK_RANGE: u64 = 7_000;
const DEFAULT_COLLECT_CHUNK_SIZE: u64 = 200;
const DEFAULT_COLLECT_WORKERS: usize = 8;
const DEFAULT_RPC_CALL_TIMEOUT_MS: u64 = 8_000;
const DEFAULT_BLOCK_OFFSET: u64 = 10;
const DEFAULT_LABELS_DB_PATH: &str = "labels.db";

/// Process-level configuration, loaded once from the environment.
pub struct Config {
    pub eth_rpc_url: String,
    pub label_api_url: Option<String>,
    pub label_api_key: Option<String>,
    pub max_block_range: u64,
    pub chunk_size: u64,
    pub collect_workers: usize,
    pub rpc_call_timeout_ms: u64,
    pub default_block_offset: u64,
    pub labels_db_path: PathBuf,
}

fn validate_http_url(name: &str, raw: &str) -> Result<()> {
    let parsed = raw.parse::<reqwest::Url>().map_err(|e| {
        ConfigError::Invalid(format!("{name} must be a valid URL, got `{raw}`: {e}"))
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::Invalid(format!(
            "{name} must use http(s) scheme, got `{other}`"
        ))
        .into()),
    }
}

fn load_max_block_range() -> u64 {
    env::var("MAX_BLOCK_RANGE")
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .filter(|v| *v >= 1)
        .unwrap_or(DEFAULT_MAX_BLOCK_RANGE)
}

fn load_chunk_size() -> u64 {
    env::var("COLLECT_CHUNK_SIZE")
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .filter(|v| *v >= 1)
        .unwrap_or(DEFAULT_COLLECT_CHUNK_SIZE)
}

fn load_collect_workers() -> usize {
    env::var("COLLECT_WORKERS")
        .ok()
        .and_then(|raw| raw.trim().parse::<usize>().ok())
        .map(|v| v.clamp(1, 64))
        .unwrap_or(DEFAULT_COLLECT_WORKERS)
}

fn load_rpc_call_timeout_ms() -> u64 {
    env::var("RPC_CALL_TIMEOUT_MS")
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .filter(|v| (250..=60_000).contains(v))
        .unwrap_or(DEFAULT_RPC_CALL_TIMEOUT_MS)
}

fn load_default_block_offset() -> u64 {
    env::var("DEFAULT_BLOCK_OFFSET")
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_BLOCK_OFFSET)
}

fn load_labels_db_path() -> PathBuf {
    env::var("LABELS_DB_PATH")
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LABELS_DB_PATH))
}

impl Config {
    pub fn load() -> Result<Self> {
        let eth_rpc_url = env::var("ETH_RPC_URL")
            .map_err(|_| ConfigError::Missing("ETH_RPC_URL must be set".to_string()))?;
        validate_http_url("ETH_RPC_URL", &eth_rpc_url)?;

        let label_api_url = env::var("LABEL_API_URL")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        if let Some(url) = label_api_url.as_deref() {
            validate_http_url("LABEL_API_URL", url)?;
        }
        let label_api_key = env::var("LABEL_API_KEY")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        Ok(Self {
            eth_rpc_url,
            label_api_url,
            label_api_key,
            max_block_range: load_max_block_range(),
            chunk_size: load_chunk_size(),
            collect_workers: load_collect_workers(),
            rpc_call_timeout_ms: load_rpc_call_timeout_ms(),
            default_block_offset: load_default_block_offset(),
            labels_db_path: load_labels_db_path(),
        })
    }
}
