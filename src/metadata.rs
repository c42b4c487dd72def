//! Remote label / deployment metadata service client.
//!
//! One batched POST per lookup, authenticated with an API key header. The
//! service answering with no `data` (or an empty array) means "nothing
//! known", not an error.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::{Address, B256};

use crate::error::SupplyError;
use crate::storage::labels_db::DeploymentRecord;
use crate::utils::error::compact_error_message;

const LABEL_HTTP_TIMEOUT_SECS: u64 = 15;
const MAX_RETRIES: u32 = 3;
const LABEL_ERR_MAX_LEN: usize = 260;

/// Batched address-to-label lookup. Implemented by [`LabelServiceClient`];
/// tests substitute in-memory sources.
#[async_trait]
pub trait LabelLookup: Send + Sync {
    /// Labels for the subset of `addresses` the service knows. Unknown
    /// addresses are simply absent from the result.
    async fn fetch_labels(
        &self,
        addresses: &[Address],
    ) -> Result<HashMap<Address, String>, SupplyError>;
}

#[derive(Debug, Deserialize)]
struct LabelServiceResponse {
    #[serde(default)]
    data: Vec<LabelEntry>,
}

#[derive(Debug, Deserialize)]
struct LabelEntry {
    address: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct DeploymentServiceResponse {
    #[serde(default)]
    data: Vec<DeploymentEntry>,
}

#[derive(Debug, Deserialize)]
struct DeploymentEntry {
    address: String,
    deployer: String,
    deployer_eoa: String,
    tx_hash: String,
    block_number: u64,
}

pub struct LabelServiceClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl LabelServiceClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = match reqwest::Client::builder()
            .timeout(Duration::from_secs(LABEL_HTTP_TIMEOUT_SECS))
            .build()
        {
            Ok(client) => client,
            Err(err) => {
                tracing::warn!(
                    "[LABELS] failed to construct timeout HTTP client: {err}; falling back to default client"
                );
                reqwest::Client::new()
            }
        };
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            client,
        }
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        payload: &serde_json::Value,
    ) -> Result<T, SupplyError> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        let mut last_err: Option<String> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(500 * 2u64.pow(attempt - 1))).await;
            }
            match self
                .client
                .post(&url)
                .header("X-API-Key", &self.api_key)
                .json(payload)
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => match resp.json::<T>().await {
                    Ok(parsed) => return Ok(parsed),
                    Err(err) => last_err = Some(err.to_string()),
                },
                Ok(resp) => last_err = Some(format!("HTTP {}", resp.status())),
                Err(err) => last_err = Some(err.to_string()),
            }
        }

        Err(SupplyError::LabelService(compact_error_message(
            &last_err.unwrap_or_else(|| "exhausted retries".to_string()),
            LABEL_ERR_MAX_LEN,
        )))
    }

    /// Deployment record for one address, or `None` when the service has no
    /// record of it.
    pub async fn fetch_deployment(
        &self,
        address: Address,
    ) -> Result<Option<DeploymentRecord>, SupplyError> {
        let payload = serde_json::json!({
            "addresses": [format!("{address:#x}")],
        });
        let resp: DeploymentServiceResponse = self.post_json("/deployments", &payload).await?;

        for entry in resp.data {
            let Ok(parsed) = Address::from_str(entry.address.trim()) else {
                continue;
            };
            if parsed != address {
                continue;
            }
            let deployer = Address::from_str(entry.deployer.trim()).map_err(|err| {
                SupplyError::LabelService(format!("invalid deployer `{}`: {err}", entry.deployer))
            })?;
            let deployer_eoa = Address::from_str(entry.deployer_eoa.trim()).map_err(|err| {
                SupplyError::LabelService(format!(
                    "invalid deployer_eoa `{}`: {err}",
                    entry.deployer_eoa
                ))
            })?;
            let tx_hash = B256::from_str(entry.tx_hash.trim()).map_err(|err| {
                SupplyError::LabelService(format!("invalid tx_hash `{}`: {err}", entry.tx_hash))
            })?;
            return Ok(Some(DeploymentRecord {
                address,
                deployer,
                deployer_eoa,
                tx_hash,
                block_number: entry.block_number,
            }));
        }
        Ok(None)
    }
}

#[async_trait]
impl LabelLookup for LabelServiceClient {
    async fn fetch_labels(
        &self,
        addresses: &[Address],
    ) -> Result<HashMap<Address, String>, SupplyError> {
        if addresses.is_empty() {
            return Ok(HashMap::new());
        }

        // The service keys on lowercase hex.
        let payload = serde_json::json!({
            "addresses": addresses.iter().map(|a| format!("{a:#x}")).collect::<Vec<_>>(),
        });
        let resp: LabelServiceResponse = self.post_json("/labels", &payload).await?;

        let mut labels = HashMap::new();
        for entry in resp.data {
            let Ok(address) = Address::from_str(entry.address.trim()) else {
                tracing::warn!(
                    "[LABELS] dropping label entry with invalid address `{}`",
                    entry.address
                );
                continue;
            };
            let name = entry.name.trim();
            if name.is_empty() {
                continue;
            }
            labels.insert(address, name.to_string());
        }
        Ok(labels)
    }
}
