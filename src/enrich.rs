//! Address label enrichment.
//!
//! Resolution order: in-process memo, then the sqlite store, then one
//! batched call to the remote label service for whatever is still unknown.
//! Freshly fetched labels are persisted. Addresses nobody can name map to
//! themselves, so the result always covers every requested address.

use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use alloy::primitives::Address;

use crate::error::{Result, SupplyError};
use crate::metadata::{LabelLookup, LabelServiceClient};
use crate::storage::labels_db::{DeploymentRecord, LabelsDb};
use crate::utils::config::Config;
use crate::utils::error::compact_error_message;

const ENRICH_ERR_MAX_LEN: usize = 260;

pub struct LabelEnricher {
    db: LabelsDb,
    remote: Option<Arc<dyn LabelLookup>>,
    memo: DashMap<Address, String>,
}

impl LabelEnricher {
    pub fn new(db: LabelsDb, remote: Option<Arc<dyn LabelLookup>>) -> Self {
        Self {
            db,
            remote,
            memo: DashMap::new(),
        }
    }

    /// Build the enricher from process configuration: sqlite store at the
    /// configured path, remote lookup only when the service is configured.
    pub fn from_config(config: &Config) -> Result<Self> {
        let db = LabelsDb::open(&config.labels_db_path).map_err(|err| {
            SupplyError::Internal(format!(
                "failed to open labels store {}: {err}",
                config.labels_db_path.display()
            ))
        })?;
        let remote: Option<Arc<dyn LabelLookup>> =
            match (config.label_api_url.as_deref(), config.label_api_key.as_deref()) {
                (Some(url), Some(key)) => Some(Arc::new(LabelServiceClient::new(url, key))),
                _ => None,
            };
        Ok(Self::new(db, remote))
    }

    /// Resolve every requested address to a human label. Total: addresses
    /// that stay unknown map to their own checksummed form. Remote or store
    /// trouble degrades to that fallback instead of failing the caller.
    pub async fn resolve(&self, addresses: &HashSet<Address>) -> HashMap<Address, String> {
        let mut resolved: HashMap<Address, String> = HashMap::new();
        let mut pending: Vec<Address> = Vec::new();

        for address in addresses {
            match self.memo.get(address) {
                Some(label) => {
                    resolved.insert(*address, label.clone());
                }
                None => pending.push(*address),
            }
        }

        if !pending.is_empty() {
            match self.db.get_labels(&pending) {
                Ok(stored) => {
                    pending.retain(|address| !stored.contains_key(address));
                    for (address, label) in stored {
                        self.memo.insert(address, label.clone());
                        resolved.insert(address, label);
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        "[LABELS] local label lookup failed: {}",
                        compact_error_message(&err.to_string(), ENRICH_ERR_MAX_LEN)
                    );
                }
            }
        }

        // One batched remote call for everything still unknown, never one
        // request per address.
        if !pending.is_empty() {
            if let Some(remote) = self.remote.as_deref() {
                match remote.fetch_labels(&pending).await {
                    Ok(fetched) => {
                        pending.retain(|address| !fetched.contains_key(address));
                        for (address, label) in fetched {
                            if let Err(err) = self.db.insert_label_if_absent(address, &label) {
                                tracing::warn!(
                                    "[LABELS] failed to persist label for {address:#x}: {}",
                                    compact_error_message(&err.to_string(), ENRICH_ERR_MAX_LEN)
                                );
                            }
                            self.memo.insert(address, label.clone());
                            resolved.insert(address, label);
                        }
                    }
                    Err(err) => {
                        tracing::warn!(
                            "[LABELS] remote label lookup failed, falling back to raw addresses: {err}"
                        );
                    }
                }
            }
        }

        // Address-as-label fallback. Not memoized: a later resolve should
        // still get a chance to learn the real name.
        for address in pending {
            resolved.insert(address, address.to_checksum(None));
        }

        resolved
    }
}

/// Deployment record for `address`: local store first, then the metadata
/// service (persisting a hit). No record anywhere is `NotFound`.
pub async fn deployment_info(
    db: &LabelsDb,
    remote: Option<&LabelServiceClient>,
    address: Address,
) -> Result<DeploymentRecord> {
    match db.get_deployment(address) {
        Ok(Some(record)) => return Ok(record),
        Ok(None) => {}
        Err(err) => {
            return Err(SupplyError::Internal(format!(
                "deployment lookup failed for {address:#x}: {err}"
            )))
        }
    }

    if let Some(client) = remote {
        if let Some(record) = client.fetch_deployment(address).await? {
            if let Err(err) = db.upsert_deployment(&record) {
                tracing::warn!(
                    "[LABELS] failed to persist deployment for {address:#x}: {}",
                    compact_error_message(&err.to_string(), ENRICH_ERR_MAX_LEN)
                );
            }
            return Ok(record);
        }
    }

    Err(SupplyError::NotFound(format!(
        "no deployment record for {}",
        address.to_checksum(None)
    )))
}
