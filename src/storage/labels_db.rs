use alloy::primitives::{Address, B256};
use anyhow::Context;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use std::time::{SystemTime, UNIX_EPOCH};

static LAST_LABELS_DB_NOW_MS: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelRecord {
    pub address: Address,
    pub label: String,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRecord {
    pub address: Address,
    pub deployer: Address,
    pub deployer_eoa: Address,
    pub tx_hash: B256,
    pub block_number: u64,
}

/// Sqlite-backed store for address labels and deployment records. Labels are
/// created on first successful resolution, updated only by explicit
/// overwrite, and never deleted here.
#[derive(Debug, Clone)]
pub struct LabelsDb {
    path: PathBuf,
}

impl LabelsDb {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let db = Self {
            path: path.as_ref().to_path_buf(),
        };
        db.ensure_schema()?;
        Ok(db)
    }

    fn ensure_schema(&self) -> anyhow::Result<()> {
        self.with_connection("ensure_schema", |conn| {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS labels (
                    address TEXT PRIMARY KEY NOT NULL,
                    label TEXT NOT NULL,
                    created_at_ms INTEGER NOT NULL,
                    updated_at_ms INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS deployments (
                    address TEXT PRIMARY KEY NOT NULL,
                    deployer TEXT NOT NULL,
                    deployer_eoa TEXT NOT NULL,
                    tx_hash TEXT NOT NULL,
                    block_number INTEGER NOT NULL,
                    created_at_ms INTEGER NOT NULL,
                    updated_at_ms INTEGER NOT NULL
                );
                "#,
            )?;
            // WAL keeps concurrent enrichment readers off the writers' backs.
            let _ = conn.execute_batch(
                r#"
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                "#,
            );
            Ok(())
        })
        .map(|_| ())
    }

    fn with_connection<T, F>(&self, context: &str, op: F) -> anyhow::Result<T>
    where
        F: Fn(&Connection) -> rusqlite::Result<T>,
    {
        let max_attempts = 6u32;
        let mut last_err = String::new();

        for attempt in 1..=max_attempts {
            let conn = Connection::open(&self.path).with_context(|| {
                format!("failed to open sqlite database {}", self.path.display())
            })?;
            conn.busy_timeout(Duration::from_millis(5_000))
                .context("failed to configure sqlite busy timeout")?;

            match op(&conn) {
                Ok(value) => return Ok(value),
                Err(err) => {
                    last_err = err.to_string();
                    if is_sqlite_locked_error(&err) && attempt < max_attempts {
                        continue;
                    }
                    return Err(anyhow::anyhow!(
                        "{} failed for {}: {}",
                        context,
                        self.path.display(),
                        last_err
                    ));
                }
            }
        }

        Err(anyhow::anyhow!(
            "{} failed for {} after {} attempt(s): {}",
            context,
            self.path.display(),
            max_attempts,
            last_err
        ))
    }

    pub fn get_label(&self, address: Address) -> anyhow::Result<Option<String>> {
        let address_hex = format!("{address:#x}");
        self.with_connection("get_label", |conn| {
            conn.query_row(
                "SELECT label FROM labels WHERE address = ?1 LIMIT 1",
                params![address_hex],
                |row| row.get::<_, String>(0),
            )
            .optional()
        })
    }

    /// Batch lookup. Addresses without a stored label are simply absent from
    /// the returned map.
    pub fn get_labels(&self, addresses: &[Address]) -> anyhow::Result<HashMap<Address, String>> {
        let mut found = HashMap::new();
        if addresses.is_empty() {
            return Ok(found);
        }
        let rows = self.with_connection("get_labels", |conn| {
            let placeholders = std::iter::repeat("?")
                .take(addresses.len())
                .collect::<Vec<_>>()
                .join(",");
            let sql = format!("SELECT address, label FROM labels WHERE address IN ({placeholders})");
            let mut stmt = conn.prepare(&sql)?;
            let keys: Vec<String> = addresses.iter().map(|a| format!("{a:#x}")).collect();
            let mut rows = stmt.query(rusqlite::params_from_iter(keys.iter()))?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push((row.get::<_, String>(0)?, row.get::<_, String>(1)?));
            }
            Ok::<_, rusqlite::Error>(out)
        })?;

        for (address_raw, label) in rows {
            if let Ok(address) = Address::from_str(address_raw.trim()) {
                found.insert(address, label);
            }
        }
        Ok(found)
    }

    pub fn all_labels(&self) -> anyhow::Result<HashMap<Address, String>> {
        let rows = self.with_connection("all_labels", |conn| {
            let mut stmt = conn.prepare("SELECT address, label FROM labels")?;
            let mut rows = stmt.query([])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push((row.get::<_, String>(0)?, row.get::<_, String>(1)?));
            }
            Ok::<_, rusqlite::Error>(out)
        })?;

        let mut found = HashMap::new();
        for (address_raw, label) in rows {
            if let Ok(address) = Address::from_str(address_raw.trim()) {
                found.insert(address, label);
            }
        }
        Ok(found)
    }

    /// First-resolution insert: keeps an existing label untouched so a
    /// concurrent resolve of the same address is redundant, not destructive.
    pub fn insert_label_if_absent(&self, address: Address, label: &str) -> anyhow::Result<()> {
        let address_hex = format!("{address:#x}");
        let now = to_i64(now_ms());
        self.with_connection("insert_label_if_absent", |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO labels (address, label, created_at_ms, updated_at_ms) VALUES (?1, ?2, ?3, ?3)",
                params![address_hex, label, now],
            )
        })
        .map(|_| ())
    }

    /// Explicit overwrite; bumps `updated_at_ms`, preserves `created_at_ms`.
    pub fn upsert_label(&self, address: Address, label: &str) -> anyhow::Result<()> {
        let address_hex = format!("{address:#x}");
        let now = to_i64(now_ms());
        self.with_connection("upsert_label", |conn| {
            conn.execute(
                r#"
                INSERT INTO labels (address, label, created_at_ms, updated_at_ms)
                VALUES (?1, ?2, ?3, ?3)
                ON CONFLICT(address) DO UPDATE SET
                    label = excluded.label,
                    updated_at_ms = excluded.updated_at_ms
                "#,
                params![address_hex, label, now],
            )
        })
        .map(|_| ())
    }

    pub fn get_deployment(&self, address: Address) -> anyhow::Result<Option<DeploymentRecord>> {
        let address_hex = format!("{address:#x}");
        let row = self.with_connection("get_deployment", |conn| {
            conn.query_row(
                "SELECT deployer, deployer_eoa, tx_hash, block_number FROM deployments WHERE address = ?1 LIMIT 1",
                params![address_hex],
                |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, String>(2)?,
                        r.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()
        })?;

        let Some((deployer_raw, eoa_raw, tx_raw, block_raw)) = row else {
            return Ok(None);
        };
        let deployer = Address::from_str(deployer_raw.trim())
            .with_context(|| format!("invalid deployer `{deployer_raw}` for {address_hex}"))?;
        let deployer_eoa = Address::from_str(eoa_raw.trim())
            .with_context(|| format!("invalid deployer_eoa `{eoa_raw}` for {address_hex}"))?;
        let tx_hash = B256::from_str(tx_raw.trim())
            .with_context(|| format!("invalid tx_hash `{tx_raw}` for {address_hex}"))?;

        Ok(Some(DeploymentRecord {
            address,
            deployer,
            deployer_eoa,
            tx_hash,
            block_number: block_raw.max(0) as u64,
        }))
    }

    pub fn upsert_deployment(&self, record: &DeploymentRecord) -> anyhow::Result<()> {
        let address_hex = format!("{:#x}", record.address);
        let deployer_hex = format!("{:#x}", record.deployer);
        let eoa_hex = format!("{:#x}", record.deployer_eoa);
        let tx_hex = format!("{:#x}", record.tx_hash);
        let block = to_i64(record.block_number);
        let now = to_i64(now_ms());
        self.with_connection("upsert_deployment", |conn| {
            conn.execute(
                r#"
                INSERT INTO deployments (address, deployer, deployer_eoa, tx_hash, block_number, created_at_ms, updated_at_ms)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                ON CONFLICT(address) DO UPDATE SET
                    deployer = excluded.deployer,
                    deployer_eoa = excluded.deployer_eoa,
                    tx_hash = excluded.tx_hash,
                    block_number = excluded.block_number,
                    updated_at_ms = excluded.updated_at_ms
                "#,
                params![address_hex, deployer_hex, eoa_hex, tx_hex, block, now],
            )
        })
        .map(|_| ())
    }
}

fn is_sqlite_locked_error(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(info, _)
            if info.code == rusqlite::ffi::ErrorCode::DatabaseBusy
                || info.code == rusqlite::ffi::ErrorCode::DatabaseLocked
    )
}

fn now_ms() -> u64 {
    let sample = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|duration| duration.as_millis() as u64);
    normalize_labels_db_now_ms(sample)
}

fn normalize_labels_db_now_ms(sample_ms: Option<u64>) -> u64 {
    let mut prev = LAST_LABELS_DB_NOW_MS.load(Ordering::Relaxed);
    loop {
        let normalized = sample_ms.unwrap_or(prev).max(prev).max(1);
        match LAST_LABELS_DB_NOW_MS.compare_exchange_weak(
            prev,
            normalized,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => return normalized,
            Err(actual) => prev = actual,
        }
    }
}

fn to_i64(value: u64) -> i64 {
    if value > i64::MAX as u64 {
        i64::MAX
    } else {
        value as i64
    }
}
