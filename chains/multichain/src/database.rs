//! # Wallet Database
//!
//! Ordered collection of [`WalletRecord`]s persisted as one JSON document.
//! Every mutation rewrites the whole file before returning, so the file on
//! disk always reflects the last completed step.
//!
//! Single writer only: nothing here locks the file, and two processes (or
//! two concurrent steps) updating the same database would lose writes.

use crate::registry::ChainName;
use crate::wallet::{Flag, PrivateKey, VolumeModeState, WalletRecord};
use core_logic::{AmountRange, CountRange, InputError, InputLists};
use ethers::signers::{LocalWallet, Signer};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

pub const SCHEMA_VERSION: u32 = 2;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Wallet database not found at {path}. Create it first.")]
    NotFound { path: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed wallet database {path}: {source}")]
    Schema {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unsupported database schema version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("Wallet index {index} out of range (total wallets: {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Rejected update of wallet {index}: {reason}")]
    Transition { index: usize, reason: String },

    #[error("Invalid private key on line {line}: {reason}")]
    InvalidPrivateKey { line: usize, reason: String },

    #[error("{count} deposit addresses for {keys} private keys")]
    TooManyDepositAddresses { count: usize, keys: usize },

    #[error(transparent)]
    Input(#[from] InputError),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct DatabaseFile {
    schema_version: u32,
    wallets: Vec<WalletRecord>,
}

/// Parameters for [`WalletDatabase::create`].
#[derive(Debug, Clone)]
pub struct CreateOptions {
    /// Range per chain; chains not listed get zero actions.
    pub bridge_counts: HashMap<ChainName, CountRange>,
    pub volume_goal: AmountRange,
    /// Fixed volume start chain, or `None` to pick one of `volume_chains`.
    pub volume_start_chain: Option<ChainName>,
    pub volume_chains: Vec<ChainName>,
}

#[derive(Debug)]
pub struct WalletDatabase {
    path: PathBuf,
    wallets: Vec<WalletRecord>,
}

impl WalletDatabase {
    /// Builds one record per private key and persists immediately.
    ///
    /// Lists are zipped by position; a missing proxy or deposit address
    /// becomes null. More proxies (or deposit addresses) than keys is fatal.
    pub fn create<R: Rng + ?Sized>(
        path: &Path,
        inputs: &InputLists,
        options: &CreateOptions,
        rng: &mut R,
    ) -> Result<Self, StoreError> {
        let keys = inputs.private_keys.len();
        if inputs.proxies.len() > keys {
            return Err(InputError::TooManyProxies {
                proxies: inputs.proxies.len(),
                keys,
            }
            .into());
        }
        if inputs.deposit_addresses.len() > keys {
            return Err(StoreError::TooManyDepositAddresses {
                count: inputs.deposit_addresses.len(),
                keys,
            });
        }

        let mut wallets = Vec::with_capacity(keys);
        for (i, key) in inputs.private_keys.iter().enumerate() {
            let address = derive_address(key).map_err(|reason| StoreError::InvalidPrivateKey {
                line: i + 1,
                reason,
            })?;

            let start_chain = match options.volume_start_chain {
                Some(chain) => chain,
                None => options
                    .volume_chains
                    .choose(rng)
                    .copied()
                    .unwrap_or(ChainName::Base),
            };
            let goal = round5(options.volume_goal.sample(rng));

            let mut record = WalletRecord::new(
                PrivateKey::new(key.clone()),
                address,
                inputs.proxies.get(i).map(|p| p.to_string()),
                inputs.deposit_addresses.get(i).cloned(),
                VolumeModeState::new(goal, start_chain),
            );
            for chain in ChainName::ALL {
                let range = options
                    .bridge_counts
                    .get(&chain)
                    .copied()
                    .unwrap_or_default();
                *record.bridge_count_mut(chain) = range.sample(rng);
            }
            wallets.push(record);
        }

        let db = Self {
            path: path.to_path_buf(),
            wallets,
        };
        db.save()?;
        info!(
            "Created wallet database with {} wallets at {}",
            db.wallets.len(),
            db.path.display()
        );
        Ok(db)
    }

    /// Loads and validates a saved database. Older layouts (a bare JSON
    /// array, or a version 1 envelope) are migrated to the current schema.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Err(StoreError::NotFound {
                path: path.display().to_string(),
            });
        }

        let raw = fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let value: Value = serde_json::from_str(&raw).map_err(|source| StoreError::Schema {
            path: path.display().to_string(),
            source,
        })?;

        let file = migrate(value).map_err(|e| match e {
            MigrateError::Json(source) => StoreError::Schema {
                path: path.display().to_string(),
                source,
            },
            MigrateError::Version(found) => StoreError::UnsupportedVersion {
                found,
                expected: SCHEMA_VERSION,
            },
        })?;

        debug!("Loaded {} wallets from {}", file.wallets.len(), path.display());
        Ok(Self {
            path: path.to_path_buf(),
            wallets: file.wallets,
        })
    }

    /// Rewrites the whole collection. The new content goes to a sibling
    /// temp file first and is renamed over the old one.
    pub fn save(&self) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.display().to_string(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }

        let file = DatabaseFileRef {
            schema_version: SCHEMA_VERSION,
            wallets: &self.wallets,
        };
        let json = serde_json::to_string_pretty(&file).map_err(|source| StoreError::Schema {
            path: self.path.display().to_string(),
            source,
        })?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    pub fn wallets(&self) -> &[WalletRecord] {
        &self.wallets
    }

    pub fn get(&self, index: usize) -> Result<&WalletRecord, StoreError> {
        self.wallets.get(index).ok_or(StoreError::IndexOutOfRange {
            index,
            len: self.wallets.len(),
        })
    }

    /// Applies `mutate` to the record at `index` and persists.
    ///
    /// The change is rolled back (and nothing is written) if it would clear
    /// a lifecycle flag, raise a counter, lower `volume_reached` or change
    /// the wallet's identity.
    pub fn update<F>(&mut self, index: usize, mutate: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut WalletRecord),
    {
        let len = self.wallets.len();
        let record = self
            .wallets
            .get_mut(index)
            .ok_or(StoreError::IndexOutOfRange { index, len })?;

        let before = record.clone();
        mutate(record);
        if let Err(reason) = WalletRecord::check_transition(&before, record) {
            *record = before;
            return Err(StoreError::Transition { index, reason });
        }

        self.save()
    }

    /// Uniform random pick among records matching every `(flag, value)` pair.
    pub fn pick_random<R: Rng + ?Sized>(
        &self,
        criteria: &[(Flag, bool)],
        rng: &mut R,
    ) -> Option<(WalletRecord, usize)> {
        let matching: Vec<usize> = self
            .wallets
            .iter()
            .enumerate()
            .filter(|(_, w)| criteria.iter().all(|(flag, value)| w.flag(*flag) == *value))
            .map(|(i, _)| i)
            .collect();

        matching
            .choose(rng)
            .map(|&i| (self.wallets[i].clone(), i))
    }

    /// First record, in storage order, whose volume cycle is not finished.
    pub fn pick_first_unfinished_volume(&self) -> Option<(WalletRecord, usize)> {
        self.wallets
            .iter()
            .position(|w| !w.volume_mode_state.deposited_to_cex)
            .map(|i| (self.wallets[i].clone(), i))
    }

    /// Decrements the named chain's counter by one and persists. Unknown
    /// chain names and counters already at zero are left alone.
    pub fn decrement_chain_counter(&mut self, index: usize, chain: &str) -> Result<(), StoreError> {
        let Ok(chain) = chain.parse::<ChainName>() else {
            debug!("Ignoring counter decrement for unknown chain '{}'", chain);
            return Ok(());
        };
        self.update(index, |w| {
            let counter = w.bridge_count_mut(chain);
            *counter = counter.saturating_sub(1);
        })
    }

    pub fn any_warmup_pending(&self) -> bool {
        self.wallets.iter().any(|w| !w.warmup_finished)
    }

    pub fn any_collector_pending(&self) -> bool {
        self.wallets.iter().any(|w| !w.collector_finished)
    }

    pub fn any_manual_bridge_pending(&self) -> bool {
        self.wallets.iter().any(|w| !w.manual_bridge_finished)
    }

    pub fn any_volume_pending(&self) -> bool {
        self.wallets
            .iter()
            .any(|w| !w.volume_mode_state.deposited_to_cex)
    }

    pub fn all_have_deposit_address(&self) -> bool {
        self.wallets
            .iter()
            .all(|w| w.deposit_address.as_deref().is_some_and(|a| !a.is_empty()))
    }
}

#[derive(Serialize)]
struct DatabaseFileRef<'a> {
    schema_version: u32,
    wallets: &'a [WalletRecord],
}

enum MigrateError {
    Json(serde_json::Error),
    Version(u32),
}

/// Brings any supported on-disk layout up to [`SCHEMA_VERSION`].
fn migrate(value: Value) -> Result<DatabaseFile, MigrateError> {
    match value {
        Value::Array(mut records) => {
            for record in &mut records {
                upgrade_record(record, 0);
            }
            let wallets = serde_json::from_value(Value::Array(records)).map_err(MigrateError::Json)?;
            Ok(DatabaseFile {
                schema_version: SCHEMA_VERSION,
                wallets,
            })
        }
        Value::Object(mut file) => {
            let found = file
                .get("schema_version")
                .and_then(Value::as_u64)
                .unwrap_or(u64::from(SCHEMA_VERSION));
            if found == 1 {
                if let Some(records) = file.get_mut("wallets").and_then(Value::as_array_mut) {
                    for record in records {
                        upgrade_record(record, 1);
                    }
                }
                file.insert("schema_version".into(), Value::from(SCHEMA_VERSION));
            } else if found != u64::from(SCHEMA_VERSION) {
                return Err(MigrateError::Version(found as u32));
            }
            serde_json::from_value(Value::Object(file)).map_err(MigrateError::Json)
        }
        other => serde_json::from_value(other).map_err(MigrateError::Json),
    }
}

/// Adds the markers introduced after schema `from` as nulls.
fn upgrade_record(record: &mut Value, from: u64) {
    let Some(fields) = record.as_object_mut() else {
        return;
    };
    if from < 2 {
        fields.entry("pending_withdrawal").or_insert(Value::Null);
    }
    if let Some(vms) = fields
        .get_mut("volume_mode_state")
        .and_then(Value::as_object_mut)
    {
        if from < 1 {
            vms.entry("pending_cex_transfer").or_insert(Value::Null);
        }
        if from < 2 {
            vms.entry("pending_withdrawal").or_insert(Value::Null);
        }
    }
}

/// Checksummed address of a hex private key.
pub fn derive_address(private_key: &str) -> Result<String, String> {
    let key = private_key.strip_prefix("0x").unwrap_or(private_key);
    let wallet: LocalWallet = key.parse().map_err(|e| format!("{}", e))?;
    Ok(ethers::utils::to_checksum(&wallet.address(), None))
}

fn round5(value: f64) -> f64 {
    crate::registry::round_to(value, 5)
}
