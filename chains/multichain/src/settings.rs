//! TOML settings loaded with the `config` crate. Every section and field has
//! a default, so a config file only needs to list what it changes.

use crate::database::CreateOptions;
use crate::engine::{EngineConfig, ExchangeConfig, Sizing};
use crate::registry::ChainName;
use anyhow::{Context, Result};
use config::{Config, File, FileFormat};
use core_logic::{AmountRange, ConfigError, CountRange, DelayRange, GasGate, RetryConfig};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub general: GeneralSettings,
    pub retry: RetrySettings,
    pub warmup: WarmupSettings,
    pub volume: VolumeSettings,
    pub collector: CollectorSettings,
    pub exchange: ExchangeSettings,
    /// Endpoint overrides, keyed by chain name.
    pub rpc: HashMap<ChainName, String>,
    pub paths: PathSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneralSettings {
    /// Manual bridge source and fixed volume start chain.
    pub start_chain: Option<ChainName>,
    /// Warmup fallback, manual bridge destination and collector target.
    pub finish_chain: Option<ChainName>,
    pub tx_delay_range: DelayRange,
    pub wallet_delay_range: DelayRange,
    pub deposit_poll_delay_range: DelayRange,
    pub gas_threshold_gwei: f64,
    pub gas_delay_range: DelayRange,
    pub gas_reference_chain: ChainName,
    pub manual_transfers_mode: bool,
    pub use_mobile_proxy: bool,
    pub proxy_change_ip_url: Option<String>,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            start_chain: Some(ChainName::Base),
            finish_chain: Some(ChainName::Arbitrum),
            tx_delay_range: DelayRange { min_secs: 10, max_secs: 15 },
            wallet_delay_range: DelayRange { min_secs: 30, max_secs: 60 },
            deposit_poll_delay_range: DelayRange { min_secs: 60, max_secs: 60 },
            gas_threshold_gwei: 15.0,
            gas_delay_range: DelayRange { min_secs: 30, max_secs: 30 },
            gas_reference_chain: ChainName::Ethereum,
            manual_transfers_mode: false,
            use_mobile_proxy: false,
            proxy_change_ip_url: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub attempts: u32,
    pub delay_range: DelayRange,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay_range: DelayRange { min_secs: 5, max_secs: 10 },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WarmupSettings {
    /// Also used by manual bridge.
    pub bridge_full_balance: bool,
    pub bridge_percentage_range: AmountRange,
    /// Chains left out get no warmup actions.
    pub bridge_counts: HashMap<ChainName, CountRange>,
}

impl Default for WarmupSettings {
    fn default() -> Self {
        Self {
            bridge_full_balance: true,
            bridge_percentage_range: AmountRange { min: 45.0, max: 50.0 },
            bridge_counts: ChainName::ALL
                .into_iter()
                .map(|chain| (chain, CountRange { min: 0, max: 1 }))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VolumeSettings {
    pub chains: Vec<ChainName>,
    /// USD target per wallet.
    pub goal_range: AmountRange,
    pub bridge_percentage_range: AmountRange,
    pub amount_to_leave_range: AmountRange,
}

impl Default for VolumeSettings {
    fn default() -> Self {
        Self {
            chains: vec![
                ChainName::Arbitrum,
                ChainName::Base,
                ChainName::Linea,
                ChainName::Optimism,
            ],
            goal_range: AmountRange { min: 100.0, max: 110.0 },
            bridge_percentage_range: AmountRange { min: 60.0, max: 65.0 },
            amount_to_leave_range: AmountRange { min: 0.0001, max: 0.0002 },
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CollectorSettings {
    /// Collect the highest-value token of each chain instead of the native coin.
    pub largest_usd_token: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExchangeSettings {
    pub enabled: bool,
    pub withdraw_amount_range: AmountRange,
    pub withdraw_tries: u32,
    pub withdraw_delay_range: DelayRange,
    pub status_poll_attempts: u32,
    pub status_poll_delay_range: DelayRange,
    pub deposit_poll_attempts: u32,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            withdraw_amount_range: AmountRange { min: 0.001, max: 0.002 },
            withdraw_tries: 5,
            withdraw_delay_range: DelayRange { min_secs: 60, max_secs: 60 },
            status_poll_attempts: 100,
            status_poll_delay_range: DelayRange { min_secs: 10, max_secs: 10 },
            deposit_poll_attempts: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathSettings {
    pub private_keys: PathBuf,
    pub proxies: PathBuf,
    pub deposit_addresses: PathBuf,
    pub database: PathBuf,
    pub journal: PathBuf,
    pub log_dir: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            private_keys: "data/private_keys.txt".into(),
            proxies: "data/proxies.txt".into(),
            deposit_addresses: "data/deposit_addresses.txt".into(),
            database: "data/database.json".into(),
            journal: "data/journal.db".into(),
            log_dir: "logs".into(),
        }
    }
}

impl Settings {
    pub fn load(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_string(),
            }
            .into());
        }
        let settings: Self = Config::builder()
            .add_source(File::with_name(path))
            .build()?
            .try_deserialize()
            .with_context(|| format!("Invalid settings in {}", path))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let settings: Self = Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_percent("warmup.bridge_percentage_range", &self.warmup.bridge_percentage_range)?;
        check_percent("volume.bridge_percentage_range", &self.volume.bridge_percentage_range)?;

        let distinct: HashSet<ChainName> = self.volume.chains.iter().copied().collect();
        if distinct.len() < 2 {
            return Err(ConfigError::InvalidValue {
                field: "volume.chains".into(),
                reason: "at least two different chains are needed".into(),
            });
        }
        if let Some(start) = self.general.start_chain {
            if !distinct.contains(&start) {
                return Err(ConfigError::InvalidValue {
                    field: "general.start_chain".into(),
                    reason: format!("{} is not one of volume.chains", start),
                });
            }
        }

        if self.volume.goal_range.min < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "volume.goal_range".into(),
                reason: "must not be negative".into(),
            });
        }
        if self.volume.amount_to_leave_range.min < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "volume.amount_to_leave_range".into(),
                reason: "must not be negative".into(),
            });
        }
        if self.exchange.withdraw_amount_range.min < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "exchange.withdraw_amount_range".into(),
                reason: "must not be negative".into(),
            });
        }
        if !(self.general.gas_threshold_gwei > 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "general.gas_threshold_gwei".into(),
                reason: "must be positive".into(),
            });
        }
        if self.retry.attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retry.attempts".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.general.use_mobile_proxy && self.general.proxy_change_ip_url.is_none() {
            return Err(ConfigError::MissingField {
                field: "general.proxy_change_ip_url".into(),
            });
        }
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        let general = &self.general;
        EngineConfig {
            retry: RetryConfig::new(self.retry.attempts, self.retry.delay_range),
            gas_gate: GasGate::new(general.gas_threshold_gwei, general.gas_delay_range),
            gas_reference: general.gas_reference_chain,
            tx_delay: general.tx_delay_range,
            wallet_delay: general.wallet_delay_range,
            deposit_poll_delay: general.deposit_poll_delay_range,
            manual_transfers: general.manual_transfers_mode,
            change_ip_url: if general.use_mobile_proxy {
                general.proxy_change_ip_url.clone()
            } else {
                None
            },
            exchange: ExchangeConfig {
                enabled: self.exchange.enabled,
                withdraw_amount: self.exchange.withdraw_amount_range,
                withdraw_retry: RetryConfig::new(
                    self.exchange.withdraw_tries,
                    self.exchange.withdraw_delay_range,
                ),
                status_poll_attempts: self.exchange.status_poll_attempts,
                status_poll_delay: self.exchange.status_poll_delay_range,
                deposit_poll_attempts: self.exchange.deposit_poll_attempts,
            },
        }
    }

    pub fn create_options(&self) -> CreateOptions {
        CreateOptions {
            bridge_counts: self.warmup.bridge_counts.clone(),
            volume_goal: self.volume.goal_range,
            volume_start_chain: self.general.start_chain,
            volume_chains: self.volume.chains.clone(),
        }
    }

    pub fn warmup_sizing(&self) -> Sizing {
        if self.warmup.bridge_full_balance {
            Sizing::Full
        } else {
            Sizing::Percent(self.warmup.bridge_percentage_range)
        }
    }

    /// Source and destination of the manual bridge route.
    pub fn manual_route(&self) -> Result<(ChainName, ChainName), ConfigError> {
        let from = self.general.start_chain.ok_or_else(|| ConfigError::MissingField {
            field: "general.start_chain".into(),
        })?;
        let to = self.finish_chain()?;
        Ok((from, to))
    }

    pub fn finish_chain(&self) -> Result<ChainName, ConfigError> {
        self.general.finish_chain.ok_or_else(|| ConfigError::MissingField {
            field: "general.finish_chain".into(),
        })
    }
}

fn check_percent(field: &str, range: &AmountRange) -> Result<(), ConfigError> {
    if range.min <= 0.0 || range.max > 100.0 {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            reason: format!("percentages must be in (0, 100], got [{}, {}]", range.min, range.max),
        });
    }
    Ok(())
}
