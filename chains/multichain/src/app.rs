//! Wiring between the settings, the live gateways and the engine.

use crate::database::WalletDatabase;
use crate::engine::{
    CollectorStrategy, ManualBridgeStrategy, Mode, ProgressionEngine, RunSummary, Sizing, Strategy,
    TokenChoice, VolumeStrategy, WarmupStrategy,
};
use crate::gateway::evm::TxSettings;
use crate::gateway::{
    CoinloreOracle, DialoguerPrompt, EvmGateway, ExchangeGateway, Gateways, LifiBridge,
    OkxCredentials, OkxExchange,
};
use crate::menu::Action;
use crate::registry::ChainRegistry;
use crate::settings::Settings;
use anyhow::{Context, Result};
use core_logic::{ActionJournal, WalletManager};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

impl Action {
    /// Engine mode behind the action; `None` for database creation.
    pub fn mode(&self) -> Option<Mode> {
        match self {
            Action::Create => None,
            Action::Warmup => Some(Mode::Warmup),
            Action::Volume => Some(Mode::Volume),
            Action::Collector => Some(Mode::Collector),
            Action::ManualBridge => Some(Mode::ManualBridge),
        }
    }
}

pub fn build_strategy(mode: Mode, settings: &Settings) -> Result<Box<dyn Strategy>> {
    let strategy: Box<dyn Strategy> = match mode {
        Mode::Warmup => Box::new(WarmupStrategy::new(
            settings.general.finish_chain,
            settings.warmup_sizing(),
        )),
        Mode::Volume => Box::new(VolumeStrategy::new(
            settings.volume.chains.clone(),
            Sizing::Percent(settings.volume.bridge_percentage_range),
            settings.volume.amount_to_leave_range,
        )),
        Mode::Collector => {
            let token = if settings.collector.largest_usd_token {
                TokenChoice::LargestUsd
            } else {
                TokenChoice::Native
            };
            Box::new(CollectorStrategy::new(settings.finish_chain()?, token))
        }
        Mode::ManualBridge => {
            let (from, to) = settings.manual_route()?;
            Box::new(ManualBridgeStrategy::new(from, to, settings.warmup_sizing()))
        }
    };
    Ok(strategy)
}

/// Live adapters. The exchange client is only built (and its credentials
/// only read) when withdrawals are enabled.
pub fn build_gateways(settings: &Settings) -> Result<Gateways> {
    let evm = Arc::new(EvmGateway::new(TxSettings::default()));
    let exchange: Option<Arc<dyn ExchangeGateway>> = if settings.exchange.enabled {
        let credentials = OkxCredentials::from_env().context("exchange is enabled")?;
        Some(Arc::new(OkxExchange::new(credentials)?) as Arc<dyn ExchangeGateway>)
    } else {
        None
    };

    Ok(Gateways {
        chain: evm.clone(),
        bridge: Arc::new(LifiBridge::new(evm)),
        exchange,
        prices: Arc::new(CoinloreOracle::new()?),
        prompt: Arc::new(DialoguerPrompt),
    })
}

/// Reads the three input lists and writes a fresh database.
pub fn create_database(settings: &Settings) -> Result<WalletDatabase> {
    let paths = &settings.paths;
    let inputs = WalletManager::load_inputs(
        &paths.private_keys,
        &paths.proxies,
        &paths.deposit_addresses,
        settings.general.use_mobile_proxy,
    )?;
    if paths.database.exists() {
        warn!("Overwriting existing database {}", paths.database.display());
    }
    let db = WalletDatabase::create(
        &paths.database,
        &inputs,
        &settings.create_options(),
        &mut rand::thread_rng(),
    )?;
    Ok(db)
}

pub async fn run_mode(
    mode: Mode,
    settings: &Settings,
    shutdown: &CancellationToken,
) -> Result<RunSummary> {
    let registry = Arc::new(ChainRegistry::new(&settings.rpc)?);
    let strategy = build_strategy(mode, settings)?;
    let mut db = WalletDatabase::load(&settings.paths.database)
        .with_context(|| format!("run `{}` first", Action::Create.label()))?;
    let gateways = build_gateways(settings)?;

    let journal = match ActionJournal::open(&settings.paths.journal).await {
        Ok(journal) => Some(Arc::new(journal)),
        Err(e) => {
            warn!("Journal unavailable, steps will only be logged: {:#}", e);
            None
        }
    };

    let mut engine = ProgressionEngine::new(registry, gateways, settings.engine_config());
    if let Some(journal) = &journal {
        engine = engine.with_journal(Arc::clone(journal));
    }
    let summary = engine.run(&mut db, strategy.as_ref(), shutdown).await;
    drop(engine);

    if let Some(journal) = journal.and_then(|j| Arc::try_unwrap(j).ok()) {
        journal.close().await;
    }

    let summary = summary?;
    info!(
        "[{}] {} steps: {} progressed, {} waiting, {} failed, {} finished",
        mode, summary.steps, summary.progressed, summary.deferred, summary.failed, summary.finished
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_run_action_builds_a_strategy() {
        let settings = Settings::default();
        for action in Action::ALL {
            if let Some(mode) = action.mode() {
                let strategy = build_strategy(mode, &settings).unwrap();
                assert_eq!(strategy.mode(), mode);
            }
        }
    }

    #[test]
    fn test_collector_needs_finish_chain() {
        let mut settings = Settings::default();
        settings.general.finish_chain = None;
        assert!(build_strategy(Mode::Collector, &settings).is_err());
        assert!(build_strategy(Mode::Warmup, &settings).is_ok());
    }
}
