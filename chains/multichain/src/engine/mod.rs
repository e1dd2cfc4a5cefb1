//! # Progression Engine
//!
//! One state machine shared by every mode. Each turn the driver picks one
//! wallet and runs a single step against it:
//!
//! 1. confirm the arrival of the last bridge, or defer if it is still in flight
//! 2. run the completion action once the strategy has nothing left to bridge
//! 3. pull funds from the exchange if the lane has not done so yet
//! 4. send the planned bridges, persisting the in-flight marker with each send
//!
//! Every state change goes through [`WalletDatabase::update`], so the file
//! on disk is current after each discrete mutation.

mod collector;
mod funding;
mod manual;
mod strategy;
mod volume;
mod warmup;

pub use collector::CollectorStrategy;
pub use manual::ManualBridgeStrategy;
pub use strategy::{
    Completion, Mode, Plan, Route, SentBridge, Sizing, Strategy, TokenChoice,
};
pub use volume::VolumeStrategy;
pub use warmup::WarmupStrategy;

use crate::database::{StoreError, WalletDatabase};
use crate::gateway::{BridgeRequest, GatewayError, Gateways, ReferenceGas};
use crate::registry::{Chain, ChainName, ChainRegistry, Token};
use crate::wallet::{Lane, WalletRecord};
use anyhow::{anyhow, Context, Result};
use core_logic::{
    with_retry_if, ActionJournal, AmountRange, DelayRange, GasGate, JournalEntry,
    MetricsCollector, RetryConfig, StepKind, WorkerRunner, TASK_RESULT_TARGET,
};
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    pub enabled: bool,
    pub withdraw_amount: AmountRange,
    pub withdraw_retry: RetryConfig,
    pub status_poll_attempts: u32,
    pub status_poll_delay: DelayRange,
    pub deposit_poll_attempts: u32,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            withdraw_amount: AmountRange { min: 0.0, max: 0.0 },
            withdraw_retry: RetryConfig::default().without_delay(),
            status_poll_attempts: 100,
            status_poll_delay: DelayRange::zero(),
            deposit_poll_attempts: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub retry: RetryConfig,
    pub gas_gate: GasGate,
    pub gas_reference: ChainName,
    /// Between sends inside one step.
    pub tx_delay: DelayRange,
    /// Between steps.
    pub wallet_delay: DelayRange,
    /// Between balance checks while waiting for an exchange deposit.
    pub deposit_poll_delay: DelayRange,
    pub manual_transfers: bool,
    /// Hit before every step when a mobile proxy is in use.
    pub change_ip_url: Option<String>,
    pub exchange: ExchangeConfig,
}

/// What one step achieved.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Progressed(String),
    /// Waiting on something external; try again on a later turn.
    Deferred(String),
    NoProgress(String),
    Finished(String),
}

impl StepOutcome {
    fn kind(&self) -> StepKind {
        match self {
            StepOutcome::Progressed(_) | StepOutcome::Finished(_) => StepKind::Progressed,
            StepOutcome::Deferred(_) => StepKind::Deferred,
            StepOutcome::NoProgress(_) => StepKind::Failed,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            StepOutcome::Progressed(_) => "progressed",
            StepOutcome::Deferred(_) => "deferred",
            StepOutcome::NoProgress(_) => "no_progress",
            StepOutcome::Finished(_) => "finished",
        }
    }

    fn message(&self) -> &str {
        match self {
            StepOutcome::Progressed(m)
            | StepOutcome::Deferred(m)
            | StepOutcome::NoProgress(m)
            | StepOutcome::Finished(m) => m,
        }
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutcome::Progressed(m) => write!(f, "SUCCESS {}", m),
            StepOutcome::Deferred(m) => write!(f, "WAITING {}", m),
            StepOutcome::NoProgress(m) => write!(f, "FAILED {}", m),
            StepOutcome::Finished(m) => write!(f, "DONE {}", m),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub steps: u32,
    pub progressed: u32,
    pub deferred: u32,
    pub failed: u32,
    pub finished: u32,
    pub interrupted: bool,
}

impl RunSummary {
    fn record(&mut self, outcome: &StepOutcome) {
        self.steps += 1;
        match outcome {
            StepOutcome::Progressed(_) => self.progressed += 1,
            StepOutcome::Deferred(_) => self.deferred += 1,
            StepOutcome::NoProgress(_) => self.failed += 1,
            StepOutcome::Finished(_) => self.finished += 1,
        }
    }
}

pub struct ProgressionEngine {
    registry: Arc<ChainRegistry>,
    gateways: Gateways,
    config: EngineConfig,
    journal: Option<Arc<ActionJournal>>,
    rng: StdRng,
}

impl ProgressionEngine {
    pub fn new(registry: Arc<ChainRegistry>, gateways: Gateways, config: EngineConfig) -> Self {
        Self {
            registry,
            gateways,
            config,
            journal: None,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_journal(mut self, journal: Arc<ActionJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Fixes every random choice the engine makes.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Steps eligible wallets until none is left or `shutdown` fires.
    ///
    /// A failing step never ends the batch. Only a failure to persist the
    /// database does, since the file would no longer reflect what was sent.
    pub async fn run(
        &mut self,
        db: &mut WalletDatabase,
        strategy: &dyn Strategy,
        shutdown: &CancellationToken,
    ) -> Result<RunSummary> {
        let mode = strategy.mode();
        strategy
            .preflight(db)
            .map_err(|reason| anyhow!("Cannot start {}: {}", mode, reason))?;

        let metrics = MetricsCollector::global();
        let mut summary = RunSummary::default();
        info!("Starting {} for {} wallets", mode, db.len());

        while strategy.has_pending(db) {
            if shutdown.is_cancelled() {
                summary.interrupted = true;
                break;
            }
            let Some((record, index)) = strategy.select(db, &mut self.rng) else {
                break;
            };

            if let Some(url) = &self.config.change_ip_url {
                crate::gateway::http::change_ip(url).await;
            }

            info!("[{}] Working with wallet {}", mode, record.short_address());
            let started = Instant::now();
            let outcome = match self.step(db, strategy, index).await {
                Ok(outcome) => outcome,
                Err(e) if is_persistence_failure(&e) => {
                    error!("[{}] Could not persist progress: {:#}", mode, e);
                    return Err(e);
                }
                Err(e) => StepOutcome::NoProgress(format!("{:#}", e)),
            };
            let elapsed = started.elapsed();

            match &outcome {
                StepOutcome::NoProgress(_) => {
                    error!(target: TASK_RESULT_TARGET, "[{}] {} {}", mode, record.short_address(), outcome)
                }
                StepOutcome::Deferred(_) => {
                    warn!(target: TASK_RESULT_TARGET, "[{}] {} {}", mode, record.short_address(), outcome)
                }
                _ => info!(target: TASK_RESULT_TARGET, "[{}] {} {}", mode, record.short_address(), outcome),
            }
            metrics.record_step(outcome.kind(), elapsed);
            if matches!(outcome, StepOutcome::Finished(_)) {
                metrics.record_wallet_finished();
            }
            self.journal_step(&record, mode, &outcome, elapsed.as_millis() as u64)
                .await;
            summary.record(&outcome);

            if strategy.has_pending(db) && !WorkerRunner::pause(&self.config.wallet_delay, shutdown).await {
                summary.interrupted = true;
                break;
            }
        }

        if summary.interrupted {
            warn!("[{}] Interrupted, progress is saved", mode);
        } else {
            info!("[{}] No more wallets left", mode);
        }
        Ok(summary)
    }

    /// Runs one step for the wallet at `index`.
    pub async fn step(
        &mut self,
        db: &mut WalletDatabase,
        strategy: &dyn Strategy,
        index: usize,
    ) -> Result<StepOutcome> {
        let registry = Arc::clone(&self.registry);
        let mut record = db.get(index)?.clone();

        if let Some(lane) = strategy.lane() {
            if let Some(waiting) = self.check_arrival(db, index, &record, lane).await? {
                return Ok(waiting);
            }
            record = db.get(index)?.clone();
        }

        if strategy.is_complete(&record) {
            return self.complete(db, strategy, index).await;
        }

        let mut routes = match strategy.plan(&record, &mut self.rng) {
            Plan::Bridge(routes) => routes,
            Plan::Complete => return self.complete(db, strategy, index).await,
            Plan::Stalled(reason) => return Ok(StepOutcome::NoProgress(reason)),
        };

        if let (Some(lane), Some(first)) = (strategy.lane(), routes.first().copied()) {
            if self.config.exchange.enabled && record.lane(lane).okx_withdrawn.is_none() {
                let chain = registry.chain(first.from);
                let (funded, amount) = match self.withdraw_from_exchange(db, index, lane, chain).await {
                    Ok(withdrawn) => withdrawn,
                    Err(e) if is_persistence_failure(&e) => return Err(e),
                    Err(e) => {
                        return Ok(StepOutcome::NoProgress(format!(
                            "exchange withdrawal to {}: {:#}",
                            chain, e
                        )))
                    }
                };
                db.update(index, |w| {
                    let mut state = w.lane(lane);
                    state.okx_withdrawn = Some(amount);
                    state.current_chain = Some(funded);
                    w.set_lane(lane, state);
                    w.set_pending_withdrawal(lane, None);
                })?;

                // A resumed withdrawal may have funded another chain than
                // the one planned this turn.
                if funded != first.from {
                    record = db.get(index)?.clone();
                    routes = match strategy.plan(&record, &mut self.rng) {
                        Plan::Bridge(routes) => routes,
                        Plan::Complete => return self.complete(db, strategy, index).await,
                        Plan::Stalled(reason) => return Ok(StepOutcome::NoProgress(reason)),
                    };
                }
            }
        }

        let mut sent = Vec::new();
        let mut last_error = None;
        for (i, route) in routes.iter().enumerate() {
            if i > 0 && !sent.is_empty() {
                tokio::time::sleep(self.config.tx_delay.sample()).await;
            }
            match self.send(db, strategy, index, route).await {
                Ok(Some(bridge)) => sent.push(bridge),
                Ok(None) => {}
                Err(e) if is_persistence_failure(&e) => return Err(e),
                Err(e) => {
                    warn!("Bridge {} -> {} failed: {:#}", route.from, route.to, e);
                    last_error = Some(e);
                }
            }
        }

        let summary = sent
            .iter()
            .map(|b| format!("{} -> {} ({})", b.from, b.to, b.amount))
            .collect::<Vec<_>>()
            .join(", ");

        if strategy.finishes_after_pass(!sent.is_empty()) {
            let Completion::MarkFinished(flag) = strategy.completion() else {
                return Err(anyhow!("{} cannot finish after a single pass", strategy.mode()));
            };
            db.update(index, |w| w.mark(flag))?;
            return Ok(StepOutcome::Finished(if summary.is_empty() {
                "nothing to move".to_string()
            } else {
                summary
            }));
        }

        if !sent.is_empty() {
            return Ok(StepOutcome::Progressed(format!("bridged {}", summary)));
        }
        Ok(StepOutcome::NoProgress(match last_error {
            Some(e) => format!("{:#}", e),
            None => "amount rounds to zero, nothing sent".to_string(),
        }))
    }

    /// Returns `Some(Deferred)` while the last bridge is still in flight and
    /// clears the marker once the destination balance has grown.
    async fn check_arrival(
        &self,
        db: &mut WalletDatabase,
        index: usize,
        record: &WalletRecord,
        lane: Lane,
    ) -> Result<Option<StepOutcome>> {
        let state = record.lane(lane);
        let Some(snapshot) = state.initial_balance else {
            return Ok(None);
        };

        let Some(chain_name) = state.current_chain else {
            warn!(
                "{} has a balance snapshot but no current chain, dropping it",
                record.short_address()
            );
            db.update(index, |w| {
                let mut state = w.lane(lane);
                state.initial_balance = None;
                w.set_lane(lane, state);
            })?;
            return Ok(None);
        };

        let chain = self.registry.chain(chain_name);
        let token = chain.native_token();
        let balance = self.balance(record, chain, token).await?;

        if !has_arrived(balance, snapshot) {
            return Ok(Some(StepOutcome::Deferred(format!(
                "bridged {} still in flight to {} ({} <= {})",
                token,
                chain,
                token.round(balance),
                token.round(snapshot)
            ))));
        }

        info!("Bridged {} has reached {}", token, chain);
        db.update(index, |w| {
            let mut state = w.lane(lane);
            state.initial_balance = None;
            w.set_lane(lane, state);
        })?;
        Ok(None)
    }

    /// Sends one route. `Ok(None)` means the amount was too small to send.
    async fn send(
        &mut self,
        db: &mut WalletDatabase,
        strategy: &dyn Strategy,
        index: usize,
        route: &Route,
    ) -> Result<Option<SentBridge>> {
        let registry = Arc::clone(&self.registry);
        let record = db.get(index)?.clone();
        let from = registry.chain(route.from);
        let to = registry.chain(route.to);

        let token_in = match route.token {
            TokenChoice::Native => from.native_token(),
            TokenChoice::LargestUsd => match self.largest_usd_token(&record, from).await? {
                Some(token) => token,
                None => {
                    debug!("No token with a USD balance on {}", from);
                    return Ok(None);
                }
            },
        };
        let token_out = to.token(token_in.symbol).unwrap_or(to.native_token());

        let amount = match route.sizing {
            Sizing::Full => None,
            Sizing::Percent(range) => {
                let balance = self.balance(&record, from, token_in).await?;
                let amount = token_in.round(balance * range.sample(&mut self.rng) / 100.0);
                if token_in.is_dust(amount) {
                    info!("Amount of {} on {} is too low to bridge", token_in, from);
                    return Ok(None);
                }
                Some(amount)
            }
        };

        let usd_price = if strategy.needs_price() {
            Some(self.price(token_in).await?)
        } else {
            None
        };

        // Taken before the send so a fast settlement is never mistaken for
        // the starting balance.
        let snapshot = match strategy.lane() {
            Some(_) => Some(self.balance(&record, to, to.native_token()).await?),
            None => None,
        };

        self.wait_for_gas().await;

        let request = BridgeRequest {
            wallet: &record,
            from,
            to,
            token_in,
            token_out,
            amount,
        };
        let bridge = Arc::clone(&self.gateways.bridge);
        let amount_sent = match with_retry_if(
            &self.config.retry,
            "bridge",
            GatewayError::is_retryable,
            || bridge.bridge(&request),
        )
        .await
        {
            Ok(receipt) => receipt.amount_sent,
            Err(GatewayError::ZeroAmount) => {
                info!("Nothing to bridge from {} to {}", from, to);
                return Ok(None);
            }
            // Broadcast without a receipt: track it as in flight so the
            // arrival check settles it instead of a second send. A
            // full-balance amount is unknown and counts as zero volume.
            Err(GatewayError::Unconfirmed { tx_hash }) => {
                warn!(
                    "Bridge {} -> {} not confirmed ({}), waiting for arrival",
                    from,
                    to,
                    from.tx_url(&tx_hash)
                );
                amount.unwrap_or(0.0)
            }
            Err(e) => return Err(e).with_context(|| format!("bridge {} -> {}", from, to)),
        };

        let metrics = MetricsCollector::global();
        metrics.record_bridge();
        if let Some(price) = usd_price {
            metrics.add_usd_volume(amount_sent * price);
        }

        let sent = SentBridge {
            from: route.from,
            to: route.to,
            amount: amount_sent,
            usd_price,
        };
        let lane = strategy.lane();
        db.update(index, |w| {
            if let (Some(lane), Some(snapshot)) = (lane, snapshot) {
                let mut state = w.lane(lane);
                state.current_chain = Some(route.to);
                state.initial_balance = Some(snapshot);
                w.set_lane(lane, state);
            }
            strategy.on_sent(w, &sent);
        })?;

        Ok(Some(sent))
    }

    async fn complete(
        &mut self,
        db: &mut WalletDatabase,
        strategy: &dyn Strategy,
        index: usize,
    ) -> Result<StepOutcome> {
        match strategy.completion() {
            Completion::MarkFinished(flag) => {
                db.update(index, |w| w.mark(flag))?;
                Ok(StepOutcome::Finished(format!("{} complete", strategy.mode())))
            }
            Completion::TransferToCex { leave } => self.transfer_to_cex(db, index, leave).await,
        }
    }

    /// Token on `chain` with the largest USD value, or `None` when every
    /// balance is zero. Balances and prices are read concurrently.
    async fn largest_usd_token<'c>(
        &self,
        record: &WalletRecord,
        chain: &'c Chain,
    ) -> Result<Option<&'c Token>> {
        let tokens: Vec<&Token> = chain.tokens().iter().collect();
        let chain_gw = &self.gateways.chain;
        let balances = join_all(tokens.iter().map(|t| chain_gw.balance(record, chain, t)));
        let (prices, balances) = tokio::join!(self.gateways.prices.prices(&tokens), balances);
        let prices = prices.context("token prices")?;

        let mut best: Option<(&Token, f64)> = None;
        for ((token, balance), price) in tokens.iter().zip(balances).zip(prices) {
            let usd = balance.with_context(|| format!("{} balance on {}", token, chain))? * price;
            debug!("{} on {}: ${:.2}", token, chain, usd);
            if usd > 0.0 && best.map_or(true, |(_, top)| usd > top) {
                best = Some((*token, usd));
            }
        }
        Ok(best.map(|(token, _)| token))
    }

    async fn balance(&self, record: &WalletRecord, chain: &Chain, token: &Token) -> Result<f64> {
        let gateway = &self.gateways.chain;
        with_retry_if(&self.config.retry, "balance", GatewayError::is_retryable, || {
            gateway.balance(record, chain, token)
        })
        .await
        .with_context(|| format!("{} balance on {}", token, chain))
    }

    async fn price(&self, token: &Token) -> Result<f64> {
        let oracle = &self.gateways.prices;
        let tokens = [token];
        let prices = with_retry_if(&self.config.retry, "price", GatewayError::is_retryable, || {
            oracle.prices(&tokens)
        })
        .await
        .with_context(|| format!("{} price", token))?;
        prices
            .first()
            .copied()
            .ok_or_else(|| anyhow!("no price returned for {}", token))
    }

    async fn wait_for_gas(&self) {
        let source = ReferenceGas {
            gateway: self.gateways.chain.as_ref(),
            chain: self.registry.chain(self.config.gas_reference),
        };
        let polls = self.config.gas_gate.wait_for_gas(&source).await;
        if polls > 1 {
            info!("Gas price back under {} gwei", self.config.gas_gate.threshold_gwei());
        }
    }

    async fn journal_step(&self, record: &WalletRecord, mode: Mode, outcome: &StepOutcome, duration_ms: u64) {
        let Some(journal) = &self.journal else {
            return;
        };
        let entry = JournalEntry {
            wallet_address: record.address.clone(),
            mode: mode.to_string(),
            action: outcome.label().to_string(),
            success: !matches!(outcome, StepOutcome::NoProgress(_)),
            message: outcome.message().to_string(),
            duration_ms,
        };
        if let Err(e) = journal.record(&entry).await {
            warn!("Failed to journal step: {:#}", e);
        }
    }
}

/// Strictly greater: an unchanged balance means nothing arrived.
pub fn has_arrived(balance: f64, snapshot: f64) -> bool {
    balance > snapshot
}

fn is_persistence_failure(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<StoreError>(), Some(StoreError::Io { .. }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arrival_is_strict() {
        assert!(!has_arrived(0.5, 0.5));
        assert!(has_arrived(0.5 + 1e-12, 0.5));
        assert!(!has_arrived(0.4, 0.5));
    }

    #[test]
    fn test_outcome_display_keywords() {
        assert!(StepOutcome::Progressed("x".into()).to_string().starts_with("SUCCESS"));
        assert!(StepOutcome::Deferred("x".into()).to_string().starts_with("WAITING"));
        assert!(StepOutcome::NoProgress("x".into()).to_string().starts_with("FAILED"));
        assert!(StepOutcome::Finished("x".into()).to_string().starts_with("DONE"));
    }

    #[test]
    fn test_only_io_errors_stop_the_batch() {
        let io = anyhow::Error::new(StoreError::Io {
            path: "db.json".into(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        });
        assert!(is_persistence_failure(&io));

        let range = anyhow::Error::new(StoreError::IndexOutOfRange { index: 3, len: 1 });
        assert!(!is_persistence_failure(&range));
        assert!(!is_persistence_failure(&anyhow!("timeout")));
    }
}
