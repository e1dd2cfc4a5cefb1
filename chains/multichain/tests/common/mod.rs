#![allow(dead_code)]

use async_trait::async_trait;
use core_logic::{
    gwei_to_wei, AmountRange, CountRange, DelayRange, GasGate, InputLists, RetryConfig,
};
use multichain_warmup::database::{CreateOptions, WalletDatabase};
use multichain_warmup::engine::{EngineConfig, ExchangeConfig, ProgressionEngine};
use multichain_warmup::gateway::{
    BridgeGateway, BridgeReceipt, BridgeRequest, ChainGateway, ExchangeGateway, GatewayError,
    Gateways, OperatorPrompt, PriceOracle, WithdrawalRequest, WithdrawalStatus,
};
use multichain_warmup::registry::{Chain, ChainName, ChainRegistry, Token};
use multichain_warmup::wallet::WalletRecord;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Pops scripted values in order and keeps returning the last one.
fn next_scripted<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransferCall {
    pub chain: ChainName,
    pub to: String,
    pub amount: f64,
}

/// Scripted balances (per chain and token symbol), gas prices and native
/// transfer results.
#[derive(Default)]
pub struct MockChain {
    balances: Mutex<HashMap<(ChainName, String), VecDeque<Result<f64, GatewayError>>>>,
    gas: Mutex<VecDeque<u128>>,
    transfer_results: Mutex<VecDeque<Result<String, GatewayError>>>,
    pub transfers: Mutex<Vec<TransferCall>>,
    pub balance_calls: AtomicUsize,
    pub gas_polls: AtomicUsize,
}

impl MockChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_balances(&self, chain: ChainName, symbol: &str, values: &[f64]) {
        self.balances.lock().unwrap().insert(
            (chain, symbol.to_string()),
            values.iter().map(|v| Ok(*v)).collect(),
        );
    }

    pub fn fail_balance(&self, chain: ChainName, symbol: &str, error: GatewayError) {
        self.balances
            .lock()
            .unwrap()
            .insert((chain, symbol.to_string()), VecDeque::from([Err(error)]));
    }

    pub fn set_gas_gwei(&self, prices: &[f64]) {
        *self.gas.lock().unwrap() = prices.iter().map(|p| gwei_to_wei(*p)).collect();
    }

    pub fn push_transfer_result(&self, result: Result<String, GatewayError>) {
        self.transfer_results.lock().unwrap().push_back(result);
    }

    pub fn transfer_calls(&self) -> Vec<TransferCall> {
        self.transfers.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainGateway for MockChain {
    async fn balance(
        &self,
        _wallet: &WalletRecord,
        chain: &Chain,
        token: &Token,
    ) -> Result<f64, GatewayError> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        let mut balances = self.balances.lock().unwrap();
        match balances.get_mut(&(chain.name, token.symbol.to_string())) {
            Some(queue) => next_scripted(queue).unwrap_or(Ok(0.0)),
            None => Ok(0.0),
        }
    }

    async fn gas_price_wei(&self, _chain: &Chain) -> Result<u128, GatewayError> {
        self.gas_polls.fetch_add(1, Ordering::SeqCst);
        let mut gas = self.gas.lock().unwrap();
        Ok(next_scripted(&mut gas).unwrap_or_else(|| gwei_to_wei(1.0)))
    }

    async fn transfer_native(
        &self,
        _wallet: &WalletRecord,
        chain: &Chain,
        to: &str,
        amount: f64,
    ) -> Result<String, GatewayError> {
        self.transfers.lock().unwrap().push(TransferCall {
            chain: chain.name,
            to: to.to_string(),
            amount,
        });
        self.transfer_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("0xfeed".to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BridgeCall {
    pub from: ChainName,
    pub to: ChainName,
    pub token_in: String,
    pub token_out: String,
    pub amount: Option<f64>,
}

/// Records every bridge request. Unscripted calls succeed and report the
/// requested amount (or `full_amount` for full-balance sends).
pub struct MockBridge {
    results: Mutex<VecDeque<Result<BridgeReceipt, GatewayError>>>,
    pub calls: Mutex<Vec<BridgeCall>>,
    pub full_amount: f64,
}

impl MockBridge {
    pub fn new() -> Arc<Self> {
        Self::with_full_amount(0.5)
    }

    pub fn with_full_amount(full_amount: f64) -> Arc<Self> {
        Arc::new(Self {
            results: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            full_amount,
        })
    }

    pub fn push_result(&self, result: Result<BridgeReceipt, GatewayError>) {
        self.results.lock().unwrap().push_back(result);
    }

    pub fn fail_times(&self, times: usize, error: GatewayError) {
        for _ in 0..times {
            self.push_result(Err(error.clone()));
        }
    }

    pub fn bridge_calls(&self) -> Vec<BridgeCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl BridgeGateway for MockBridge {
    async fn bridge(&self, request: &BridgeRequest<'_>) -> Result<BridgeReceipt, GatewayError> {
        self.calls.lock().unwrap().push(BridgeCall {
            from: request.from.name,
            to: request.to.name,
            token_in: request.token_in.symbol.to_string(),
            token_out: request.token_out.symbol.to_string(),
            amount: request.amount,
        });
        if let Some(result) = self.results.lock().unwrap().pop_front() {
            return result;
        }
        Ok(BridgeReceipt {
            amount_sent: request.amount.unwrap_or(self.full_amount),
            tx_hash: "0xb41d6e".to_string(),
        })
    }
}

pub struct MockExchange {
    statuses: Mutex<VecDeque<WithdrawalStatus>>,
    withdraw_results: Mutex<VecDeque<Result<String, GatewayError>>>,
    pub withdrawals: Mutex<Vec<WithdrawalRequest>>,
    pub sweeps: AtomicUsize,
    pub status_polls: AtomicUsize,
}

impl MockExchange {
    pub fn completing() -> Arc<Self> {
        Self::with_statuses(vec![WithdrawalStatus::Completed])
    }

    pub fn with_statuses(statuses: Vec<WithdrawalStatus>) -> Arc<Self> {
        Arc::new(Self {
            statuses: Mutex::new(statuses.into()),
            withdraw_results: Mutex::new(VecDeque::new()),
            withdrawals: Mutex::new(Vec::new()),
            sweeps: AtomicUsize::new(0),
            status_polls: AtomicUsize::new(0),
        })
    }

    pub fn push_withdraw_result(&self, result: Result<String, GatewayError>) {
        self.withdraw_results.lock().unwrap().push_back(result);
    }

    pub fn withdraw_count(&self) -> usize {
        self.withdrawals.lock().unwrap().len()
    }
}

#[async_trait]
impl ExchangeGateway for MockExchange {
    async fn transfer_from_sub_accounts(&self, _symbol: &str) -> Result<(), GatewayError> {
        self.sweeps.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn withdraw(&self, request: &WithdrawalRequest) -> Result<String, GatewayError> {
        self.withdrawals.lock().unwrap().push(request.clone());
        self.withdraw_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("wd-1".to_string()))
    }

    async fn withdrawal_status(&self, _id: &str) -> Result<WithdrawalStatus, GatewayError> {
        self.status_polls.fetch_add(1, Ordering::SeqCst);
        let mut statuses = self.statuses.lock().unwrap();
        Ok(next_scripted(&mut statuses).unwrap_or(WithdrawalStatus::Completed))
    }
}

/// Same USD price for every token unless overridden per symbol.
pub struct MockPrices {
    default: f64,
    by_symbol: HashMap<String, f64>,
    pub calls: AtomicUsize,
}

impl MockPrices {
    pub fn flat(price: f64) -> Arc<Self> {
        Self::with_prices(price, &[])
    }

    pub fn with_prices(default: f64, by_symbol: &[(&str, f64)]) -> Arc<Self> {
        Arc::new(Self {
            default,
            by_symbol: by_symbol
                .iter()
                .map(|(s, p)| (s.to_string(), *p))
                .collect(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl PriceOracle for MockPrices {
    async fn prices(&self, tokens: &[&Token]) -> Result<Vec<f64>, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(tokens
            .iter()
            .map(|t| self.by_symbol.get(t.symbol).copied().unwrap_or(self.default))
            .collect())
    }
}

pub struct FixedPrompt(pub f64);

impl OperatorPrompt for FixedPrompt {
    fn ask_amount(&self, _prompt: &str) -> anyhow::Result<f64> {
        Ok(self.0)
    }
}

pub struct Mocks {
    pub chain: Arc<MockChain>,
    pub bridge: Arc<MockBridge>,
    pub exchange: Option<Arc<MockExchange>>,
    pub prices: Arc<MockPrices>,
}

impl Mocks {
    pub fn new() -> Self {
        Self {
            chain: MockChain::new(),
            bridge: MockBridge::new(),
            exchange: None,
            prices: MockPrices::flat(2000.0),
        }
    }

    pub fn gateways(&self) -> Gateways {
        Gateways {
            chain: self.chain.clone(),
            bridge: self.bridge.clone(),
            exchange: self
                .exchange
                .clone()
                .map(|e| e as Arc<dyn ExchangeGateway>),
            prices: self.prices.clone(),
            prompt: Arc::new(FixedPrompt(0.0)),
        }
    }

    pub fn engine(&self, config: EngineConfig) -> ProgressionEngine {
        ProgressionEngine::new(Arc::new(ChainRegistry::builtin()), self.gateways(), config)
            .with_seed(42)
    }
}

/// No sleeping anywhere, three attempts per retried call.
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        retry: RetryConfig::new(3, DelayRange::zero()),
        gas_gate: GasGate::new(15.0, DelayRange::zero()),
        gas_reference: ChainName::Ethereum,
        tx_delay: DelayRange::zero(),
        wallet_delay: DelayRange::zero(),
        deposit_poll_delay: DelayRange::zero(),
        manual_transfers: false,
        change_ip_url: None,
        exchange: ExchangeConfig {
            enabled: false,
            withdraw_amount: AmountRange { min: 0.01, max: 0.01 },
            withdraw_retry: RetryConfig::new(2, DelayRange::zero()),
            status_poll_attempts: 3,
            status_poll_delay: DelayRange::zero(),
            deposit_poll_attempts: 3,
        },
    }
}

pub fn test_key(i: usize) -> String {
    format!("0x{:064x}", i + 1)
}

pub fn inputs(keys: usize, deposits: usize) -> InputLists {
    InputLists {
        private_keys: (0..keys).map(test_key).collect(),
        proxies: Vec::new(),
        deposit_addresses: (0..deposits)
            .map(|i| format!("0x{:040x}", 0xde90_0000u64 + i as u64))
            .collect(),
    }
}

pub fn options(counts: &[(ChainName, u32)]) -> CreateOptions {
    CreateOptions {
        bridge_counts: counts
            .iter()
            .map(|(chain, n)| (*chain, CountRange { min: *n, max: *n }))
            .collect(),
        volume_goal: AmountRange { min: 100.0, max: 100.0 },
        volume_start_chain: Some(ChainName::Arbitrum),
        volume_chains: vec![ChainName::Arbitrum, ChainName::Optimism],
    }
}

pub fn create_db(path: &Path, keys: usize, counts: &[(ChainName, u32)]) -> WalletDatabase {
    WalletDatabase::create(
        path,
        &inputs(keys, keys),
        &options(counts),
        &mut StdRng::seed_from_u64(1),
    )
    .unwrap()
}
