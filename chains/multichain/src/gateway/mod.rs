//! # Gateways
//!
//! Narrow async interfaces to everything outside the process: the chain
//! RPC, the bridge aggregator, the exchange and the price feed. The engine
//! only ever talks to these traits, so tests swap in scripted mocks.

pub mod evm;
pub mod http;
pub mod lifi;
pub mod okx;
pub mod price;
pub mod prompt;

use crate::registry::{Chain, Token};
use crate::wallet::WalletRecord;
use anyhow::Result;
use async_trait::async_trait;
use core_logic::GasPriceSource;
use std::sync::Arc;
use thiserror::Error;

pub use evm::EvmGateway;
pub use lifi::LifiBridge;
pub use okx::{OkxCredentials, OkxExchange};
pub use price::CoinloreOracle;
pub use prompt::DialoguerPrompt;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// Network, HTTP or RPC failure that may succeed on a later attempt.
    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),

    #[error("Withdrawal address {address} is not allowlisted on the exchange")]
    NotAllowlisted { address: String },

    #[error("Withdrawal {id} was cancelled by the exchange")]
    WithdrawalCancelled { id: String },

    #[error("Withdrawal {id} not final after {attempts} status checks")]
    WithdrawalTimedOut { id: String, attempts: u32 },

    #[error("No deposit on {chain} after {attempts} balance checks")]
    DepositTimedOut { chain: String, attempts: u32 },

    #[error("Send amount rounds to zero")]
    ZeroAmount,

    #[error("Transaction {tx_hash} reverted")]
    TxFailed { tx_hash: String },

    /// Broadcast happened but no receipt arrived in time. Never retried:
    /// the funds may already be on their way.
    #[error("Transaction {tx_hash} not confirmed in time")]
    Unconfirmed { tx_hash: String },
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::TxFailed { .. })
    }

    /// Maps a lower-level error onto the transient/rejected split using the
    /// shared transient pattern list.
    pub fn classify(context: &str, err: anyhow::Error) -> Self {
        let text = format!("{}: {:#}", context, err);
        let lower = text.to_lowercase();
        if lower.contains("insufficient funds") {
            Self::InsufficientBalance(text)
        } else if core_logic::is_transient_error(&err) {
            Self::Transient(text)
        } else {
            Self::Rejected(text)
        }
    }
}

/// Result of a successful bridge send.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeReceipt {
    /// Amount of `token_in` that left the wallet, in token units.
    pub amount_sent: f64,
    pub tx_hash: String,
}

pub struct BridgeRequest<'a> {
    pub wallet: &'a WalletRecord,
    pub from: &'a Chain,
    pub to: &'a Chain,
    pub token_in: &'a Token,
    pub token_out: &'a Token,
    /// `None` bridges the full balance net of gas and protocol fee.
    pub amount: Option<f64>,
}

#[async_trait]
pub trait BridgeGateway: Send + Sync {
    async fn bridge(&self, request: &BridgeRequest<'_>) -> Result<BridgeReceipt, GatewayError>;
}

#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Balance of `token` in token units.
    async fn balance(
        &self,
        wallet: &WalletRecord,
        chain: &Chain,
        token: &Token,
    ) -> Result<f64, GatewayError>;

    async fn gas_price_wei(&self, chain: &Chain) -> Result<u128, GatewayError>;

    /// Sends `amount` of the native coin and waits for a successful receipt.
    async fn transfer_native(
        &self,
        wallet: &WalletRecord,
        chain: &Chain,
        to: &str,
        amount: f64,
    ) -> Result<String, GatewayError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct WithdrawalRequest {
    pub symbol: String,
    pub amount: f64,
    pub address: String,
    /// Exchange network name, e.g. `Arbitrum One`.
    pub network: String,
    pub fee: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WithdrawalStatus {
    Pending(String),
    Completed,
    Cancelled,
}

#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Moves every sub-account balance of `symbol` into the main account.
    async fn transfer_from_sub_accounts(&self, symbol: &str) -> Result<(), GatewayError>;

    /// Requests an on-chain withdrawal and returns the exchange's id for it.
    async fn withdraw(&self, request: &WithdrawalRequest) -> Result<String, GatewayError>;

    async fn withdrawal_status(&self, id: &str) -> Result<WithdrawalStatus, GatewayError>;
}

#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// USD prices, one per token, in the same order.
    async fn prices(&self, tokens: &[&Token]) -> Result<Vec<f64>, GatewayError>;
}

/// Operator input for manual transfers mode.
pub trait OperatorPrompt: Send + Sync {
    fn ask_amount(&self, prompt: &str) -> Result<f64>;
}

/// Everything the engine talks to, bundled for cheap cloning.
#[derive(Clone)]
pub struct Gateways {
    pub chain: Arc<dyn ChainGateway>,
    pub bridge: Arc<dyn BridgeGateway>,
    pub exchange: Option<Arc<dyn ExchangeGateway>>,
    pub prices: Arc<dyn PriceOracle>,
    pub prompt: Arc<dyn OperatorPrompt>,
}

/// Gas price of one chain, as seen by the gas gate.
pub struct ReferenceGas<'a> {
    pub gateway: &'a dyn ChainGateway,
    pub chain: &'a Chain,
}

#[async_trait]
impl GasPriceSource for ReferenceGas<'_> {
    async fn gas_price_wei(&self) -> Result<u128> {
        Ok(self.gateway.gas_price_wei(self.chain).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classes() {
        assert!(GatewayError::Transient("timeout".into()).is_retryable());
        assert!(GatewayError::TxFailed { tx_hash: "0x1".into() }.is_retryable());
        assert!(!GatewayError::ZeroAmount.is_retryable());
        assert!(!GatewayError::InsufficientBalance("x".into()).is_retryable());
        assert!(!GatewayError::Unconfirmed { tx_hash: "0x1".into() }.is_retryable());
        assert!(!GatewayError::WithdrawalCancelled { id: "1".into() }.is_retryable());
    }

    #[test]
    fn test_classify() {
        let err = GatewayError::classify("rpc", anyhow::anyhow!("connection reset by peer"));
        assert!(matches!(err, GatewayError::Transient(_)));

        let err = GatewayError::classify("send", anyhow::anyhow!("insufficient funds for gas"));
        assert!(matches!(err, GatewayError::InsufficientBalance(_)));

        let err = GatewayError::classify("send", anyhow::anyhow!("execution reverted: bad"));
        assert!(matches!(err, GatewayError::Rejected(_)));
    }
}
