//! ethers-backed chain access: balances, gas price, signing and sending.

use super::{http, ChainGateway, GatewayError};
use crate::registry::{Chain, Token};
use crate::wallet::WalletRecord;
use async_trait::async_trait;
use ethers::prelude::*;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::utils::{format_units, parse_units};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

const ERC20_ABI: &str = r#"[
    {"type":"function","name":"balanceOf","stateMutability":"view","inputs":[{"name":"account","type":"address"}],"outputs":[{"name":"","type":"uint256"}]},
    {"type":"function","name":"allowance","stateMutability":"view","inputs":[{"name":"owner","type":"address"},{"name":"spender","type":"address"}],"outputs":[{"name":"","type":"uint256"}]},
    {"type":"function","name":"approve","stateMutability":"nonpayable","inputs":[{"name":"spender","type":"address"},{"name":"amount","type":"uint256"}],"outputs":[{"name":"","type":"bool"}]}
]"#;

// Send amounts are formatted with at most this many decimals before
// conversion, so float noise never adds wei.
const MAX_AMOUNT_DECIMALS: u8 = 9;

#[derive(Debug, Clone, Copy)]
pub struct TxSettings {
    pub gas_price_multiplier: f64,
    pub gas_limit_multiplier: f64,
    pub confirm_timeout: Duration,
}

impl Default for TxSettings {
    fn default() -> Self {
        Self {
            gas_price_multiplier: 1.1,
            gas_limit_multiplier: 1.2,
            confirm_timeout: Duration::from_secs(300),
        }
    }
}

type ProviderKey = (u64, Option<String>);

/// One HTTP provider per (chain, proxy) pair, created on first use.
pub struct EvmGateway {
    settings: TxSettings,
    providers: Mutex<HashMap<ProviderKey, Provider<Http>>>,
}

impl EvmGateway {
    pub fn new(settings: TxSettings) -> Self {
        Self {
            settings,
            providers: Mutex::new(HashMap::new()),
        }
    }

    pub fn provider(&self, chain: &Chain, proxy: Option<&str>) -> Result<Provider<Http>, GatewayError> {
        let key = (chain.chain_id, proxy.map(str::to_string));
        let mut cache = self
            .providers
            .lock()
            .map_err(|_| GatewayError::Rejected("provider cache poisoned".into()))?;
        if let Some(provider) = cache.get(&key) {
            return Ok(provider.clone());
        }

        let client = http::client_for(proxy)?;
        let url = reqwest::Url::parse(&chain.rpc)
            .map_err(|e| GatewayError::Rejected(format!("bad RPC url for {}: {}", chain, e)))?;
        let provider = Provider::new(Http::new_with_client(url, client));
        cache.insert(key, provider.clone());
        debug!("Created provider for {} (proxied: {})", chain, proxy.is_some());
        Ok(provider)
    }

    fn erc20(&self, provider: Provider<Http>, token: &Token) -> Result<Contract<Provider<Http>>, GatewayError> {
        let abi: abi::Abi = serde_json::from_str(ERC20_ABI)
            .map_err(|e| GatewayError::Rejected(format!("erc20 abi: {}", e)))?;
        let address = parse_address(token.contract_address)?;
        Ok(Contract::new(address, abi, Arc::new(provider)))
    }

    pub async fn balance_wei(
        &self,
        wallet: &WalletRecord,
        chain: &Chain,
        token: &Token,
    ) -> Result<U256, GatewayError> {
        let provider = self.provider(chain, wallet.proxy.as_deref())?;
        let owner = parse_address(&wallet.address)?;

        if token.is_native {
            return provider
                .get_balance(owner, None)
                .await
                .map_err(rpc_err("eth_getBalance"));
        }

        self.erc20(provider, token)?
            .method::<_, U256>("balanceOf", owner)
            .map_err(rpc_err("balanceOf"))?
            .call()
            .await
            .map_err(rpc_err("balanceOf"))
    }

    pub async fn gas_price(&self, wallet: &WalletRecord, chain: &Chain) -> Result<U256, GatewayError> {
        self.provider(chain, wallet.proxy.as_deref())?
            .get_gas_price()
            .await
            .map_err(rpc_err("eth_gasPrice"))
    }

    /// Raw network fee (`gas * gas_price`) of a call, without multipliers.
    pub async fn estimate_fee(
        &self,
        wallet: &WalletRecord,
        chain: &Chain,
        to: Address,
        data: Bytes,
        value: U256,
    ) -> Result<U256, GatewayError> {
        let provider = self.provider(chain, wallet.proxy.as_deref())?;
        let tx: TypedTransaction = TransactionRequest::new()
            .from(parse_address(&wallet.address)?)
            .to(to)
            .data(data)
            .value(value)
            .into();
        let gas = provider
            .estimate_gas(&tx, None)
            .await
            .map_err(rpc_err("eth_estimateGas"))?;
        let gas_price = provider
            .get_gas_price()
            .await
            .map_err(rpc_err("eth_gasPrice"))?;
        Ok(gas * gas_price)
    }

    /// Approves `spender` for `amount` unless the allowance already covers it.
    pub async fn ensure_allowance(
        &self,
        wallet: &WalletRecord,
        chain: &Chain,
        token: &Token,
        spender: Address,
        amount: U256,
    ) -> Result<(), GatewayError> {
        let provider = self.provider(chain, wallet.proxy.as_deref())?;
        let owner = parse_address(&wallet.address)?;
        let contract = self.erc20(provider, token)?;

        let allowance: U256 = contract
            .method::<_, U256>("allowance", (owner, spender))
            .map_err(rpc_err("allowance"))?
            .call()
            .await
            .map_err(rpc_err("allowance"))?;
        if allowance >= amount {
            debug!("Allowance of {} on {} already sufficient", token, chain);
            return Ok(());
        }

        let data = contract
            .encode("approve", (spender, amount))
            .map_err(rpc_err("approve"))?;
        let tx_hash = self
            .send(wallet, chain, parse_address(token.contract_address)?, Some(data), U256::zero())
            .await?;
        info!("Approved {} on {}: {}", token, chain, chain.tx_url(&tx_hash));
        Ok(())
    }

    /// Signs, broadcasts and waits for the receipt of a legacy transaction.
    pub async fn send(
        &self,
        wallet: &WalletRecord,
        chain: &Chain,
        to: Address,
        data: Option<Bytes>,
        value: U256,
    ) -> Result<String, GatewayError> {
        let provider = self.provider(chain, wallet.proxy.as_deref())?;
        let signer = signer_for(wallet, chain)?;

        let gas_price = provider
            .get_gas_price()
            .await
            .map_err(rpc_err("eth_gasPrice"))?;

        let mut request = TransactionRequest::new()
            .from(signer.address())
            .to(to)
            .value(value)
            .gas_price(scale(gas_price, self.settings.gas_price_multiplier))
            .chain_id(chain.chain_id);
        if let Some(data) = data {
            request = request.data(data);
        }
        let mut tx: TypedTransaction = request.into();

        let gas = provider
            .estimate_gas(&tx, None)
            .await
            .map_err(rpc_err("eth_estimateGas"))?;
        tx.set_gas(scale(gas, self.settings.gas_limit_multiplier));

        let client = SignerMiddleware::new(provider, signer);
        let pending = client
            .send_transaction(tx, None)
            .await
            .map_err(rpc_err("eth_sendRawTransaction"))?;
        let tx_hash = format!("{:?}", pending.tx_hash());
        debug!("Broadcast {} on {}", tx_hash, chain);

        match tokio::time::timeout(self.settings.confirm_timeout, pending).await {
            Ok(Ok(Some(receipt))) if receipt.status == Some(U64::from(1)) => Ok(tx_hash),
            Ok(Ok(Some(_))) => Err(GatewayError::TxFailed { tx_hash }),
            _ => Err(GatewayError::Unconfirmed { tx_hash }),
        }
    }
}

#[async_trait]
impl ChainGateway for EvmGateway {
    async fn balance(
        &self,
        wallet: &WalletRecord,
        chain: &Chain,
        token: &Token,
    ) -> Result<f64, GatewayError> {
        let wei = self.balance_wei(wallet, chain, token).await?;
        Ok(from_base_units(wei, token.decimals))
    }

    async fn gas_price_wei(&self, chain: &Chain) -> Result<u128, GatewayError> {
        let price = self
            .provider(chain, None)?
            .get_gas_price()
            .await
            .map_err(rpc_err("eth_gasPrice"))?;
        Ok(price.low_u128())
    }

    async fn transfer_native(
        &self,
        wallet: &WalletRecord,
        chain: &Chain,
        to: &str,
        amount: f64,
    ) -> Result<String, GatewayError> {
        let token = chain.native_token();
        let value = to_base_units(amount, token.decimals)?;
        let balance = self.balance_wei(wallet, chain, token).await?;
        if balance < value {
            return Err(GatewayError::InsufficientBalance(format!(
                "{} {} on {} is less than {}",
                from_base_units(balance, token.decimals),
                token,
                chain,
                amount
            )));
        }

        let tx_hash = self.send(wallet, chain, parse_address(to)?, None, value).await?;
        info!(
            "Transferred {} {} to {}: {}",
            amount,
            token,
            to,
            chain.tx_url(&tx_hash)
        );
        Ok(tx_hash)
    }
}

fn rpc_err<E>(context: &'static str) -> impl FnOnce(E) -> GatewayError
where
    E: std::error::Error + Send + Sync + 'static,
{
    move |e| GatewayError::classify(context, e.into())
}

fn signer_for(wallet: &WalletRecord, chain: &Chain) -> Result<LocalWallet, GatewayError> {
    let key = wallet.private_key.expose();
    let key = key.strip_prefix("0x").unwrap_or(key);
    let signer: LocalWallet = key
        .parse()
        .map_err(|e| GatewayError::Rejected(format!("invalid private key: {}", e)))?;
    Ok(signer.with_chain_id(chain.chain_id))
}

pub fn parse_address(value: &str) -> Result<Address, GatewayError> {
    value
        .parse()
        .map_err(|e| GatewayError::Rejected(format!("invalid address {}: {}", value, e)))
}

/// Multiplies by a float factor with three decimals of precision.
fn scale(value: U256, factor: f64) -> U256 {
    let permille = (factor * 1000.0).round() as u64;
    value * U256::from(permille) / U256::from(1000u64)
}

pub fn to_base_units(amount: f64, decimals: u8) -> Result<U256, GatewayError> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(GatewayError::Rejected(format!("invalid amount {}", amount)));
    }
    let text = format!("{:.*}", decimals.min(MAX_AMOUNT_DECIMALS) as usize, amount);
    let parsed = parse_units(text, u32::from(decimals))
        .map_err(|e| GatewayError::Rejected(format!("amount {}: {}", amount, e)))?;
    Ok(parsed.into())
}

pub fn from_base_units(value: U256, decimals: u8) -> f64 {
    format_units(value, u32::from(decimals))
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.0)
}
