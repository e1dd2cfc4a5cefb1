//! LI.FI (Jumper) bridge client: route lookup, step transaction build,
//! approval and send.

use super::evm::{from_base_units, parse_address, to_base_units, EvmGateway};
use super::{http, BridgeGateway, BridgeReceipt, BridgeRequest, GatewayError};
use async_trait::async_trait;
use ethers::types::{Bytes, U256};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

const ROUTES_URL: &str = "https://li.quest/v1/advanced/routes";
const STEP_TRANSACTION_URL: &str = "https://li.quest/v1/advanced/stepTransaction";
const SDK_HEADER: (&str, &str) = ("X-Lifi-Sdk", "3.0.0-alpha.57");
const WIDGET_HEADER: (&str, &str) = ("X-Lifi-Widget", "3.0.0-alpha.35");

/// Value used to quote a transaction when sizing a full-balance bridge.
const SIMULATION_VALUE_WEI: u64 = 100_000_000_000_000;
/// Headroom on the estimated network fee of a full-balance bridge, in permille.
const FULL_BRIDGE_GAS_PERMILLE: u64 = 1300;
const MAX_SLIPPAGE_PERCENT: f64 = 5.0;

#[derive(Debug, Deserialize)]
struct RoutesResponse {
    routes: Vec<Route>,
}

#[derive(Debug, Deserialize)]
struct Route {
    steps: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StepResponse {
    transaction_request: TransactionRequest,
}

#[derive(Debug, Deserialize)]
struct TransactionRequest {
    to: String,
    data: String,
    value: String,
}

/// Decoded call ready to be signed.
#[derive(Debug, Clone)]
struct BridgeCall {
    to: ethers::types::Address,
    data: Bytes,
    value: U256,
}

impl TryFrom<TransactionRequest> for BridgeCall {
    type Error = GatewayError;

    fn try_from(tx: TransactionRequest) -> Result<Self, Self::Error> {
        let data = tx
            .data
            .parse::<Bytes>()
            .map_err(|e| GatewayError::Rejected(format!("bad calldata: {}", e)))?;
        let value = U256::from_str_radix(tx.value.trim_start_matches("0x"), 16)
            .map_err(|e| GatewayError::Rejected(format!("bad value {}: {}", tx.value, e)))?;
        Ok(Self {
            to: parse_address(&tx.to)?,
            data,
            value,
        })
    }
}

pub struct LifiBridge {
    evm: Arc<EvmGateway>,
}

impl LifiBridge {
    pub fn new(evm: Arc<EvmGateway>) -> Self {
        Self { evm }
    }

    async fn route_step(&self, request: &BridgeRequest<'_>, amount: U256) -> Result<Value, GatewayError> {
        let client = http::client_for(request.wallet.proxy.as_deref())?;
        let body = json!({
            "fromAddress": request.wallet.address,
            "fromAmount": amount.to_string(),
            "fromChainId": request.from.chain_id,
            "fromTokenAddress": request.token_in.contract_address,
            "toAddress": request.wallet.address,
            "toChainId": request.to.chain_id,
            "toTokenAddress": request.token_out.contract_address,
            "options": {
                "integrator": "jumper.exchange",
                "order": "CHEAPEST",
                "slippage": MAX_SLIPPAGE_PERCENT / 100.0,
                "maxPriceImpact": 1,
                "allowSwitchChain": false,
                "insurance": false
            }
        });

        let response: RoutesResponse = client
            .post(ROUTES_URL)
            .header(SDK_HEADER.0, SDK_HEADER.1)
            .header(WIDGET_HEADER.0, WIDGET_HEADER.1)
            .json(&body)
            .send()
            .await
            .map_err(|e| http::map_reqwest("routes", e))?
            .error_for_status()
            .map_err(|e| http::map_reqwest("routes", e))?
            .json()
            .await
            .map_err(|e| GatewayError::Rejected(format!("routes response: {}", e)))?;

        // Route availability changes from minute to minute, so an empty
        // answer is worth asking again.
        response
            .routes
            .into_iter()
            .next()
            .and_then(|route| route.steps.into_iter().next())
            .ok_or_else(|| GatewayError::Transient("found zero routes".into()))
    }

    async fn build_call(&self, request: &BridgeRequest<'_>, amount: U256) -> Result<BridgeCall, GatewayError> {
        let step = self.route_step(request, amount).await?;
        let client = http::client_for(request.wallet.proxy.as_deref())?;

        let response: StepResponse = client
            .post(STEP_TRANSACTION_URL)
            .header(SDK_HEADER.0, SDK_HEADER.1)
            .header(WIDGET_HEADER.0, WIDGET_HEADER.1)
            .json(&step)
            .send()
            .await
            .map_err(|e| http::map_reqwest("stepTransaction", e))?
            .error_for_status()
            .map_err(|e| http::map_reqwest("stepTransaction", e))?
            .json()
            .await
            .map_err(|e| GatewayError::Rejected(format!("stepTransaction response: {}", e)))?;

        response.transaction_request.try_into()
    }

    /// Balance minus the padded network fee and the protocol fee, both
    /// measured on a quote for a tiny simulated amount.
    async fn full_native_amount(&self, request: &BridgeRequest<'_>) -> Result<U256, GatewayError> {
        let simulated = U256::from(SIMULATION_VALUE_WEI);
        let call = self.build_call(request, simulated).await?;

        let network_fee = self
            .evm
            .estimate_fee(request.wallet, request.from, call.to, call.data, call.value)
            .await?
            * U256::from(FULL_BRIDGE_GAS_PERMILLE)
            / U256::from(1000u64);
        let protocol_fee = call.value.saturating_sub(simulated);
        let balance = self
            .evm
            .balance_wei(request.wallet, request.from, request.token_in)
            .await?;

        debug!(
            "Full bridge sizing on {}: balance {} network fee {} protocol fee {}",
            request.from, balance, network_fee, protocol_fee
        );
        Ok(balance
            .saturating_sub(network_fee)
            .saturating_sub(protocol_fee))
    }
}

#[async_trait]
impl BridgeGateway for LifiBridge {
    async fn bridge(&self, request: &BridgeRequest<'_>) -> Result<BridgeReceipt, GatewayError> {
        let token_in = request.token_in;
        let amount = match request.amount {
            Some(amount) => to_base_units(amount, token_in.decimals)?,
            None if token_in.is_native => self.full_native_amount(request).await?,
            None => {
                self.evm
                    .balance_wei(request.wallet, request.from, token_in)
                    .await?
            }
        };
        if amount.is_zero() {
            return Err(GatewayError::ZeroAmount);
        }

        let human = from_base_units(amount, token_in.decimals);
        info!(
            "Bridging {} {} from {} to {} on {}",
            token_in.round(human),
            token_in,
            request.from,
            request.token_out,
            request.to
        );

        let call = self.build_call(request, amount).await?;
        if !token_in.is_native {
            self.evm
                .ensure_allowance(request.wallet, request.from, token_in, call.to, amount)
                .await?;
        }

        let tx_hash = self
            .evm
            .send(request.wallet, request.from, call.to, Some(call.data), call.value)
            .await?;
        info!("Bridge sent: {}", request.from.tx_url(&tx_hash));

        Ok(BridgeReceipt {
            amount_sent: human,
            tx_hash,
        })
    }
}
