//! OKX v5 REST client for the funding account: sub-account sweeps,
//! withdrawals and withdrawal status.

use super::{http, ExchangeGateway, GatewayError, WithdrawalRequest, WithdrawalStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use std::fmt;
use tracing::{debug, error, info};
use zeroize::{Zeroize, ZeroizeOnDrop};

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_BASE_URL: &str = "https://www.okx.com";

// Funding account id in OKX transfer requests.
const FUNDING_ACCOUNT: &str = "6";
// Transfer type "sub-account to master account".
const SUB_TO_MASTER: &str = "2";
// Withdrawal destination "on-chain".
const ON_CHAIN_DEST: &str = "4";

const NOT_ALLOWLISTED: &str = "Withdrawal address is not allowlisted for verification exemption";
const INSUFFICIENT_BALANCE: &str = "Insufficient balance";
const DUST_AMOUNT: &str = "Parameter amt";
const STATE_CANCELLED: &str = "Cancelation complete";
const STATE_COMPLETED: &str = "Withdrawal complete";
// Codes OKX uses for rate limiting and "system busy".
const TRANSIENT_CODES: [&str; 3] = ["50011", "50013", "50026"];

#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct OkxCredentials {
    pub api_key: String,
    pub secret: String,
    pub passphrase: String,
}

impl OkxCredentials {
    /// Reads `OKX_API_KEY`, `OKX_API_SECRET` and `OKX_API_PASSPHRASE`.
    pub fn from_env() -> Result<Self> {
        let read = |name: &str| std::env::var(name).with_context(|| format!("{} is not set", name));
        Ok(Self {
            api_key: read("OKX_API_KEY")?,
            secret: read("OKX_API_SECRET")?,
            passphrase: read("OKX_API_PASSPHRASE")?,
        })
    }
}

impl fmt::Debug for OkxCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OkxCredentials")
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubAccount {
    sub_acct: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubAccountBalance {
    avail_bal: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WithdrawalAck {
    wd_id: String,
}

#[derive(Debug, Deserialize)]
struct WithdrawalState {
    state: String,
}

pub struct OkxExchange {
    http: Client,
    credentials: OkxCredentials,
    base_url: String,
}

impl OkxExchange {
    pub fn new(credentials: OkxCredentials) -> Result<Self, GatewayError> {
        Self::with_base_url(credentials, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(credentials: OkxCredentials, base_url: &str) -> Result<Self, GatewayError> {
        Ok(Self {
            http: http::client_for(None)?,
            credentials,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Vec<T>, GatewayError> {
        let body = body.map(|b| b.to_string()).unwrap_or_default();
        let timestamp = chrono::Utc::now()
            .format("%Y-%m-%dT%H:%M:%S%.3fZ")
            .to_string();
        let signature = sign(&self.credentials.secret, &timestamp, method.as_str(), path, &body)?;

        let mut builder = self
            .http
            .request(method.clone(), format!("{}{}", self.base_url, path))
            .header("OK-ACCESS-KEY", &self.credentials.api_key)
            .header("OK-ACCESS-SIGN", signature)
            .header("OK-ACCESS-TIMESTAMP", timestamp)
            .header("OK-ACCESS-PASSPHRASE", &self.credentials.passphrase)
            .header("Content-Type", "application/json");
        if method == Method::POST {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| http::map_reqwest(path, e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| http::map_reqwest(path, e))?;

        // Error bodies carry the same envelope, so parse before checking status.
        let envelope: Envelope<T> = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(_) if status.is_server_error() || status.as_u16() == 429 => {
                return Err(GatewayError::Transient(format!("{} returned {}", path, status)));
            }
            Err(e) => {
                return Err(GatewayError::Rejected(format!(
                    "{} returned unexpected body ({}): {}",
                    path, status, e
                )));
            }
        };

        if envelope.code != "0" {
            return Err(classify_api_error(&envelope.code, &envelope.msg));
        }
        Ok(envelope.data)
    }

    async fn sweep_sub_account(&self, name: &str, symbol: &str) -> Result<(), GatewayError> {
        let balances: Vec<SubAccountBalance> = self
            .request(
                Method::GET,
                &format!("/api/v5/asset/subaccount/balances?subAcct={}&ccy={}", name, symbol),
                None,
            )
            .await?;
        let Some(amount) = balances.into_iter().next().map(|b| b.avail_bal) else {
            return Ok(());
        };
        if amount.parse::<f64>().unwrap_or(0.0) <= 0.0 {
            return Ok(());
        }

        let body = json!({
            "ccy": symbol,
            "amt": amount,
            "from": FUNDING_ACCOUNT,
            "to": FUNDING_ACCOUNT,
            "type": SUB_TO_MASTER,
            "subAcct": name,
        });
        match self.request::<Value>(Method::POST, "/api/v5/asset/transfer", Some(body)).await {
            Ok(_) => {
                info!("[OKX] Moved {} {} from sub-account {} to main account", amount, symbol, name);
                Ok(())
            }
            Err(e) if e.to_string().contains(DUST_AMOUNT) => {
                debug!("[OKX] Balance of sub-account {} is too small to move", name);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ExchangeGateway for OkxExchange {
    async fn transfer_from_sub_accounts(&self, symbol: &str) -> Result<(), GatewayError> {
        let accounts: Vec<SubAccount> = self
            .request(Method::GET, "/api/v5/users/subaccount/list", None)
            .await?;

        for account in accounts {
            if let Err(e) = self.sweep_sub_account(&account.sub_acct, symbol).await {
                error!(
                    "[OKX] Couldn't move {} from sub-account {}: {}",
                    symbol, account.sub_acct, e
                );
            }
        }
        Ok(())
    }

    async fn withdraw(&self, request: &WithdrawalRequest) -> Result<String, GatewayError> {
        info!(
            "[OKX] Withdrawing {} {} to {} on {}",
            request.amount, request.symbol, request.address, request.network
        );
        let body = json!({
            "ccy": request.symbol,
            "amt": request.amount.to_string(),
            "dest": ON_CHAIN_DEST,
            "toAddr": request.address,
            "fee": request.fee.to_string(),
            "chain": format!("{}-{}", request.symbol, request.network),
        });

        let acks: Vec<WithdrawalAck> = self
            .request(Method::POST, "/api/v5/asset/withdrawal", Some(body))
            .await
            .map_err(|e| match e {
                GatewayError::NotAllowlisted { .. } => GatewayError::NotAllowlisted {
                    address: request.address.clone(),
                },
                other => other,
            })?;

        acks.into_iter()
            .next()
            .map(|ack| ack.wd_id)
            .ok_or_else(|| GatewayError::Rejected("withdrawal response without wdId".into()))
    }

    async fn withdrawal_status(&self, id: &str) -> Result<WithdrawalStatus, GatewayError> {
        let states: Vec<WithdrawalState> = self
            .request(
                Method::GET,
                &format!("/api/v5/asset/deposit-withdraw-status?wdId={}", id),
                None,
            )
            .await?;
        let state = states
            .into_iter()
            .next()
            .map(|s| s.state)
            .unwrap_or_default();
        Ok(parse_state(&state))
    }
}

/// Base64 HMAC-SHA256 over `timestamp + method + path + body`.
fn sign(secret: &str, timestamp: &str, method: &str, path: &str, body: &str) -> Result<String, GatewayError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| GatewayError::Rejected(format!("bad api secret: {}", e)))?;
    mac.update(timestamp.as_bytes());
    mac.update(method.as_bytes());
    mac.update(path.as_bytes());
    mac.update(body.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

fn classify_api_error(code: &str, msg: &str) -> GatewayError {
    let text = format!("OKX error {}: {}", code, msg);
    if msg.contains(NOT_ALLOWLISTED) {
        GatewayError::NotAllowlisted {
            address: String::new(),
        }
    } else if msg.contains(INSUFFICIENT_BALANCE) {
        GatewayError::InsufficientBalance(text)
    } else if TRANSIENT_CODES.contains(&code) {
        GatewayError::Transient(text)
    } else {
        GatewayError::Rejected(text)
    }
}

fn parse_state(state: &str) -> WithdrawalStatus {
    if state.contains(STATE_CANCELLED) {
        WithdrawalStatus::Cancelled
    } else if state.contains(STATE_COMPLETED) {
        WithdrawalStatus::Completed
    } else {
        WithdrawalStatus::Pending(state.to_string())
    }
}
