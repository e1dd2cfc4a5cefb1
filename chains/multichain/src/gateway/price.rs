use super::{http, GatewayError, PriceOracle};
use crate::registry::Token;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

const TICKER_URL: &str = "https://api.coinlore.net/api/ticker/";

#[derive(Debug, Deserialize)]
struct Ticker {
    id: String,
    price_usd: String,
}

/// Spot USD prices from the coinlore public ticker.
pub struct CoinloreOracle {
    http: Client,
}

impl CoinloreOracle {
    pub fn new() -> Result<Self, GatewayError> {
        Ok(Self {
            http: http::client_for(None)?,
        })
    }
}

#[async_trait]
impl PriceOracle for CoinloreOracle {
    async fn prices(&self, tokens: &[&Token]) -> Result<Vec<f64>, GatewayError> {
        let ids: Vec<&str> = tokens
            .iter()
            .map(|t| {
                t.price_id
                    .ok_or_else(|| GatewayError::Rejected(format!("{} has no price id", t)))
            })
            .collect::<Result<_, _>>()?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let tickers: Vec<Ticker> = self
            .http
            .get(TICKER_URL)
            .query(&[("id", ids.join(","))])
            .send()
            .await
            .map_err(|e| http::map_reqwest("ticker", e))?
            .error_for_status()
            .map_err(|e| http::map_reqwest("ticker", e))?
            .json()
            .await
            .map_err(|e| GatewayError::Rejected(format!("ticker response: {}", e)))?;

        let by_id = index_prices(tickers)?;
        debug!("Fetched {} prices", by_id.len());
        ids.iter()
            .map(|id| {
                by_id
                    .get(*id)
                    .copied()
                    .ok_or_else(|| GatewayError::Rejected(format!("no price for id {}", id)))
            })
            .collect()
    }
}

fn index_prices(tickers: Vec<Ticker>) -> Result<HashMap<String, f64>, GatewayError> {
    tickers
        .into_iter()
        .map(|t| {
            let price = t
                .price_usd
                .parse::<f64>()
                .map_err(|e| GatewayError::Rejected(format!("price {}: {}", t.price_usd, e)))?;
            Ok((t.id, price))
        })
        .collect()
}
