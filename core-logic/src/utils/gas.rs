//! # Core Logic - Gas Gate
//!
//! Holds sends back while the reference chain's gas price is above a
//! configured ceiling. The gate only wraps sends; confirmation polling and
//! balance reads never go through it.

use crate::config::DelayRange;
use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

/// Anything that can report a current gas price in wei.
#[async_trait]
pub trait GasPriceSource: Send + Sync {
    async fn gas_price_wei(&self) -> Result<u128>;
}

#[derive(Debug, Clone, Copy)]
pub struct GasGate {
    threshold_gwei: f64,
    delay: DelayRange,
}

impl GasGate {
    pub fn new(threshold_gwei: f64, delay: DelayRange) -> Self {
        Self {
            threshold_gwei,
            delay,
        }
    }

    pub fn threshold_gwei(&self) -> f64 {
        self.threshold_gwei
    }

    pub fn threshold_wei(&self) -> u128 {
        gwei_to_wei(self.threshold_gwei)
    }

    /// Polls `source` until the price is at or below the threshold.
    ///
    /// Never gives up. A failed price read counts as "not yet" and is
    /// retried after the same delay. Returns the number of polls made.
    pub async fn wait_for_gas(&self, source: &dyn GasPriceSource) -> u32 {
        let threshold = self.threshold_wei();
        let mut polls = 0;

        loop {
            polls += 1;
            match source.gas_price_wei().await {
                Ok(price) if price <= threshold => return polls,
                Ok(price) => {
                    info!(
                        "Gas price {:.2} gwei is above {:.2} gwei, waiting",
                        wei_to_gwei(price),
                        self.threshold_gwei
                    );
                }
                Err(e) => warn!("Failed to read gas price: {}", e),
            }
            tokio::time::sleep(self.delay.sample()).await;
        }
    }
}

/// Convert gwei to wei
pub fn gwei_to_wei(gwei: f64) -> u128 {
    (gwei * 1e9) as u128
}

pub fn wei_to_gwei(wei: u128) -> f64 {
    wei as f64 / 1e9
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gwei_to_wei() {
        assert_eq!(gwei_to_wei(1.0), 1_000_000_000);
        assert_eq!(gwei_to_wei(0.5), 500_000_000);
        assert_eq!(gwei_to_wei(15.0), 15_000_000_000);
    }

    #[test]
    fn test_wei_to_gwei() {
        assert_eq!(wei_to_gwei(20_000_000_000), 20.0);
    }
}
