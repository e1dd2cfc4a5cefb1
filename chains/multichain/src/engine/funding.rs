//! Money in and out of the exchange: the withdrawal sub-step that funds a
//! lane and the final transfer to the wallet's deposit address.

use super::{has_arrived, ProgressionEngine, StepOutcome};
use crate::database::WalletDatabase;
use crate::gateway::{ExchangeGateway, GatewayError, WithdrawalRequest, WithdrawalStatus};
use crate::registry::{round_to, Chain, ChainName, Token};
use crate::wallet::{Flag, Lane, PendingTransfer, PendingWithdrawal, WalletRecord};
use anyhow::{anyhow, Context, Result};
use core_logic::{with_retry_if, AmountRange, MetricsCollector};
use std::sync::Arc;
use tracing::{debug, info, warn};

impl ProgressionEngine {
    /// Funds `lane` from the exchange on `chain` and waits for the deposit.
    /// Returns the chain that received the funds and the amount withdrawn
    /// (zero means skipped).
    ///
    /// The withdrawal is recorded as pending as soon as the exchange accepts
    /// it. A later turn that finds the marker resumes polling that
    /// withdrawal on its chain instead of requesting another one.
    pub(super) async fn withdraw_from_exchange(
        &mut self,
        db: &mut WalletDatabase,
        index: usize,
        lane: Lane,
        chain: &Chain,
    ) -> Result<(ChainName, f64)> {
        let registry = Arc::clone(&self.registry);
        let record = db.get(index)?.clone();
        let exchange = self
            .gateways
            .exchange
            .clone()
            .ok_or_else(|| anyhow!("exchange withdrawals are enabled but no exchange is configured"))?;

        let pending = match record.pending_withdrawal(lane) {
            Some(pending) => {
                info!(
                    "Resuming withdrawal {} of {} to {}",
                    pending.id,
                    pending.amount,
                    record.short_address()
                );
                pending.clone()
            }
            None => match self.request_withdrawal(&record, exchange.as_ref(), chain).await? {
                Some(pending) => {
                    db.update(index, |w| w.set_pending_withdrawal(lane, Some(pending.clone())))?;
                    pending
                }
                None => return Ok((chain.name, 0.0)),
            },
        };

        let chain = registry.chain(pending.chain);
        let token = chain.native_token();
        if let Err(e) = self.wait_for_withdrawal(exchange.as_ref(), &pending.id).await {
            if matches!(e, GatewayError::WithdrawalCancelled { .. }) {
                db.update(index, |w| w.set_pending_withdrawal(lane, None))?;
            }
            return Err(e.into());
        }
        self.wait_for_deposit(&record, chain, token, pending.balance_before)
            .await?;
        info!(
            "Withdrew {} {} to {} on {}",
            pending.amount,
            token,
            record.short_address(),
            chain
        );
        Ok((pending.chain, pending.amount))
    }

    /// Sweeps sub-accounts and asks the exchange for a withdrawal. `None`
    /// means the amount was zero and nothing was requested.
    async fn request_withdrawal(
        &mut self,
        record: &WalletRecord,
        exchange: &dyn ExchangeGateway,
        chain: &Chain,
    ) -> Result<Option<PendingWithdrawal>> {
        let token = chain.native_token();
        let symbol = token.symbol.to_uppercase();

        exchange
            .transfer_from_sub_accounts(&symbol)
            .await
            .context("sub-account sweep")?;

        let amount = if self.config.manual_transfers {
            self.gateways.prompt.ask_amount(&format!(
                "Amount of {} to withdraw from the exchange to {} on {}",
                token,
                record.short_address(),
                chain
            ))?
        } else {
            round_to(self.config.exchange.withdraw_amount.sample(&mut self.rng), 6)
        };
        if amount <= 0.0 {
            info!("Withdrawal amount is zero, skipping exchange withdrawal");
            return Ok(None);
        }

        let before = self.balance(record, chain, token).await?;
        let request = WithdrawalRequest {
            symbol,
            amount,
            address: record.address.clone(),
            network: chain.okx_chain_name.to_string(),
            fee: chain.okx_withdrawal_fee,
        };
        let id = with_retry_if(
            &self.config.exchange.withdraw_retry,
            "exchange withdrawal",
            GatewayError::is_retryable,
            || exchange.withdraw(&request),
        )
        .await?;
        MetricsCollector::global().record_withdrawal();

        Ok(Some(PendingWithdrawal {
            id,
            chain: chain.name,
            amount,
            balance_before: before,
        }))
    }

    async fn wait_for_withdrawal(&self, exchange: &dyn ExchangeGateway, id: &str) -> Result<(), GatewayError> {
        let attempts = self.config.exchange.status_poll_attempts;
        info!("Waiting for withdrawal {} to be final", id);

        for attempt in 1..=attempts {
            match exchange.withdrawal_status(id).await {
                Ok(WithdrawalStatus::Completed) => {
                    info!("Withdrawal {} sent by the exchange", id);
                    return Ok(());
                }
                Ok(WithdrawalStatus::Cancelled) => {
                    return Err(GatewayError::WithdrawalCancelled { id: id.to_string() });
                }
                Ok(WithdrawalStatus::Pending(state)) => debug!("Withdrawal {}: {}", id, state),
                Err(e) if e.is_retryable() => warn!("Withdrawal status check failed: {}", e),
                Err(e) => return Err(e),
            }
            if attempt < attempts {
                tokio::time::sleep(self.config.exchange.status_poll_delay.sample()).await;
            }
        }

        Err(GatewayError::WithdrawalTimedOut {
            id: id.to_string(),
            attempts,
        })
    }

    async fn wait_for_deposit(
        &self,
        record: &WalletRecord,
        chain: &Chain,
        token: &Token,
        before: f64,
    ) -> Result<(), GatewayError> {
        let attempts = self.config.exchange.deposit_poll_attempts;

        for attempt in 1..=attempts {
            match self.gateways.chain.balance(record, chain, token).await {
                Ok(balance) if has_arrived(balance, before) => {
                    info!("Deposit of {} arrived on {}", token, chain);
                    return Ok(());
                }
                Ok(balance) => debug!("Waiting for deposit on {}: {} {}", chain, balance, token),
                Err(e) => warn!("Balance check on {} failed: {}", chain, e),
            }
            if attempt < attempts {
                tokio::time::sleep(self.config.deposit_poll_delay.sample()).await;
            }
        }

        Err(GatewayError::DepositTimedOut {
            chain: chain.to_string(),
            attempts,
        })
    }

    /// Sends what is left on the volume chain to the deposit address.
    ///
    /// A `pending_cex_transfer` marker is written before the send. If one is
    /// already present, the previous run stopped mid-transfer and the balance
    /// decides whether the funds already left.
    pub(super) async fn transfer_to_cex(
        &mut self,
        db: &mut WalletDatabase,
        index: usize,
        leave: AmountRange,
    ) -> Result<StepOutcome> {
        let registry = Arc::clone(&self.registry);
        let record = db.get(index)?.clone();
        let deposit = record
            .deposit_address
            .clone()
            .filter(|a| !a.is_empty())
            .ok_or_else(|| anyhow!("wallet has no deposit address"))?;
        let chain_name = record
            .volume_mode_state
            .current_chain
            .ok_or_else(|| anyhow!("volume state has no current chain"))?;
        let chain = registry.chain(chain_name);
        let token = chain.native_token();
        let balance = self.balance(&record, chain, token).await?;

        if let Some(pending) = record.volume_mode_state.pending_cex_transfer {
            if transfer_left_wallet(&pending, balance) {
                db.update(index, |w| {
                    w.volume_mode_state.pending_cex_transfer = None;
                    w.mark(Flag::DepositedToCex);
                })?;
                return Ok(StepOutcome::Finished(format!(
                    "earlier transfer of {} {} to {} confirmed by balance",
                    pending.amount, token, deposit
                )));
            }
            warn!("Earlier transfer to {} never left the wallet, sending again", deposit);
            db.update(index, |w| w.volume_mode_state.pending_cex_transfer = None)?;
        }

        let amount = if self.config.manual_transfers {
            self.gateways.prompt.ask_amount(&format!(
                "Amount of {} to send from {} to the exchange",
                token,
                record.short_address()
            ))?
        } else {
            let leave = round_to(leave.sample(&mut self.rng), 6);
            if balance < leave {
                return Ok(StepOutcome::NoProgress(format!(
                    "balance {} {} on {} is below the amount to leave ({})",
                    token.round(balance),
                    token,
                    chain,
                    leave
                )));
            }
            balance - leave
        };

        if token.is_dust(amount) {
            db.update(index, |w| w.mark(Flag::DepositedToCex))?;
            return Ok(StepOutcome::Finished("nothing to send to the exchange".into()));
        }

        db.update(index, |w| {
            w.volume_mode_state.pending_cex_transfer = Some(PendingTransfer {
                chain: chain_name,
                amount,
                balance_before: balance,
            });
        })?;

        self.wait_for_gas().await;
        let gateway = Arc::clone(&self.gateways.chain);
        let result = with_retry_if(
            &self.config.retry,
            "exchange deposit transfer",
            GatewayError::is_retryable,
            || gateway.transfer_native(&record, chain, &deposit, amount),
        )
        .await;

        match result {
            Ok(tx_hash) => {
                db.update(index, |w| {
                    w.volume_mode_state.pending_cex_transfer = None;
                    w.mark(Flag::DepositedToCex);
                })?;
                Ok(StepOutcome::Finished(format!(
                    "sent {} {} to {}: {}",
                    token.round(amount),
                    token,
                    deposit,
                    chain.tx_url(&tx_hash)
                )))
            }
            // Marker stays so the next turn can tell from the balance.
            Err(GatewayError::Unconfirmed { tx_hash }) => Ok(StepOutcome::NoProgress(format!(
                "transfer {} not confirmed yet",
                tx_hash
            ))),
            Err(e) => {
                db.update(index, |w| w.volume_mode_state.pending_cex_transfer = None)?;
                Err(e).context("exchange deposit transfer")
            }
        }
    }
}

/// The send is considered done once the balance dropped by at least the
/// pending amount. A drop of gas alone means the transfer reverted.
fn transfer_left_wallet(pending: &PendingTransfer, balance: f64) -> bool {
    pending.balance_before - balance >= pending.amount * (1.0 - 1e-9)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> PendingTransfer {
        PendingTransfer {
            chain: ChainName::Arbitrum,
            amount: 0.5,
            balance_before: 0.6,
        }
    }

    #[test]
    fn test_balance_drop_means_sent() {
        assert!(transfer_left_wallet(&pending(), 0.0999));
        assert!(transfer_left_wallet(&pending(), 0.1));
    }

    #[test]
    fn test_gas_only_drop_means_not_sent() {
        assert!(!transfer_left_wallet(&pending(), 0.6));
        assert!(!transfer_left_wallet(&pending(), 0.5999));
    }
}
