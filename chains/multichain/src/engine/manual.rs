//! Manual bridge: one fixed route per wallet.

use super::strategy::{Completion, Mode, Plan, Route, SentBridge, Sizing, Strategy, TokenChoice};
use crate::database::WalletDatabase;
use crate::registry::ChainName;
use crate::wallet::{Flag, Lane, WalletRecord};
use rand::RngCore;

pub struct ManualBridgeStrategy {
    from: ChainName,
    to: ChainName,
    sizing: Sizing,
}

impl ManualBridgeStrategy {
    pub fn new(from: ChainName, to: ChainName, sizing: Sizing) -> Self {
        Self { from, to, sizing }
    }
}

impl Strategy for ManualBridgeStrategy {
    fn mode(&self) -> Mode {
        Mode::ManualBridge
    }

    fn lane(&self) -> Option<Lane> {
        None
    }

    fn has_pending(&self, db: &WalletDatabase) -> bool {
        db.any_manual_bridge_pending()
    }

    fn preflight(&self, _db: &WalletDatabase) -> Result<(), String> {
        if self.from == self.to {
            return Err(format!("start and finish chain are both {}", self.from));
        }
        Ok(())
    }

    fn select(&self, db: &WalletDatabase, rng: &mut dyn RngCore) -> Option<(WalletRecord, usize)> {
        db.pick_random(&[(Flag::ManualBridgeFinished, false)], rng)
    }

    fn is_complete(&self, _record: &WalletRecord) -> bool {
        false
    }

    fn plan(&self, _record: &WalletRecord, _rng: &mut dyn RngCore) -> Plan {
        Plan::Bridge(vec![Route {
            from: self.from,
            to: self.to,
            token: TokenChoice::Native,
            sizing: self.sizing,
        }])
    }

    fn on_sent(&self, _record: &mut WalletRecord, _sent: &SentBridge) {}

    fn completion(&self) -> Completion {
        Completion::MarkFinished(Flag::ManualBridgeFinished)
    }

    fn finishes_after_pass(&self, any_sent: bool) -> bool {
        any_sent
    }
}
