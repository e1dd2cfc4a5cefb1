//! Volume: bounce funds between a fixed set of chains until the USD goal
//! is met, then send the balance to the wallet's exchange deposit address.

use super::strategy::{Completion, Mode, Plan, Route, SentBridge, Sizing, Strategy, TokenChoice};
use crate::database::WalletDatabase;
use crate::registry::ChainName;
use crate::wallet::{Lane, WalletRecord};
use core_logic::AmountRange;
use rand::seq::SliceRandom;
use rand::RngCore;

pub struct VolumeStrategy {
    chains: Vec<ChainName>,
    sizing: Sizing,
    amount_to_leave: AmountRange,
}

impl VolumeStrategy {
    pub fn new(chains: Vec<ChainName>, sizing: Sizing, amount_to_leave: AmountRange) -> Self {
        Self {
            chains,
            sizing,
            amount_to_leave,
        }
    }
}

impl Strategy for VolumeStrategy {
    fn mode(&self) -> Mode {
        Mode::Volume
    }

    fn lane(&self) -> Option<Lane> {
        Some(Lane::Volume)
    }

    fn has_pending(&self, db: &WalletDatabase) -> bool {
        db.any_volume_pending()
    }

    fn preflight(&self, db: &WalletDatabase) -> Result<(), String> {
        if db.all_have_deposit_address() {
            Ok(())
        } else {
            Err("Deposit addresses must be provided for each wallet".into())
        }
    }

    // Volume cycles run to completion one wallet at a time.
    fn select(&self, db: &WalletDatabase, _rng: &mut dyn RngCore) -> Option<(WalletRecord, usize)> {
        db.pick_first_unfinished_volume()
    }

    fn is_complete(&self, record: &WalletRecord) -> bool {
        record.volume_mode_state.goal_reached()
    }

    fn plan(&self, record: &WalletRecord, rng: &mut dyn RngCore) -> Plan {
        let Some(source) = record.volume_mode_state.current_chain else {
            return Plan::Stalled("volume state has no current chain".into());
        };

        let candidates: Vec<ChainName> = self
            .chains
            .iter()
            .copied()
            .filter(|chain| *chain != source)
            .collect();
        let Some(destination) = candidates.choose(rng).copied() else {
            return Plan::Stalled(format!("no volume chain to bridge to from {}", source));
        };

        Plan::Bridge(vec![Route {
            from: source,
            to: destination,
            token: TokenChoice::Native,
            sizing: self.sizing,
        }])
    }

    fn on_sent(&self, record: &mut WalletRecord, sent: &SentBridge) {
        if let Some(price) = sent.usd_price {
            record.volume_mode_state.volume_reached += sent.amount * price;
        }
    }

    fn completion(&self) -> Completion {
        Completion::TransferToCex {
            leave: self.amount_to_leave,
        }
    }

    fn needs_price(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::{PrivateKey, VolumeModeState};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn strategy() -> VolumeStrategy {
        VolumeStrategy::new(
            vec![ChainName::Arbitrum, ChainName::Base, ChainName::Linea],
            Sizing::Percent(AmountRange::new(60.0, 65.0).unwrap()),
            AmountRange::new(0.0001, 0.0002).unwrap(),
        )
    }

    fn record(start: ChainName) -> WalletRecord {
        WalletRecord::new(
            PrivateKey::new("0x01"),
            "0x1111111111111111111111111111111111111111".into(),
            None,
            Some("0xdeposit".into()),
            VolumeModeState::new(100.0, start),
        )
    }

    #[test]
    fn test_destination_from_volume_chains() {
        let strategy = strategy();
        let mut rng = StdRng::seed_from_u64(11);
        let wallet = record(ChainName::Base);
        for _ in 0..20 {
            match strategy.plan(&wallet, &mut rng) {
                Plan::Bridge(routes) => {
                    assert_eq!(routes[0].from, ChainName::Base);
                    assert!(matches!(routes[0].to, ChainName::Arbitrum | ChainName::Linea));
                }
                other => panic!("unexpected plan {:?}", other),
            }
        }
    }

    #[test]
    fn test_usd_progress_accumulates() {
        let strategy = strategy();
        let mut wallet = record(ChainName::Base);
        let sent = SentBridge {
            from: ChainName::Base,
            to: ChainName::Arbitrum,
            amount: 0.02,
            usd_price: Some(2500.0),
        };
        strategy.on_sent(&mut wallet, &sent);
        strategy.on_sent(&mut wallet, &sent);
        assert!((wallet.volume_mode_state.volume_reached - 100.0).abs() < 1e-9);
        assert!(strategy.is_complete(&wallet));
    }

    #[test]
    fn test_missing_current_chain_stalls() {
        let strategy = strategy();
        let mut rng = StdRng::seed_from_u64(1);
        let mut wallet = record(ChainName::Base);
        wallet.volume_mode_state.current_chain = None;
        assert!(matches!(strategy.plan(&wallet, &mut rng), Plan::Stalled(_)));
    }
}
