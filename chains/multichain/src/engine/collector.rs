//! Collector: one pass per wallet moving every other chain's balance to a
//! single destination chain.

use super::strategy::{Completion, Mode, Plan, Route, SentBridge, Sizing, Strategy, TokenChoice};
use crate::database::WalletDatabase;
use crate::registry::ChainName;
use crate::wallet::{Flag, Lane, WalletRecord};
use rand::RngCore;

pub struct CollectorStrategy {
    destination: ChainName,
    token: TokenChoice,
}

impl CollectorStrategy {
    pub fn new(destination: ChainName, token: TokenChoice) -> Self {
        Self { destination, token }
    }
}

impl Strategy for CollectorStrategy {
    fn mode(&self) -> Mode {
        Mode::Collector
    }

    fn lane(&self) -> Option<Lane> {
        None
    }

    fn has_pending(&self, db: &WalletDatabase) -> bool {
        db.any_collector_pending()
    }

    fn select(&self, db: &WalletDatabase, rng: &mut dyn RngCore) -> Option<(WalletRecord, usize)> {
        db.pick_random(&[(Flag::CollectorFinished, false)], rng)
    }

    fn is_complete(&self, _record: &WalletRecord) -> bool {
        false
    }

    fn plan(&self, _record: &WalletRecord, _rng: &mut dyn RngCore) -> Plan {
        let routes = ChainName::ALL
            .into_iter()
            .filter(|chain| *chain != self.destination)
            .map(|from| Route {
                from,
                to: self.destination,
                token: self.token,
                sizing: Sizing::Full,
            })
            .collect();
        Plan::Bridge(routes)
    }

    fn on_sent(&self, _record: &mut WalletRecord, _sent: &SentBridge) {}

    fn completion(&self) -> Completion {
        Completion::MarkFinished(Flag::CollectorFinished)
    }

    fn finishes_after_pass(&self, _any_sent: bool) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::{PrivateKey, VolumeModeState};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_routes_cover_every_other_chain() {
        let strategy = CollectorStrategy::new(ChainName::Arbitrum, TokenChoice::Native);
        let wallet = WalletRecord::new(
            PrivateKey::new("0x01"),
            "0x1111111111111111111111111111111111111111".into(),
            None,
            None,
            VolumeModeState::new(1.0, ChainName::Base),
        );
        let mut rng = StdRng::seed_from_u64(1);

        let Plan::Bridge(routes) = strategy.plan(&wallet, &mut rng) else {
            panic!("collector always bridges");
        };
        assert_eq!(routes.len(), ChainName::ALL.len() - 1);
        assert!(routes.iter().all(|r| r.to == ChainName::Arbitrum));
        assert!(routes.iter().all(|r| r.from != ChainName::Arbitrum));
        assert!(routes.iter().all(|r| r.sizing == Sizing::Full));
    }
}
