//! Warmup: spend each chain's randomized bridge budget, hopping between
//! chains that still have actions, then settle on the finish chain.

use super::strategy::{Completion, Mode, Plan, Route, SentBridge, Sizing, Strategy, TokenChoice};
use crate::database::WalletDatabase;
use crate::registry::ChainName;
use crate::wallet::{Flag, Lane, WalletRecord};
use rand::seq::SliceRandom;
use rand::RngCore;

pub struct WarmupStrategy {
    finish_chain: Option<ChainName>,
    sizing: Sizing,
}

impl WarmupStrategy {
    pub fn new(finish_chain: Option<ChainName>, sizing: Sizing) -> Self {
        Self {
            finish_chain,
            sizing,
        }
    }
}

impl Strategy for WarmupStrategy {
    fn mode(&self) -> Mode {
        Mode::Warmup
    }

    fn lane(&self) -> Option<Lane> {
        Some(Lane::Warmup)
    }

    fn has_pending(&self, db: &WalletDatabase) -> bool {
        db.any_warmup_pending()
    }

    fn select(&self, db: &WalletDatabase, rng: &mut dyn RngCore) -> Option<(WalletRecord, usize)> {
        db.pick_random(&[(Flag::WarmupFinished, false)], rng)
    }

    fn is_complete(&self, record: &WalletRecord) -> bool {
        !record.has_actions_available()
    }

    fn plan(&self, record: &WalletRecord, rng: &mut dyn RngCore) -> Plan {
        let with_actions = record.chains_with_actions();

        let source = match record.current_chain {
            Some(chain) => chain,
            None => match with_actions.choose(rng) {
                Some(chain) => *chain,
                None => return Plan::Complete,
            },
        };

        let candidates: Vec<ChainName> = with_actions
            .into_iter()
            .filter(|chain| *chain != source)
            .collect();

        let destination = match candidates.choose(rng) {
            Some(chain) => *chain,
            None => match self.finish_chain {
                Some(finish) if finish != source => finish,
                _ => return Plan::Complete,
            },
        };

        Plan::Bridge(vec![Route {
            from: source,
            to: destination,
            token: TokenChoice::Native,
            sizing: self.sizing,
        }])
    }

    fn on_sent(&self, record: &mut WalletRecord, sent: &SentBridge) {
        let counter = record.bridge_count_mut(sent.from);
        *counter = counter.saturating_sub(1);
    }

    fn completion(&self) -> Completion {
        Completion::MarkFinished(Flag::WarmupFinished)
    }
}
