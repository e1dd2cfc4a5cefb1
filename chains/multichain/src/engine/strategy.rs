use crate::database::WalletDatabase;
use crate::registry::ChainName;
use crate::wallet::{Flag, Lane, WalletRecord};
use core_logic::AmountRange;
use rand::RngCore;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Warmup,
    Volume,
    Collector,
    ManualBridge,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Warmup => "warmup",
            Mode::Volume => "volume",
            Mode::Collector => "collector",
            Mode::ManualBridge => "manual-bridge",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much of the source balance a bridge moves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sizing {
    /// Everything, net of gas and protocol fee.
    Full,
    /// A percentage drawn from the range, rounded to the token's precision.
    Percent(AmountRange),
}

/// Which source token a route spends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenChoice {
    Native,
    /// The token with the largest USD value on the source chain.
    LargestUsd,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Route {
    pub from: ChainName,
    pub to: ChainName,
    pub token: TokenChoice,
    pub sizing: Sizing,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    Bridge(Vec<Route>),
    /// Nothing left to bridge; run the completion action.
    Complete,
    /// The wallet cannot progress in this mode until something external changes.
    Stalled(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Completion {
    MarkFinished(Flag),
    /// Send the balance minus a leftover to the wallet's deposit address.
    TransferToCex { leave: AmountRange },
}

/// A bridge that left the wallet, as the strategy sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct SentBridge {
    pub from: ChainName,
    pub to: ChainName,
    pub amount: f64,
    pub usd_price: Option<f64>,
}

/// Per-mode rules plugged into the shared progression engine.
pub trait Strategy: Send + Sync {
    fn mode(&self) -> Mode;

    /// In-flight markers this mode reads and writes. `None` means sends
    /// are fire-and-forget and arrival is never awaited.
    fn lane(&self) -> Option<Lane>;

    fn has_pending(&self, db: &WalletDatabase) -> bool;

    /// Batch-level check before the first step.
    fn preflight(&self, _db: &WalletDatabase) -> Result<(), String> {
        Ok(())
    }

    fn select(&self, db: &WalletDatabase, rng: &mut dyn RngCore) -> Option<(WalletRecord, usize)>;

    /// True when the wallet has nothing left to bridge in this mode.
    fn is_complete(&self, record: &WalletRecord) -> bool;

    fn plan(&self, record: &WalletRecord, rng: &mut dyn RngCore) -> Plan;

    /// Applied to the record in the same update that records the send.
    fn on_sent(&self, record: &mut WalletRecord, sent: &SentBridge);

    fn completion(&self) -> Completion;

    /// Whether one pass over the planned routes finishes the wallet.
    fn finishes_after_pass(&self, _any_sent: bool) -> bool {
        false
    }

    /// Whether sends need a USD spot price.
    fn needs_price(&self) -> bool {
        false
    }
}
