//! # Wallet Record
//!
//! Persisted per-account progress. Every field is required on load; `null`
//! and `0` are distinct values and both survive a save/load round trip.

use crate::registry::ChainName;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Deserializes an `Option<T>` without the implicit "missing means None"
/// default, so an absent key is reported instead of silently becoming null.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer)
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct PrivateKey(String);

impl PrivateKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***REDACTED***")
    }
}

/// Lifecycle flags. Each one only ever moves from false to true.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    WarmupFinished,
    CollectorFinished,
    ManualBridgeFinished,
    DepositedToCex,
}

impl Flag {
    pub const ALL: [Flag; 4] = [
        Flag::WarmupFinished,
        Flag::CollectorFinished,
        Flag::ManualBridgeFinished,
        Flag::DepositedToCex,
    ];

    pub fn field_name(&self) -> &'static str {
        match self {
            Flag::WarmupFinished => "warmup_finished",
            Flag::CollectorFinished => "collector_finished",
            Flag::ManualBridgeFinished => "manual_bridge_finished",
            Flag::DepositedToCex => "volume_mode_state.deposited_to_cex",
        }
    }
}

/// Written before the final exchange transfer is sent and cleared once its
/// outcome is known. A marker found on startup means the previous run died
/// mid-transfer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PendingTransfer {
    pub chain: ChainName,
    pub amount: f64,
    pub balance_before: f64,
}

/// Written once the exchange has accepted a withdrawal and cleared when the
/// deposit lands or the exchange cancels it. While present, later turns
/// keep polling this withdrawal instead of requesting a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PendingWithdrawal {
    pub id: String,
    pub chain: ChainName,
    pub amount: f64,
    pub balance_before: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VolumeModeState {
    /// USD target.
    pub volume_goal: f64,
    /// USD accumulated from successful sends. Never decreases.
    pub volume_reached: f64,
    #[serde(deserialize_with = "nullable")]
    pub current_chain: Option<ChainName>,
    #[serde(deserialize_with = "nullable")]
    pub initial_balance: Option<f64>,
    #[serde(deserialize_with = "nullable")]
    pub okx_withdrawn: Option<f64>,
    pub deposited_to_cex: bool,
    #[serde(deserialize_with = "nullable")]
    pub pending_cex_transfer: Option<PendingTransfer>,
    #[serde(deserialize_with = "nullable")]
    pub pending_withdrawal: Option<PendingWithdrawal>,
}

impl VolumeModeState {
    pub fn new(volume_goal: f64, start_chain: ChainName) -> Self {
        Self {
            volume_goal,
            volume_reached: 0.0,
            current_chain: Some(start_chain),
            initial_balance: None,
            okx_withdrawn: None,
            deposited_to_cex: false,
            pending_cex_transfer: None,
            pending_withdrawal: None,
        }
    }

    pub fn goal_reached(&self) -> bool {
        self.volume_reached >= self.volume_goal
    }
}

/// Which set of in-flight markers a mode works with. Warmup uses the
/// top-level ones; volume keeps its own copy inside `volume_mode_state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    Warmup,
    Volume,
}

/// Copy of one lane's markers.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LaneState {
    pub current_chain: Option<ChainName>,
    pub initial_balance: Option<f64>,
    pub okx_withdrawn: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WalletRecord {
    pub private_key: PrivateKey,
    pub address: String,
    #[serde(deserialize_with = "nullable")]
    pub proxy: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub deposit_address: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub current_chain: Option<ChainName>,
    #[serde(deserialize_with = "nullable")]
    pub initial_balance: Option<f64>,
    pub arbitrum_bridge_count: u32,
    pub base_bridge_count: u32,
    pub bsc_bridge_count: u32,
    pub optimism_bridge_count: u32,
    pub polygon_bridge_count: u32,
    pub linea_bridge_count: u32,
    pub zkera_bridge_count: u32,
    pub ethereum_bridge_count: u32,
    pub warmup_finished: bool,
    pub collector_finished: bool,
    pub manual_bridge_finished: bool,
    #[serde(deserialize_with = "nullable")]
    pub okx_withdrawn: Option<f64>,
    #[serde(deserialize_with = "nullable")]
    pub pending_withdrawal: Option<PendingWithdrawal>,
    pub volume_mode_state: VolumeModeState,
}

impl WalletRecord {
    pub fn new(
        private_key: PrivateKey,
        address: String,
        proxy: Option<String>,
        deposit_address: Option<String>,
        volume_mode_state: VolumeModeState,
    ) -> Self {
        Self {
            private_key,
            address,
            proxy,
            deposit_address,
            current_chain: None,
            initial_balance: None,
            arbitrum_bridge_count: 0,
            base_bridge_count: 0,
            bsc_bridge_count: 0,
            optimism_bridge_count: 0,
            polygon_bridge_count: 0,
            linea_bridge_count: 0,
            zkera_bridge_count: 0,
            ethereum_bridge_count: 0,
            warmup_finished: false,
            collector_finished: false,
            manual_bridge_finished: false,
            okx_withdrawn: None,
            pending_withdrawal: None,
            volume_mode_state,
        }
    }

    /// `0x1234..abcd`, for log lines.
    pub fn short_address(&self) -> String {
        if self.address.len() > 10 {
            format!(
                "{}..{}",
                &self.address[..6],
                &self.address[self.address.len() - 4..]
            )
        } else {
            self.address.clone()
        }
    }

    pub fn bridge_count(&self, chain: ChainName) -> u32 {
        match chain {
            ChainName::Arbitrum => self.arbitrum_bridge_count,
            ChainName::Base => self.base_bridge_count,
            ChainName::Bsc => self.bsc_bridge_count,
            ChainName::Optimism => self.optimism_bridge_count,
            ChainName::Polygon => self.polygon_bridge_count,
            ChainName::Linea => self.linea_bridge_count,
            ChainName::Zkera => self.zkera_bridge_count,
            ChainName::Ethereum => self.ethereum_bridge_count,
        }
    }

    pub fn bridge_count_mut(&mut self, chain: ChainName) -> &mut u32 {
        match chain {
            ChainName::Arbitrum => &mut self.arbitrum_bridge_count,
            ChainName::Base => &mut self.base_bridge_count,
            ChainName::Bsc => &mut self.bsc_bridge_count,
            ChainName::Optimism => &mut self.optimism_bridge_count,
            ChainName::Polygon => &mut self.polygon_bridge_count,
            ChainName::Linea => &mut self.linea_bridge_count,
            ChainName::Zkera => &mut self.zkera_bridge_count,
            ChainName::Ethereum => &mut self.ethereum_bridge_count,
        }
    }

    /// Chains with at least one remaining bridge action, in registry order.
    pub fn chains_with_actions(&self) -> Vec<ChainName> {
        ChainName::ALL
            .into_iter()
            .filter(|c| self.bridge_count(*c) > 0)
            .collect()
    }

    pub fn has_actions_available(&self) -> bool {
        ChainName::ALL.iter().any(|c| self.bridge_count(*c) > 0)
    }

    pub fn flag(&self, flag: Flag) -> bool {
        match flag {
            Flag::WarmupFinished => self.warmup_finished,
            Flag::CollectorFinished => self.collector_finished,
            Flag::ManualBridgeFinished => self.manual_bridge_finished,
            Flag::DepositedToCex => self.volume_mode_state.deposited_to_cex,
        }
    }

    /// Sets a lifecycle flag. There is no way to clear one.
    pub fn mark(&mut self, flag: Flag) {
        match flag {
            Flag::WarmupFinished => self.warmup_finished = true,
            Flag::CollectorFinished => self.collector_finished = true,
            Flag::ManualBridgeFinished => self.manual_bridge_finished = true,
            Flag::DepositedToCex => self.volume_mode_state.deposited_to_cex = true,
        }
    }

    pub fn lane(&self, lane: Lane) -> LaneState {
        match lane {
            Lane::Warmup => LaneState {
                current_chain: self.current_chain,
                initial_balance: self.initial_balance,
                okx_withdrawn: self.okx_withdrawn,
            },
            Lane::Volume => LaneState {
                current_chain: self.volume_mode_state.current_chain,
                initial_balance: self.volume_mode_state.initial_balance,
                okx_withdrawn: self.volume_mode_state.okx_withdrawn,
            },
        }
    }

    pub fn set_lane(&mut self, lane: Lane, state: LaneState) {
        match lane {
            Lane::Warmup => {
                self.current_chain = state.current_chain;
                self.initial_balance = state.initial_balance;
                self.okx_withdrawn = state.okx_withdrawn;
            }
            Lane::Volume => {
                let vms = &mut self.volume_mode_state;
                vms.current_chain = state.current_chain;
                vms.initial_balance = state.initial_balance;
                vms.okx_withdrawn = state.okx_withdrawn;
            }
        }
    }

    pub fn pending_withdrawal(&self, lane: Lane) -> Option<&PendingWithdrawal> {
        match lane {
            Lane::Warmup => self.pending_withdrawal.as_ref(),
            Lane::Volume => self.volume_mode_state.pending_withdrawal.as_ref(),
        }
    }

    pub fn set_pending_withdrawal(&mut self, lane: Lane, pending: Option<PendingWithdrawal>) {
        match lane {
            Lane::Warmup => self.pending_withdrawal = pending,
            Lane::Volume => self.volume_mode_state.pending_withdrawal = pending,
        }
    }

    /// Checks that `after` is a legal successor of `before`: same identity,
    /// no flag cleared, no counter increased, no volume lost.
    pub fn check_transition(before: &Self, after: &Self) -> Result<(), String> {
        if before.private_key != after.private_key || before.address != after.address {
            return Err("wallet identity cannot change".into());
        }
        for flag in Flag::ALL {
            if before.flag(flag) && !after.flag(flag) {
                return Err(format!("{} cannot be reset to false", flag.field_name()));
            }
        }
        for chain in ChainName::ALL {
            if after.bridge_count(chain) > before.bridge_count(chain) {
                return Err(format!("{}_bridge_count cannot increase", chain));
            }
        }
        if after.volume_mode_state.volume_reached < before.volume_mode_state.volume_reached {
            return Err("volume_mode_state.volume_reached cannot decrease".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> WalletRecord {
        WalletRecord::new(
            PrivateKey::new("0xabc"),
            "0x1111111111111111111111111111111111111111".into(),
            None,
            Some("0xdeposit".into()),
            VolumeModeState::new(100.0, ChainName::Base),
        )
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let rendered = format!("{:?}", record());
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("0xabc"));
    }

    #[test]
    fn test_short_address() {
        assert_eq!(record().short_address(), "0x1111..1111");
    }

    #[test]
    fn test_counters_and_actions() {
        let mut w = record();
        assert!(!w.has_actions_available());
        *w.bridge_count_mut(ChainName::Linea) = 2;
        *w.bridge_count_mut(ChainName::Arbitrum) = 1;
        assert!(w.has_actions_available());
        assert_eq!(
            w.chains_with_actions(),
            vec![ChainName::Arbitrum, ChainName::Linea]
        );
    }

    #[test]
    fn test_lane_round_trip() {
        let mut w = record();
        let state = LaneState {
            current_chain: Some(ChainName::Optimism),
            initial_balance: Some(0.0),
            okx_withdrawn: None,
        };
        w.set_lane(Lane::Volume, state);
        assert_eq!(w.lane(Lane::Volume), state);
        assert_eq!(w.lane(Lane::Warmup), LaneState::default());
    }

    #[test]
    fn test_pending_withdrawal_is_kept_per_lane() {
        let mut w = record();
        let pending = PendingWithdrawal {
            id: "wd-7".into(),
            chain: ChainName::Base,
            amount: 0.02,
            balance_before: 0.001,
        };
        w.set_pending_withdrawal(Lane::Volume, Some(pending.clone()));
        assert_eq!(w.pending_withdrawal(Lane::Volume), Some(&pending));
        assert_eq!(w.pending_withdrawal(Lane::Warmup), None);

        w.set_pending_withdrawal(Lane::Volume, None);
        assert_eq!(w.volume_mode_state.pending_withdrawal, None);
    }

    #[test]
    fn test_transition_rejects_cleared_flag() {
        let mut before = record();
        before.mark(Flag::WarmupFinished);
        let mut after = before.clone();
        after.warmup_finished = false;
        let err = WalletRecord::check_transition(&before, &after).unwrap_err();
        assert!(err.contains("warmup_finished"));
    }

    #[test]
    fn test_transition_rejects_volume_decrease() {
        let mut before = record();
        before.volume_mode_state.volume_reached = 50.0;
        let mut after = before.clone();
        after.volume_mode_state.volume_reached = 49.0;
        assert!(WalletRecord::check_transition(&before, &after).is_err());
    }

    #[test]
    fn test_transition_rejects_counter_increase() {
        let before = record();
        let mut after = before.clone();
        after.base_bridge_count = 1;
        assert!(WalletRecord::check_transition(&before, &after).is_err());
    }

    #[test]
    fn test_missing_optional_field_is_rejected() {
        let mut value = serde_json::to_value(record()).unwrap();
        value.as_object_mut().unwrap().remove("initial_balance");
        let err = serde_json::from_value::<WalletRecord>(value).unwrap_err();
        assert!(err.to_string().contains("initial_balance"));
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let mut value = serde_json::to_value(record()).unwrap();
        value
            .as_object_mut()
            .unwrap()
            .insert("nickname".into(), serde_json::json!("alice"));
        assert!(serde_json::from_value::<WalletRecord>(value).is_err());
    }

    #[test]
    fn test_null_and_zero_balance_are_distinct() {
        let mut zero = record();
        zero.initial_balance = Some(0.0);
        let json = serde_json::to_string(&zero).unwrap();
        assert!(json.contains("\"initial_balance\":0.0"));
        let back: WalletRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.initial_balance, Some(0.0));

        let json = serde_json::to_string(&record()).unwrap();
        assert!(json.contains("\"initial_balance\":null"));
        let back: WalletRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.initial_balance, None);
    }
}
