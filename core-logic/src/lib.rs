//! # Core Logic - Shared Utilities for Chain Projects
//!
//! Chain-agnostic building blocks used by the projects under `chains/`:
//! configuration primitives, typed errors, the retry policy, the gas gate,
//! the action journal, metrics, logging and input-list loading.
//!
//! ## Modules
//!
//! - [`config`] - Range and proxy types deserialized from TOML
//! - [`error`] - Typed error handling with thiserror
//! - [`journal`] - SQLite audit trail of wallet steps
//! - [`metrics`] - Step and activity counters
//! - [`utils`] - Retry, gas gate, proxies, input lists, logger, runner

pub mod config;
pub mod error;
pub mod journal;
pub mod metrics;
pub(crate) mod utils;

pub use config::{AmountRange, CountRange, DelayRange, ProxyConfig};
pub use error::{ConfigError, CoreError, InputError, JournalError, NetworkError};
pub use journal::{ActionJournal, JournalEntry, JournalMetricsSnapshot, JournalRow};
pub use metrics::{MetricsCollector, MetricsSnapshot, StepKind};

pub use utils::{
    setup_logger, GasGate, GasPriceSource, InputLists, ProxyManager, WalletManager, WorkerRunner,
    TASK_RESULT_TARGET,
};

pub use utils::gas::{gwei_to_wei, wei_to_gwei};
pub use utils::retry::{is_transient_error, with_retry, with_retry_if, RetryConfig};
