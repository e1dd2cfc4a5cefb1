//! # Multichain Warmup
//!
//! Moves funds for a batch of EVM wallets across a fixed set of chains,
//! one wallet step at a time, and records every state change in a JSON
//! wallet database so an interrupted run resumes where it stopped.
//!
//! ## Modes
//!
//! - **Warmup**: random bridges until each wallet's per-chain counters are spent
//! - **Volume**: bridges between the volume chains until a USD goal is reached,
//!   then sends the balance to the wallet's exchange deposit address
//! - **Collector**: sweeps every chain into one destination chain
//! - **Manual bridge**: one fixed route per wallet
//!
//! ## Layout
//!
//! - [`registry`] - Chains, tokens and endpoints
//! - [`wallet`] - The persisted wallet record and its flags
//! - [`database`] - Load, migrate, mutate and save the wallet file
//! - [`gateway`] - Traits for RPC, bridge, exchange and prices, plus live adapters
//! - [`engine`] - The shared step state machine and the per-mode strategies
//! - [`settings`] - TOML settings
//! - [`menu`], [`app`] - Operator entry points

pub mod app;
pub mod database;
pub mod engine;
pub mod gateway;
pub mod menu;
pub mod registry;
pub mod settings;
pub mod wallet;
