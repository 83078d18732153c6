//! Flash-loan arbitrage engine for an EVM L2 (chain id 8453 / Base).
//!
//! `engine::ArbitrageEngine` is the composition root: it owns the token
//! registry, pool catalog/discovery, the derived trade graph, the
//! multi-venue quote engine, strategy search, the risk controller, the
//! gas oracle, the mempool observer and the execution pipeline, and
//! drives them from a single poll loop. See `main.rs` for how a binary
//! wires it up.

pub mod config;
pub mod contracts;
pub mod engine;
pub mod error;
pub mod execution;
pub mod gas;
pub mod mempool;
pub mod persistence;
pub mod pool;
pub mod quote;
pub mod risk;
pub mod strategy;
pub mod token_registry;
pub mod types;

pub use config::{load_config, EngineConfig};
pub use engine::ArbitrageEngine;
