//! Mempool Observer (C9).
//!
//! - `types` — wire-level structs shared between the decoder and the
//!   observation loop: `PendingSwap`, `PoolUpdate`, `MevRecommendation`.
//! - `decoder` — selector-table calldata decoding for the router ABIs in
//!   scope (v2 `swapExactTokensForTokens*`, v3 `exactInputSingle`/`exactInput`).
//! - `monitor` — the push-subscription observation loop: a producer task
//!   that decodes and publishes over an mpsc channel. Subscriber logic
//!   never runs inline — callbacks never block the socket read.
//!
//! Strictly advisory: every failure here is logged and retried, never
//! propagated to the main engine loop.

pub mod decoder;
pub mod monitor;
pub mod types;

pub use monitor::{run_observation, MempoolObserverConfig};
pub use types::{MempoolEvent, MevRecommendation, PendingSwap, PoolUpdate};
