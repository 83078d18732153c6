//! Execution Pipeline (C10).
//!
//! - `nonce` — a locally tracked signer nonce, the only writer of which is
//!   this module.
//! - `relay` — private-relay (`eth_sendBundle`) submission with public
//!   fallback.
//! - `pipeline` — the NEW → PREFLIGHT → ENCODE → SIMULATE → BUILD_TX →
//!   SUBMIT_PRIVATE/SUBMIT_PUBLIC → WAIT state machine.

pub mod nonce;
pub mod pipeline;
pub mod relay;

pub use pipeline::{ExecutionOutcome, ExecutionPipeline};
