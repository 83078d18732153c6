//! Pretty-prints the engine's persisted stats snapshot.
//!
//! Reads `STATS_SNAPSHOT_PATH` (same default as the main binary) and
//! dumps it as formatted JSON, for a quick operator check without
//! needing to parse the raw file by hand.

use anyhow::{Context, Result};
use base_arb_engine::{config, persistence};

fn main() -> Result<()> {
    let config = config::load_config().context("failed to load configuration")?;
    let stats = persistence::load_stats(&config.stats_snapshot_path);
    let json = serde_json::to_string_pretty(&stats).context("failed to serialize stats")?;
    println!("{json}");
    Ok(())
}
