//! Pool Catalog & Persistence (C2).
//!
//! Thread-safe map of discovered pools (keyed by lowercased pool address),
//! owned exclusively by discovery and liquidity refresh; every other
//! component only reads it. Snapshots are written atomically (temp file,
//! fsync, rename) so a crash mid-write never corrupts the on-disk copy.

use crate::error::PersistenceError;
use crate::pool::graph::TradeGraph;
use crate::types::{DiscoveredPool, TradePair};
use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

const SNAPSHOT_VERSION: u32 = 1;
const MAX_SNAPSHOT_AGE_SECS: i64 = 7 * 24 * 3600;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub version: u32,
    pub timestamp_millis: u64,
    pub last_scan_block: u64,
    pub pools: Vec<DiscoveredPool>,
    /// Derived from `pools` at save time (the same pair grouping
    /// `TradeGraph::build` does), persisted so a reader of the snapshot
    /// file doesn't have to re-derive it to see the pair structure.
    /// Rebuilt fresh from the active pool set every cycle; not read back
    /// into any live state on `load`.
    #[serde(default)]
    pub trade_pairs: Vec<TradePair>,
}

/// Thread-safe, persistent catalog of discovered pools.
pub struct PoolCatalog {
    pools: Arc<DashMap<Address, DiscoveredPool>>,
    last_scan_block: AtomicU64,
    snapshot_path: String,
}

impl PoolCatalog {
    pub fn new(snapshot_path: impl Into<String>) -> Self {
        Self {
            pools: Arc::new(DashMap::new()),
            last_scan_block: AtomicU64::new(0),
            snapshot_path: snapshot_path.into(),
        }
    }

    pub fn insert(&self, pool: DiscoveredPool) {
        debug!(venue = %pool.venue_id, pool = %pool.pool_address, "catalog insert");
        self.pools.insert(pool.pool_address, pool);
    }

    pub fn get(&self, address: Address) -> Option<DiscoveredPool> {
        self.pools.get(&address).map(|e| e.clone())
    }

    pub fn contains(&self, address: Address) -> bool {
        self.pools.contains_key(&address)
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    pub fn iter_all(&self) -> Vec<DiscoveredPool> {
        self.pools.iter().map(|e| e.value().clone()).collect()
    }

    pub fn iter_active(&self) -> Vec<DiscoveredPool> {
        self.pools.iter().filter(|e| e.is_active).map(|e| e.value().clone()).collect()
    }

    pub fn last_scan_block(&self) -> u64 {
        self.last_scan_block.load(Ordering::Relaxed)
    }

    pub fn set_last_scan_block(&self, block: u64) {
        self.last_scan_block.store(block, Ordering::Relaxed);
    }

    /// Atomic write: serialize, write to a `.tmp` sibling, fsync, rename.
    pub fn save(&self) -> Result<(), PersistenceError> {
        let active = self.iter_active();
        let trade_pairs = TradeGraph::build(&active).all_pairs().to_vec();

        let snapshot = PoolSnapshot {
            version: SNAPSHOT_VERSION,
            timestamp_millis: now_millis(),
            last_scan_block: self.last_scan_block(),
            pools: self.iter_all(),
            trade_pairs,
        };

        let json = serde_json::to_string_pretty(&snapshot).map_err(PersistenceError::Serialize)?;
        let path = Path::new(&self.snapshot_path);
        let tmp_path = path.with_extension("tmp");

        let write_err = |source: std::io::Error| PersistenceError::Write {
            path: self.snapshot_path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }

        let mut file = File::create(&tmp_path).map_err(write_err)?;
        file.write_all(json.as_bytes()).map_err(write_err)?;
        file.sync_all().map_err(write_err)?;
        std::fs::rename(&tmp_path, path).map_err(write_err)?;

        debug!(pools = snapshot.pools.len(), "catalog snapshot saved");
        Ok(())
    }

    /// Load a prior snapshot if it is structurally valid and fresh enough
    /// (§3: reload invariants — version matches, age <= 7 days). On any
    /// failure the caller is expected to trigger a full rescan instead.
    pub fn load(&self) -> Result<(), PersistenceError> {
        let path = &self.snapshot_path;
        let json = std::fs::read_to_string(path)
            .map_err(|_| PersistenceError::StaleOrInvalid(path.clone()))?;
        let snapshot: PoolSnapshot =
            serde_json::from_str(&json).map_err(|_| PersistenceError::StaleOrInvalid(path.clone()))?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(PersistenceError::StaleOrInvalid(path.clone()));
        }

        let age_secs = (now_millis().saturating_sub(snapshot.timestamp_millis)) / 1000;
        if age_secs as i64 > MAX_SNAPSHOT_AGE_SECS {
            warn!(age_secs, "snapshot too old, refusing load");
            return Err(PersistenceError::StaleOrInvalid(path.clone()));
        }

        for pool in snapshot.pools {
            self.pools.insert(pool.pool_address, pool);
        }
        self.last_scan_block.store(snapshot.last_scan_block, Ordering::Relaxed);

        info!(
            pools = self.pools.len(),
            last_scan_block = snapshot.last_scan_block,
            "catalog snapshot loaded"
        );
        Ok(())
    }

    pub fn clone_handle(&self) -> Self {
        Self {
            pools: Arc::clone(&self.pools),
            last_scan_block: AtomicU64::new(self.last_scan_block()),
            snapshot_path: self.snapshot_path.clone(),
        }
    }
}

fn now_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

pub fn snapshot_age(snapshot: &PoolSnapshot, at: DateTime<Utc>) -> i64 {
    at.timestamp_millis() - snapshot.timestamp_millis as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VenueKind;
    use alloy::primitives::U256;
    use tempfile_like::TempSnapshotPath;

    /// Minimal stand-in for a tempfile crate: writes into the OS temp
    /// dir directly and cleans up on drop.
    mod tempfile_like {
        use std::path::PathBuf;

        pub struct TempSnapshotPath(pub PathBuf);

        impl TempSnapshotPath {
            pub fn new(name: &str) -> Self {
                let mut p = std::env::temp_dir();
                p.push(format!("base_arb_engine_test_{name}_{}.json", std::process::id()));
                Self(p)
            }

            pub fn as_str(&self) -> String {
                self.0.to_string_lossy().to_string()
            }
        }

        impl Drop for TempSnapshotPath {
            fn drop(&mut self) {
                let _ = std::fs::remove_file(&self.0);
                let _ = std::fs::remove_file(self.0.with_extension("tmp"));
            }
        }
    }

    fn sample_pool(addr: u8) -> DiscoveredPool {
        DiscoveredPool {
            venue_id: "test-v3-3000".to_string(),
            venue_kind: VenueKind::V3Cl,
            pool_address: Address::with_last_byte(addr),
            token0: Address::with_last_byte(1),
            token1: Address::with_last_byte(2),
            token0_decimals: 18,
            token1_decimals: 6,
            fee_or_tick_spacing: 3000,
            liquidity: 1_000_000,
            reserve0: U256::ZERO,
            reserve1: U256::ZERO,
            liquidity_usd: 50_000.0,
            last_updated_millis: 0,
            is_active: true,
        }
    }

    #[test]
    fn round_trip_preserves_active_pool_set_and_scan_block() {
        let path = TempSnapshotPath::new("roundtrip");
        let catalog = PoolCatalog::new(path.as_str());
        catalog.insert(sample_pool(1));
        catalog.insert(sample_pool(2));
        catalog.set_last_scan_block(12345);
        catalog.save().unwrap();

        let reloaded = PoolCatalog::new(path.as_str());
        reloaded.load().unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.last_scan_block(), 12345);
    }

    #[test]
    fn stale_snapshot_is_refused() {
        let path = TempSnapshotPath::new("stale");
        let snapshot = PoolSnapshot {
            version: SNAPSHOT_VERSION,
            timestamp_millis: now_millis() - (8 * 24 * 3600 * 1000),
            last_scan_block: 1,
            pools: vec![sample_pool(1)],
            trade_pairs: Vec::new(),
        };
        std::fs::write(path.0.clone(), serde_json::to_string(&snapshot).unwrap()).unwrap();

        let catalog = PoolCatalog::new(path.as_str());
        assert!(catalog.load().is_err());
    }

    #[test]
    fn save_derives_trade_pairs_from_the_active_set() {
        let path = TempSnapshotPath::new("trade_pairs");
        let catalog = PoolCatalog::new(path.as_str());
        catalog.insert(sample_pool(1));
        catalog.insert(sample_pool(2));
        catalog.save().unwrap();

        let json = std::fs::read_to_string(path.as_str()).unwrap();
        let snapshot: PoolSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snapshot.trade_pairs.len(), 1, "both pools share the same token pair");
        assert_eq!(snapshot.trade_pairs[0].pools.len(), 2);
    }

    #[test]
    fn wrong_version_is_refused() {
        let path = TempSnapshotPath::new("version");
        let mut snapshot = PoolSnapshot {
            version: SNAPSHOT_VERSION,
            timestamp_millis: now_millis(),
            last_scan_block: 1,
            pools: vec![sample_pool(1)],
            trade_pairs: Vec::new(),
        };
        snapshot.version = SNAPSHOT_VERSION + 1;
        std::fs::write(path.0.clone(), serde_json::to_string(&snapshot).unwrap()).unwrap();

        let catalog = PoolCatalog::new(path.as_str());
        assert!(catalog.load().is_err());
    }
}
