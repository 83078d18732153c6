//! Statistics snapshot persistence — the same atomic-write recipe as the
//! pool catalog (§4.2), applied to `EngineStats` so a restart doesn't lose
//! cumulative counters.

use crate::error::PersistenceError;
use crate::types::EngineStats;
use std::fs::File;
use std::io::Write;
use std::path::Path;

pub fn save_stats(path: &str, stats: &EngineStats) -> Result<(), PersistenceError> {
    let json = serde_json::to_string_pretty(stats).map_err(PersistenceError::Serialize)?;
    let target = Path::new(path);
    let tmp_path = target.with_extension("tmp");

    let write_err = |source: std::io::Error| PersistenceError::Write { path: path.to_string(), source };

    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }

    let mut file = File::create(&tmp_path).map_err(write_err)?;
    file.write_all(json.as_bytes()).map_err(write_err)?;
    file.sync_all().map_err(write_err)?;
    std::fs::rename(&tmp_path, target).map_err(write_err)?;
    Ok(())
}

pub fn load_stats(path: &str) -> EngineStats {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|json| serde_json::from_str(&json).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TempPath(std::path::PathBuf);
    impl TempPath {
        fn new(name: &str) -> Self {
            let mut p = std::env::temp_dir();
            p.push(format!("base_arb_engine_stats_test_{name}_{}.json", std::process::id()));
            Self(p)
        }
        fn as_str(&self) -> String {
            self.0.to_string_lossy().to_string()
        }
    }
    impl Drop for TempPath {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
            let _ = std::fs::remove_file(self.0.with_extension("tmp"));
        }
    }

    #[test]
    fn round_trips_counters() {
        let path = TempPath::new("roundtrip");
        let mut stats = EngineStats::default();
        stats.record_cycle(150);
        stats.opportunities_found = 3;
        save_stats(&path.as_str(), &stats).unwrap();

        let reloaded = load_stats(&path.as_str());
        assert_eq!(reloaded.cycles, 1);
        assert_eq!(reloaded.opportunities_found, 3);
    }

    #[test]
    fn missing_file_yields_default() {
        let path = TempPath::new("missing");
        let stats = load_stats(&path.as_str());
        assert_eq!(stats.cycles, 0);
    }
}
