//! Bandit statistics persistence.
//!
//! Stats live in a single JSON document, loaded once at policy construction
//! and rewritten wholesale after each qualifying feedback event. The store
//! trait keeps the storage technology swappable without touching bandit
//! logic.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Running reward statistics for one action within one bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ArmStats {
    pub count: u64,
    pub reward: f64,
}

impl ArmStats {
    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.reward / self.count as f64
        }
    }
}

/// Per-bucket, per-action reward statistics: `{buckets: {bucket: {action: {count, reward}}}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BanditStats {
    #[serde(default)]
    pub buckets: HashMap<String, HashMap<String, ArmStats>>,
}

/// Load/save boundary for [`BanditStats`].
pub trait StatsStore: Send + Sync {
    /// Loads the stats document. Missing or corrupt state yields empty stats,
    /// never an error.
    fn load(&self) -> BanditStats;

    /// Persists the full stats document. Callers treat failures as
    /// best-effort durability and must not let them reach the request path.
    fn save(&self, stats: &BanditStats) -> Result<()>;
}

/// Flat-file JSON store.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default location: `$LUMA_DATA/state/bandit_stats.json`, falling back
    /// to `~/.luma/state/bandit_stats.json`.
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| ".".into());
        let base: PathBuf = std::env::var("LUMA_DATA")
            .map(Into::into)
            .unwrap_or(home.join(".luma"));
        base.join("state").join("bandit_stats.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StatsStore for JsonFileStore {
    fn load(&self) -> BanditStats {
        match fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(stats) => stats,
                Err(err) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        error = %err,
                        "corrupt bandit stats, starting empty"
                    );
                    BanditStats::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BanditStats::default(),
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "failed to read bandit stats, starting empty"
                );
                BanditStats::default()
            }
        }
    }

    fn save(&self, stats: &BanditStats) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(stats)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}
