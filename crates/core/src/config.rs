//! Engine configuration via `terrace.toml`
//!
//! A config file lives in the data directory. On first open a default file
//! is written; to change settings, edit the file and restart. Programmatic
//! overrides go through the engine's open options.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Config file name placed in the database data directory.
pub const CONFIG_FILE_NAME: &str = "terrace.toml";

/// When timeline appends reach disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurabilityLevel {
    /// fsync on every commit append. Slow, loses nothing.
    Strict,
    /// Flush on every append, fsync periodically. The default.
    #[default]
    Batched,
}

/// Engine configuration.
///
/// # Example
///
/// ```toml
/// hot_tier_max_age_seconds = 604800
/// warm_tier_max_age_seconds = 2592000
/// min_compaction_size_bytes = 1048576
/// max_blocks_per_compaction = 10
/// result_cache_max_entries = 100
/// result_cache_max_age_seconds = 3600
/// durability = "batched"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Age at which HOT blocks are promoted to WARM.
    pub hot_tier_max_age_seconds: u64,
    /// Age at which WARM blocks are promoted to COLD.
    pub warm_tier_max_age_seconds: u64,
    /// Minimum target size for merged blocks.
    pub min_compaction_size_bytes: u64,
    /// Upper bound on blocks merged in one compaction pass.
    pub max_blocks_per_compaction: usize,
    /// Result cache entry bound (LRU).
    pub result_cache_max_entries: usize,
    /// Result cache entry TTL.
    pub result_cache_max_age_seconds: u64,
    /// Oldest snapshot age before automatic release.
    pub snapshot_retention_seconds: u64,
    /// Commits older than this (and below the oldest live snapshot) are
    /// eligible for timeline segment compaction.
    pub timeline_retention_seconds: u64,
    /// Background compaction cadence.
    pub compaction_interval_seconds: u64,
    /// HOT tier size trigger for compaction.
    pub hot_tier_max_bytes: u64,
    /// WARM tier size trigger for compaction.
    pub warm_tier_max_bytes: u64,
    /// Window for the per-table read/write workload counters.
    pub workload_window_seconds: u64,
    /// Row count above which the planner considers a parallel scan.
    pub parallel_scan_threshold_rows: u64,
    /// Ceiling on the planner-selected parallel degree.
    pub max_parallel_degree: usize,
    /// Timeline append durability.
    pub durability: DurabilityLevel,
    /// Accepted for compatibility; the core engine ignores it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jit_call_threshold: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hot_tier_max_age_seconds: 7 * 86_400,
            warm_tier_max_age_seconds: 30 * 86_400,
            min_compaction_size_bytes: 1024 * 1024,
            max_blocks_per_compaction: 10,
            result_cache_max_entries: 100,
            result_cache_max_age_seconds: 3600,
            snapshot_retention_seconds: 30 * 86_400,
            timeline_retention_seconds: 30 * 86_400,
            compaction_interval_seconds: 3600,
            hot_tier_max_bytes: 64 * 1024 * 1024,
            warm_tier_max_bytes: 256 * 1024 * 1024,
            workload_window_seconds: 300,
            parallel_scan_threshold_rows: 10_000,
            max_parallel_degree: 4,
            durability: DurabilityLevel::Batched,
            jit_call_threshold: None,
        }
    }
}

impl EngineConfig {
    /// Load config from `dir/terrace.toml`, writing the defaults on first
    /// open.
    ///
    /// # Errors
    ///
    /// `Config` if the file cannot be parsed or fails validation.
    pub fn load_or_create(dir: impl AsRef<Path>) -> Result<Self> {
        let path = dir.as_ref().join(CONFIG_FILE_NAME);
        let config = if path.exists() {
            let text = fs::read_to_string(&path)?;
            toml::from_str(&text).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?
        } else {
            let config = Self::default();
            let text = toml::to_string_pretty(&config)
                .map_err(|e| Error::Config(e.to_string()))?;
            fs::write(&path, text)?;
            config
        };
        config.validate()?;
        Ok(config)
    }

    /// Check option ranges. Surfaced at initialization, never later.
    pub fn validate(&self) -> Result<()> {
        if self.hot_tier_max_age_seconds == 0 {
            return Err(Error::Config("hot_tier_max_age_seconds must be > 0".into()));
        }
        if self.warm_tier_max_age_seconds <= self.hot_tier_max_age_seconds {
            return Err(Error::Config(
                "warm_tier_max_age_seconds must exceed hot_tier_max_age_seconds".into(),
            ));
        }
        if self.min_compaction_size_bytes == 0 {
            return Err(Error::Config("min_compaction_size_bytes must be > 0".into()));
        }
        if self.max_blocks_per_compaction < 2 {
            return Err(Error::Config("max_blocks_per_compaction must be >= 2".into()));
        }
        if self.result_cache_max_entries == 0 {
            return Err(Error::Config("result_cache_max_entries must be > 0".into()));
        }
        if self.max_parallel_degree == 0 {
            return Err(Error::Config("max_parallel_degree must be > 0".into()));
        }
        Ok(())
    }

    /// HOT promotion threshold in engine microseconds.
    pub fn hot_tier_max_age_micros(&self) -> i64 {
        self.hot_tier_max_age_seconds as i64 * 1_000_000
    }

    /// WARM promotion threshold in engine microseconds.
    pub fn warm_tier_max_age_micros(&self) -> i64 {
        self.warm_tier_max_age_seconds as i64 * 1_000_000
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_documented_values() {
        let c = EngineConfig::default();
        assert_eq!(c.hot_tier_max_age_seconds, 7 * 86_400);
        assert_eq!(c.warm_tier_max_age_seconds, 30 * 86_400);
        assert_eq!(c.min_compaction_size_bytes, 1024 * 1024);
        assert_eq!(c.max_blocks_per_compaction, 10);
        assert_eq!(c.result_cache_max_entries, 100);
        assert_eq!(c.result_cache_max_age_seconds, 3600);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn first_open_writes_default_file() {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig::load_or_create(dir.path()).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(dir.path().join(CONFIG_FILE_NAME).exists());

        // Second open reads the same file back.
        let again = EngineConfig::load_or_create(dir.path()).unwrap();
        assert_eq!(again, config);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "max_blocks_per_compaction = 5\n",
        )
        .unwrap();
        let config = EngineConfig::load_or_create(dir.path()).unwrap();
        assert_eq!(config.max_blocks_per_compaction, 5);
        assert_eq!(config.result_cache_max_entries, 100);
    }

    #[test]
    fn unknown_jit_option_is_accepted() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "jit_call_threshold = 50\n",
        )
        .unwrap();
        let config = EngineConfig::load_or_create(dir.path()).unwrap();
        assert_eq!(config.jit_call_threshold, Some(50));
    }

    #[test]
    fn invalid_values_surface_config_error() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "result_cache_max_entries = 0\n",
        )
        .unwrap();
        assert!(matches!(
            EngineConfig::load_or_create(dir.path()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn malformed_toml_surfaces_config_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), "not toml [").unwrap();
        assert!(matches!(
            EngineConfig::load_or_create(dir.path()),
            Err(Error::Config(_))
        ));
    }
}
