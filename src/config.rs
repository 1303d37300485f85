use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::report::DEFAULT_BINS;
use crate::stats::{Bounds, DEFAULT_RELATIONS, StatsConfig};

/// Application configuration loaded from TOML config file.
/// All fields have sensible defaults — the config file is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Keep one series per file (true) or only the latest file (false).
    pub aggregated: bool,
    /// Extend note durations through sustain-pedal ranges.
    pub pedal: bool,
    /// Number of parallel decode workers. 0 = auto-detect (cores / 2, min 1).
    pub workers: usize,
    /// Histogram bins per report.
    pub histogram_bins: usize,
    /// Expected ratios between consecutive IOI / duration values, in tie-break order.
    pub relations: Vec<f64>,
    /// Inclusive IOI window (ms).
    pub attack: Bounds,
    /// Inclusive duration window (ms).
    pub duration: Bounds,
}

impl Default for AppConfig {
    fn default() -> Self {
        let stats = StatsConfig::default();
        Self {
            aggregated: stats.aggregated,
            pedal: true,
            workers: 0,
            histogram_bins: DEFAULT_BINS,
            relations: DEFAULT_RELATIONS.to_vec(),
            attack: stats.attack,
            duration: stats.duration,
        }
    }
}

impl AppConfig {
    /// Load config from `~/.config/midistat/config.toml`.
    /// Returns default config if file doesn't exist.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Load config from an explicit path.
    /// Logs a warning and falls back to defaults if it can't be read or parsed.
    pub fn load_from(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                return Self::default();
            }
        };
        match toml::from_str::<AppConfig>(&contents) {
            Ok(config) => {
                log::info!("Loaded config from {}", path.display());
                config.sanitized()
            }
            Err(e) => {
                log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                Self::default()
            }
        }
    }

    /// Drop non-positive relations; an empty list falls back to the defaults.
    fn sanitized(mut self) -> Self {
        let before = self.relations.len();
        self.relations.retain(|r| r.is_finite() && *r > 0.0);
        if self.relations.len() != before {
            log::warn!("Ignoring {} non-positive relations", before - self.relations.len());
        }
        if self.relations.is_empty() {
            self.relations = DEFAULT_RELATIONS.to_vec();
        }
        self
    }

    /// Resolve worker count: 0 → auto-detect (cores / 2, min 1).
    pub fn resolve_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            let cores = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2);
            (cores / 2).max(1)
        }
    }

    pub fn stats_config(&self) -> StatsConfig {
        StatsConfig {
            aggregated: self.aggregated,
            attack: self.attack,
            duration: self.duration,
            relations: self.relations.clone(),
        }
    }

    /// Get the config file path.
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}
