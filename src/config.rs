//! Configuration for the ledger core and the simulator.
//!
//! Loads optional `dvel.toml` from a directory. Every knob is carried
//! explicitly in a config struct and threaded through constructors; there
//! is no process-global tunable state.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants;

/// Top-level configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DvelConfig {
    pub validation: ValidationConfig,
    pub sybil: SybilConfig,
    pub node: NodeLimits,
}

/// Validation knobs.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Maximum backward timestamp skew accepted per author, in ticks.
    pub max_backward_skew: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        ValidationConfig {
            max_backward_skew: constants::DEFAULT_MAX_BACKWARD_SKEW,
        }
    }
}

/// Sybil overlay knobs.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SybilConfig {
    /// Ticks before a newly seen author carries any weight.
    pub warmup_ticks: u64,
    /// Quarantine length applied when an author equivocates.
    pub quarantine_ticks: u64,
    /// Fixed-point denominator for author weights (weight of 1.0).
    pub fixed_point_scale: u64,
    /// Ancestor-walk cap for preferred-tip selection.
    pub max_link_walk: usize,
}

impl Default for SybilConfig {
    fn default() -> Self {
        SybilConfig {
            warmup_ticks: constants::DEFAULT_WARMUP_TICKS,
            quarantine_ticks: constants::DEFAULT_QUARANTINE_TICKS,
            fixed_point_scale: constants::DEFAULT_FIXED_POINT_SCALE,
            max_link_walk: constants::DEFAULT_MAX_LINK_WALK,
        }
    }
}

/// Per-node runtime bounds.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeLimits {
    /// Dedup cache capacity (cleared wholesale when exceeded).
    pub max_seen: usize,
    /// Hard cap on events queued across all pending-parent buckets.
    pub max_pending_total: usize,
    /// Safety bound on pending-pool drain steps per inbox pass.
    pub max_drain_steps: usize,
}

impl Default for NodeLimits {
    fn default() -> Self {
        NodeLimits {
            max_seen: constants::MAX_SEEN,
            max_pending_total: constants::MAX_PENDING_TOTAL,
            max_drain_steps: constants::MAX_DRAIN_STEPS,
        }
    }
}

impl DvelConfig {
    /// Load configuration from `dvel.toml` in the given directory.
    /// Returns `Default` if the file doesn't exist or fails to parse.
    pub fn load(dir: &Path) -> Self {
        let config_path = dir.join("dvel.toml");
        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("loaded config from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!(
                        "failed to parse {}: {}, using defaults",
                        config_path.display(),
                        e
                    );
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// A configuration suited to adversarial delivery schedules: the
    /// simulator raises the skew bound so deep reordering of one author's
    /// events does not turn into permanent rejects.
    pub fn for_simulation() -> Self {
        let mut config = Self::default();
        config.validation.max_backward_skew = 1_000_000;
        config
    }
}
