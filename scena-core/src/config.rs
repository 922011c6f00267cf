//! Core configuration
//!
//! All knobs are plain serde structs so hosts can load them from TOML or
//! JSON, or build them in code. Every field has a sensible default; an
//! empty config is a valid config.

use serde::{Deserialize, Serialize};

use crate::types::InitialAssetStatus;

/// Timing thresholds for drift correction and trigger handling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Projected drift (milliseconds) beyond which a remote or audio time
    /// source is hard-resynced instead of left to converge.
    pub drift_resync_threshold_ms: f64,

    /// How far past a pause trigger's time playback may land before the
    /// core seeks back to just after the trigger.
    pub pause_overshoot_threshold_ms: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            drift_resync_threshold_ms: 33.0,
            pause_overshoot_threshold_ms: 33.0,
        }
    }
}

/// Configuration for one [`EpisodeCore`](crate::episode::EpisodeCore).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EpisodeCoreConfig {
    /// Identifier of the episode this core will play.
    pub episode_id: String,

    /// Where the main sequence starts.
    pub initial_asset_status: InitialAssetStatus,

    /// Try to start playback as soon as the first instance is ready.
    pub attempt_autoplay: bool,

    /// Name of the component the core must wait for before it starts
    /// loading anything (usually the stage renderer). `None` skips the
    /// wait.
    pub critical_component: Option<String>,

    /// Initial volume, 0.0..=1.0.
    pub volume: f64,

    pub sync: SyncConfig,
}

impl Default for EpisodeCoreConfig {
    fn default() -> Self {
        Self {
            episode_id: String::new(),
            initial_asset_status: InitialAssetStatus::default(),
            attempt_autoplay: false,
            critical_component: None,
            volume: 1.0,
            sync: SyncConfig::default(),
        }
    }
}
