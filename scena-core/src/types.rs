//! Shared data model types

use serde::{Deserialize, Serialize};

/// Opaque content payload handed through to components untouched.
pub type ContentSpec = serde_json::Value;

/// One schedulable unit in an episode's timeline (video, interactive
/// widget, audio-only segment).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,

    /// Duration in milliseconds; `None` means open-ended (the segment only
    /// ends when its component calls `finish_itself`). Open-ended segments
    /// are excluded from the sequence duration sum.
    pub duration: Option<f64>,

    pub spec: ContentSpec,

    /// Skip opportunistic preloading of this asset.
    #[serde(default)]
    pub preload_disabled: bool,

    /// Tear the outgoing instance down before the incoming one is created,
    /// instead of after the visible swap.
    #[serde(default)]
    pub early_destroy_on_switch: bool,
}

/// Everything the core needs to know about one episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeData {
    pub assets: Vec<Asset>,
}

/// Where playback should begin when the sequence starts.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct InitialAssetStatus {
    /// Segment index to start at.
    #[serde(default)]
    pub order: usize,

    /// Time within that segment, milliseconds.
    #[serde(default)]
    pub time: f64,
}

/// Current playback position of a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Ordinal of the current content within the sequence.
    pub segment: usize,

    /// Time within that segment, milliseconds.
    pub progress: f64,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            segment: 0,
            progress: 0.0,
        }
    }
}

/// Lifecycle state of a content instance.
///
/// Once `Destroyed`, permanently terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentState {
    Idle,
    Preloading,
    Ready,
    Destroying,
    Destroyed,
}

impl std::fmt::Display for ContentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentState::Idle => write!(f, "idle"),
            ContentState::Preloading => write!(f, "preloading"),
            ContentState::Ready => write!(f, "ready"),
            ContentState::Destroying => write!(f, "destroying"),
            ContentState::Destroyed => write!(f, "destroyed"),
        }
    }
}

/// Top-level state of the episode core facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CoreState {
    WaitingForCriticalComponent,
    WaitingForEpisodeData,
    WaitingForResource,
    Working,
    Panic,
    Destroying,
    Destroyed,
}

impl std::fmt::Display for CoreState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoreState::WaitingForCriticalComponent => write!(f, "waitingForCriticalComponent"),
            CoreState::WaitingForEpisodeData => write!(f, "waitingForEpisodeData"),
            CoreState::WaitingForResource => write!(f, "waitingForResource"),
            CoreState::Working => write!(f, "working"),
            CoreState::Panic => write!(f, "panic"),
            CoreState::Destroying => write!(f, "destroying"),
            CoreState::Destroyed => write!(f, "destroyed"),
        }
    }
}
