//! # Scena Core
//!
//! Content-scheduling and timeline-synchronization engine for segmented
//! interactive multimedia episodes.
//!
//! An episode is an ordered list of heterogeneous content units (video,
//! interactive widgets, audio-only segments) that must be preloaded,
//! shown, played and torn down under strict ordering and barrier rules,
//! while nested subsequences and cross-cutting time-triggered state
//! (subtitles, music cues, pause markers) stay consistent with one
//! authoritative clock.
//!
//! The engine renders nothing itself. Hosts register [`Component`]
//! implementations (renderers, mixers, overlays), inject episode data into
//! an [`EpisodeCore`], and drive everything with a fixed-rate
//! [`EpisodeCore::tick`]. Components call back through the [`CoreHandle`]
//! they receive at registration.
//!
//! ```no_run
//! use std::sync::Arc;
//! use scena_core::{Component, EpisodeCore, EpisodeCoreConfig, EpisodeData};
//!
//! struct Stage;
//! impl Component for Stage {}
//!
//! # fn episode_data() -> EpisodeData { EpisodeData { assets: vec![] } }
//! let core = EpisodeCore::new(EpisodeCoreConfig::default());
//! let handle = core.register_component("stage", Arc::new(Stage));
//! core.initialize_episode(episode_data()).unwrap();
//! // host render loop:
//! core.tick();
//! ```

pub mod audio;
pub mod component;
pub mod config;
pub mod episode;
pub mod error;
pub mod events;
pub mod instance;
pub mod managed_state;
pub mod sequence;
pub mod signal;
pub mod subsequence;
pub mod task_queue;
pub mod types;

mod context;

pub use audio::{AudioHost, AudioSink, AudioTrack, AudioTrackHandle, PendingSink};
pub use component::{Component, ComponentRegistry};
pub use config::{EpisodeCoreConfig, SyncConfig};
pub use episode::{AudioRequest, CoreHandle, EpisodeCore};
pub use error::{Error, Result};
pub use events::SequenceEvent;
pub use instance::ContentInstance;
pub use managed_state::{
    ManagedCoreState, ManagedCoreStateList, ManagedCoreStateManager, PointTriggerEvent,
    StateTrigger, UpdateReason, PAUSE_TRIGGER_EXTENSION_ID,
};
pub use sequence::ContentSequence;
pub use signal::{Signal, SignalState};
pub use subsequence::SubsequenceManager;
pub use task_queue::{ExecutionQueue, ImmediateExecutionQueue, QueuedTask, TaskQueueManager};
pub use types::{
    Asset, ContentSpec, ContentState, CoreState, EpisodeData, InitialAssetStatus, Progress,
};
