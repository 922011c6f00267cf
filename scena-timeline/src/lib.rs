//! # Scena Timeline
//!
//! Generic multi-track clock abstraction for the Scena scheduling engine.
//!
//! A [`Timeline`] coordinates the time and progress of several [`Track`]s.
//! Tracks are ordered by priority; the highest-priority track that can
//! answer [`Track::check`] drives the clock, and every other track is asked
//! to follow it once per frame via [`Track::update`]. A track that cannot
//! currently advance reports itself as *stuck*, which suspends the whole
//! timeline until every track is unstuck again.
//!
//! All times are `f64` milliseconds on a monotonic [`Clock`].

pub mod basic_track;
pub mod clock;
pub mod monitor_track;
pub mod remote_track;
pub mod timeline;
pub mod track;

pub use basic_track::BasicTrack;
pub use clock::Clock;
pub use monitor_track::MonitorTrack;
pub use remote_track::{Remote, RemoteTrack, DEFAULT_REMOTE_DRIFT_LIMIT_MS};
pub use timeline::Timeline;
pub use track::{Track, TrackSample};
