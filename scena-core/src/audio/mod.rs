//! Audio integration
//!
//! The core never touches a sound device. Hosts hand it [`AudioSink`]
//! implementations (a rodio sink, a web audio node, a test double) and the
//! core drives them: [`AudioTrack`] slaves one sink to a content
//! timeline, [`AudioHost`] plays named sinks outside any timeline.

mod host;
mod sink;
mod track;

pub use host::AudioHost;
pub use sink::AudioSink;
pub use track::{AudioTrack, AudioTrackHandle, PendingSink};
