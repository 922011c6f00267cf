//! The generic track interface

/// A time/progress sample reported by a track.
///
/// `time` is the clock timestamp (milliseconds) at which `progress` was
/// observed. A track that cannot timestamp its reading returns `time: None`
/// and the timeline substitutes the current clock reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackSample {
    pub time: Option<f64>,
    pub progress: f64,
}

/// One synchronized participant of a [`Timeline`](crate::Timeline).
///
/// Tracks are polled at frame rate while the timeline plays, so `update`
/// must be cheap and non-blocking.
pub trait Track: Send {
    /// Report the track's notion of progress, if it has one.
    ///
    /// The timeline asks tracks in priority order; the first track that
    /// answers becomes the driving time source for this frame.
    fn check(&mut self) -> Option<TrackSample>;

    /// Follow the driving track's `(time, progress)` sample.
    ///
    /// Called once per frame for every track. A track may resynchronize
    /// whatever system it fronts. Returns `true` if and only if the track
    /// is currently stuck and playback cannot meaningfully advance.
    fn update(&mut self, time: f64, progress: f64) -> bool;

    /// The timeline was seeked to `progress` (sampled at `time`).
    fn seek(&mut self, time: f64, progress: f64);

    /// The timeline started playing.
    fn play(&mut self);

    /// The timeline stopped playing.
    fn pause(&mut self);

    /// Some track reported stuck; the whole timeline is suspending.
    fn suspend(&mut self);

    /// No track is stuck anymore; the timeline is resuming.
    fn resume(&mut self);
}
