//! Track that reports timeline state outward

use crate::track::{Track, TrackSample};

/// Callback invoked with `(time, progress)` on every frame and seek.
pub type UpdateFn = Box<dyn FnMut(f64, f64) + Send>;

/// Callback invoked with the new stuck flag on suspend/resume edges.
pub type StuckChangeFn = Box<dyn FnMut(bool) + Send>;

/// The track used to subscribe to state changes on a timeline.
///
/// Never a time source (`check` returns `None`); registered at the lowest
/// priority so it observes the settled frame. Useful to drive progress
/// reporting and visual state.
pub struct MonitorTrack {
    on_update: UpdateFn,
    on_stuck_change: StuckChangeFn,
}

impl MonitorTrack {
    pub fn new(on_update: UpdateFn, on_stuck_change: StuckChangeFn) -> Self {
        Self {
            on_update,
            on_stuck_change,
        }
    }
}

impl Track for MonitorTrack {
    fn check(&mut self) -> Option<TrackSample> {
        None
    }

    fn update(&mut self, time: f64, progress: f64) -> bool {
        (self.on_update)(time, progress);
        false
    }

    fn seek(&mut self, time: f64, progress: f64) {
        (self.on_update)(time, progress);
    }

    fn play(&mut self) {}

    fn pause(&mut self) {}

    fn suspend(&mut self) {
        (self.on_stuck_change)(true);
    }

    fn resume(&mut self) {
        (self.on_stuck_change)(false);
    }
}
