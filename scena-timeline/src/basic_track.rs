//! Fallback time source backed by the plain clock

use crate::clock::Clock;
use crate::track::{Track, TrackSample};

/// A basic track that keeps time with the monotonic clock.
///
/// Every timeline owns one at priority 0 so there is always a usable time
/// source even before any component or audio reports in. While playing and
/// not suspended it extrapolates progress from the clock; otherwise it
/// holds the last known progress.
#[derive(Debug)]
pub struct BasicTrack {
    clock: Clock,
    last_update_time: f64,
    progress: f64,
    playing: bool,
    suspended: bool,
}

impl BasicTrack {
    pub fn new(clock: Clock) -> Self {
        let now = clock.now_ms();
        Self {
            clock,
            last_update_time: now,
            progress: 0.0,
            playing: false,
            suspended: false,
        }
    }
}

impl Track for BasicTrack {
    fn check(&mut self) -> Option<TrackSample> {
        Some(TrackSample {
            time: Some(self.last_update_time),
            progress: self.progress,
        })
    }

    fn update(&mut self, time: f64, progress: f64) -> bool {
        self.seek(time, progress);
        false
    }

    fn seek(&mut self, time: f64, progress: f64) {
        let now = self.clock.now_ms();
        if self.playing && !self.suspended {
            self.progress = progress + now - time;
        } else {
            self.progress = progress;
        }
        self.last_update_time = now;
    }

    fn play(&mut self) {
        self.playing = true;
        self.last_update_time = self.clock.now_ms();
    }

    fn pause(&mut self) {
        let now = self.clock.now_ms();
        if self.playing && !self.suspended {
            self.progress += now - self.last_update_time;
        }
        self.last_update_time = now;
        self.playing = false;
    }

    fn suspend(&mut self) {
        let now = self.clock.now_ms();
        if self.playing && !self.suspended {
            self.progress += now - self.last_update_time;
        }
        self.last_update_time = now;
        self.suspended = true;
    }

    fn resume(&mut self) {
        self.suspended = false;
        self.last_update_time = self.clock.now_ms();
    }
}
