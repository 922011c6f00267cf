//! Track that keeps an externally driven clock in sync

use tracing::debug;

use crate::track::{Track, TrackSample};

/// Default allowed divergence between the timeline and the remote system
/// before a corrective `sync` is issued, in milliseconds.
pub const DEFAULT_REMOTE_DRIFT_LIMIT_MS: f64 = 33.0;

/// An externally driven clock bridged by a [`RemoteTrack`].
///
/// The remote system loads and reports time asynchronously; the track only
/// sees the latest `(progress, update_time)` pair it chose to report.
pub trait Remote: Send {
    /// The latest known progress of the remote system.
    fn progress(&self) -> f64;

    /// The clock time at which that progress was reported.
    fn update_time(&self) -> f64;

    /// Is the remote system stuck.
    fn stuck(&self) -> bool;

    /// Ask the remote system to jump to `progress` (sampled at `time`).
    fn sync(&mut self, time: f64, progress: f64);

    /// Hint that the timeline started playing.
    fn play(&mut self);

    /// Hint that the timeline stopped playing.
    fn pause(&mut self);

    /// Hint that the timeline is suspended by a stuck track.
    fn suspend(&mut self);

    /// Hint that the timeline is no longer suspended.
    fn resume(&mut self);
}

/// The track used to synchronize with a remote system, like a component
/// running its own render loop.
///
/// On every frame the projected remote position is compared against the
/// driving track; when the divergence exceeds the drift limit the remote is
/// told to re-sync. The remote's stuck flag propagates to the timeline.
pub struct RemoteTrack {
    remote: Box<dyn Remote>,
    drift_limit_ms: f64,
    playing: bool,
    suspended: bool,
}

impl RemoteTrack {
    pub fn new(remote: Box<dyn Remote>, drift_limit_ms: f64) -> Self {
        Self {
            remote,
            drift_limit_ms,
            playing: false,
            suspended: false,
        }
    }
}

impl Track for RemoteTrack {
    fn check(&mut self) -> Option<TrackSample> {
        Some(TrackSample {
            time: Some(self.remote.update_time()),
            progress: self.remote.progress(),
        })
    }

    fn update(&mut self, time: f64, progress: f64) -> bool {
        let time_diff = if self.playing && !self.suspended {
            time - self.remote.update_time()
        } else {
            0.0
        };
        let diff = ((progress - self.remote.progress()) - time_diff).abs();
        if diff > self.drift_limit_ms {
            debug!(diff, progress, "remote track out of sync, correcting");
            self.remote.sync(time, progress);
        }
        self.remote.stuck()
    }

    fn seek(&mut self, time: f64, progress: f64) {
        self.remote.sync(time, progress);
    }

    fn play(&mut self) {
        self.playing = true;
        self.remote.play();
    }

    fn pause(&mut self) {
        self.playing = false;
        self.remote.pause();
    }

    fn suspend(&mut self) {
        self.suspended = true;
        self.remote.suspend();
    }

    fn resume(&mut self) {
        self.suspended = false;
        self.remote.resume();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default, Clone)]
    struct FakeRemoteState {
        progress: f64,
        update_time: f64,
        stuck: bool,
        syncs: Vec<(f64, f64)>,
    }

    #[derive(Clone, Default)]
    struct FakeRemote(Arc<Mutex<FakeRemoteState>>);

    impl Remote for FakeRemote {
        fn progress(&self) -> f64 {
            self.0.lock().unwrap().progress
        }
        fn update_time(&self) -> f64 {
            self.0.lock().unwrap().update_time
        }
        fn stuck(&self) -> bool {
            self.0.lock().unwrap().stuck
        }
        fn sync(&mut self, time: f64, progress: f64) {
            let mut state = self.0.lock().unwrap();
            state.syncs.push((time, progress));
            state.update_time = time;
            state.progress = progress;
        }
        fn play(&mut self) {}
        fn pause(&mut self) {}
        fn suspend(&mut self) {}
        fn resume(&mut self) {}
    }

    #[test]
    fn test_no_sync_within_drift_limit() {
        let remote = FakeRemote::default();
        let handle = remote.clone();
        let mut track = RemoteTrack::new(Box::new(remote), DEFAULT_REMOTE_DRIFT_LIMIT_MS);

        track.play();
        {
            let mut state = handle.0.lock().unwrap();
            state.progress = 100.0;
            state.update_time = 0.0;
        }

        // timeline 20ms ahead after 0ms elapsed: within 33ms, no sync
        assert!(!track.update(0.0, 120.0));
        assert!(handle.0.lock().unwrap().syncs.is_empty());
    }

    #[test]
    fn test_sync_issued_beyond_drift_limit() {
        let remote = FakeRemote::default();
        let handle = remote.clone();
        let mut track = RemoteTrack::new(Box::new(remote), DEFAULT_REMOTE_DRIFT_LIMIT_MS);

        track.play();
        {
            let mut state = handle.0.lock().unwrap();
            state.progress = 100.0;
            state.update_time = 0.0;
        }

        assert!(!track.update(0.0, 200.0));
        let state = handle.0.lock().unwrap();
        assert_eq!(state.syncs, vec![(0.0, 200.0)]);
    }

    #[test]
    fn test_elapsed_time_is_credited_while_playing() {
        let remote = FakeRemote::default();
        let handle = remote.clone();
        let mut track = RemoteTrack::new(Box::new(remote), DEFAULT_REMOTE_DRIFT_LIMIT_MS);

        track.play();
        {
            let mut state = handle.0.lock().unwrap();
            state.progress = 100.0;
            state.update_time = 0.0;
        }

        // 100ms later the remote should itself have advanced ~100ms, so a
        // driving progress of 200 is a divergence of 0, not 100.
        assert!(!track.update(100.0, 200.0));
        assert!(handle.0.lock().unwrap().syncs.is_empty());
    }

    #[test]
    fn test_stuck_flag_propagates() {
        let remote = FakeRemote::default();
        let handle = remote.clone();
        let mut track = RemoteTrack::new(Box::new(remote), DEFAULT_REMOTE_DRIFT_LIMIT_MS);

        handle.0.lock().unwrap().stuck = true;
        assert!(track.update(0.0, 0.0));
    }
}
