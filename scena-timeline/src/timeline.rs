//! Multi-track timeline coordination

use tracing::warn;

use crate::basic_track::BasicTrack;
use crate::clock::Clock;
use crate::track::Track;

struct TrackSlot {
    track: Box<dyn Track>,
    priority: i64,
}

/// The timeline used to coordinate time and progress across tracks.
///
/// It has no length of its own; the owner decides when playback is finished.
/// The timeline does not run its own frame loop either; the host drives
/// [`Timeline::tick`] at frame rate while the timeline is playing.
pub struct Timeline {
    clock: Clock,
    tracks: Vec<TrackSlot>,
    playing: bool,
    stuck: bool,
}

impl Timeline {
    /// Create a timeline with its built-in [`BasicTrack`] at priority 0,
    /// so there is always at least one usable time source.
    pub fn new(clock: Clock) -> Self {
        let basic = BasicTrack::new(clock.clone());
        Self {
            clock,
            tracks: vec![TrackSlot {
                track: Box::new(basic),
                priority: 0,
            }],
            playing: false,
            stuck: false,
        }
    }

    /// Is the timeline stuck by one of its tracks.
    pub fn is_stuck(&self) -> bool {
        self.stuck
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Current progress of the timeline in milliseconds.
    ///
    /// While playing, the driving track's last sample is extrapolated to
    /// the present.
    pub fn time(&mut self) -> f64 {
        let (time, progress) = self.check();
        if self.playing && !self.stuck {
            progress + self.clock.now_ms() - time
        } else {
            progress
        }
    }

    /// Seek the timeline: every track jumps to `value`.
    pub fn set_time(&mut self, value: f64) {
        let now = self.clock.now_ms();
        for slot in &mut self.tracks {
            slot.track.seek(now, value);
        }
    }

    /// Start playing. Idempotent.
    pub fn play(&mut self) {
        if self.playing {
            return;
        }
        self.playing = true;
        for slot in &mut self.tracks {
            slot.track.play();
        }
    }

    /// Stop playing. Idempotent.
    pub fn pause(&mut self) {
        if !self.playing {
            return;
        }
        self.playing = false;
        for slot in &mut self.tracks {
            slot.track.pause();
        }
    }

    /// Advance one frame: fan the driving sample out to every track and
    /// recompute the stuck flag. Returns the stuck flag.
    ///
    /// No-op while paused. Track `update` implementations must be cheap;
    /// this runs at frame rate.
    pub fn tick(&mut self) -> bool {
        if !self.playing {
            return self.stuck;
        }
        let (time, progress) = self.check();
        let mut stuck = false;
        for slot in &mut self.tracks {
            stuck |= slot.track.update(time, progress);
        }
        if self.stuck != stuck {
            self.stuck = stuck;
            if stuck {
                for slot in &mut self.tracks {
                    slot.track.suspend();
                }
            } else {
                for slot in &mut self.tracks {
                    slot.track.resume();
                }
            }
        }
        self.stuck
    }

    /// Add a track at the given priority (higher drives first).
    ///
    /// The new track is seeked to the current timeline position and brought
    /// up to the current play/suspend state before it joins the set.
    pub fn add_track(&mut self, mut track: Box<dyn Track>, priority: i64) {
        let (time, progress) = self.check();
        track.seek(time, progress);
        if self.playing {
            track.play();
        }
        if self.stuck {
            track.suspend();
        }
        self.tracks.push(TrackSlot { track, priority });
        // stable: equal priorities keep insertion order
        self.tracks.sort_by_key(|slot| std::cmp::Reverse(slot.priority));
    }

    fn check(&mut self) -> (f64, f64) {
        let now = self.clock.now_ms();
        for slot in &mut self.tracks {
            if let Some(sample) = slot.track.check() {
                return (sample.time.unwrap_or(now), sample.progress);
            }
        }
        warn!("timeline has no time source");
        (now, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor_track::MonitorTrack;
    use crate::track::TrackSample;
    use std::sync::{Arc, Mutex};

    fn init_tracing() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    /// A scripted driving track with a controllable stuck flag.
    struct ScriptedTrack {
        state: Arc<Mutex<(f64, f64, bool)>>, // (time, progress, stuck)
    }

    impl Track for ScriptedTrack {
        fn check(&mut self) -> Option<TrackSample> {
            let state = self.state.lock().unwrap();
            Some(TrackSample {
                time: Some(state.0),
                progress: state.1,
            })
        }
        fn update(&mut self, _time: f64, _progress: f64) -> bool {
            self.state.lock().unwrap().2
        }
        fn seek(&mut self, time: f64, progress: f64) {
            let mut state = self.state.lock().unwrap();
            state.0 = time;
            state.1 = progress;
        }
        fn play(&mut self) {}
        fn pause(&mut self) {}
        fn suspend(&mut self) {}
        fn resume(&mut self) {}
    }

    #[test]
    fn test_time_holds_while_paused() {
        init_tracing();
        let clock = Clock::manual(0.0);
        let mut timeline = Timeline::new(clock.clone());

        timeline.set_time(500.0);
        clock.advance(200.0);
        assert_eq!(timeline.time(), 500.0);
    }

    #[test]
    fn test_time_extrapolates_while_playing() {
        let clock = Clock::manual(0.0);
        let mut timeline = Timeline::new(clock.clone());

        timeline.play();
        timeline.set_time(500.0);
        clock.advance(200.0);
        assert_eq!(timeline.time(), 700.0);
    }

    #[test]
    fn test_higher_priority_track_drives() {
        let clock = Clock::manual(0.0);
        let mut timeline = Timeline::new(clock.clone());

        let state = Arc::new(Mutex::new((0.0, 4000.0, false)));
        timeline.add_track(
            Box::new(ScriptedTrack {
                state: Arc::clone(&state),
            }),
            1,
        );
        // add_track seeked the new track to the basic track's position;
        // push its own notion of progress afterwards
        state.lock().unwrap().1 = 4000.0;

        assert_eq!(timeline.time(), 4000.0);
    }

    #[test]
    fn test_stuck_or_over_tracks_with_suspend_resume_edges() {
        init_tracing();
        let clock = Clock::manual(0.0);
        let mut timeline = Timeline::new(clock.clone());

        let state = Arc::new(Mutex::new((0.0, 0.0, false)));
        timeline.add_track(
            Box::new(ScriptedTrack {
                state: Arc::clone(&state),
            }),
            1,
        );

        let edges: Arc<Mutex<Vec<bool>>> = Arc::new(Mutex::new(Vec::new()));
        let edge_log = Arc::clone(&edges);
        timeline.add_track(
            Box::new(MonitorTrack::new(
                Box::new(|_, _| {}),
                Box::new(move |stuck| edge_log.lock().unwrap().push(stuck)),
            )),
            i64::MIN,
        );

        timeline.play();
        assert!(!timeline.tick());

        state.lock().unwrap().2 = true;
        assert!(timeline.tick());
        assert!(timeline.is_stuck());

        state.lock().unwrap().2 = false;
        assert!(!timeline.tick());

        assert_eq!(*edges.lock().unwrap(), vec![true, false]);
    }

    #[test]
    fn test_tick_is_noop_while_paused() {
        let clock = Clock::manual(0.0);
        let mut timeline = Timeline::new(clock.clone());

        let state = Arc::new(Mutex::new((0.0, 0.0, true)));
        timeline.add_track(Box::new(ScriptedTrack { state }), 1);

        // paused: the stuck track is not consulted
        assert!(!timeline.tick());
        assert!(!timeline.is_stuck());
    }
}
