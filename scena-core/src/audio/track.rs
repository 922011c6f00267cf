//! Timeline track backed by a host audio sink
//!
//! Once a content has an audio track, the audio clock is the best time
//! source available, so [`AudioTrack`] sits above the built-in basic track
//! in priority. A sink usually arrives asynchronously (decode, fetch); the
//! track reports stuck from the moment audio is promised until the sink
//! lands, which pauses the whole timeline instead of letting picture run
//! ahead of sound.

use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use scena_timeline::{Clock, Track, TrackSample};
use tracing::debug;

use super::sink::AudioSink;

/// Future the host resolves with the decoded sink, or `None` when the
/// content turns out to have no audio after all.
pub type PendingSink = BoxFuture<'static, Option<Box<dyn AudioSink>>>;

struct AudioTrackInner {
    sink: Option<Box<dyn AudioSink>>,
    /// A sink was promised but has not arrived.
    pending: bool,
    playing: bool,
    suspended: bool,
    volume: f64,
    drift_limit_ms: f64,
}

impl AudioTrackInner {
    fn apply_transport(&mut self) {
        if let Some(sink) = &mut self.sink {
            if self.playing && !self.suspended {
                sink.play();
            } else {
                sink.pause();
            }
        }
    }
}

/// Shared control surface for an [`AudioTrack`] that already joined a
/// timeline. The owning content instance keeps the handle; the timeline
/// owns the track.
#[derive(Clone)]
pub struct AudioTrackHandle {
    inner: Arc<Mutex<AudioTrackInner>>,
}

impl AudioTrackHandle {
    /// Mark the track as waiting for a sink. The track reports stuck until
    /// [`set_sink`](AudioTrackHandle::set_sink) is called.
    pub fn mark_pending(&self) {
        self.inner.lock().unwrap().pending = true;
    }

    /// Install the resolved sink (or clear the promise with `None`).
    pub fn set_sink(&self, sink: Option<Box<dyn AudioSink>>) {
        let mut inner = self.inner.lock().unwrap();
        inner.pending = false;
        inner.sink = sink;
        let volume = inner.volume;
        if let Some(sink) = &mut inner.sink {
            sink.set_volume(volume);
        }
        inner.apply_transport();
        debug!(has_sink = inner.sink.is_some(), "audio sink settled");
    }

    pub fn set_volume(&self, volume: f64) {
        let mut inner = self.inner.lock().unwrap();
        inner.volume = volume;
        if let Some(sink) = &mut inner.sink {
            sink.set_volume(volume);
        }
    }
}

/// [`Track`] implementation that treats a host [`AudioSink`] as the time
/// source and drift-corrects it against the driving sample.
pub struct AudioTrack {
    clock: Clock,
    inner: Arc<Mutex<AudioTrackInner>>,
}

impl AudioTrack {
    /// Priority audio tracks use inside a content timeline, above the
    /// built-in basic track.
    pub const PRIORITY: i64 = 1;

    pub fn new(clock: Clock, drift_limit_ms: f64) -> (Self, AudioTrackHandle) {
        let inner = Arc::new(Mutex::new(AudioTrackInner {
            sink: None,
            pending: false,
            playing: false,
            suspended: false,
            volume: 1.0,
            drift_limit_ms,
        }));
        let handle = AudioTrackHandle {
            inner: Arc::clone(&inner),
        };
        (Self { clock, inner }, handle)
    }
}

impl Track for AudioTrack {
    fn check(&mut self) -> Option<TrackSample> {
        let mut inner = self.inner.lock().unwrap();
        let sink = inner.sink.as_mut()?;
        Some(TrackSample {
            time: Some(self.clock.now_ms()),
            progress: sink.position_ms(),
        })
    }

    fn update(&mut self, time: f64, progress: f64) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let inner = &mut *inner;
        let Some(sink) = inner.sink.as_mut() else {
            return inner.pending;
        };

        // project the driving sample to the present, then compare with
        // where the sink actually is
        let now = self.clock.now_ms();
        let target = if inner.playing && !inner.suspended {
            progress + now - time
        } else {
            progress
        };
        let current = sink.position_ms();
        if (target - current).abs() > inner.drift_limit_ms {
            debug!(target, current, "audio drifted, resyncing");
            sink.set_position_ms(target);
        }
        false
    }

    fn seek(&mut self, _time: f64, progress: f64) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(sink) = &mut inner.sink {
            sink.set_position_ms(progress);
        }
    }

    fn play(&mut self) {
        let mut inner = self.inner.lock().unwrap();
        inner.playing = true;
        inner.apply_transport();
    }

    fn pause(&mut self) {
        let mut inner = self.inner.lock().unwrap();
        inner.playing = false;
        inner.apply_transport();
    }

    fn suspend(&mut self) {
        let mut inner = self.inner.lock().unwrap();
        inner.suspended = true;
        inner.apply_transport();
    }

    fn resume(&mut self) {
        let mut inner = self.inner.lock().unwrap();
        inner.suspended = false;
        inner.apply_transport();
    }
}
