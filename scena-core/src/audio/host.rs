//! Standalone named audio sources
//!
//! Interface sounds, ambience loops and voice-overs play outside any
//! content timeline. [`AudioHost`] keeps them by name, applies the master
//! volume, runs linear fades, and feeds each source's subtitle triggers
//! into the shared managed state manager.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use scena_timeline::Clock;
use tracing::debug;

use super::sink::AudioSink;
use crate::managed_state::{
    ManagedCoreStateList, ManagedCoreStateManager, StateTrigger, UpdateReason,
};

struct Fade {
    from: f64,
    to: f64,
    start_ms: f64,
    duration_ms: f64,
}

struct AudioSource {
    sink: Box<dyn AudioSink>,
    volume: f64,
    fade: Option<Fade>,
    subtitles: Option<Arc<Mutex<ManagedCoreStateList>>>,
}

/// Named audio sources playing outside the content timelines.
pub struct AudioHost {
    clock: Clock,
    master_volume: Mutex<f64>,
    sources: Mutex<HashMap<String, AudioSource>>,
    state_manager: Arc<ManagedCoreStateManager>,
}

impl AudioHost {
    pub fn new(clock: Clock, state_manager: Arc<ManagedCoreStateManager>) -> Self {
        Self {
            clock,
            master_volume: Mutex::new(1.0),
            sources: Mutex::new(HashMap::new()),
            state_manager,
        }
    }

    /// Register a source under `name`, replacing any source already there.
    /// Subtitle triggers, if given, join the shared managed state union for
    /// as long as the source lives.
    pub fn add(
        &self,
        name: &str,
        mut sink: Box<dyn AudioSink>,
        subtitle_triggers: Option<Vec<StateTrigger>>,
    ) {
        let subtitles = subtitle_triggers.map(|triggers| {
            let list = Arc::new(Mutex::new(ManagedCoreStateList::new(Some(triggers))));
            self.state_manager.register_list(&list);
            list
        });
        sink.set_volume(*self.master_volume.lock().unwrap());
        debug!(name, "adding audio source");
        let replaced = self.sources.lock().unwrap().insert(
            name.to_owned(),
            AudioSource {
                sink,
                volume: 1.0,
                fade: None,
                subtitles,
            },
        );
        if let Some(replaced) = replaced {
            self.drop_source(replaced);
        }
    }

    pub fn play(&self, name: &str) {
        if let Some(source) = self.sources.lock().unwrap().get_mut(name) {
            source.sink.play();
        }
    }

    pub fn pause(&self, name: &str) {
        if let Some(source) = self.sources.lock().unwrap().get_mut(name) {
            source.sink.pause();
        }
    }

    /// Remove the source entirely, pausing it and retiring its subtitles.
    pub fn stop(&self, name: &str) {
        let source = self.sources.lock().unwrap().remove(name);
        if let Some(mut source) = source {
            debug!(name, "stopping audio source");
            source.sink.pause();
            self.drop_source(source);
        }
    }

    pub fn seek(&self, name: &str, position_ms: f64) {
        if let Some(source) = self.sources.lock().unwrap().get_mut(name) {
            source.sink.set_position_ms(position_ms);
            if let Some(list) = &source.subtitles {
                let outcome = list.lock().unwrap().seek(position_ms, UpdateReason::Seek);
                self.state_manager.dispatch_edges(outcome.fired);
            }
        }
    }

    pub fn set_volume(&self, name: &str, volume: f64) {
        let master = *self.master_volume.lock().unwrap();
        if let Some(source) = self.sources.lock().unwrap().get_mut(name) {
            source.volume = volume;
            source.fade = None;
            source.sink.set_volume(master * volume);
        }
    }

    pub fn set_loop(&self, name: &str, looped: bool) {
        if let Some(source) = self.sources.lock().unwrap().get_mut(name) {
            source.sink.set_loop(looped);
        }
    }

    /// Start a linear fade of the source's own volume towards `target`.
    pub fn fade_to(&self, name: &str, target: f64, duration_ms: f64) {
        let now = self.clock.now_ms();
        if let Some(source) = self.sources.lock().unwrap().get_mut(name) {
            source.fade = Some(Fade {
                from: source.volume,
                to: target,
                start_ms: now,
                duration_ms: duration_ms.max(0.0),
            });
        }
    }

    /// Master multiplier applied on top of every source's own volume.
    pub fn set_master_volume(&self, volume: f64) {
        *self.master_volume.lock().unwrap() = volume;
        for source in self.sources.lock().unwrap().values_mut() {
            source.sink.set_volume(volume * source.volume);
        }
    }

    /// Advance fades and subtitle positions. Driven from the core tick.
    pub fn tick(&self) {
        let now = self.clock.now_ms();
        let master = *self.master_volume.lock().unwrap();
        let mut fired = Vec::new();
        {
            let mut sources = self.sources.lock().unwrap();
            for source in sources.values_mut() {
                if let Some(fade) = &source.fade {
                    let t = if fade.duration_ms <= 0.0 {
                        1.0
                    } else {
                        ((now - fade.start_ms) / fade.duration_ms).clamp(0.0, 1.0)
                    };
                    source.volume = fade.from + (fade.to - fade.from) * t;
                    source.sink.set_volume(master * source.volume);
                    if t >= 1.0 {
                        source.fade = None;
                    }
                }
                if source.sink.is_playing() {
                    if let Some(list) = &source.subtitles {
                        let position = source.sink.position_ms();
                        let outcome = list.lock().unwrap().seek(position, UpdateReason::Tick);
                        fired.extend(outcome.fired);
                    }
                }
            }
        }
        self.state_manager.dispatch_edges(fired);
    }

    /// Pause every source and drop them all. Used on core teardown.
    pub fn destroy(&self) {
        let sources: Vec<AudioSource> = self.sources.lock().unwrap().drain().map(|(_, s)| s).collect();
        for mut source in sources {
            source.sink.pause();
            self.drop_source(source);
        }
    }

    fn drop_source(&self, source: AudioSource) {
        if let Some(list) = &source.subtitles {
            let id = list.lock().unwrap().id();
            self.state_manager.unregister_list(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeSink {
        playing: bool,
        position: f64,
        volume: Arc<Mutex<f64>>,
    }

    impl AudioSink for FakeSink {
        fn play(&mut self) {
            self.playing = true;
        }
        fn pause(&mut self) {
            self.playing = false;
        }
        fn is_playing(&self) -> bool {
            self.playing
        }
        fn position_ms(&mut self) -> f64 {
            self.position
        }
        fn set_position_ms(&mut self, position: f64) {
            self.position = position;
        }
        fn set_volume(&mut self, volume: f64) {
            *self.volume.lock().unwrap() = volume;
        }
    }

    fn fake_sink() -> (Box<dyn AudioSink>, Arc<Mutex<f64>>) {
        let volume = Arc::new(Mutex::new(1.0));
        (
            Box::new(FakeSink {
                playing: false,
                position: 0.0,
                volume: Arc::clone(&volume),
            }),
            volume,
        )
    }

    #[test]
    fn test_master_volume_multiplies_source_volume() {
        let host = AudioHost::new(Clock::manual(0.0), Arc::new(ManagedCoreStateManager::new()));
        let (sink, volume) = fake_sink();
        host.add("click", sink, None);

        host.set_volume("click", 0.5);
        host.set_master_volume(0.4);
        assert!((*volume.lock().unwrap() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_linear_fade_reaches_target_and_clears() {
        let clock = Clock::manual(0.0);
        let host = AudioHost::new(clock.clone(), Arc::new(ManagedCoreStateManager::new()));
        let (sink, volume) = fake_sink();
        host.add("bgm", sink, None);

        host.fade_to("bgm", 0.0, 1000.0);
        clock.advance(500.0);
        host.tick();
        assert!((*volume.lock().unwrap() - 0.5).abs() < 1e-9);

        clock.advance(600.0);
        host.tick();
        assert_eq!(*volume.lock().unwrap(), 0.0);
        assert!(host.sources.lock().unwrap().get("bgm").unwrap().fade.is_none());
    }

    #[test]
    fn test_stop_retires_subtitles_from_union() {
        let manager = Arc::new(ManagedCoreStateManager::new());
        let host = AudioHost::new(Clock::manual(0.0), Arc::clone(&manager));
        let (sink, _) = fake_sink();
        host.add(
            "vo",
            sink,
            Some(vec![StateTrigger::Range {
                id: "line1".to_owned(),
                extension_id: "subtitle".to_owned(),
                from: 0.0,
                to: 5000.0,
                spec: serde_json::Value::Null,
            }]),
        );
        host.play("vo");
        host.seek("vo", 100.0);
        host.tick();
        assert_eq!(manager.states_by_type("subtitle").len(), 1);

        host.stop("vo");
        assert!(manager.states_by_type("subtitle").is_empty());
    }
}
