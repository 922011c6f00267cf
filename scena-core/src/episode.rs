//! Episode core facade
//!
//! [`EpisodeCore`] owns the main sequence, the audio host and the shared
//! context, and is the only surface hosts and components talk to. Hosts
//! drive it with a fixed-rate [`tick`](EpisodeCore::tick) and register
//! components; each registration returns a [`CoreHandle`] carrying every
//! scheduler-issued function that component may call back with.
//!
//! Startup is a barrier of its own: the core waits for the critical
//! component (if one is configured) and for episode data before the first
//! switch begins, then reports `WaitingForResource` until the first
//! instance is ready.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::watch;
use tracing::{info, warn};

use crate::audio::{AudioHost, AudioSink, PendingSink};
use crate::component::Component;
use crate::config::EpisodeCoreConfig;
use crate::context::SharedContext;
use crate::error::{Error, Result};
use crate::managed_state::{ManagedCoreState, StateTrigger, PAUSE_TRIGGER_EXTENSION_ID};
use crate::sequence::ContentSequence;
use crate::task_queue::{ExecutionQueue, ImmediateExecutionQueue, QueuedTask};
use crate::types::{ContentState, CoreState, EpisodeData};

use scena_timeline::Clock;

/// One named audio source to install, with optional subtitle triggers.
pub struct AudioRequest {
    pub name: String,
    pub sink: Box<dyn AudioSink>,
    pub subtitle_triggers: Option<Vec<StateTrigger>>,
}

struct CoreInner {
    config: EpisodeCoreConfig,
    ctx: Arc<SharedContext>,
    audio_host: AudioHost,
    state_tx: watch::Sender<CoreState>,
    main_sequence: Mutex<Option<Arc<ContentSequence>>>,
    episode_data_set: AtomicBool,
    critical_registered: AtomicBool,
    started: AtomicBool,
    destroyed: AtomicBool,
    panic_reason: Mutex<Option<String>>,
}

pub struct EpisodeCore {
    inner: Arc<CoreInner>,
}

impl EpisodeCore {
    pub fn new(config: EpisodeCoreConfig) -> Self {
        Self::with_parts(config, Clock::monotonic(), Arc::new(ImmediateExecutionQueue))
    }

    /// Construct with an explicit clock and execution queue. Tests use a
    /// manual clock; hosts with their own scheduling substitute the queue.
    pub fn with_parts(
        config: EpisodeCoreConfig,
        clock: Clock,
        queue: Arc<dyn ExecutionQueue>,
    ) -> Self {
        let ctx = Arc::new(SharedContext {
            registry: Default::default(),
            clock: clock.clone(),
            sync: config.sync,
            state_manager: Arc::new(Default::default()),
            instances: Mutex::new(Default::default()),
            showing_content_count: Default::default(),
            queue,
            sequences: Mutex::new(Vec::new()),
        });
        let audio_host = AudioHost::new(clock, Arc::clone(&ctx.state_manager));
        let initial_state = if config.critical_component.is_some() {
            CoreState::WaitingForCriticalComponent
        } else {
            CoreState::WaitingForEpisodeData
        };
        info!(episode = %config.episode_id, "episode core created");
        Self {
            inner: Arc::new(CoreInner {
                config,
                ctx,
                audio_host,
                state_tx: watch::channel(initial_state).0,
                main_sequence: Mutex::new(None),
                episode_data_set: AtomicBool::new(false),
                critical_registered: AtomicBool::new(false),
                started: AtomicBool::new(false),
                destroyed: AtomicBool::new(false),
                panic_reason: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> CoreState {
        *self.inner.state_tx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<CoreState> {
        self.inner.state_tx.subscribe()
    }

    /// The main sequence, once episode data has been injected.
    pub fn sequence(&self) -> Option<Arc<ContentSequence>> {
        self.inner.main_sequence.lock().unwrap().clone()
    }

    /// Why the core entered `Panic`, if it did.
    pub fn panic_reason(&self) -> Option<String> {
        self.inner.panic_reason.lock().unwrap().clone()
    }

    /// Register a component under `name` and hand it its callback surface.
    pub fn register_component(&self, name: &str, component: Arc<dyn Component>) -> CoreHandle {
        self.inner.ctx.registry.insert(name, component);
        info!(component = name, "component registered");
        if self.inner.config.critical_component.as_deref() == Some(name) {
            self.inner.critical_registered.store(true, Ordering::SeqCst);
            self.inner.maybe_start();
        }
        CoreHandle {
            name: name.to_owned(),
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Remove a component. Its barrier holds are force-released and any
    /// content instances of the matching asset are torn down, so a
    /// renderer going away cannot stall the switch protocol forever.
    pub fn unregister_component(&self, name: &str) {
        if self.inner.ctx.registry.remove(name).is_none() {
            return;
        }
        info!(component = name, "component unregistered");
        let name_owned = name.to_owned();
        self.inner
            .ctx
            .for_each_sequence(|sequence| sequence.unblock_component(&name_owned));
        let doomed: Vec<_> = self
            .inner
            .ctx
            .instances
            .lock()
            .unwrap()
            .values()
            .filter(|instance| instance.asset().id == name)
            .cloned()
            .collect();
        for instance in doomed {
            tokio::spawn(instance.destroy());
        }
    }

    /// Inject the episode's asset list and begin startup. Errors if data
    /// was already injected or the core is gone.
    pub fn initialize_episode(&self, data: EpisodeData) -> Result<()> {
        let inner = &self.inner;
        if inner.destroyed.load(Ordering::SeqCst) {
            return Err(Error::CoreDestroyed);
        }
        if inner.episode_data_set.swap(true, Ordering::SeqCst) {
            return Err(Error::EpisodeDataAlreadySet);
        }
        info!(episode = %inner.config.episode_id, assets = data.assets.len(), "episode data set");

        let sequence = ContentSequence::new("main", data.assets, Arc::clone(&inner.ctx));
        sequence.dependency_signal().settle();
        let status = inner.config.initial_asset_status;
        if status.order > 0 || status.time > 0.0 {
            sequence.set_initial_position(status.order, status.time);
        }
        *inner.main_sequence.lock().unwrap() = Some(Arc::clone(&sequence));

        // flip to Working (and maybe autoplay) once the first instance is
        // up
        let weak = Arc::downgrade(inner);
        let first_ready = Arc::clone(&sequence);
        tokio::spawn(async move {
            let _ = first_ready.first_ready_signal().wait().await;
            if let Some(inner) = weak.upgrade() {
                if inner.destroyed.load(Ordering::SeqCst) {
                    return;
                }
                inner.set_state(CoreState::Working);
                if inner.config.attempt_autoplay {
                    first_ready.play();
                }
            }
        });

        inner.maybe_start();
        Ok(())
    }

    /// Episode metadata failed to resolve; the core becomes unusable.
    pub fn fail_episode(&self, reason: &str) {
        warn!(episode = %self.inner.config.episode_id, reason, "episode failed");
        *self.inner.panic_reason.lock().unwrap() = Some(reason.to_owned());
        self.inner.set_state(CoreState::Panic);
    }

    /// Advance one frame: every timeline in the tree, the audio host, and
    /// the pause triggers that fired since the last tick.
    pub fn tick(&self) {
        let inner = &self.inner;
        if inner.destroyed.load(Ordering::SeqCst) {
            return;
        }
        let sequence = self.sequence();
        if let Some(sequence) = &sequence {
            sequence.tick();
        }
        inner.audio_host.tick();

        for event in inner.ctx.state_manager.take_edges() {
            if event.state.extension_id != PAUSE_TRIGGER_EXTENSION_ID {
                continue;
            }
            let Some(sequence) = &sequence else { continue };
            info!(trigger = %event.state.id, "pause trigger fired");
            sequence.pause();
            // the tick that crossed the trigger may have overshot; snap
            // back to just past the trigger so resuming does not skip it
            let overshoot = sequence.time() - event.time;
            if overshoot > inner.ctx.sync.pause_overshoot_threshold_ms {
                if let Some(segment) = sequence.current_segment() {
                    sequence.seek(segment, event.time + 1.0);
                }
            }
        }

        if let Some(sequence) = &sequence {
            if *sequence.watch_playing().borrow() {
                let progress = sequence.time();
                let now = inner.ctx.clock.now_ms();
                inner
                    .ctx
                    .registry
                    .for_each(|_, component| component.sync(progress, now));
            }
        }
    }

    pub fn play(&self) -> Result<()> {
        let sequence = self.inner.usable_sequence()?;
        self.inner
            .ctx
            .registry
            .for_each(|_, component| component.play());
        sequence.play();
        Ok(())
    }

    pub fn pause(&self) -> Result<()> {
        let sequence = self.inner.usable_sequence()?;
        self.inner
            .ctx
            .registry
            .for_each(|_, component| component.pause());
        sequence.pause();
        Ok(())
    }

    pub fn seek(&self, segment: usize, time: f64) -> Result<()> {
        self.inner.usable_sequence()?.seek(segment, time);
        Ok(())
    }

    pub fn skip(&self) -> Result<()> {
        self.inner.usable_sequence()?.skip();
        Ok(())
    }

    pub fn set_volume(&self, volume: f64) -> Result<()> {
        if self.inner.destroyed.load(Ordering::SeqCst) {
            return Err(Error::CoreDestroyed);
        }
        self.inner.audio_host.set_master_volume(volume);
        if let Some(sequence) = self.sequence() {
            sequence.set_volume(volume);
        }
        Ok(())
    }

    pub fn audio_host(&self) -> &AudioHost {
        &self.inner.audio_host
    }

    /// Precise time within the current segment, milliseconds.
    pub fn time(&self) -> f64 {
        self.sequence().map_or(0.0, |sequence| sequence.time())
    }

    /// Sum of the finite segment durations of the main sequence.
    pub fn duration(&self) -> f64 {
        self.sequence().map_or(0.0, |sequence| sequence.duration())
    }

    /// True while no content anywhere in the tree is shown.
    pub fn is_stage_empty(&self) -> bool {
        self.inner
            .ctx
            .showing_content_count
            .load(Ordering::SeqCst)
            == 0
    }

    /// Fan a host UI dialog action out to every component, untouched.
    pub fn trigger_dialog_action(&self, action: &serde_json::Value) {
        self.inner
            .ctx
            .registry
            .for_each(|_, component| component.handle_dialog_action_trigger(action));
    }

    /// Current managed state union.
    pub fn managed_states(&self) -> Vec<ManagedCoreState> {
        self.inner.ctx.state_manager.states()
    }

    pub fn managed_states_by_type(&self, extension_id: &str) -> Vec<ManagedCoreState> {
        self.inner.ctx.state_manager.states_by_type(extension_id)
    }

    /// Tear the whole core down: main sequence, audio, then every
    /// component. Single-flight and idempotent.
    pub async fn destroy(&self) {
        let inner = &self.inner;
        if inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(episode = %inner.config.episode_id, "destroying episode core");
        inner.set_state(CoreState::Destroying);

        let sequence = inner.main_sequence.lock().unwrap().take();
        if let Some(sequence) = sequence {
            sequence.destroy().await;
        }
        inner.audio_host.destroy();

        let mut teardowns = Vec::new();
        inner
            .ctx
            .registry
            .for_each(|_, component| teardowns.push(component.destroy_itself()));
        futures::future::join_all(teardowns).await;
        for name in inner.ctx.registry.names() {
            inner.ctx.registry.remove(&name);
        }

        inner.set_state(CoreState::Destroyed);
    }
}

impl CoreInner {
    fn set_state(&self, state: CoreState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state || *current == CoreState::Destroyed {
                false
            } else {
                info!(%state, "core state");
                *current = state;
                true
            }
        });
    }

    /// Begin the first switch once both startup requirements are met.
    fn maybe_start(&self) {
        if self.destroyed.load(Ordering::SeqCst) {
            return;
        }
        if self.config.critical_component.is_some()
            && !self.critical_registered.load(Ordering::SeqCst)
        {
            return;
        }
        if !self.episode_data_set.load(Ordering::SeqCst) {
            self.set_state(CoreState::WaitingForEpisodeData);
            return;
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        self.set_state(CoreState::WaitingForResource);
        if let Some(sequence) = &*self.main_sequence.lock().unwrap() {
            sequence.switch_to_first_content();
        }
    }

    fn usable_sequence(&self) -> Result<Arc<ContentSequence>> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(Error::CoreDestroyed);
        }
        self.main_sequence
            .lock()
            .unwrap()
            .clone()
            .ok_or(Error::CoreDestroyed)
    }
}

/// Callback surface handed to one registered component. All methods hold a
/// weak reference to the core; calls after core teardown fail with
/// [`Error::CoreDestroyed`].
#[derive(Clone)]
pub struct CoreHandle {
    name: String,
    inner: Weak<CoreInner>,
}

impl CoreHandle {
    pub fn component_name(&self) -> &str {
        &self.name
    }

    fn core(&self) -> Result<Arc<CoreInner>> {
        let inner = self.inner.upgrade().ok_or(Error::CoreDestroyed)?;
        if inner.destroyed.load(Ordering::SeqCst) {
            return Err(Error::CoreDestroyed);
        }
        Ok(inner)
    }

    fn instance(&self, instance_id: &str) -> Result<Arc<crate::instance::ContentInstance>> {
        self.core()?
            .ctx
            .instance(instance_id)
            .ok_or_else(|| Error::NotAContent(instance_id.to_owned()))
    }

    /// Release this component's hold on instance creation, in every
    /// sequence of the tree.
    pub fn unblock_next_content_setup(&self) -> Result<()> {
        let inner = self.core()?;
        inner
            .ctx
            .for_each_sequence(|sequence| sequence.unblock_next_content_setup(&self.name));
        Ok(())
    }

    /// Release this component's hold on the visible swap.
    pub fn unblock_content_switch(&self) -> Result<()> {
        let inner = self.core()?;
        inner
            .ctx
            .for_each_sequence(|sequence| sequence.unblock_content_switch(&self.name));
        Ok(())
    }

    pub fn update_content_state(&self, instance_id: &str, state: ContentState) -> Result<()> {
        self.instance(instance_id)?.update_content_state(state)
    }

    pub fn finish_itself(&self, instance_id: &str) -> Result<()> {
        self.instance(instance_id)?.finish_itself();
        Ok(())
    }

    pub fn report_progress(&self, instance_id: &str, progress: f64) -> Result<()> {
        self.instance(instance_id)?.report_progress(progress);
        Ok(())
    }

    pub fn report_stuck(&self, instance_id: &str) -> Result<()> {
        self.instance(instance_id)?.report_stuck();
        Ok(())
    }

    pub fn report_unstuck(&self, instance_id: &str) -> Result<()> {
        self.instance(instance_id)?.report_unstuck();
        Ok(())
    }

    /// Install (or clear) the content's primary audio track.
    pub fn set_audio_track(&self, instance_id: &str, pending: Option<PendingSink>) -> Result<()> {
        self.instance(instance_id)?.set_audio_track(pending);
        Ok(())
    }

    /// Install named standalone audio sources.
    pub fn add_audios(&self, requests: Vec<AudioRequest>) -> Result<()> {
        let inner = self.core()?;
        for request in requests {
            inner
                .audio_host
                .add(&request.name, request.sink, request.subtitle_triggers);
        }
        Ok(())
    }

    pub fn play_audio(&self, name: &str) -> Result<()> {
        self.core()?.audio_host.play(name);
        Ok(())
    }

    pub fn pause_audio(&self, name: &str) -> Result<()> {
        self.core()?.audio_host.pause(name);
        Ok(())
    }

    pub fn stop_audio(&self, name: &str) -> Result<()> {
        self.core()?.audio_host.stop(name);
        Ok(())
    }

    pub fn seek_audio(&self, name: &str, position_ms: f64) -> Result<()> {
        self.core()?.audio_host.seek(name, position_ms);
        Ok(())
    }

    pub fn set_audio_volume(&self, name: &str, volume: f64) -> Result<()> {
        self.core()?.audio_host.set_volume(name, volume);
        Ok(())
    }

    pub fn fade_audio(&self, name: &str, target: f64, duration_ms: f64) -> Result<()> {
        self.core()?.audio_host.fade_to(name, target, duration_ms);
        Ok(())
    }

    pub fn set_audio_loop(&self, name: &str, looped: bool) -> Result<()> {
        self.core()?.audio_host.set_loop(name, looped);
        Ok(())
    }

    pub fn add_managed_state(&self, instance_id: &str, state: ManagedCoreState) -> Result<()> {
        self.instance(instance_id)?.add_managed_state(state);
        Ok(())
    }

    pub fn remove_managed_state(&self, instance_id: &str, state_id: &str) -> Result<bool> {
        Ok(self.instance(instance_id)?.remove_managed_state(state_id))
    }

    pub fn clear_managed_states(&self, instance_id: &str) -> Result<()> {
        self.instance(instance_id)?.clear_managed_states();
        Ok(())
    }

    pub fn set_state_triggers(
        &self,
        instance_id: &str,
        triggers: Option<Vec<StateTrigger>>,
    ) -> Result<()> {
        self.instance(instance_id)?.set_state_triggers(triggers);
        Ok(())
    }

    pub fn set_managed_state_enabled(&self, instance_id: &str, enabled: bool) -> Result<()> {
        self.instance(instance_id)?
            .set_managed_state_enabled(enabled);
        Ok(())
    }

    /// Gate a named one-shot task on this component's `run_queued_task`
    /// hook.
    pub fn require_queued_task(&self, task_id: &str, instance_id: &str) -> Result<Arc<QueuedTask>> {
        let inner = self.core()?;
        let component = inner
            .ctx
            .registry
            .get(&self.name)
            .ok_or_else(|| Error::ComponentNotFound(self.name.clone()))?;
        self.instance(instance_id)?
            .require_queued_task(task_id, component)
    }

    /// Create a nested sequence under the given content; resolves once its
    /// first instance is ready.
    pub async fn create_sequence(
        &self,
        instance_id: &str,
        sequence_id: &str,
        assets: Vec<crate::types::Asset>,
    ) -> Result<()> {
        self.instance(instance_id)?
            .subsequences()
            .create_sequence(sequence_id, assets)
            .await
    }

    pub fn start_sequence(&self, instance_id: &str, sequence_id: &str) -> Result<()> {
        self.instance(instance_id)?
            .subsequences()
            .start_sequence(sequence_id)
    }

    pub fn show_sequence(&self, instance_id: &str, sequence_id: &str) -> Result<()> {
        self.instance(instance_id)?
            .subsequences()
            .show_sequence(sequence_id)
    }

    pub fn hide_sequence(&self, instance_id: &str, sequence_id: &str) -> Result<()> {
        self.instance(instance_id)?
            .subsequences()
            .hide_sequence(sequence_id)
    }
}
