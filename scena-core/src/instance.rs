//! Content instances
//!
//! A [`ContentInstance`] is one loaded occurrence of an asset: it owns the
//! asset's timeline, audio track handle, trigger list, task gate and nested
//! subsequences, and enforces the content lifecycle state machine. The
//! owning sequence creates it when a segment needs loading and destroys it
//! exactly once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use scena_timeline::{Remote, RemoteTrack, Timeline};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audio::{AudioTrack, AudioTrackHandle, PendingSink};
use crate::component::{Component, ComponentRegistry};
use crate::context::SharedContext;
use crate::error::{Error, Result};
use crate::managed_state::{ManagedCoreState, ManagedCoreStateList, StateTrigger, UpdateReason};
use crate::signal::Signal;
use crate::subsequence::SubsequenceManager;
use crate::task_queue::{QueuedTask, TaskQueueManager};
use crate::types::{Asset, ContentState};

/// Priority of the component-clock bridge inside an instance timeline,
/// below the built-in basic track.
const REMOTE_TRACK_PRIORITY: i64 = -1;

/// Upward notifications from an instance to its owning sequence. Captured
/// as closures over a `Weak` sequence reference, never a strong one.
pub(crate) struct InstanceHooks {
    pub on_ready: Box<dyn Fn(&str) + Send + Sync>,
    pub on_finished: Box<dyn Fn(&str) + Send + Sync>,
    /// `(instance id, progress ms, clock time ms)`
    pub on_progress: Box<dyn Fn(&str, f64, f64) + Send + Sync>,
    pub on_stuck_change: Box<dyn Fn(&str, bool) + Send + Sync>,
}

impl Default for InstanceHooks {
    fn default() -> Self {
        Self {
            on_ready: Box::new(|_| {}),
            on_finished: Box::new(|_| {}),
            on_progress: Box::new(|_, _, _| {}),
            on_stuck_change: Box::new(|_, _| {}),
        }
    }
}

/// Latest position report from the component driving this content, bridged
/// into the timeline by a [`RemoteTrack`].
#[derive(Debug)]
struct RemoteReport {
    progress: f64,
    update_time: f64,
    stuck: bool,
}

/// [`Remote`] adapter over the component report. Corrective syncs and
/// transport edges (play, pause, suspend, resume) are forwarded to the
/// component driving this content, looked up under the asset's id.
struct ComponentRemote {
    report: Arc<Mutex<RemoteReport>>,
    registry: ComponentRegistry,
    component_name: String,
}

impl ComponentRemote {
    fn with_component(&self, f: impl FnOnce(&Arc<dyn Component>)) {
        if let Some(component) = self.registry.get(&self.component_name) {
            f(&component);
        }
    }
}

impl Remote for ComponentRemote {
    fn progress(&self) -> f64 {
        self.report.lock().unwrap().progress
    }

    fn update_time(&self) -> f64 {
        self.report.lock().unwrap().update_time
    }

    fn stuck(&self) -> bool {
        self.report.lock().unwrap().stuck
    }

    fn sync(&mut self, time: f64, progress: f64) {
        {
            let mut report = self.report.lock().unwrap();
            report.progress = progress;
            report.update_time = time;
        }
        self.with_component(|component| component.sync(progress, time));
    }

    fn play(&mut self) {
        self.with_component(|component| component.play());
    }

    fn pause(&mut self) {
        self.with_component(|component| component.pause());
    }

    fn suspend(&mut self) {
        self.with_component(|component| component.suspend());
    }

    fn resume(&mut self) {
        self.with_component(|component| component.resume());
    }
}

pub struct ContentInstance {
    id: String,
    asset: Asset,
    ctx: Arc<SharedContext>,
    state: Mutex<ContentState>,
    timeline: Mutex<Timeline>,
    report: Arc<Mutex<RemoteReport>>,
    audio: Mutex<Option<AudioTrackHandle>>,
    state_list: Arc<Mutex<ManagedCoreStateList>>,
    task_queue: TaskQueueManager,
    subsequences: SubsequenceManager,
    hooks: InstanceHooks,
    showing: AtomicBool,
    managed_state_enabled: AtomicBool,
    intend_playing: AtomicBool,
    last_stuck: AtomicBool,
    volume: Mutex<f64>,
    destroy_started: AtomicBool,
    ready_signal: Signal,
    destroyed_signal: Signal,
}

impl ContentInstance {
    pub(crate) fn new(asset: Asset, ctx: Arc<SharedContext>, hooks: InstanceHooks) -> Arc<Self> {
        let id = format!("{}#{}", asset.id, Uuid::new_v4());
        let now = ctx.clock.now_ms();
        let instance = Arc::new(Self {
            id: id.clone(),
            timeline: Mutex::new(Timeline::new(ctx.clock.clone())),
            report: Arc::new(Mutex::new(RemoteReport {
                progress: 0.0,
                update_time: now,
                stuck: false,
            })),
            audio: Mutex::new(None),
            state_list: Arc::new(Mutex::new(ManagedCoreStateList::new(None))),
            task_queue: TaskQueueManager::new(Arc::clone(&ctx.queue)),
            subsequences: SubsequenceManager::new(Arc::clone(&ctx)),
            hooks,
            showing: AtomicBool::new(false),
            managed_state_enabled: AtomicBool::new(true),
            intend_playing: AtomicBool::new(false),
            last_stuck: AtomicBool::new(false),
            volume: Mutex::new(1.0),
            destroy_started: AtomicBool::new(false),
            ready_signal: Signal::new(),
            destroyed_signal: Signal::new(),
            state: Mutex::new(ContentState::Idle),
            asset,
            ctx: Arc::clone(&ctx),
        });
        ctx.instances
            .lock()
            .unwrap()
            .insert(id, Arc::clone(&instance));
        instance
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn asset(&self) -> &Asset {
        &self.asset
    }

    pub fn state(&self) -> ContentState {
        *self.state.lock().unwrap()
    }

    /// Settles when the instance reaches `ready`.
    pub fn ready_signal(&self) -> &Signal {
        &self.ready_signal
    }

    pub fn destroyed_signal(&self) -> &Signal {
        &self.destroyed_signal
    }

    pub fn is_showing(&self) -> bool {
        self.showing.load(Ordering::SeqCst)
    }

    pub(crate) fn subsequences(&self) -> &SubsequenceManager {
        &self.subsequences
    }

    fn transition(&self, to: ContentState) -> Result<()> {
        use ContentState::*;
        let mut state = self.state.lock().unwrap();
        let from = *state;
        let allowed = matches!(
            (from, to),
            (Idle, Preloading)
                | (Idle, Destroying)
                | (Idle, Destroyed)
                | (Preloading, Ready)
                | (Preloading, Destroying)
                | (Preloading, Destroyed)
                | (Ready, Destroying)
                | (Ready, Destroyed)
                | (Destroying, Destroyed)
                | (Destroyed, Destroyed)
        );
        if !allowed {
            return Err(Error::InvalidStateTransition { from, to });
        }
        if from != to {
            debug!(id = %self.id, %from, %to, "content state transition");
            *state = to;
        }
        Ok(())
    }

    /// Begin loading: enter `preloading`, bridge the component clock into
    /// the timeline, and ask every component to create the content.
    pub(crate) fn preload(&self) -> Result<()> {
        self.transition(ContentState::Preloading)?;
        self.timeline.lock().unwrap().add_track(
            Box::new(RemoteTrack::new(
                Box::new(ComponentRemote {
                    report: Arc::clone(&self.report),
                    registry: self.ctx.registry.clone(),
                    component_name: self.asset.id.clone(),
                }),
                self.ctx.sync.drift_resync_threshold_ms,
            )),
            REMOTE_TRACK_PRIORITY,
        );
        info!(id = %self.id, asset = %self.asset.id, "preloading content");
        self.ctx
            .registry
            .for_each(|_, component| component.create_content(&self.id, &self.asset.spec));
        Ok(())
    }

    /// State report from a component, validated against the lifecycle
    /// table.
    pub fn update_content_state(&self, to: ContentState) -> Result<()> {
        self.transition(to)?;
        match to {
            ContentState::Ready => {
                info!(id = %self.id, "content ready");
                if self.intend_playing.load(Ordering::SeqCst) {
                    self.timeline.lock().unwrap().play();
                }
                self.ready_signal.settle();
                (self.hooks.on_ready)(&self.id);
            }
            ContentState::Destroyed => {
                // settle readiness too, releasing any switch parked on it
                self.ready_signal.settle();
                self.destroyed_signal.settle();
            }
            _ => {}
        }
        Ok(())
    }

    /// The component declares this content finished; the owning sequence
    /// starts switching.
    pub fn finish_itself(&self) {
        info!(id = %self.id, "content finished itself");
        (self.hooks.on_finished)(&self.id);
    }

    /// Position report from the component-side clock.
    pub fn report_progress(&self, progress: f64) {
        let mut report = self.report.lock().unwrap();
        report.progress = progress;
        report.update_time = self.ctx.clock.now_ms();
    }

    pub fn report_stuck(&self) {
        self.report.lock().unwrap().stuck = true;
    }

    pub fn report_unstuck(&self) {
        self.report.lock().unwrap().stuck = false;
    }

    /// Install (or clear) the primary audio track. A pending sink keeps
    /// the whole timeline stuck until it resolves.
    pub fn set_audio_track(&self, pending: Option<PendingSink>) {
        let handle = {
            let mut audio = self.audio.lock().unwrap();
            if audio.is_none() {
                let (track, handle) =
                    AudioTrack::new(self.ctx.clock.clone(), self.ctx.sync.drift_resync_threshold_ms);
                self.timeline
                    .lock()
                    .unwrap()
                    .add_track(Box::new(track), AudioTrack::PRIORITY);
                handle.set_volume(*self.volume.lock().unwrap());
                *audio = Some(handle);
            }
            audio.as_ref().unwrap().clone()
        };
        match pending {
            None => handle.set_sink(None),
            Some(pending) => {
                handle.mark_pending();
                tokio::spawn(async move {
                    let sink = pending.await;
                    handle.set_sink(sink);
                });
            }
        }
    }

    /// The sequence wants this content playing. Takes effect immediately
    /// when ready, or as soon as `ready` is reached.
    pub(crate) fn play(&self) {
        self.intend_playing.store(true, Ordering::SeqCst);
        if self.state() == ContentState::Ready {
            self.timeline.lock().unwrap().play();
        }
        self.subsequences.parent_play();
    }

    pub(crate) fn pause(&self) {
        self.intend_playing.store(false, Ordering::SeqCst);
        self.timeline.lock().unwrap().pause();
        self.subsequences.parent_pause();
    }

    pub(crate) fn show(&self) {
        if self.showing.swap(true, Ordering::SeqCst) {
            return;
        }
        self.ctx
            .showing_content_count
            .fetch_add(1, Ordering::SeqCst);
        self.ctx
            .registry
            .for_each(|_, component| component.show_content(&self.id));
        if let Some(component) = self.ctx.registry.get(&self.asset.id) {
            component.show_itself();
        }
        self.update_state_participation();
        self.subsequences.parent_show();
    }

    pub(crate) fn hide(&self) {
        if !self.showing.swap(false, Ordering::SeqCst) {
            return;
        }
        self.ctx
            .showing_content_count
            .fetch_sub(1, Ordering::SeqCst);
        self.ctx
            .registry
            .for_each(|_, component| component.hide_content(&self.id));
        if let Some(component) = self.ctx.registry.get(&self.asset.id) {
            component.hide_itself();
        }
        self.update_state_participation();
        self.subsequences.parent_hide();
    }

    /// Opt this instance's trigger list in or out of the managed state
    /// union. Hidden instances never participate regardless.
    pub fn set_managed_state_enabled(&self, enabled: bool) {
        self.managed_state_enabled.store(enabled, Ordering::SeqCst);
        self.update_state_participation();
    }

    fn update_state_participation(&self) {
        let participating =
            self.is_showing() && self.managed_state_enabled.load(Ordering::SeqCst);
        if participating {
            self.ctx.state_manager.register_list(&self.state_list);
        } else {
            let id = self.state_list.lock().unwrap().id();
            self.ctx.state_manager.unregister_list(id);
        }
    }

    pub fn add_managed_state(&self, state: ManagedCoreState) {
        self.state_list.lock().unwrap().add_state(state);
    }

    pub fn remove_managed_state(&self, id: &str) -> bool {
        self.state_list.lock().unwrap().remove_state(id)
    }

    pub fn clear_managed_states(&self) {
        self.state_list.lock().unwrap().clear_states();
    }

    /// Replace the time-keyed trigger set for this content.
    pub fn set_state_triggers(&self, triggers: Option<Vec<StateTrigger>>) {
        self.state_list.lock().unwrap().set_triggers(triggers);
    }

    pub(crate) fn set_volume(&self, volume: f64) {
        *self.volume.lock().unwrap() = volume;
        if let Some(handle) = &*self.audio.lock().unwrap() {
            handle.set_volume(volume);
        }
        self.subsequences.set_volume(volume);
    }

    /// Jump this content's own clock.
    pub(crate) fn seek_to(&self, time: f64) {
        self.timeline.lock().unwrap().set_time(time);
        let outcome = self.state_list.lock().unwrap().seek(time, UpdateReason::Seek);
        self.ctx.state_manager.dispatch_edges(outcome.fired);
    }

    pub fn time(&self) -> f64 {
        self.timeline.lock().unwrap().time()
    }

    /// Gate a named one-shot task on the owning component's
    /// `run_queued_task` hook. An absent hook means immediate success.
    pub fn require_queued_task(
        &self,
        task_id: &str,
        component: Arc<dyn Component>,
    ) -> Result<Arc<QueuedTask>> {
        let id = task_id.to_owned();
        self.task_queue
            .require(task_id, move || component.run_queued_task(&id))
    }

    /// Advance one frame: tick the timeline, surface stuck edges and
    /// progress upward, and move the trigger list to the new time.
    pub(crate) fn tick(&self) {
        match self.state() {
            ContentState::Destroying | ContentState::Destroyed => return,
            _ => {}
        }
        let (playing, stuck, time) = {
            let mut timeline = self.timeline.lock().unwrap();
            let playing = timeline.is_playing();
            let stuck = timeline.tick();
            (playing, stuck, timeline.time())
        };
        if stuck != self.last_stuck.swap(stuck, Ordering::SeqCst) {
            (self.hooks.on_stuck_change)(&self.id, stuck);
        }
        if playing && !stuck {
            let outcome = self
                .state_list
                .lock()
                .unwrap()
                .seek(time, UpdateReason::Tick);
            self.ctx.state_manager.dispatch_edges(outcome.fired);
            (self.hooks.on_progress)(&self.id, time, self.ctx.clock.now_ms());
        }
        self.subsequences.tick();
    }

    /// Tear the instance down. Single-flight: concurrent calls await the
    /// first one. A failure in any component's teardown does not stop the
    /// rest.
    pub(crate) fn destroy(self: Arc<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            if self.destroy_started.swap(true, Ordering::SeqCst) {
                let _ = self.destroyed_signal.wait().await;
                return;
            }
            if self.state() == ContentState::Destroyed {
                self.destroyed_signal.settle();
                return;
            }
            if let Err(error) = self.transition(ContentState::Destroying) {
                // unreachable given the table, but never abort teardown
                warn!(id = %self.id, %error, "unexpected state entering teardown");
            }
            info!(id = %self.id, "destroying content");

            // wake any switch parked on readiness; its post-await checks
            // observe the teardown
            self.ready_signal.settle();

            self.timeline.lock().unwrap().pause();
            self.task_queue.destroy();
            self.subsequences.destroy().await;

            if self.showing.swap(false, Ordering::SeqCst) {
                self.ctx
                    .showing_content_count
                    .fetch_sub(1, Ordering::SeqCst);
                self.ctx
                    .registry
                    .for_each(|_, component| component.hide_content(&self.id));
                if let Some(component) = self.ctx.registry.get(&self.asset.id) {
                    component.hide_itself();
                }
            }
            self.ctx
                .registry
                .for_each(|_, component| component.destroy_content(&self.id));

            let list_id = self.state_list.lock().unwrap().id();
            self.ctx.state_manager.unregister_list(list_id);
            if let Some(handle) = &*self.audio.lock().unwrap() {
                handle.set_sink(None);
            }
            self.ctx.instances.lock().unwrap().remove(&self.id);

            let _ = self.transition(ContentState::Destroyed);
            self.destroyed_signal.settle();
        })
    }
}
