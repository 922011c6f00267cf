//! Content sequences and the switch protocol
//!
//! A [`ContentSequence`] orders content units and moves a "current" cursor
//! across them. Moving the cursor is the *switch protocol*: a multi-party
//! barrier dance in which registered components may hold up both the
//! creation of the incoming instance and the visible swap until they
//! explicitly unblock. Unblock calls are order-independent; only the
//! empty-set transition matters. There is deliberately no timeout on a
//! barrier: an unresolved blocker stalls switching (visibly stuck) rather
//! than silently skipping ahead.
//!
//! Switch steps, serialized by the `switching` flag:
//! 1. pause the outgoing content;
//! 2. shift the segment cursor;
//! 3. collect blocker names into the setup and swap barrier sets;
//! 4. await the setup barrier;
//! 5. stop with an `End` event when the cursor ran off the asset list;
//! 6. tear the outgoing content down early when its asset asks for it;
//! 7. create (or reuse a preloaded) incoming instance;
//! 8. await the swap barrier, instance readiness and the external
//!    dependency;
//! 9. show the incoming content *before* hiding the outgoing one, resume
//!    playback, and opportunistically preload the segment after it.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::context::SharedContext;
use crate::events::SequenceEvent;
use crate::instance::{ContentInstance, InstanceHooks};
use crate::signal::Signal;
use crate::types::{Asset, ContentState, Progress};

struct ContentSlot {
    asset: Asset,
    instance: Option<Arc<ContentInstance>>,
}

struct SwitchState {
    switching: bool,
    last_segment: i64,
    current_segment: i64,
    next_segment: i64,
    next_start_time: f64,
}

#[derive(Default)]
struct BlockerState {
    setup: HashSet<String>,
    swap: HashSet<String>,
    setup_signal: Option<Arc<Signal>>,
    swap_signal: Option<Arc<Signal>>,
}

struct PlayShowFlags {
    self_playing: bool,
    parent_playing: bool,
    self_showing: bool,
    parent_showing: bool,
}

pub struct ContentSequence {
    id: String,
    ctx: Arc<SharedContext>,
    contents: Mutex<Vec<ContentSlot>>,
    switch: Mutex<SwitchState>,
    blockers: Mutex<BlockerState>,
    /// External gate awaited before any swap completes. The episode core
    /// settles it once episode data is in; subsequences settle it at
    /// creation.
    dependency: Signal,
    /// Settles the first time a segment becomes current.
    first_ready: Signal,
    flags: Mutex<PlayShowFlags>,
    volume: Mutex<f64>,
    destroyed: AtomicBool,
    playing_tx: watch::Sender<bool>,
    stuck_tx: watch::Sender<bool>,
    progress_tx: watch::Sender<Progress>,
    events_tx: broadcast::Sender<SequenceEvent>,
}

impl ContentSequence {
    pub(crate) fn new(id: &str, assets: Vec<Asset>, ctx: Arc<SharedContext>) -> Arc<Self> {
        let (events_tx, _) = broadcast::channel(64);
        let sequence = Arc::new(Self {
            id: id.to_owned(),
            ctx: Arc::clone(&ctx),
            contents: Mutex::new(
                assets
                    .into_iter()
                    .map(|asset| ContentSlot {
                        asset,
                        instance: None,
                    })
                    .collect(),
            ),
            switch: Mutex::new(SwitchState {
                switching: false,
                last_segment: -2,
                current_segment: -1,
                next_segment: 0,
                next_start_time: 0.0,
            }),
            blockers: Mutex::new(BlockerState::default()),
            dependency: Signal::new(),
            first_ready: Signal::new(),
            flags: Mutex::new(PlayShowFlags {
                self_playing: false,
                parent_playing: true,
                self_showing: true,
                parent_showing: true,
            }),
            volume: Mutex::new(1.0),
            destroyed: AtomicBool::new(false),
            playing_tx: watch::channel(false).0,
            stuck_tx: watch::channel(false).0,
            progress_tx: watch::channel(Progress::default()).0,
            events_tx,
        });
        ctx.register_sequence(&sequence);
        sequence
    }

    /// Pick where the very first switch should land. Only honored before
    /// the cursor has moved.
    pub(crate) fn set_initial_position(&self, segment: usize, time: f64) {
        let mut switch = self.switch.lock().unwrap();
        if switch.current_segment == -1 && !switch.switching {
            switch.next_segment = segment as i64;
            switch.next_start_time = time;
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Sum of the finite segment durations; open-ended segments do not
    /// count.
    pub fn duration(&self) -> f64 {
        self.contents
            .lock()
            .unwrap()
            .iter()
            .filter_map(|slot| slot.asset.duration)
            .sum()
    }

    pub fn segment_count(&self) -> usize {
        self.contents.lock().unwrap().len()
    }

    pub fn current_segment(&self) -> Option<usize> {
        let segment = self.switch.lock().unwrap().current_segment;
        usize::try_from(segment).ok()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SequenceEvent> {
        self.events_tx.subscribe()
    }

    pub fn watch_playing(&self) -> watch::Receiver<bool> {
        self.playing_tx.subscribe()
    }

    pub fn watch_stuck(&self) -> watch::Receiver<bool> {
        self.stuck_tx.subscribe()
    }

    pub fn watch_progress(&self) -> watch::Receiver<Progress> {
        self.progress_tx.subscribe()
    }

    /// Settles once the first segment's instance has become current.
    pub fn first_ready_signal(&self) -> &Signal {
        &self.first_ready
    }

    pub(crate) fn dependency_signal(&self) -> &Signal {
        &self.dependency
    }

    /// Precise time within the current segment.
    pub fn time(&self) -> f64 {
        match self.current_instance() {
            Some(instance) => instance.time(),
            None => 0.0,
        }
    }

    fn current_instance(&self) -> Option<Arc<ContentInstance>> {
        let current = self.switch.lock().unwrap().current_segment;
        let index = usize::try_from(current).ok()?;
        self.contents.lock().unwrap().get(index)?.instance.clone()
    }

    fn instantiated(&self) -> Vec<Arc<ContentInstance>> {
        self.contents
            .lock()
            .unwrap()
            .iter()
            .filter_map(|slot| slot.instance.clone())
            .collect()
    }

    /// Kick off the very first switch. Idempotent; later calls are no-ops
    /// because the cursor has moved past −1.
    pub fn switch_to_first_content(self: &Arc<Self>) {
        {
            let switch = self.switch.lock().unwrap();
            if switch.current_segment != -1 {
                return;
            }
        }
        self.start_switch();
    }

    /// Serialize entry into the switch protocol. Returns false when a
    /// switch is already in flight or the sequence is gone.
    fn start_switch(self: &Arc<Self>) -> bool {
        if self.is_destroyed() {
            return false;
        }
        {
            let mut switch = self.switch.lock().unwrap();
            if switch.switching {
                return false;
            }
            switch.switching = true;
        }
        let sequence = Arc::clone(self);
        tokio::spawn(async move { sequence.run_switch().await });
        true
    }

    async fn run_switch(self: Arc<Self>) {
        // steps 1–2: pause the outgoing segment, shift the cursor
        let (last, current, start_time) = {
            let mut switch = self.switch.lock().unwrap();
            if let Ok(outgoing) = usize::try_from(switch.current_segment) {
                if let Some(instance) = self
                    .contents
                    .lock()
                    .unwrap()
                    .get(outgoing)
                    .and_then(|slot| slot.instance.clone())
                {
                    instance.pause();
                }
            }
            switch.last_segment = switch.current_segment;
            switch.current_segment = switch.next_segment;
            switch.next_segment += 1;
            let start_time = switch.next_start_time;
            switch.next_start_time = 0.0;
            (switch.last_segment, switch.current_segment, start_time)
        };
        debug!(sequence = %self.id, last, current, "content switch started");

        // step 3: collect blockers into both barrier sets. A destroy
        // between spawn and here has already force-cleared the old
        // blocker state; do not install fresh signals it cannot see.
        if self.is_destroyed() {
            return;
        }
        let names = self.ctx.registry.switch_blockers(last, current);
        let (setup_signal, swap_signal) = {
            let mut blockers = self.blockers.lock().unwrap();
            if names.is_empty() {
                (None, None)
            } else {
                info!(sequence = %self.id, blockers = ?names, "switch blocked by components");
                blockers.setup = names.iter().cloned().collect();
                blockers.swap = names.iter().cloned().collect();
                let setup = Arc::new(Signal::new());
                let swap = Arc::new(Signal::new());
                blockers.setup_signal = Some(Arc::clone(&setup));
                blockers.swap_signal = Some(Arc::clone(&swap));
                (Some(setup), Some(swap))
            }
        };

        // step 4: setup barrier
        if let Some(signal) = &setup_signal {
            let _ = signal.wait().await;
        }
        if self.is_destroyed() {
            return;
        }

        // step 5: ran off the end of the asset list
        let segment_count = self.segment_count();
        let Ok(current_index) = usize::try_from(current) else {
            return;
        };
        if current_index >= segment_count {
            info!(sequence = %self.id, "sequence ended");
            self.first_ready.settle();
            let _ = self.events_tx.send(SequenceEvent::End);
            // switching stays set: the cursor must never move again
            return;
        }

        // step 6: early teardown of the outgoing content when requested
        let outgoing = usize::try_from(last).ok().and_then(|index| {
            let contents = self.contents.lock().unwrap();
            let slot = contents.get(index)?;
            slot.instance
                .clone()
                .map(|instance| (instance, slot.asset.early_destroy_on_switch))
        });
        let mut outgoing = match outgoing {
            Some((instance, early)) if early => {
                instance.hide();
                Arc::clone(&instance).destroy().await;
                self.clear_slot(last);
                None
            }
            other => other.map(|(instance, _)| instance),
        };

        // step 7: create or reuse the incoming instance
        let incoming = {
            let existing = self.contents.lock().unwrap()[current_index].instance.clone();
            match existing {
                Some(instance) => instance,
                None => match self.create_instance(current_index) {
                    Some(instance) => instance,
                    None => return,
                },
            }
        };
        if start_time > 0.0 {
            incoming.seek_to(start_time);
        }

        // step 8: swap barrier, readiness, external dependency
        if let Some(signal) = &swap_signal {
            let _ = signal.wait().await;
        }
        let _ = incoming.ready_signal().wait().await;
        let _ = self.dependency.wait().await;
        if self.is_destroyed() {
            return;
        }
        if matches!(
            incoming.state(),
            ContentState::Destroying | ContentState::Destroyed
        ) {
            // the incoming content was torn down while we were parked
            // (component unregistration); abort and release the protocol
            warn!(sequence = %self.id, segment = current_index, "incoming content destroyed during switch");
            self.clear_slot(current);
            self.switch.lock().unwrap().switching = false;
            return;
        }

        // step 9: show before hide
        if self.effective_showing() {
            incoming.show();
        }
        self.progress_tx.send_replace(Progress {
            segment: current_index,
            progress: start_time,
        });
        let _ = self.events_tx.send(SequenceEvent::SegmentStart {
            segment: current_index,
        });
        self.first_ready.settle();
        info!(sequence = %self.id, segment = current_index, "segment started");

        if let Some(instance) = outgoing.take() {
            instance.hide();
            tokio::spawn(Arc::clone(&instance).destroy());
            self.clear_slot(last);
        }
        if self.effective_playing() {
            incoming.play();
        }

        // opportunistic preload of the segment after this one
        let preload_index = current_index + 1;
        let preload = {
            let contents = self.contents.lock().unwrap();
            contents
                .get(preload_index)
                .map(|slot| (slot.asset.preload_disabled, slot.instance.is_some()))
        };
        if let Some((false, false)) = preload {
            self.create_instance(preload_index);
        }

        self.switch.lock().unwrap().switching = false;
    }

    fn clear_slot(&self, segment: i64) {
        if let Ok(index) = usize::try_from(segment) {
            if let Some(slot) = self.contents.lock().unwrap().get_mut(index) {
                slot.instance = None;
            }
        }
    }

    fn create_instance(self: &Arc<Self>, index: usize) -> Option<Arc<ContentInstance>> {
        let asset = self.contents.lock().unwrap().get(index)?.asset.clone();
        let instance = ContentInstance::new(asset, Arc::clone(&self.ctx), self.hooks());
        instance.set_volume(*self.volume.lock().unwrap());
        if let Err(error) = instance.preload() {
            warn!(sequence = %self.id, index, %error, "preload failed");
            return None;
        }
        self.contents.lock().unwrap().get_mut(index)?.instance = Some(Arc::clone(&instance));
        Some(instance)
    }

    fn hooks(self: &Arc<Self>) -> InstanceHooks {
        let finished = Arc::downgrade(self);
        let progress = Arc::downgrade(self);
        let stuck = Arc::downgrade(self);
        InstanceHooks {
            on_ready: Box::new(|_| {}),
            on_finished: Box::new(move |id| {
                if let Some(sequence) = Weak::upgrade(&finished) {
                    sequence.handle_content_finished(id);
                }
            }),
            on_progress: Box::new(move |id, time, _clock_time| {
                if let Some(sequence) = Weak::upgrade(&progress) {
                    sequence.handle_progress(id, time);
                }
            }),
            on_stuck_change: Box::new(move |id, stuck_now| {
                if let Some(sequence) = Weak::upgrade(&stuck) {
                    sequence.handle_stuck_change(id, stuck_now);
                }
            }),
        }
    }

    fn is_current(&self, instance_id: &str) -> bool {
        self.current_instance()
            .is_some_and(|instance| instance.id() == instance_id)
    }

    fn handle_content_finished(self: &Arc<Self>, instance_id: &str) {
        if !self.is_current(instance_id) {
            debug!(sequence = %self.id, instance_id, "finish from non-current content ignored");
            return;
        }
        // only a finished content announces its segment end; seeks and
        // skips switch silently
        let Some(segment) = self.current_segment() else {
            return;
        };
        if self.switch.lock().unwrap().switching {
            return;
        }
        let _ = self.events_tx.send(SequenceEvent::SegmentEnd { segment });
        self.start_switch();
    }

    fn handle_progress(&self, instance_id: &str, time: f64) {
        if !self.is_current(instance_id) {
            return;
        }
        if let Some(segment) = self.current_segment() {
            self.progress_tx.send_replace(Progress {
                segment,
                progress: time,
            });
        }
    }

    fn handle_stuck_change(&self, instance_id: &str, stuck: bool) {
        if self.is_current(instance_id) {
            self.stuck_tx.send_replace(stuck);
        }
    }

    /// Release one component's hold on instance creation.
    pub fn unblock_next_content_setup(&self, name: &str) {
        let mut blockers = self.blockers.lock().unwrap();
        if blockers.setup.remove(name) && blockers.setup.is_empty() {
            if let Some(signal) = blockers.setup_signal.take() {
                signal.settle();
            }
        }
    }

    /// Release one component's hold on the visible swap.
    pub fn unblock_content_switch(&self, name: &str) {
        let mut blockers = self.blockers.lock().unwrap();
        if blockers.swap.remove(name) && blockers.swap.is_empty() {
            if let Some(signal) = blockers.swap_signal.take() {
                signal.settle();
            }
        }
    }

    /// Drop every hold the named component has on the current switch.
    /// Used when a component unregisters mid-switch.
    pub(crate) fn unblock_component(&self, name: &str) {
        self.unblock_next_content_setup(name);
        self.unblock_content_switch(name);
    }

    /// Jump to `(segment, time)`. Dropped with a log line while a switch
    /// is in flight or before the first switch; never queued.
    pub fn seek(self: &Arc<Self>, segment: usize, time: f64) {
        {
            let mut switch = self.switch.lock().unwrap();
            if self.is_destroyed() {
                warn!(sequence = %self.id, "seek on destroyed sequence ignored");
                return;
            }
            if switch.switching || switch.current_segment < 0 {
                warn!(sequence = %self.id, segment, "seek ignored while switching");
                return;
            }
            if segment as i64 != switch.current_segment {
                switch.next_segment = segment as i64;
                switch.next_start_time = time;
            } else {
                drop(switch);
                if let Some(instance) = self.current_instance() {
                    instance.seek_to(time);
                }
                self.progress_tx.send_replace(Progress {
                    segment,
                    progress: time,
                });
                return;
            }
        }
        self.start_switch();
    }

    pub fn skip(self: &Arc<Self>) {
        let current = self.switch.lock().unwrap().current_segment;
        if let Ok(current) = usize::try_from(current) {
            self.seek(current + 1, 0.0);
        }
    }

    fn effective_playing(&self) -> bool {
        let flags = self.flags.lock().unwrap();
        flags.self_playing && flags.parent_playing
    }

    fn effective_showing(&self) -> bool {
        let flags = self.flags.lock().unwrap();
        flags.self_showing && flags.parent_showing
    }

    fn apply_playing(&self) {
        let effective = self.effective_playing();
        self.playing_tx.send_replace(effective);
        if let Some(instance) = self.current_instance() {
            if effective {
                instance.play();
            } else {
                instance.pause();
            }
        }
    }

    fn apply_showing(&self, was: bool) {
        let effective = self.effective_showing();
        if was == effective {
            return;
        }
        for instance in self.instantiated() {
            if effective {
                instance.show();
            } else {
                instance.hide();
            }
        }
    }

    pub fn play(&self) {
        if self.is_destroyed() {
            warn!(sequence = %self.id, "play on destroyed sequence ignored");
            return;
        }
        self.flags.lock().unwrap().self_playing = true;
        self.apply_playing();
    }

    pub fn pause(&self) {
        if self.is_destroyed() {
            warn!(sequence = %self.id, "pause on destroyed sequence ignored");
            return;
        }
        self.flags.lock().unwrap().self_playing = false;
        self.apply_playing();
    }

    /// Playing authority inherited from the owner (episode core or parent
    /// instance). Effective playing is `self AND parent`.
    pub(crate) fn parent_play(&self) {
        self.flags.lock().unwrap().parent_playing = true;
        self.apply_playing();
    }

    pub(crate) fn parent_pause(&self) {
        self.flags.lock().unwrap().parent_playing = false;
        self.apply_playing();
    }

    /// Toggle visibility across every currently-instantiated content, not
    /// only the current one.
    pub fn show(&self) {
        let was = self.effective_showing();
        self.flags.lock().unwrap().self_showing = true;
        self.apply_showing(was);
    }

    pub fn hide(&self) {
        let was = self.effective_showing();
        self.flags.lock().unwrap().self_showing = false;
        self.apply_showing(was);
    }

    pub(crate) fn parent_show(&self) {
        let was = self.effective_showing();
        self.flags.lock().unwrap().parent_showing = true;
        self.apply_showing(was);
    }

    pub(crate) fn parent_hide(&self) {
        let was = self.effective_showing();
        self.flags.lock().unwrap().parent_showing = false;
        self.apply_showing(was);
    }

    /// Cascade a volume change to every instantiated content (and through
    /// them, their subsequences).
    pub fn set_volume(&self, volume: f64) {
        *self.volume.lock().unwrap() = volume;
        for instance in self.instantiated() {
            instance.set_volume(volume);
        }
    }

    /// Advance every instantiated content by one frame.
    pub fn tick(&self) {
        if self.is_destroyed() {
            return;
        }
        for instance in self.instantiated() {
            instance.tick();
        }
    }

    /// Tear the sequence down. Single-flight; in-flight barriers are
    /// force-cleared so a suspended switch wakes, observes destruction and
    /// aborts. Instance teardown is best-effort across the whole set.
    pub async fn destroy(self: Arc<Self>) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(sequence = %self.id, "destroying sequence");
        {
            let mut blockers = self.blockers.lock().unwrap();
            blockers.setup.clear();
            blockers.swap.clear();
            if let Some(signal) = blockers.setup_signal.take() {
                signal.settle();
            }
            if let Some(signal) = blockers.swap_signal.take() {
                signal.settle();
            }
        }
        self.dependency.settle();
        self.first_ready.settle();

        let instances: Vec<Arc<ContentInstance>> = {
            let mut contents = self.contents.lock().unwrap();
            contents
                .iter_mut()
                .filter_map(|slot| slot.instance.take())
                .collect()
        };
        futures::future::join_all(
            instances
                .into_iter()
                .map(|instance| instance.destroy()),
        )
        .await;
        self.playing_tx.send_replace(false);
    }
}
