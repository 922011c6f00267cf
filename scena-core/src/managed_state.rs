//! Managed core state
//!
//! Contents and audio sources publish time-varying state (subtitles,
//! chapter markers, pause points) as *managed core state*: plain records
//! tagged with an extension id. Each publisher owns a
//! [`ManagedCoreStateList`] that maps a media time to the set of records
//! active at that time; the [`ManagedCoreStateManager`] merges every
//! registered list into one queryable union for the host.
//!
//! Two trigger shapes exist. A range trigger holds its record active over
//! `[from, to)`. A point trigger fires an edge when playback crosses its
//! time, and never contributes to the active set.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Extension id of the built-in pause point triggers handled by
/// [`EpisodeCore::tick`](crate::episode::EpisodeCore::tick).
pub const PAUSE_TRIGGER_EXTENSION_ID: &str = "core:pause";

/// One record of managed state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedCoreState {
    pub id: String,
    pub extension_id: String,
    #[serde(default)]
    pub spec: serde_json::Value,
}

/// A time-keyed rule producing managed state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StateTrigger {
    /// Active over `[from, to)` milliseconds.
    Range {
        id: String,
        extension_id: String,
        from: f64,
        to: f64,
        #[serde(default)]
        spec: serde_json::Value,
    },
    /// Fires an edge when playback crosses `time`.
    Point {
        id: String,
        extension_id: String,
        time: f64,
        /// Fire at most once over the list's lifetime.
        #[serde(default)]
        once: bool,
        /// Also fire when `time` is crossed by a seek rather than by
        /// normal progression.
        #[serde(default)]
        trigger_on_seek: bool,
        #[serde(default)]
        spec: serde_json::Value,
    },
}

impl StateTrigger {
    fn state(&self) -> ManagedCoreState {
        match self {
            StateTrigger::Range {
                id,
                extension_id,
                spec,
                ..
            }
            | StateTrigger::Point {
                id,
                extension_id,
                spec,
                ..
            } => ManagedCoreState {
                id: id.clone(),
                extension_id: extension_id.clone(),
                spec: spec.clone(),
            },
        }
    }
}

/// Why a list is being moved to a new time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateReason {
    /// Normal playback progression.
    Tick,
    /// A jump; point triggers only fire if they opted in.
    Seek,
}

/// A point trigger edge, delivered through the manager's channel.
#[derive(Debug, Clone, PartialEq)]
pub struct PointTriggerEvent {
    /// The trigger's own time, for overshoot correction.
    pub time: f64,
    pub state: ManagedCoreState,
}

/// One publisher's view of its managed state over time.
///
/// `triggers: None` means the list is manual-only: records are added and
/// removed explicitly and [`seek`](ManagedCoreStateList::seek) never
/// changes anything.
pub struct ManagedCoreStateList {
    id: Uuid,
    triggers: Option<Vec<StateTrigger>>,
    manual: HashMap<String, ManagedCoreState>,
    active_range_ids: HashSet<String>,
    fired_once: HashSet<String>,
    last_time: f64,
    generation: u64,
}

/// What a call to [`ManagedCoreStateList::seek`] changed.
pub struct SeekOutcome {
    /// The active set differs from before the seek.
    pub dirty: bool,
    /// Point triggers crossed by this move, in trigger order.
    pub fired: Vec<PointTriggerEvent>,
}

impl ManagedCoreStateList {
    pub fn new(triggers: Option<Vec<StateTrigger>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            triggers,
            manual: HashMap::new(),
            active_range_ids: HashSet::new(),
            fired_once: HashSet::new(),
            last_time: 0.0,
            generation: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Add a manual record. Replaces any record with the same id.
    pub fn add_state(&mut self, state: ManagedCoreState) {
        self.manual.insert(state.id.clone(), state);
        self.generation += 1;
    }

    pub fn remove_state(&mut self, id: &str) -> bool {
        let removed = self.manual.remove(id).is_some();
        if removed {
            self.generation += 1;
        }
        removed
    }

    /// Replace the trigger set. The active subset is recomputed on the
    /// next seek.
    pub fn set_triggers(&mut self, triggers: Option<Vec<StateTrigger>>) {
        self.triggers = triggers;
        self.active_range_ids.clear();
        self.fired_once.clear();
        self.generation += 1;
    }

    pub fn clear_states(&mut self) {
        if !self.manual.is_empty() {
            self.manual.clear();
            self.generation += 1;
        }
    }

    /// Move the list to `time`. Recomputes which range triggers are active
    /// and collects the point triggers crossed on the way.
    pub fn seek(&mut self, time: f64, reason: UpdateReason) -> SeekOutcome {
        let Some(triggers) = &self.triggers else {
            self.last_time = time;
            return SeekOutcome {
                dirty: false,
                fired: Vec::new(),
            };
        };

        let last_time = self.last_time;
        self.last_time = time;

        let mut active = HashSet::new();
        let mut fired = Vec::new();
        for trigger in triggers {
            match trigger {
                StateTrigger::Range { id, from, to, .. } => {
                    if *from <= time && time < *to {
                        active.insert(id.clone());
                    }
                }
                StateTrigger::Point {
                    id,
                    time: at,
                    once,
                    trigger_on_seek,
                    ..
                } => {
                    let crossed = last_time < *at && *at <= time;
                    if !crossed {
                        continue;
                    }
                    if reason == UpdateReason::Seek && !trigger_on_seek {
                        continue;
                    }
                    if *once && !self.fired_once.insert(id.clone()) {
                        continue;
                    }
                    fired.push(PointTriggerEvent {
                        time: *at,
                        state: trigger.state(),
                    });
                }
            }
        }

        let dirty = active != self.active_range_ids;
        if dirty {
            self.active_range_ids = active;
            self.generation += 1;
        }
        SeekOutcome { dirty, fired }
    }

    /// All currently active records: manual ones plus the active ranges.
    pub fn states(&self) -> Vec<ManagedCoreState> {
        let mut states: Vec<ManagedCoreState> = self.manual.values().cloned().collect();
        if let Some(triggers) = &self.triggers {
            for trigger in triggers {
                if let StateTrigger::Range { id, .. } = trigger {
                    if self.active_range_ids.contains(id) {
                        states.push(trigger.state());
                    }
                }
            }
        }
        states
    }

    fn generation(&self) -> u64 {
        self.generation
    }
}

/// Merges every registered [`ManagedCoreStateList`] into one union.
///
/// The union is materialized lazily: each list carries a generation
/// counter, and [`states`](ManagedCoreStateManager::states) only rebuilds
/// when some list's generation moved since the last build.
pub struct ManagedCoreStateManager {
    lists: Mutex<HashMap<Uuid, Arc<Mutex<ManagedCoreStateList>>>>,
    cache: Mutex<UnionCache>,
    edge_tx: mpsc::UnboundedSender<PointTriggerEvent>,
    edge_rx: Mutex<mpsc::UnboundedReceiver<PointTriggerEvent>>,
}

#[derive(Default)]
struct UnionCache {
    generations: HashMap<Uuid, u64>,
    states: Vec<ManagedCoreState>,
}

impl ManagedCoreStateManager {
    pub fn new() -> Self {
        let (edge_tx, edge_rx) = mpsc::unbounded_channel();
        Self {
            lists: Mutex::new(HashMap::new()),
            cache: Mutex::new(UnionCache::default()),
            edge_tx,
            edge_rx: Mutex::new(edge_rx),
        }
    }

    pub fn register_list(&self, list: &Arc<Mutex<ManagedCoreStateList>>) {
        let id = list.lock().unwrap().id();
        debug!(list_id = %id, "registering managed state list");
        self.lists.lock().unwrap().insert(id, Arc::clone(list));
    }

    pub fn unregister_list(&self, id: Uuid) {
        if self.lists.lock().unwrap().remove(&id).is_some() {
            debug!(list_id = %id, "unregistered managed state list");
        }
    }

    /// Hand the manager point trigger edges collected from a list seek.
    pub fn dispatch_edges(&self, fired: Vec<PointTriggerEvent>) {
        for event in fired {
            // receiver lives as long as self, send cannot fail
            let _ = self.edge_tx.send(event);
        }
    }

    /// Drain the point trigger edges accumulated since the last call.
    pub fn take_edges(&self) -> Vec<PointTriggerEvent> {
        let mut rx = self.edge_rx.lock().unwrap();
        let mut edges = Vec::new();
        while let Ok(event) = rx.try_recv() {
            edges.push(event);
        }
        edges
    }

    /// The union of every registered list's active records.
    pub fn states(&self) -> Vec<ManagedCoreState> {
        let lists = self.lists.lock().unwrap();
        let mut cache = self.cache.lock().unwrap();

        let mut generations = HashMap::with_capacity(lists.len());
        for (id, list) in lists.iter() {
            generations.insert(*id, list.lock().unwrap().generation());
        }
        if generations != cache.generations {
            let mut states = Vec::new();
            for list in lists.values() {
                states.extend(list.lock().unwrap().states());
            }
            cache.generations = generations;
            cache.states = states;
        }
        cache.states.clone()
    }

    /// Active records filtered by extension id.
    pub fn states_by_type(&self, extension_id: &str) -> Vec<ManagedCoreState> {
        self.states()
            .into_iter()
            .filter(|state| state.extension_id == extension_id)
            .collect()
    }
}

impl Default for ManagedCoreStateManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(id: &str, from: f64, to: f64) -> StateTrigger {
        StateTrigger::Range {
            id: id.to_owned(),
            extension_id: "subtitle".to_owned(),
            from,
            to,
            spec: serde_json::Value::Null,
        }
    }

    fn point(id: &str, time: f64, once: bool, trigger_on_seek: bool) -> StateTrigger {
        StateTrigger::Point {
            id: id.to_owned(),
            extension_id: "marker".to_owned(),
            time,
            once,
            trigger_on_seek,
            spec: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_range_activation_half_open() {
        let mut list = ManagedCoreStateList::new(Some(vec![range("a", 1000.0, 2000.0)]));

        assert!(!list.seek(999.0, UpdateReason::Tick).dirty);
        assert!(list.seek(1000.0, UpdateReason::Tick).dirty);
        assert_eq!(list.states().len(), 1);

        // `to` is exclusive
        assert!(list.seek(2000.0, UpdateReason::Tick).dirty);
        assert!(list.states().is_empty());
    }

    #[test]
    fn test_point_fires_on_crossing_only() {
        let mut list = ManagedCoreStateList::new(Some(vec![point("p", 500.0, false, false)]));

        assert!(list.seek(499.0, UpdateReason::Tick).fired.is_empty());
        let outcome = list.seek(500.0, UpdateReason::Tick);
        assert_eq!(outcome.fired.len(), 1);
        assert_eq!(outcome.fired[0].time, 500.0);

        // staying past the point does not re-fire
        assert!(list.seek(600.0, UpdateReason::Tick).fired.is_empty());
        // but crossing again after rewinding does (not a once trigger)
        list.seek(0.0, UpdateReason::Seek);
        assert_eq!(list.seek(600.0, UpdateReason::Tick).fired.len(), 1);
    }

    #[test]
    fn test_point_once_and_seek_opt_in() {
        let mut list = ManagedCoreStateList::new(Some(vec![
            point("once", 100.0, true, true),
            point("quiet", 100.0, false, false),
        ]));

        // a seek only fires the opted-in trigger
        let outcome = list.seek(150.0, UpdateReason::Seek);
        assert_eq!(outcome.fired.len(), 1);
        assert_eq!(outcome.fired[0].state.id, "once");

        // `once` suppresses the second crossing even via tick
        list.seek(0.0, UpdateReason::Seek);
        assert!(list.seek(150.0, UpdateReason::Tick).fired.iter().all(|e| e.state.id == "quiet"));
    }

    #[test]
    fn test_manual_only_list_ignores_seek() {
        let mut list = ManagedCoreStateList::new(None);
        list.add_state(ManagedCoreState {
            id: "m".to_owned(),
            extension_id: "ui".to_owned(),
            spec: serde_json::Value::Null,
        });

        let outcome = list.seek(1e9, UpdateReason::Tick);
        assert!(!outcome.dirty);
        assert!(outcome.fired.is_empty());
        assert_eq!(list.states().len(), 1);
    }

    #[test]
    fn test_manager_union_tracks_list_changes() {
        let manager = ManagedCoreStateManager::new();
        let list = Arc::new(Mutex::new(ManagedCoreStateList::new(Some(vec![range(
            "a", 0.0, 1000.0,
        )]))));
        manager.register_list(&list);

        assert!(manager.states().is_empty());
        list.lock().unwrap().seek(500.0, UpdateReason::Tick);
        assert_eq!(manager.states().len(), 1);
        assert_eq!(manager.states_by_type("subtitle").len(), 1);
        assert!(manager.states_by_type("marker").is_empty());

        let id = list.lock().unwrap().id();
        manager.unregister_list(id);
        // cache invalidates because the generation map shrank
        assert!(manager.states().is_empty());
    }

    #[test]
    fn test_edge_channel_round_trip() {
        let manager = ManagedCoreStateManager::new();
        let mut list = ManagedCoreStateList::new(Some(vec![point("p", 10.0, false, false)]));
        let outcome = list.seek(20.0, UpdateReason::Tick);
        manager.dispatch_edges(outcome.fired);

        let edges = manager.take_edges();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].state.id, "p");
        assert!(manager.take_edges().is_empty());
    }
}
