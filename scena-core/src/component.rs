//! Component integration surface
//!
//! A component is anything registered with the core that renders or reacts
//! to content: a video stage, an audio mixer, a subtitle overlay, an
//! analytics tap. The core does not know what a component is for; it only
//! fans lifecycle notifications out through the [`Component`] trait.
//!
//! Every method has a no-op default, so a component implements exactly the
//! subset of the surface it cares about. The set of overridden methods is
//! the component's capability map.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use futures::future::BoxFuture;

use crate::types::ContentSpec;

/// Callbacks the core invokes on registered components.
///
/// All methods are synchronous notifications except [`destroy_itself`] and
/// [`run_queued_task`], which return futures the core awaits. Components
/// must not call back into the core from inside these methods; use the
/// handle they received at registration, from a spawned task.
///
/// [`destroy_itself`]: Component::destroy_itself
/// [`run_queued_task`]: Component::run_queued_task
#[allow(unused_variables)]
pub trait Component: Send + Sync {
    /// The sequence (or core) started playing.
    fn play(&self) {}

    /// The sequence (or core) paused.
    fn pause(&self) {}

    /// The timeline went stuck; halt any self-driven playback.
    fn suspend(&self) {}

    /// The timeline recovered from stuck.
    fn resume(&self) {}

    /// Periodic position report: `progress` milliseconds into the current
    /// segment, sampled at clock time `time`.
    fn sync(&self, progress: f64, time: f64) {}

    /// Prepare renderable resources for a content. The component reports
    /// readiness later through its handle's `update_content_state`.
    fn create_content(&self, id: &str, spec: &ContentSpec) {}

    fn show_content(&self, id: &str) {}

    fn hide_content(&self, id: &str) {}

    fn destroy_content(&self, id: &str) {}

    /// The component as a whole became visible.
    fn show_itself(&self) {}

    /// The component as a whole was hidden.
    fn hide_itself(&self) {}

    /// The component is being unregistered or the core is being destroyed.
    /// The returned future is awaited before teardown continues.
    fn destroy_itself(&self) -> BoxFuture<'static, ()> {
        Box::pin(async {})
    }

    /// Asked before a content switch from segment `from` to segment `to`.
    /// Returning `true` adds this component to the switch barrier; it must
    /// later release itself via its handle's `unblock_content_switch`.
    fn should_block_content_switch(&self, from: i64, to: i64) -> bool {
        false
    }

    /// A dialog action was triggered by the host UI. The payload is passed
    /// through untouched; presentation is the host's concern.
    fn handle_dialog_action_trigger(&self, action: &serde_json::Value) {}

    /// Claim a task the host scheduled under `task_id`. Return `Some` to
    /// run it, `None` to pass.
    fn run_queued_task(&self, task_id: &str) -> Option<BoxFuture<'static, ()>> {
        None
    }

    /// A subsequence this component started has played its last segment.
    fn sequence_ended(&self, sequence_id: &str) {}
}

/// Registry of live components, keyed by registration name.
#[derive(Clone, Default)]
pub struct ComponentRegistry {
    components: Arc<RwLock<HashMap<String, Arc<dyn Component>>>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: &str, component: Arc<dyn Component>) {
        self.components
            .write()
            .unwrap()
            .insert(name.to_owned(), component);
    }

    pub fn remove(&self, name: &str) -> Option<Arc<dyn Component>> {
        self.components.write().unwrap().remove(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Component>> {
        self.components.read().unwrap().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.components.read().unwrap().keys().cloned().collect()
    }

    /// Run `f` for every registered component. The registry lock is not
    /// held while `f` runs.
    pub fn for_each(&self, mut f: impl FnMut(&str, &Arc<dyn Component>)) {
        let snapshot: Vec<(String, Arc<dyn Component>)> = self
            .components
            .read()
            .unwrap()
            .iter()
            .map(|(name, component)| (name.clone(), Arc::clone(component)))
            .collect();
        for (name, component) in &snapshot {
            f(name, component);
        }
    }

    /// Names of the components that want to hold up a switch from segment
    /// `from` to segment `to`.
    pub fn switch_blockers(&self, from: i64, to: i64) -> Vec<String> {
        let mut blockers = Vec::new();
        self.for_each(|name, component| {
            if component.should_block_content_switch(from, to) {
                blockers.push(name.to_owned());
            }
        });
        blockers
    }
}
