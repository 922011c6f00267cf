//! State shared across one sequence tree
//!
//! The root sequence and every nested subsequence see the same component
//! registry, clock, managed state union, instance arena and showing
//! counter. Instances are reached through the arena by id; ownership of an
//! instance stays with the sequence slot that created it.

use std::collections::HashMap;
use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, Mutex, Weak};

use scena_timeline::Clock;

use crate::component::ComponentRegistry;
use crate::config::SyncConfig;
use crate::instance::ContentInstance;
use crate::managed_state::ManagedCoreStateManager;
use crate::sequence::ContentSequence;
use crate::task_queue::ExecutionQueue;

pub(crate) struct SharedContext {
    pub registry: ComponentRegistry,
    pub clock: Clock,
    pub sync: SyncConfig,
    pub state_manager: Arc<ManagedCoreStateManager>,
    /// Arena of live instances, keyed by instance id. A lookup table, not
    /// an ownership relation.
    pub instances: Mutex<HashMap<String, Arc<ContentInstance>>>,
    /// Contents currently shown anywhere in the tree.
    pub showing_content_count: AtomicUsize,
    pub queue: Arc<dyn ExecutionQueue>,
    /// Every sequence in the tree (root and nested), for operations that
    /// must reach all of them, like barrier unblocks.
    pub sequences: Mutex<Vec<Weak<ContentSequence>>>,
}

impl SharedContext {
    pub fn instance(&self, id: &str) -> Option<Arc<ContentInstance>> {
        self.instances.lock().unwrap().get(id).cloned()
    }

    pub fn register_sequence(&self, sequence: &Arc<ContentSequence>) {
        let mut sequences = self.sequences.lock().unwrap();
        sequences.retain(|weak| weak.strong_count() > 0);
        sequences.push(Arc::downgrade(sequence));
    }

    pub fn for_each_sequence(&self, f: impl Fn(&Arc<ContentSequence>)) {
        let alive: Vec<Arc<ContentSequence>> = self
            .sequences
            .lock()
            .unwrap()
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        for sequence in &alive {
            f(sequence);
        }
    }
}
