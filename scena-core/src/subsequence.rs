//! Nested sequences owned by a content instance
//!
//! A content may schedule its own inner episode fragment: a full
//! [`ContentSequence`] keyed by id, sharing the parent tree's registry,
//! clock, arena and managed state union. Subsequences inherit the parent
//! instance's play and show authority; they never outlive it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::context::SharedContext;
use crate::error::{Error, Result};
use crate::events::SequenceEvent;
use crate::sequence::ContentSequence;
use crate::types::Asset;

pub struct SubsequenceManager {
    ctx: Arc<SharedContext>,
    sequences: Mutex<HashMap<String, Arc<ContentSequence>>>,
    parent_playing: AtomicBool,
    parent_showing: AtomicBool,
    destroyed: AtomicBool,
}

impl SubsequenceManager {
    pub(crate) fn new(ctx: Arc<SharedContext>) -> Self {
        Self {
            ctx,
            sequences: Mutex::new(HashMap::new()),
            parent_playing: AtomicBool::new(false),
            parent_showing: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
        }
    }

    /// Create a subsequence and wait until its first content is ready.
    /// The new sequence starts hidden and paused; `start_sequence` and
    /// `show_sequence` bring it live.
    pub async fn create_sequence(&self, id: &str, assets: Vec<Asset>) -> Result<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(Error::SequenceDestroyed);
        }
        if assets.is_empty() {
            return Err(Error::EmptySubsequence);
        }
        let sequence = {
            let mut sequences = self.sequences.lock().unwrap();
            if sequences.contains_key(id) {
                return Err(Error::SubsequenceExists(id.to_owned()));
            }
            let sequence = ContentSequence::new(id, assets, Arc::clone(&self.ctx));
            sequences.insert(id.to_owned(), Arc::clone(&sequence));
            sequence
        };
        info!(sequence = id, "creating subsequence");

        // no external gate for nested sequences
        sequence.dependency_signal().settle();
        sequence.hide();
        if !self.parent_playing.load(Ordering::SeqCst) {
            sequence.parent_pause();
        }
        if !self.parent_showing.load(Ordering::SeqCst) {
            sequence.parent_hide();
        }

        // forward the end of the subsequence to every component
        let mut events = sequence.subscribe_events();
        let registry = self.ctx.registry.clone();
        let sequence_id = id.to_owned();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                if event == SequenceEvent::End {
                    debug!(sequence = %sequence_id, "subsequence ended");
                    registry.for_each(|_, component| component.sequence_ended(&sequence_id));
                    break;
                }
            }
        });

        sequence.switch_to_first_content();
        let _ = sequence.first_ready_signal().wait().await;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Arc<ContentSequence>> {
        self.sequences
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::SubsequenceNotFound(id.to_owned()))
    }

    pub fn start_sequence(&self, id: &str) -> Result<()> {
        self.get(id)?.play();
        Ok(())
    }

    pub fn show_sequence(&self, id: &str) -> Result<()> {
        self.get(id)?.show();
        Ok(())
    }

    pub fn hide_sequence(&self, id: &str) -> Result<()> {
        self.get(id)?.hide();
        Ok(())
    }

    fn all(&self) -> Vec<Arc<ContentSequence>> {
        self.sequences.lock().unwrap().values().cloned().collect()
    }

    pub(crate) fn parent_play(&self) {
        self.parent_playing.store(true, Ordering::SeqCst);
        for sequence in self.all() {
            sequence.parent_play();
        }
    }

    pub(crate) fn parent_pause(&self) {
        self.parent_playing.store(false, Ordering::SeqCst);
        for sequence in self.all() {
            sequence.parent_pause();
        }
    }

    pub(crate) fn parent_show(&self) {
        self.parent_showing.store(true, Ordering::SeqCst);
        for sequence in self.all() {
            sequence.parent_show();
        }
    }

    pub(crate) fn parent_hide(&self) {
        self.parent_showing.store(false, Ordering::SeqCst);
        for sequence in self.all() {
            sequence.parent_hide();
        }
    }

    pub(crate) fn set_volume(&self, volume: f64) {
        for sequence in self.all() {
            sequence.set_volume(volume);
        }
    }

    pub(crate) fn tick(&self) {
        for sequence in self.all() {
            sequence.tick();
        }
    }

    /// Destroy every subsequence. Best-effort across the set.
    pub(crate) async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        let sequences: Vec<Arc<ContentSequence>> =
            self.sequences.lock().unwrap().drain().map(|(_, s)| s).collect();
        futures::future::join_all(sequences.into_iter().map(|sequence| sequence.destroy())).await;
    }
}
