// crates/sync-engine/src/pending.rs
//! Items with unconfirmed local edits

use shoplist_core::ItemId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Marks {
    generations: HashMap<ItemId, u64>,
    next: u64,
}

/// Set of items whose local checked value has not been confirmed remotely
///
/// Remote snapshots for these items are ignored until the flag clears. Every
/// mark gets a fresh generation so a write can only clear the mark it was
/// issued under.
#[derive(Debug, Clone, Default)]
pub struct PendingTracker {
    marks: Arc<Mutex<Marks>>,
}

impl PendingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flags `item_id` and returns the generation of this mark
    pub fn mark(&self, item_id: &ItemId) -> u64 {
        let mut marks = self.lock();
        marks.next += 1;
        let generation = marks.next;
        marks.generations.insert(item_id.clone(), generation);
        generation
    }

    pub fn generation(&self, item_id: &ItemId) -> Option<u64> {
        self.lock().generations.get(item_id).copied()
    }

    /// Clears the flag only if it is still at `generation`
    pub fn clear_if(&self, item_id: &ItemId, generation: u64) -> bool {
        let mut marks = self.lock();
        if marks.generations.get(item_id) == Some(&generation) {
            marks.generations.remove(item_id);
            true
        } else {
            false
        }
    }

    pub fn clear(&self, item_id: &ItemId) {
        self.lock().generations.remove(item_id);
    }

    pub fn clear_all(&self) {
        self.lock().generations.clear();
    }

    pub fn is_pending(&self, item_id: &ItemId) -> bool {
        self.lock().generations.contains_key(item_id)
    }

    pub fn len(&self) -> usize {
        self.lock().generations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().generations.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Marks> {
        self.marks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
