// crates/sync-engine/src/mutator.rs
//! Instant local toggles

use crate::clock::Clock;
use crate::collection::ItemCollection;
use crate::pending::PendingTracker;
use crate::queue::MutationQueue;
use shoplist_core::ItemId;
use std::sync::Arc;

/// Applies a toggle to local state at once and queues the remote write
#[derive(Clone)]
pub struct OptimisticMutator {
    collection: ItemCollection,
    pending: PendingTracker,
    queue: MutationQueue,
    clock: Arc<dyn Clock>,
}

impl OptimisticMutator {
    pub fn new(
        collection: ItemCollection,
        pending: PendingTracker,
        queue: MutationQueue,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            collection,
            pending,
            queue,
            clock,
        }
    }

    /// Sets the checked flag locally, marks the item pending and queues it
    ///
    /// Returns false without side effects when the item is not in the list.
    pub fn apply_local_toggle(&self, item_id: &ItemId, checked: bool) -> bool {
        let now = self.clock.now();
        let pending = &self.pending;
        // Marked under the collection lock so a concurrent remote merge skips the item.
        let applied = self.collection.update_item(item_id, |item| {
            pending.mark(item_id);
            item.set_checked(checked, now);
        });
        if !applied {
            log::debug!("Ignoring toggle for unknown item {}", item_id);
            return false;
        }

        self.queue.enqueue(item_id.clone(), checked);
        true
    }
}
