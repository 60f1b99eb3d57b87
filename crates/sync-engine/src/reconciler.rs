// crates/sync-engine/src/reconciler.rs
//! Merging remote change events into local state

use crate::collection::ItemCollection;
use crate::pending::PendingTracker;
use crate::queue::MutationQueue;
use crate::store::RemoteChangeEvent;
use crate::timer::DebounceTimer;
use shoplist_core::{ItemId, ListId, ShoppingListItem};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;

/// What one batch merge did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub replaced: usize,
    pub inserted: usize,
    /// Snapshots equal to local state in every visible field
    pub unchanged: usize,
    /// Snapshots dropped because a local edit is still pending
    pub skipped_pending: usize,
}

impl ReconcileReport {
    pub fn applied(&self) -> usize {
        self.replaced + self.inserted
    }
}

#[derive(Default)]
struct ReconcilerState {
    list_id: Option<ListId>,
    batch: Vec<ShoppingListItem>,
    tombstones: HashSet<ItemId>,
}

struct ReconcilerInner {
    collection: ItemCollection,
    pending: PendingTracker,
    queue: MutationQueue,
    state: Mutex<ReconcilerState>,
    timer: DebounceTimer,
}

/// Applies remote events without clobbering pending local edits
///
/// Upserts are collected for a short window and merged in one pass; the
/// window starts at the first upsert and is not extended by later ones.
/// Deletes apply at once and tombstone the id so a late upsert cannot bring
/// the item back.
#[derive(Clone)]
pub struct RemoteReconciler {
    inner: Arc<ReconcilerInner>,
}

impl RemoteReconciler {
    pub fn new(
        handle: Handle,
        window: Duration,
        collection: ItemCollection,
        pending: PendingTracker,
        queue: MutationQueue,
    ) -> Self {
        Self {
            inner: Arc::new(ReconcilerInner {
                collection,
                pending,
                queue,
                state: Mutex::new(ReconcilerState::default()),
                timer: DebounceTimer::new(handle, window),
            }),
        }
    }

    /// Restricts upserts to `list_id` and forgets earlier tombstones
    pub fn bind(&self, list_id: ListId) {
        let mut state = self.lock();
        state.list_id = Some(list_id);
        state.tombstones.clear();
    }

    pub fn on_remote_event(&self, event: RemoteChangeEvent) {
        match event {
            RemoteChangeEvent::Upserted(item) => self.queue_upsert(item),
            RemoteChangeEvent::Deleted(item_id) => self.apply_delete(&item_id),
        }
    }

    /// Removes an item everywhere and tombstones its id
    pub fn apply_delete(&self, item_id: &ItemId) {
        {
            let mut state = self.lock();
            state.batch.retain(|i| &i.id != item_id);
            state.tombstones.insert(item_id.clone());
        }
        self.inner.pending.clear(item_id);
        self.inner.queue.discard(item_id);
        if self.inner.collection.remove(item_id).is_some() {
            log::debug!("Removed deleted item {}", item_id);
        }
    }

    /// Drops anything waiting in the batch
    pub fn discard_batch(&self) {
        self.lock().batch.clear();
        self.inner.timer.cancel();
    }

    pub fn batched(&self) -> usize {
        self.lock().batch.len()
    }

    pub fn is_tombstoned(&self, item_id: &ItemId) -> bool {
        self.lock().tombstones.contains(item_id)
    }

    pub fn cancel(&self) {
        self.inner.timer.cancel();
    }

    pub async fn settle(&self) {
        self.inner.timer.settle().await;
    }

    /// Merges the batch now instead of waiting for the window
    pub fn flush_now(&self) -> ReconcileReport {
        self.inner.timer.cancel();
        self.flush()
    }

    fn queue_upsert(&self, item: ShoppingListItem) {
        {
            let mut state = self.lock();
            if state.list_id.as_ref().is_some_and(|id| id != &item.list_id) {
                log::debug!("Ignoring upsert of {} from list {}", item.id, item.list_id);
                return;
            }
            if state.tombstones.contains(&item.id) {
                log::debug!("Ignoring upsert of deleted item {}", item.id);
                return;
            }
            match state.batch.iter_mut().find(|i| i.id == item.id) {
                Some(queued) => *queued = item,
                None => state.batch.push(item),
            }
        }

        let reconciler = self.clone();
        self.inner.timer.start_if_idle(async move {
            reconciler.flush();
        });
    }

    fn flush(&self) -> ReconcileReport {
        let batch = std::mem::take(&mut self.lock().batch);
        if batch.is_empty() {
            return ReconcileReport::default();
        }

        let pending = &self.inner.pending;
        let report = self.inner.collection.apply_batch(|items| {
            let mut report = ReconcileReport::default();
            for incoming in batch {
                if pending.is_pending(&incoming.id) {
                    report.skipped_pending += 1;
                    continue;
                }
                match items.iter_mut().find(|i| i.id == incoming.id) {
                    Some(existing) if existing.differs_visibly(&incoming) => {
                        *existing = incoming;
                        report.replaced += 1;
                    }
                    Some(_) => report.unchanged += 1,
                    None => {
                        items.push(incoming);
                        report.inserted += 1;
                    }
                }
            }
            (report.applied() > 0, report)
        });

        log::debug!(
            "Merged remote batch: {} replaced, {} inserted, {} unchanged, {} pending",
            report.replaced,
            report.inserted,
            report.unchanged,
            report.skipped_pending
        );
        report
    }

    fn lock(&self) -> MutexGuard<'_, ReconcilerState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
