// crates/sync-engine/src/queue.rs
//! Debounced batching of checked-flag writes

use crate::error::{StoreError, SyncError};
use crate::pending::PendingTracker;
use crate::report::SyncReporter;
use crate::store::ListStore;
use crate::timer::DebounceTimer;
use async_trait::async_trait;
use futures::future::join_all;
use shoplist_core::ItemId;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;

/// Outcome of one flush
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Items the store accepted
    pub confirmed: Vec<ItemId>,
    /// Items the store refused; local state was kept
    pub failed: Vec<(ItemId, StoreError)>,
    /// How many confirmed writes set an item to checked
    pub newly_checked: usize,
}

impl FlushReport {
    pub fn len(&self) -> usize {
        self.confirmed.len() + self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Hook run after every non-empty flush
#[async_trait]
pub trait FlushListener: Send + Sync {
    async fn on_flush(&self, report: &FlushReport);
}

struct QueueInner {
    queued: Mutex<BTreeMap<ItemId, bool>>,
    store: Arc<dyn ListStore>,
    pending: PendingTracker,
    reporter: Arc<dyn SyncReporter>,
    listener: Option<Arc<dyn FlushListener>>,
    timer: DebounceTimer,
}

/// Coalesces toggles per item and writes them after a quiet period
///
/// Every enqueue restarts one shared debounce timer, so a burst of toggles
/// across many items becomes a single flush with one call per item.
#[derive(Clone)]
pub struct MutationQueue {
    inner: Arc<QueueInner>,
}

impl MutationQueue {
    pub fn new(
        handle: Handle,
        debounce: Duration,
        store: Arc<dyn ListStore>,
        pending: PendingTracker,
        reporter: Arc<dyn SyncReporter>,
    ) -> Self {
        Self::with_listener(handle, debounce, store, pending, reporter, None)
    }

    pub fn with_listener(
        handle: Handle,
        debounce: Duration,
        store: Arc<dyn ListStore>,
        pending: PendingTracker,
        reporter: Arc<dyn SyncReporter>,
        listener: Option<Arc<dyn FlushListener>>,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                queued: Mutex::new(BTreeMap::new()),
                store,
                pending,
                reporter,
                listener,
                timer: DebounceTimer::new(handle, debounce),
            }),
        }
    }

    /// Queues the latest value for `item_id` and restarts the debounce
    pub fn enqueue(&self, item_id: ItemId, checked: bool) {
        self.lock().insert(item_id, checked);

        let queue = self.clone();
        self.inner.timer.restart(async move {
            queue.flush().await;
        });
    }

    /// Drops the queued value for `item_id`, if any
    pub fn discard(&self, item_id: &ItemId) -> Option<bool> {
        self.lock().remove(item_id)
    }

    /// Drops everything queued
    pub fn discard_all(&self) {
        self.lock().clear();
        self.inner.timer.cancel();
    }

    pub fn queued(&self, item_id: &ItemId) -> Option<bool> {
        self.lock().get(item_id).copied()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn is_scheduled(&self) -> bool {
        self.inner.timer.is_pending()
    }

    /// Disarms the debounce without touching queued values
    pub fn cancel_timer(&self) {
        self.inner.timer.cancel();
    }

    /// Waits for flushes the timer has already started
    pub async fn settle(&self) {
        self.inner.timer.settle().await;
    }

    /// Writes everything queued, one concurrent call per item
    ///
    /// The queue is emptied before any call is issued, so toggles made while
    /// the calls are in flight start a new batch. Failures keep local state
    /// and are reported, never re-queued.
    pub async fn flush(&self) -> FlushReport {
        let batch: Vec<(ItemId, bool)> = std::mem::take(&mut *self.lock()).into_iter().collect();
        if batch.is_empty() {
            return FlushReport::default();
        }

        log::debug!("Flushing {} queued toggle(s)", batch.len());

        let store = &self.inner.store;
        let pending = &self.inner.pending;
        let calls = batch.into_iter().map(|(item_id, checked)| async move {
            let generation = pending.generation(&item_id);
            let result = store.set_item_checked(&item_id, checked).await;
            (item_id, checked, generation, result)
        });
        let results = join_all(calls).await;

        let mut report = FlushReport::default();
        for (item_id, checked, generation, result) in results {
            // A toggle made after this batch was drained owns a newer mark.
            match generation {
                Some(generation) => {
                    pending.clear_if(&item_id, generation);
                }
                None if !self.lock().contains_key(&item_id) => pending.clear(&item_id),
                None => {}
            }

            match result {
                Ok(_) => {
                    if checked {
                        report.newly_checked += 1;
                    }
                    report.confirmed.push(item_id);
                }
                Err(source) => {
                    self.inner.reporter.report(&SyncError::TransientSyncFailure {
                        item_id: item_id.clone(),
                        checked,
                        source: source.clone(),
                    });
                    report.failed.push((item_id, source));
                }
            }
        }

        if let Some(listener) = &self.inner.listener {
            listener.on_flush(&report).await;
        }

        report
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<ItemId, bool>> {
        self.inner
            .queued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
