// crates/sync-engine/src/collection.rs
//! The session's in-memory item list

use shoplist_core::{ItemId, ShoppingListItem};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// Ordered items of the loaded list plus a revision counter
///
/// Every change that alters what a viewer sees bumps the revision once;
/// observers use [`ItemCollection::subscribe`] as a re-render signal.
#[derive(Clone)]
pub struct ItemCollection {
    items: Arc<Mutex<Vec<ShoppingListItem>>>,
    revision: Arc<watch::Sender<u64>>,
}

impl ItemCollection {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            items: Arc::new(Mutex::new(Vec::new())),
            revision: Arc::new(revision),
        }
    }

    /// Copy of the current items in collection order
    pub fn items(&self) -> Vec<ShoppingListItem> {
        self.lock().clone()
    }

    pub fn get(&self, item_id: &ItemId) -> Option<ShoppingListItem> {
        self.lock().iter().find(|i| &i.id == item_id).cloned()
    }

    pub fn contains(&self, item_id: &ItemId) -> bool {
        self.lock().iter().any(|i| &i.id == item_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Runs `f` over the items in one locked pass
    ///
    /// The revision is bumped once if `f` reports a change.
    pub fn apply_batch<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut Vec<ShoppingListItem>) -> (bool, R),
    {
        let (changed, result) = {
            let mut items = self.lock();
            f(&mut items)
        };
        if changed {
            self.bump();
        }
        result
    }

    /// Applies `f` to one item; returns false if the item is absent
    pub fn update_item<F>(&self, item_id: &ItemId, f: F) -> bool
    where
        F: FnOnce(&mut ShoppingListItem),
    {
        self.apply_batch(|items| match items.iter_mut().find(|i| &i.id == item_id) {
            Some(item) => {
                f(item);
                (true, true)
            }
            None => (false, false),
        })
    }

    /// Replaces the item with the same id or appends it
    pub fn upsert(&self, item: ShoppingListItem) {
        self.apply_batch(|items| {
            match items.iter_mut().find(|i| i.id == item.id) {
                Some(existing) => *existing = item,
                None => items.push(item),
            }
            (true, ())
        })
    }

    pub fn remove(&self, item_id: &ItemId) -> Option<ShoppingListItem> {
        self.apply_batch(|items| match items.iter().position(|i| &i.id == item_id) {
            Some(index) => (true, Some(items.remove(index))),
            None => (false, None),
        })
    }

    pub fn clear(&self) {
        self.apply_batch(|items| {
            let changed = !items.is_empty();
            items.clear();
            (changed, ())
        })
    }

    fn bump(&self) {
        self.revision.send_modify(|r| *r += 1);
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ShoppingListItem>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ItemCollection {
    fn default() -> Self {
        Self::new()
    }
}
