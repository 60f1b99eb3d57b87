// crates/sync-engine/src/memory.rs
//! In-process store for tests and demos

use crate::clock::{Clock, SystemClock};
use crate::error::{StoreError, StoreResult};
use crate::store::{
    ChangeFeed, ListStore, LiveNotification, NotificationDispatch, NotificationFeed,
    OutgoingNotification, RemoteChangeEvent,
};
use async_trait::async_trait;
use shoplist_core::{ItemId, ItemUpdate, ListId, NewItem, ShoppingList, ShoppingListItem};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Number of calls made to each store operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub get_list_by_share_code: usize,
    pub get_items: usize,
    pub set_item_checked: usize,
    pub add_item: usize,
    pub update_item: usize,
    pub delete_item: usize,
    pub delete_list: usize,
    pub clear_items: usize,
    pub subscribe: usize,
    pub send: usize,
}

#[derive(Default)]
struct MemoryState {
    lists: Vec<ShoppingList>,
    items: Vec<ShoppingListItem>,
    change_subscribers: HashMap<ListId, Vec<mpsc::UnboundedSender<RemoteChangeEvent>>>,
    notification_subscribers: HashMap<ListId, Vec<mpsc::UnboundedSender<LiveNotification>>>,
    sent: Vec<OutgoingNotification>,
    calls: CallCounts,
    failing_items: HashSet<ItemId>,
    fail_notifications: bool,
    write_latency: Duration,
}

impl MemoryState {
    fn broadcast(&mut self, list_id: &ListId, event: RemoteChangeEvent) {
        if let Some(subscribers) = self.change_subscribers.get_mut(list_id) {
            subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }

    fn list_exists(&self, list_id: &ListId) -> bool {
        self.lists.iter().any(|l| &l.id == list_id)
    }
}

/// A [`ListStore`] and [`NotificationDispatch`] kept entirely in memory
///
/// Writes are echoed to change subscribers the way a real-time backend
/// would, including back to the writer. Failures can be injected per item
/// and for notification delivery.
#[derive(Clone)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Uses `clock` for server-side timestamps
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            clock,
        }
    }

    /// Creates a list with a fresh six-character share code
    pub fn create_list(&self, name: &str) -> ShoppingList {
        let share_code: String = Uuid::new_v4()
            .simple()
            .to_string()
            .chars()
            .take(6)
            .collect::<String>()
            .to_ascii_uppercase();
        let mut list = ShoppingList::new(name, share_code);
        list.created_at = self.clock.now();
        self.lock().lists.push(list.clone());
        list
    }

    /// Inserts an item without notifying subscribers
    pub fn seed_item(&self, item: ShoppingListItem) -> ShoppingListItem {
        self.lock().items.push(item.clone());
        item
    }

    pub fn item(&self, item_id: &ItemId) -> Option<ShoppingListItem> {
        self.lock().items.iter().find(|i| &i.id == item_id).cloned()
    }

    pub fn items(&self, list_id: &ListId) -> Vec<ShoppingListItem> {
        self.lock()
            .items
            .iter()
            .filter(|i| &i.list_id == list_id)
            .cloned()
            .collect()
    }

    pub fn list(&self, list_id: &ListId) -> Option<ShoppingList> {
        self.lock().lists.iter().find(|l| &l.id == list_id).cloned()
    }

    /// Pushes an event to the list's change subscribers as if another
    /// participant had made the change; stored items are left alone
    pub fn emit(&self, list_id: &ListId, event: RemoteChangeEvent) {
        self.lock().broadcast(list_id, event);
    }

    /// Toggles an item as another participant would, echoing the change
    pub fn remote_toggle(&self, item_id: &ItemId, checked: bool) -> Option<ShoppingListItem> {
        let now = self.clock.now();
        let mut state = self.lock();
        let item = state.items.iter_mut().find(|i| &i.id == item_id)?;
        item.set_checked(checked, now);
        let item = item.clone();
        state.broadcast(&item.list_id, RemoteChangeEvent::Upserted(item.clone()));
        Some(item)
    }

    /// Delivers a notification from another participant
    pub fn push_notification(&self, notification: LiveNotification) {
        let mut state = self.lock();
        if let Some(subscribers) = state.notification_subscribers.get_mut(&notification.list_id) {
            subscribers.retain(|tx| tx.send(notification.clone()).is_ok());
        }
    }

    /// Makes writes to `item_id` fail until healed
    pub fn fail_item(&self, item_id: &ItemId) {
        self.lock().failing_items.insert(item_id.clone());
    }

    pub fn heal_item(&self, item_id: &ItemId) {
        self.lock().failing_items.remove(item_id);
    }

    /// Delays every checked-flag write by `latency`
    pub fn set_write_latency(&self, latency: Duration) {
        self.lock().write_latency = latency;
    }

    pub fn fail_notifications(&self, fail: bool) {
        self.lock().fail_notifications = fail;
    }

    /// Closes every live feed for `list_id`
    pub fn drop_subscribers(&self, list_id: &ListId) {
        let mut state = self.lock();
        state.change_subscribers.remove(list_id);
        state.notification_subscribers.remove(list_id);
    }

    pub fn subscriber_count(&self, list_id: &ListId) -> usize {
        self.lock()
            .change_subscribers
            .get(list_id)
            .map(|subs| subs.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    pub fn calls(&self) -> CallCounts {
        self.lock().calls
    }

    pub fn set_checked_calls(&self) -> usize {
        self.lock().calls.set_item_checked
    }

    pub fn sent_notifications(&self) -> Vec<OutgoingNotification> {
        self.lock().sent.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ListStore for InMemoryStore {
    async fn get_list_by_share_code(&self, share_code: &str) -> StoreResult<Option<ShoppingList>> {
        let mut state = self.lock();
        state.calls.get_list_by_share_code += 1;
        Ok(state
            .lists
            .iter()
            .find(|l| l.matches_share_code(share_code))
            .cloned())
    }

    async fn get_items(&self, list_id: &ListId) -> StoreResult<Vec<ShoppingListItem>> {
        let mut state = self.lock();
        state.calls.get_items += 1;
        if !state.list_exists(list_id) {
            return Err(StoreError::NotFound(list_id.to_string()));
        }
        Ok(state
            .items
            .iter()
            .filter(|i| &i.list_id == list_id)
            .cloned()
            .collect())
    }

    async fn set_item_checked(
        &self,
        item_id: &ItemId,
        checked: bool,
    ) -> StoreResult<ShoppingListItem> {
        let latency = self.lock().write_latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let now = self.clock.now();
        let mut state = self.lock();
        state.calls.set_item_checked += 1;
        if state.failing_items.contains(item_id) {
            return Err(StoreError::Unavailable(format!(
                "write to {} failed",
                item_id
            )));
        }

        let item = state
            .items
            .iter_mut()
            .find(|i| &i.id == item_id)
            .ok_or_else(|| StoreError::NotFound(item_id.to_string()))?;
        if item.checked != checked {
            item.set_checked(checked, now);
        }
        let item = item.clone();
        state.broadcast(&item.list_id, RemoteChangeEvent::Upserted(item.clone()));
        Ok(item)
    }

    async fn add_item(&self, input: NewItem) -> StoreResult<ShoppingListItem> {
        let now = self.clock.now();
        let mut state = self.lock();
        state.calls.add_item += 1;
        if !state.list_exists(&input.list_id) {
            return Err(StoreError::NotFound(input.list_id.to_string()));
        }

        let item = ShoppingListItem::from_new(ItemId::new(), input, now);
        state.items.push(item.clone());
        state.broadcast(&item.list_id, RemoteChangeEvent::Upserted(item.clone()));
        Ok(item)
    }

    async fn update_item(
        &self,
        item_id: &ItemId,
        update: ItemUpdate,
    ) -> StoreResult<ShoppingListItem> {
        let mut state = self.lock();
        state.calls.update_item += 1;
        if state.failing_items.contains(item_id) {
            return Err(StoreError::Unavailable(format!(
                "update of {} failed",
                item_id
            )));
        }

        let item = state
            .items
            .iter_mut()
            .find(|i| &i.id == item_id)
            .ok_or_else(|| StoreError::NotFound(item_id.to_string()))?;
        update.apply_to(item);
        let item = item.clone();
        state.broadcast(&item.list_id, RemoteChangeEvent::Upserted(item.clone()));
        Ok(item)
    }

    async fn delete_item(&self, item_id: &ItemId) -> StoreResult<()> {
        let mut state = self.lock();
        state.calls.delete_item += 1;
        let index = state
            .items
            .iter()
            .position(|i| &i.id == item_id)
            .ok_or_else(|| StoreError::NotFound(item_id.to_string()))?;
        let item = state.items.remove(index);
        state.broadcast(&item.list_id, RemoteChangeEvent::Deleted(item.id));
        Ok(())
    }

    async fn delete_list(&self, list_id: &ListId) -> StoreResult<()> {
        let mut state = self.lock();
        state.calls.delete_list += 1;
        if !state.list_exists(list_id) {
            return Err(StoreError::NotFound(list_id.to_string()));
        }
        state.lists.retain(|l| &l.id != list_id);
        state.items.retain(|i| &i.list_id != list_id);
        state.change_subscribers.remove(list_id);
        state.notification_subscribers.remove(list_id);
        Ok(())
    }

    async fn clear_items(&self, list_id: &ListId) -> StoreResult<()> {
        let mut state = self.lock();
        state.calls.clear_items += 1;
        let removed: Vec<ItemId> = state
            .items
            .iter()
            .filter(|i| &i.list_id == list_id)
            .map(|i| i.id.clone())
            .collect();
        state.items.retain(|i| &i.list_id != list_id);
        for id in removed {
            state.broadcast(list_id, RemoteChangeEvent::Deleted(id));
        }
        Ok(())
    }

    async fn subscribe(&self, list_id: &ListId) -> StoreResult<ChangeFeed> {
        let mut state = self.lock();
        state.calls.subscribe += 1;
        if !state.list_exists(list_id) {
            return Err(StoreError::NotFound(list_id.to_string()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        state
            .change_subscribers
            .entry(list_id.clone())
            .or_default()
            .push(tx);
        Ok(rx)
    }
}

#[async_trait]
impl NotificationDispatch for InMemoryStore {
    async fn send(&self, notification: OutgoingNotification) -> StoreResult<()> {
        let now = self.clock.now();
        let mut state = self.lock();
        state.calls.send += 1;
        if state.fail_notifications {
            return Err(StoreError::Unavailable(
                "notification service offline".to_string(),
            ));
        }

        let live = LiveNotification {
            list_id: notification.list_id.clone(),
            message: notification.message.clone(),
            class: notification.class,
            triggered_by: notification.triggered_by.clone(),
            created_at: now,
        };
        if let Some(subscribers) = state.notification_subscribers.get_mut(&live.list_id) {
            subscribers.retain(|tx| tx.send(live.clone()).is_ok());
        }
        state.sent.push(notification);
        Ok(())
    }

    async fn subscribe_notifications(&self, list_id: &ListId) -> StoreResult<NotificationFeed> {
        let mut state = self.lock();
        let (tx, rx) = mpsc::unbounded_channel();
        state
            .notification_subscribers
            .entry(list_id.clone())
            .or_default()
            .push(tx);
        Ok(rx)
    }
}
