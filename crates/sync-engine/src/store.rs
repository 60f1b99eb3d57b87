// crates/sync-engine/src/store.rs
//! Remote collaborators and the messages they exchange

use crate::error::StoreResult;
use crate::throttle::EventClass;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shoplist_core::{
    ItemId, ItemUpdate, ListId, NewItem, ShoppingList, ShoppingListItem, Timestamp,
};
use tokio::sync::mpsc;

/// A change to one item pushed by the live transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum RemoteChangeEvent {
    Upserted(ShoppingListItem),
    Deleted(ItemId),
}

impl RemoteChangeEvent {
    pub fn item_id(&self) -> &ItemId {
        match self {
            Self::Upserted(item) => &item.id,
            Self::Deleted(id) => id,
        }
    }
}

/// Live change events for one list; the channel closing means the
/// subscription was lost
pub type ChangeFeed = mpsc::UnboundedReceiver<RemoteChangeEvent>;

/// Live notifications for one list
pub type NotificationFeed = mpsc::UnboundedReceiver<LiveNotification>;

/// A notification about to be sent to the other participants of a list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingNotification {
    pub list_id: ListId,
    pub message: String,
    pub class: EventClass,
    pub triggered_by: String,
}

/// A notification delivered to participants of a list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveNotification {
    pub list_id: ListId,
    pub message: String,
    pub class: EventClass,
    pub triggered_by: String,
    pub created_at: Timestamp,
}

/// Remote list and item persistence
#[async_trait]
pub trait ListStore: Send + Sync {
    async fn get_list_by_share_code(&self, share_code: &str) -> StoreResult<Option<ShoppingList>>;

    async fn get_items(&self, list_id: &ListId) -> StoreResult<Vec<ShoppingListItem>>;

    /// Sets the checked flag; repeating the same call is harmless
    async fn set_item_checked(
        &self,
        item_id: &ItemId,
        checked: bool,
    ) -> StoreResult<ShoppingListItem>;

    async fn add_item(&self, item: NewItem) -> StoreResult<ShoppingListItem>;

    /// Changes the editable fields of a row and returns the stored row
    async fn update_item(
        &self,
        item_id: &ItemId,
        update: ItemUpdate,
    ) -> StoreResult<ShoppingListItem>;

    async fn delete_item(&self, item_id: &ItemId) -> StoreResult<()>;

    /// Deletes the list and every item on it
    async fn delete_list(&self, list_id: &ListId) -> StoreResult<()>;

    async fn clear_items(&self, list_id: &ListId) -> StoreResult<()>;

    async fn subscribe(&self, list_id: &ListId) -> StoreResult<ChangeFeed>;
}

/// Delivery of activity notifications
#[async_trait]
pub trait NotificationDispatch: Send + Sync {
    async fn send(&self, notification: OutgoingNotification) -> StoreResult<()>;

    async fn subscribe_notifications(&self, list_id: &ListId) -> StoreResult<NotificationFeed>;
}
