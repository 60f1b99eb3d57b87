// crates/sync-engine/src/lib.rs
//! Optimistic synchronization for shared shopping lists
//!
//! Several people edit one list at the same time. This crate keeps a local
//! copy of the list that reacts to every tap at once while staying
//! consistent with the remote store:
//! - Toggles are applied locally and written in debounced batches
//! - Items with an unconfirmed edit are shielded from stale remote snapshots
//! - Remote changes are merged in short windows, deletes first
//! - Activity notifications are throttled per list and event class
//!
//! # Example
//!
//! ```rust
//! use shoplist_core::{Category, NewItem};
//! use shoplist_sync_engine::{InMemoryStore, ListSyncController};
//! use std::sync::Arc;
//!
//! let rt = tokio::runtime::Builder::new_current_thread()
//!     .enable_time()
//!     .build()
//!     .unwrap();
//!
//! rt.block_on(async {
//!     let store = InMemoryStore::new();
//!     let list = store.create_list("Weekly groceries");
//!
//!     let controller = ListSyncController::builder(Arc::new(store.clone()), Arc::new(store))
//!         .with_user_name("Sam")
//!         .build()
//!         .unwrap();
//!     controller.load(&list.share_code).await.unwrap();
//!
//!     let milk = controller
//!         .add_item(NewItem::new(list.id.clone(), "Milk", Category::Dairy))
//!         .await
//!         .unwrap();
//!     assert!(controller.toggle_item(&milk.id, true));
//!     assert!(controller.item(&milk.id).unwrap().checked);
//!
//!     let report = controller.dispose().await.unwrap();
//!     assert_eq!(report.confirmed, vec![milk.id]);
//! });
//! ```

mod clock;
mod collection;
mod controller;
mod error;
mod memory;
mod mutator;
mod notify;
mod pending;
mod queue;
mod reconciler;
mod report;
mod snapshot;
mod store;
mod throttle;
mod timer;

pub use clock::{Clock, ManualClock, SystemClock, TokioClock};
pub use collection::ItemCollection;
pub use controller::{
    ListSyncController, ListSyncControllerBuilder, SyncSettings, SyncStatus, Unsubscribe,
};
pub use error::{ErrorSeverity, StoreError, StoreResult, SyncError, SyncResult};
pub use memory::{CallCounts, InMemoryStore};
pub use mutator::OptimisticMutator;
pub use notify::{Activity, BackgroundNotifier, NotificationSettings, Notifier, NotifyOutcome};
pub use pending::PendingTracker;
pub use queue::{FlushListener, FlushReport, MutationQueue};
pub use reconciler::{ReconcileReport, RemoteReconciler};
pub use report::{CollectingReporter, LogReporter, ReportedError, SyncReporter};
pub use snapshot::{CategoryGroup, ListSnapshot, ListStats};
pub use store::{
    ChangeFeed, ListStore, LiveNotification, NotificationDispatch, NotificationFeed,
    OutgoingNotification, RemoteChangeEvent,
};
pub use throttle::{EventClass, NotificationThrottler, DEFAULT_THROTTLE_WINDOW};
pub use timer::DebounceTimer;
