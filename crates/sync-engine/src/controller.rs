// crates/sync-engine/src/controller.rs
//! One list session: local state, live feeds and the public operations

use crate::clock::{Clock, SystemClock};
use crate::collection::ItemCollection;
use crate::error::{SyncError, SyncResult};
use crate::mutator::OptimisticMutator;
use crate::notify::{Activity, BackgroundNotifier, NotificationSettings, Notifier, NotifyOutcome};
use crate::pending::PendingTracker;
use crate::queue::{FlushListener, FlushReport, MutationQueue};
use crate::reconciler::{ReconcileReport, RemoteReconciler};
use crate::report::{LogReporter, SyncReporter};
use crate::snapshot::{ListSnapshot, ListStats};
use crate::store::{ChangeFeed, ListStore, LiveNotification, NotificationDispatch, NotificationFeed};
use crate::throttle::NotificationThrottler;
use async_trait::async_trait;
use shoplist_config::{Config, SyncConfig};
use shoplist_core::{
    CoreError, ItemId, ItemUpdate, ListId, NewItem, ShoppingList, ShoppingListItem, Validator,
};
use shoplist_resilience::Timeout;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

const LIVE_NOTIFICATION_CAPACITY: usize = 64;

/// Timing used by a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    /// Quiet period before queued toggles are written
    pub mutation_debounce: Duration,
    /// How long remote upserts are collected before merging
    pub remote_batch_window: Duration,
    /// Upper bound on the final flush in [`ListSyncController::dispose`]
    pub dispose_flush_timeout: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            mutation_debounce: Duration::from_millis(1000),
            remote_batch_window: Duration::from_millis(50),
            dispose_flush_timeout: Duration::from_millis(2000),
        }
    }
}

impl From<&SyncConfig> for SyncSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            mutation_debounce: config.mutation_debounce(),
            remote_batch_window: config.remote_batch_window(),
            dispose_flush_timeout: config.dispose_flush_timeout(),
        }
    }
}

/// Health of the live connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// No live subscription
    Idle,
    /// Receiving remote changes
    Live,
    /// The change feed was lost; local edits still work
    Degraded,
}

#[derive(Debug, Default)]
struct Session {
    list: Option<ShoppingList>,
    user_name: Option<String>,
}

type SharedSession = Arc<Mutex<Session>>;

fn lock_session(session: &SharedSession) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Announces the first checks of a shopping trip after each flush
///
/// Only flushes where every write landed are announced. The send runs in the
/// background so the flush never waits on it.
struct CheckActivity {
    session: SharedSession,
    background: BackgroundNotifier,
}

#[async_trait]
impl FlushListener for CheckActivity {
    async fn on_flush(&self, report: &FlushReport) {
        if report.newly_checked == 0 || !report.is_clean() {
            return;
        }

        let (list, user) = {
            let session = lock_session(&self.session);
            (session.list.clone(), session.user_name.clone())
        };
        match (list, user) {
            (Some(list), Some(user)) => {
                let activity = Activity::ItemsChecked {
                    count: report.newly_checked,
                };
                self.background.spawn(list, user, activity);
            }
            (Some(list), None) => {
                log::debug!("No display name set, not announcing checks on {}", list.id);
            }
            _ => {}
        }
    }
}

struct Subscription {
    id: u64,
    change_pump: JoinHandle<()>,
    notification_pump: Option<JoinHandle<()>>,
}

impl Subscription {
    fn is_active(&self) -> bool {
        !self.change_pump.is_finished()
    }

    fn abort(self) {
        self.change_pump.abort();
        if let Some(pump) = self.notification_pump {
            pump.abort();
        }
    }
}

struct ControllerInner {
    handle: Handle,
    store: Arc<dyn ListStore>,
    dispatch: Arc<dyn NotificationDispatch>,
    settings: SyncSettings,
    reporter: Arc<dyn SyncReporter>,
    collection: ItemCollection,
    pending: PendingTracker,
    queue: MutationQueue,
    mutator: OptimisticMutator,
    reconciler: RemoteReconciler,
    notifier: Arc<Notifier>,
    background: BackgroundNotifier,
    session: SharedSession,
    status: Arc<watch::Sender<SyncStatus>>,
    live: broadcast::Sender<LiveNotification>,
    subscription: Mutex<Option<Subscription>>,
    next_subscription: AtomicU64,
    ended: AtomicBool,
}

impl ControllerInner {
    /// Closes the live feeds; with `only` set, closes them only if that
    /// subscription is still the current one
    fn close_subscription(&self, only: Option<u64>) {
        let closed = {
            let mut slot = self.subscription.lock().unwrap_or_else(PoisonError::into_inner);
            match (&*slot, only) {
                (Some(current), Some(id)) if current.id != id => None,
                _ => slot.take(),
            }
        };
        if let Some(subscription) = closed {
            subscription.abort();
            self.status.send_replace(SyncStatus::Idle);
            log::debug!("Closed live subscription");
        }
    }
}

impl Drop for ControllerInner {
    fn drop(&mut self) {
        let slot = self
            .subscription
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(subscription) = slot.take() {
            subscription.abort();
        }
    }
}

/// Handle returned by [`ListSyncController::subscribe`]
///
/// Consuming it with [`Unsubscribe::unsubscribe`] or dropping it closes the
/// live feeds it opened. It never closes a newer subscription.
#[must_use = "dropping the handle closes the subscription"]
pub struct Unsubscribe {
    inner: Weak<ControllerInner>,
    id: u64,
    closed: bool,
}

impl Unsubscribe {
    pub fn unsubscribe(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(inner) = self.inner.upgrade() {
            inner.close_subscription(Some(self.id));
        }
    }
}

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        self.close();
    }
}

/// Builder for [`ListSyncController`]
pub struct ListSyncControllerBuilder {
    store: Arc<dyn ListStore>,
    dispatch: Arc<dyn NotificationDispatch>,
    sync: SyncSettings,
    notifications: NotificationSettings,
    clock: Option<Arc<dyn Clock>>,
    reporter: Option<Arc<dyn SyncReporter>>,
    throttler: Option<NotificationThrottler>,
    user_name: Option<String>,
}

impl ListSyncControllerBuilder {
    /// Takes timing, notification settings and the display name from `config`
    pub fn with_config(mut self, config: &Config) -> Self {
        self.sync = SyncSettings::from(&config.sync);
        self.notifications = NotificationSettings::from(&config.notifications);
        if let Some(name) = &config.app.user_name {
            self.user_name = Some(name.clone());
        }
        self
    }

    pub fn with_sync_settings(mut self, settings: SyncSettings) -> Self {
        self.sync = settings;
        self
    }

    pub fn with_notification_settings(mut self, settings: NotificationSettings) -> Self {
        self.notifications = settings;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn SyncReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Uses `throttler` instead of the process-wide one
    pub fn with_throttler(mut self, throttler: NotificationThrottler) -> Self {
        self.throttler = Some(throttler);
        self
    }

    pub fn with_user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = normalize_name(name.into());
        self
    }

    /// Builds the controller on the current tokio runtime
    pub fn build(self) -> SyncResult<ListSyncController> {
        let handle = Handle::try_current().map_err(|_| SyncError::NoRuntime)?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let reporter = self.reporter.unwrap_or_else(|| Arc::new(LogReporter));
        let throttler = self.throttler.unwrap_or_else(|| {
            NotificationThrottler::shared(self.notifications.throttle_window, Arc::clone(&clock))
        });

        let session: SharedSession = Arc::new(Mutex::new(Session {
            list: None,
            user_name: self.user_name.and_then(normalize_name),
        }));
        let notifier = Arc::new(Notifier::new(
            Arc::clone(&self.dispatch),
            throttler,
            self.notifications,
            Arc::clone(&reporter),
        ));

        let background = BackgroundNotifier::new(Arc::clone(&notifier), handle.clone());

        let collection = ItemCollection::new();
        let pending = PendingTracker::new();
        let queue = MutationQueue::with_listener(
            handle.clone(),
            self.sync.mutation_debounce,
            Arc::clone(&self.store),
            pending.clone(),
            Arc::clone(&reporter),
            Some(Arc::new(CheckActivity {
                session: Arc::clone(&session),
                background: background.clone(),
            })),
        );
        let mutator = OptimisticMutator::new(
            collection.clone(),
            pending.clone(),
            queue.clone(),
            Arc::clone(&clock),
        );
        let reconciler = RemoteReconciler::new(
            handle.clone(),
            self.sync.remote_batch_window,
            collection.clone(),
            pending.clone(),
            queue.clone(),
        );
        let (status, _) = watch::channel(SyncStatus::Idle);
        let (live, _) = broadcast::channel(LIVE_NOTIFICATION_CAPACITY);

        Ok(ListSyncController {
            inner: Arc::new(ControllerInner {
                handle,
                store: self.store,
                dispatch: self.dispatch,
                settings: self.sync,
                reporter,
                collection,
                pending,
                queue,
                mutator,
                reconciler,
                notifier,
                background,
                session,
                status: Arc::new(status),
                live,
                subscription: Mutex::new(None),
                next_subscription: AtomicU64::new(1),
                ended: AtomicBool::new(false),
            }),
        })
    }
}

fn normalize_name(name: String) -> Option<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Owns the item collection for one list and keeps it in sync
///
/// Toggles apply locally at once and are written in debounced batches.
/// Remote changes are merged in short windows and never overwrite an item
/// whose local edit is still unconfirmed.
///
/// Keep one controller per list per process.
pub struct ListSyncController {
    inner: Arc<ControllerInner>,
}

impl ListSyncController {
    pub fn builder(
        store: Arc<dyn ListStore>,
        dispatch: Arc<dyn NotificationDispatch>,
    ) -> ListSyncControllerBuilder {
        ListSyncControllerBuilder {
            store,
            dispatch,
            sync: SyncSettings::default(),
            notifications: NotificationSettings::default(),
            clock: None,
            reporter: None,
            throttler: None,
            user_name: None,
        }
    }

    /// Fetches the list and its items and makes them the local state
    ///
    /// Can be called again at any time, including while subscribed. Items
    /// with an unconfirmed local edit keep their local value.
    pub async fn load(&self, share_code: &str) -> SyncResult<ShoppingList> {
        let inner = &self.inner;
        let list = inner
            .store
            .get_list_by_share_code(share_code)
            .await?
            .ok_or_else(|| SyncError::NotFound(share_code.trim().to_string()))?;
        let fetched = inner.store.get_items(&list.id).await?;

        if self.list_id().is_some_and(|current| current != list.id) {
            log::info!("Switching session to list {}", list.id);
            inner.close_subscription(None);
            inner.reconciler.discard_batch();
            inner.queue.cancel_timer();
            inner.queue.flush().await;
        }

        inner.reconciler.bind(list.id.clone());
        let pending = &inner.pending;
        let count = fetched.len();
        inner.collection.apply_batch(|items| {
            let merged = fetched
                .into_iter()
                .map(|remote| {
                    if pending.is_pending(&remote.id) {
                        items
                            .iter()
                            .find(|local| local.id == remote.id)
                            .cloned()
                            .unwrap_or(remote)
                    } else {
                        remote
                    }
                })
                .collect();
            *items = merged;
            (true, ())
        });

        lock_session(&inner.session).list = Some(list.clone());
        inner.ended.store(false, Ordering::SeqCst);
        log::info!("Loaded list '{}' ({} items)", list.name, count);
        Ok(list)
    }

    /// Opens the live change and notification feeds for the loaded list
    ///
    /// Fails with [`SyncError::AlreadySubscribed`] while a subscription is
    /// live. After the feed drops, subscribing again is allowed.
    pub async fn subscribe(&self) -> SyncResult<Unsubscribe> {
        let list_id = self.require_list()?.id;
        if self.has_active_subscription() {
            return Err(SyncError::AlreadySubscribed);
        }

        let changes = self.inner.store.subscribe(&list_id).await?;
        let notifications = match self.inner.dispatch.subscribe_notifications(&list_id).await {
            Ok(feed) => Some(feed),
            Err(e) => {
                log::warn!("Live notifications unavailable for {}: {}", list_id, e);
                None
            }
        };

        let id = self.inner.next_subscription.fetch_add(1, Ordering::SeqCst);
        let subscription = Subscription {
            id,
            change_pump: self.spawn_change_pump(list_id.clone(), changes),
            notification_pump: notifications.map(|feed| self.spawn_notification_pump(feed)),
        };

        let replaced = {
            let mut slot = self
                .inner
                .subscription
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if slot.as_ref().is_some_and(Subscription::is_active) {
                drop(slot);
                subscription.abort();
                return Err(SyncError::AlreadySubscribed);
            }
            slot.replace(subscription)
        };
        if let Some(stale) = replaced {
            stale.abort();
        }

        self.inner.status.send_replace(SyncStatus::Live);
        log::info!("Subscribed to live changes for list {}", list_id);
        Ok(Unsubscribe {
            inner: Arc::downgrade(&self.inner),
            id,
            closed: false,
        })
    }

    /// Flips an item's checked flag locally and queues the remote write
    ///
    /// Returns false if the item is not on the list.
    pub fn toggle_item(&self, item_id: &ItemId, checked: bool) -> bool {
        self.inner.mutator.apply_local_toggle(item_id, checked)
    }

    /// Current items, grouped for display
    pub fn snapshot(&self) -> ListSnapshot {
        ListSnapshot::build(self.inner.collection.items())
    }

    pub fn stats(&self) -> ListStats {
        ListStats::from_items(&self.inner.collection.items())
    }

    pub fn item(&self, item_id: &ItemId) -> Option<ShoppingListItem> {
        self.inner.collection.get(item_id)
    }

    pub fn list(&self) -> Option<ShoppingList> {
        lock_session(&self.inner.session).list.clone()
    }

    /// Sets the name shown to others; a blank name clears it
    pub fn set_user_name(&self, name: impl Into<String>) {
        lock_session(&self.inner.session).user_name = normalize_name(name.into());
    }

    pub fn user_name(&self) -> Option<String> {
        lock_session(&self.inner.session).user_name.clone()
    }

    /// Adds an item remotely and to the local list
    pub async fn add_item(&self, mut item: NewItem) -> SyncResult<ShoppingListItem> {
        let list = self.require_list()?;
        if item.list_id != list.id {
            return Err(CoreError::invalid_field("list_id", "item belongs to a different list").into());
        }

        let user = self.user_name();
        if item.added_by.is_none() {
            item.added_by = user.clone();
        }
        item.validate().map_err(CoreError::Validation)?;

        let created = self.inner.store.add_item(item).await?;
        if !self.inner.reconciler.is_tombstoned(&created.id) {
            self.inner.collection.upsert(created.clone());
        }

        if let Some(user) = user {
            self.inner
                .background
                .spawn(list, user, Activity::ItemsAdded { count: 1 });
        }
        Ok(created)
    }

    /// Changes an item's name, quantity, unit, price, notes or category
    ///
    /// The write goes to the store first; the returned row then replaces the
    /// local one. An unconfirmed local toggle on the item is kept.
    pub async fn update_item(
        &self,
        item_id: &ItemId,
        update: ItemUpdate,
    ) -> SyncResult<ShoppingListItem> {
        self.require_list()?;
        if update.is_empty() {
            return Err(CoreError::invalid_field("update", "no fields to change").into());
        }
        update.validate().map_err(CoreError::Validation)?;

        let stored = self.inner.store.update_item(item_id, update).await?;
        if self.inner.reconciler.is_tombstoned(&stored.id) {
            return Ok(stored);
        }

        let pending = self.inner.pending.is_pending(&stored.id);
        let replaced = self.inner.collection.update_item(&stored.id, |local| {
            let (checked, checked_at) = (local.checked, local.checked_at);
            *local = stored.clone();
            if pending {
                local.checked = checked;
                local.checked_at = checked_at;
            }
        });
        if !replaced {
            self.inner.collection.upsert(stored.clone());
        }
        Ok(stored)
    }

    /// Deletes an item remotely, then locally
    pub async fn delete_item(&self, item_id: &ItemId) -> SyncResult<()> {
        self.require_list()?;
        self.inner.store.delete_item(item_id).await?;
        self.inner.reconciler.apply_delete(item_id);
        Ok(())
    }

    /// Checks every unchecked item; returns how many changed
    ///
    /// The writes share one debounced flush.
    pub fn check_all(&self) -> usize {
        self.toggle_all(true)
    }

    /// Unchecks every checked item; returns how many changed
    pub fn uncheck_all(&self) -> usize {
        self.toggle_all(false)
    }

    /// Removes every item from the list
    pub async fn clear_items(&self) -> SyncResult<()> {
        let list = self.require_list()?;
        self.inner.store.clear_items(&list.id).await?;
        self.reset_local_state();
        log::info!("Cleared all items from list {}", list.id);
        Ok(())
    }

    /// Deletes the list and ends the session
    ///
    /// Later operations fail with [`SyncError::Disposed`] until another list
    /// is loaded.
    pub async fn delete_list(&self) -> SyncResult<()> {
        let list = self.require_list()?;
        self.inner.store.delete_list(&list.id).await?;

        self.inner.close_subscription(None);
        self.reset_local_state();
        lock_session(&self.inner.session).list = None;
        self.inner.ended.store(true, Ordering::SeqCst);
        log::info!("Deleted list {}", list.id);
        Ok(())
    }

    /// Tells the other participants the trip is over
    pub async fn mark_shopping_complete(&self) -> SyncResult<NotifyOutcome> {
        let list = self.require_list()?;
        let Some(user) = self.user_name() else {
            return Ok(NotifyOutcome::Skipped);
        };

        let all_purchased = self.stats().is_complete();
        Ok(self
            .inner
            .notifier
            .notify(&list, &user, Activity::ShoppingComplete { all_purchased })
            .await)
    }

    /// Tells the other participants which items are still needed
    pub async fn report_missing_items(&self) -> SyncResult<NotifyOutcome> {
        let list = self.require_list()?;
        let missing = self.stats().remaining;
        let user = match self.user_name() {
            Some(user) if missing > 0 => user,
            _ => return Ok(NotifyOutcome::Skipped),
        };

        Ok(self
            .inner
            .notifier
            .notify(&list, &user, Activity::MissingItems { missing })
            .await)
    }

    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status.subscribe()
    }

    /// Revision counter that moves whenever the visible list changes
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.inner.collection.subscribe()
    }

    /// Notifications from the other participants of this list
    pub fn notifications(&self) -> broadcast::Receiver<LiveNotification> {
        self.inner.live.subscribe()
    }

    pub fn is_pending(&self, item_id: &ItemId) -> bool {
        self.inner.pending.is_pending(item_id)
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    pub fn queued_count(&self) -> usize {
        self.inner.queue.len()
    }

    /// Writes queued toggles now instead of waiting for the debounce
    pub async fn flush_mutations(&self) -> FlushReport {
        self.inner.queue.cancel_timer();
        self.inner.queue.flush().await
    }

    /// Merges batched remote upserts now instead of waiting for the window
    pub fn flush_remote(&self) -> ReconcileReport {
        self.inner.reconciler.flush_now()
    }

    /// Waits for flushes, merges and notifications that have already started
    pub async fn settle(&self) {
        self.inner.queue.settle().await;
        self.inner.reconciler.settle().await;
        self.inner.background.settle().await;
    }

    /// Ends the session
    ///
    /// Disarms both timers, writes outstanding toggles within the configured
    /// bound and closes the live feeds. Notifications still being sent are
    /// left to finish on their own.
    pub async fn dispose(self) -> SyncResult<FlushReport> {
        let inner = &self.inner;
        inner.reconciler.cancel();
        inner.queue.cancel_timer();

        let queue = inner.queue.clone();
        let result = Timeout::new(inner.settings.dispose_flush_timeout)
            .run("final mutation flush", async move {
                queue.settle().await;
                queue.flush().await
            })
            .await;

        inner.close_subscription(None);
        inner.reconciler.discard_batch();

        match result {
            Ok(report) => {
                log::info!("Session closed after flushing {} toggle(s)", report.len());
                Ok(report)
            }
            Err(e) => {
                let error = SyncError::FlushTimedOut(e);
                inner.reporter.report(&error);
                Err(error)
            }
        }
    }

    fn toggle_all(&self, checked: bool) -> usize {
        let targets: Vec<ItemId> = self
            .inner
            .collection
            .items()
            .into_iter()
            .filter(|i| i.checked != checked)
            .map(|i| i.id)
            .collect();

        targets
            .iter()
            .filter(|id| self.inner.mutator.apply_local_toggle(id, checked))
            .count()
    }

    fn list_id(&self) -> Option<ListId> {
        lock_session(&self.inner.session)
            .list
            .as_ref()
            .map(|l| l.id.clone())
    }

    fn require_list(&self) -> SyncResult<ShoppingList> {
        match self.list() {
            Some(list) => Ok(list),
            None if self.inner.ended.load(Ordering::SeqCst) => Err(SyncError::Disposed),
            None => Err(SyncError::NotLoaded),
        }
    }

    fn has_active_subscription(&self) -> bool {
        self.inner
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(Subscription::is_active)
    }

    fn reset_local_state(&self) {
        self.inner.queue.discard_all();
        self.inner.reconciler.discard_batch();
        self.inner.pending.clear_all();
        self.inner.collection.clear();
    }

    fn spawn_change_pump(&self, list_id: ListId, mut feed: ChangeFeed) -> JoinHandle<()> {
        let reconciler = self.inner.reconciler.clone();
        let status = Arc::clone(&self.inner.status);
        let reporter = Arc::clone(&self.inner.reporter);

        self.inner.handle.spawn(async move {
            while let Some(event) = feed.recv().await {
                reconciler.on_remote_event(event);
            }
            status.send_replace(SyncStatus::Degraded);
            reporter.report(&SyncError::SubscriptionDropped(list_id));
        })
    }

    fn spawn_notification_pump(&self, mut feed: NotificationFeed) -> JoinHandle<()> {
        let session = Arc::clone(&self.inner.session);
        let live = self.inner.live.clone();

        self.inner.handle.spawn(async move {
            while let Some(notification) = feed.recv().await {
                let own = lock_session(&session).user_name.as_deref()
                    == Some(notification.triggered_by.as_str());
                if own {
                    continue;
                }
                if live.send(notification).is_err() {
                    log::trace!("No listeners for live notification");
                }
            }
        })
    }
}
