// crates/sync-engine/src/notify.rs
//! Formatting and sending activity notifications

use crate::error::SyncError;
use crate::report::SyncReporter;
use crate::store::{NotificationDispatch, OutgoingNotification};
use crate::throttle::{EventClass, NotificationThrottler, DEFAULT_THROTTLE_WINDOW};
use shoplist_config::NotificationConfig;
use shoplist_core::ShoppingList;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Which notifications a participant sends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationSettings {
    pub enabled: bool,
    pub items_added: bool,
    pub items_purchased: bool,
    pub shopping_complete: bool,
    pub throttle_window: Duration,
}

impl NotificationSettings {
    /// Whether `class` may be sent at all
    ///
    /// Missing-item reports follow the shopping-complete toggle.
    pub fn allows(&self, class: EventClass) -> bool {
        self.enabled
            && match class {
                EventClass::ItemsAdded => self.items_added,
                EventClass::ItemsChecked => self.items_purchased,
                EventClass::ShoppingComplete | EventClass::MissingItems => self.shopping_complete,
            }
    }
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            items_added: true,
            items_purchased: true,
            shopping_complete: true,
            throttle_window: DEFAULT_THROTTLE_WINDOW,
        }
    }
}

impl From<&NotificationConfig> for NotificationSettings {
    fn from(config: &NotificationConfig) -> Self {
        Self {
            enabled: config.enabled,
            items_added: config.items_added,
            items_purchased: config.items_purchased,
            shopping_complete: config.shopping_complete,
            throttle_window: config.throttle_window(),
        }
    }
}

/// Something a participant did that others may hear about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    ItemsAdded { count: usize },
    ItemsChecked { count: usize },
    ShoppingComplete { all_purchased: bool },
    MissingItems { missing: usize },
}

impl Activity {
    pub fn class(&self) -> EventClass {
        match self {
            Self::ItemsAdded { .. } => EventClass::ItemsAdded,
            Self::ItemsChecked { .. } => EventClass::ItemsChecked,
            Self::ShoppingComplete { .. } => EventClass::ShoppingComplete,
            Self::MissingItems { .. } => EventClass::MissingItems,
        }
    }

    /// Human-readable message shown to the other participants
    pub fn message(&self, user: &str, list_name: &str) -> String {
        match *self {
            Self::ItemsAdded { count } => {
                format!("{} added {} {} to {}", user, count, plural(count), list_name)
            }
            Self::ItemsChecked { .. } => {
                format!("{} started checking items off {}", user, list_name)
            }
            Self::ShoppingComplete { all_purchased: true } => format!(
                "{} finished shopping! ✓ All items purchased from {}",
                user, list_name
            ),
            Self::ShoppingComplete {
                all_purchased: false,
            } => format!("{} finished shopping at {}", user, list_name),
            Self::MissingItems { missing } => format!(
                "{} finished shopping. {} {} still needed in {}",
                user,
                missing,
                plural(missing),
                list_name
            ),
        }
    }

    fn count(&self) -> u32 {
        let count = match *self {
            Self::ItemsAdded { count } | Self::ItemsChecked { count } => count,
            Self::MissingItems { missing } => missing,
            Self::ShoppingComplete { .. } => 1,
        };
        u32::try_from(count).unwrap_or(u32::MAX)
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        "item"
    } else {
        "items"
    }
}

/// What happened to a notification request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    Sent,
    /// Inside the throttle window; the activity was counted
    Throttled,
    /// Turned off in the participant's settings
    Disabled,
    /// Nothing to announce, or no display name to announce it with
    Skipped,
    /// Dispatch failed; the error went to the reporter
    Failed,
}

/// Applies settings and throttling, then dispatches
pub struct Notifier {
    dispatch: Arc<dyn NotificationDispatch>,
    throttler: NotificationThrottler,
    settings: NotificationSettings,
    reporter: Arc<dyn SyncReporter>,
}

impl Notifier {
    pub fn new(
        dispatch: Arc<dyn NotificationDispatch>,
        throttler: NotificationThrottler,
        settings: NotificationSettings,
        reporter: Arc<dyn SyncReporter>,
    ) -> Self {
        Self {
            dispatch,
            throttler,
            settings,
            reporter,
        }
    }

    pub fn settings(&self) -> &NotificationSettings {
        &self.settings
    }

    pub fn throttler(&self) -> &NotificationThrottler {
        &self.throttler
    }

    /// Sends `activity` on behalf of `user` unless settings or the window say no
    ///
    /// The send is recorded before dispatch, so overlapping flushes cannot
    /// both pass the window check.
    pub async fn notify(&self, list: &ShoppingList, user: &str, activity: Activity) -> NotifyOutcome {
        let class = activity.class();
        if !self.settings.allows(class) {
            log::debug!("{} notification disabled for list {}", class, list.id);
            return NotifyOutcome::Disabled;
        }

        if !class.is_always_notify() {
            self.throttler
                .record_activity(&list.id, class, activity.count());
            if !self.throttler.should_notify(&list.id, class) {
                log::debug!(
                    "{} notification throttled for list {} ({} pending)",
                    class,
                    list.id,
                    self.throttler.pending_count(&list.id, class)
                );
                return NotifyOutcome::Throttled;
            }
            self.throttler.record_sent(&list.id, class);
        }

        let notification = OutgoingNotification {
            list_id: list.id.clone(),
            message: activity.message(user, &list.name),
            class,
            triggered_by: user.to_string(),
        };

        match self.dispatch.send(notification).await {
            Ok(()) => {
                log::info!("Sent {} notification for list {}", class, list.id);
                NotifyOutcome::Sent
            }
            Err(source) => {
                self.reporter.report(&SyncError::NotificationDispatchFailure {
                    list_id: list.id.clone(),
                    source,
                });
                NotifyOutcome::Failed
            }
        }
    }
}

/// Runs notifications as their own tasks
///
/// Callers never wait on the dispatch. `settle` waits for whatever has been
/// spawned so far.
#[derive(Clone)]
pub struct BackgroundNotifier {
    notifier: Arc<Notifier>,
    handle: Handle,
    running: Arc<Mutex<Vec<JoinHandle<NotifyOutcome>>>>,
}

impl BackgroundNotifier {
    pub fn new(notifier: Arc<Notifier>, handle: Handle) -> Self {
        Self {
            notifier,
            handle,
            running: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Starts sending `activity` without waiting for it
    pub fn spawn(&self, list: ShoppingList, user: String, activity: Activity) {
        let notifier = Arc::clone(&self.notifier);
        let task = self
            .handle
            .spawn(async move { notifier.notify(&list, &user, activity).await });

        let mut running = self.lock();
        running.retain(|h| !h.is_finished());
        running.push(task);
    }

    /// Notifications spawned and not yet finished
    pub fn in_flight(&self) -> usize {
        self.lock().iter().filter(|h| !h.is_finished()).count()
    }

    /// Waits for every spawned notification, including ones spawned meanwhile
    pub async fn settle(&self) {
        loop {
            let running = std::mem::take(&mut *self.lock());
            if running.is_empty() {
                return;
            }
            for task in running {
                match task.await {
                    Ok(outcome) => log::trace!("Background notification finished: {:?}", outcome),
                    Err(e) if e.is_cancelled() => {}
                    Err(e) => log::warn!("Background notification ended abnormally: {}", e),
                }
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<JoinHandle<NotifyOutcome>>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
