// crates/sync-engine/src/throttle.rs
//! Rate limiting for activity notifications

use crate::clock::{Clock, SystemClock};
use serde::{Deserialize, Serialize};
use shoplist_core::{ListId, Timestamp};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

/// Kinds of list activity that produce notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventClass {
    ItemsAdded,
    ItemsChecked,
    ShoppingComplete,
    MissingItems,
}

impl EventClass {
    /// Classes that are sent every time, regardless of the window
    pub fn is_always_notify(&self) -> bool {
        matches!(self, Self::ShoppingComplete | Self::MissingItems)
    }
}

impl fmt::Display for EventClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ItemsAdded => "items_added",
            Self::ItemsChecked => "items_checked",
            Self::ShoppingComplete => "shopping_complete",
            Self::MissingItems => "missing_items",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ThrottleEntry {
    last_sent: Option<Timestamp>,
    count: u32,
}

type ThrottleMap = HashMap<(ListId, EventClass), ThrottleEntry>;

/// Default window between two throttled notifications
pub const DEFAULT_THROTTLE_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Per (list, event class) rolling window
///
/// Handles are cheap to clone and share their state. State made by
/// [`NotificationThrottler::shared`] lives for the whole process, so closing
/// and reopening a list does not reset the window.
#[derive(Clone)]
pub struct NotificationThrottler {
    window: Duration,
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<ThrottleMap>>,
}

impl NotificationThrottler {
    /// Creates a throttler with its own private state
    pub fn new(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            window,
            clock,
            state: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns a handle on the process-wide throttle state
    pub fn shared(window: Duration, clock: Arc<dyn Clock>) -> Self {
        static STATE: OnceLock<Arc<Mutex<ThrottleMap>>> = OnceLock::new();
        let state = STATE.get_or_init(|| Arc::new(Mutex::new(HashMap::new())));
        Self {
            window,
            clock,
            state: Arc::clone(state),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// True when nothing was sent yet or the last send is older than the window
    pub fn should_notify(&self, list_id: &ListId, class: EventClass) -> bool {
        if class.is_always_notify() {
            return true;
        }

        let now = self.clock.now();
        let state = self.lock();
        match state.get(&(list_id.clone(), class)).and_then(|e| e.last_sent) {
            None => true,
            Some(last) => u128::from(now.millis_since(last)) > self.window.as_millis(),
        }
    }

    /// Records a send and resets the accumulated activity count
    pub fn record_sent(&self, list_id: &ListId, class: EventClass) {
        let now = self.clock.now();
        let mut state = self.lock();
        let entry = state.entry((list_id.clone(), class)).or_default();
        entry.last_sent = Some(now);
        entry.count = 0;
    }

    /// Adds to the activity seen since the last send
    pub fn record_activity(&self, list_id: &ListId, class: EventClass, count: u32) {
        let mut state = self.lock();
        let entry = state.entry((list_id.clone(), class)).or_default();
        entry.count = entry.count.saturating_add(count);
    }

    /// Activity accumulated since the last send
    pub fn pending_count(&self, list_id: &ListId, class: EventClass) -> u32 {
        self.lock()
            .get(&(list_id.clone(), class))
            .map(|e| e.count)
            .unwrap_or(0)
    }

    fn lock(&self) -> MutexGuard<'_, ThrottleMap> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for NotificationThrottler {
    fn default() -> Self {
        Self::shared(DEFAULT_THROTTLE_WINDOW, Arc::new(SystemClock))
    }
}

impl fmt::Debug for NotificationThrottler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationThrottler")
            .field("window", &self.window)
            .field("tracked", &self.lock().len())
            .finish()
    }
}
