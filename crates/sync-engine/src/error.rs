// crates/sync-engine/src/error.rs
//! Error types for list synchronization

use shoplist_core::{CoreError, ItemId, ListId};
use shoplist_resilience::ResilienceError;
use std::fmt;
use thiserror::Error;

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type for collaborator calls
pub type StoreResult<T> = Result<T, StoreError>;

/// Failures reported by the remote store or notification service
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The addressed list or item does not exist remotely
    #[error("Not found: {0}")]
    NotFound(String),

    /// The service could not be reached or timed out
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The service refused the request
    #[error("Request rejected: {0}")]
    Rejected(String),
}

/// How badly an error affects the running session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Local state stays usable; the next remote event converges it
    Recoverable,
    /// A live feature is off until the session reconnects
    Degraded,
    /// The requested operation cannot proceed
    Fatal,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recoverable => write!(f, "Recoverable"),
            Self::Degraded => write!(f, "Degraded"),
            Self::Fatal => write!(f, "Fatal"),
        }
    }
}

/// Errors that can occur during list synchronization
#[derive(Debug, Error)]
pub enum SyncError {
    /// No list matches the share code
    #[error("No list found for share code '{0}'")]
    NotFound(String),

    /// A queued toggle could not be written; local state was kept
    #[error("Failed to sync item {item_id} (checked = {checked}): {source}")]
    TransientSyncFailure {
        item_id: ItemId,
        checked: bool,
        source: StoreError,
    },

    /// An activity notification could not be delivered
    #[error("Failed to send notification for list {list_id}: {source}")]
    NotificationDispatchFailure { list_id: ListId, source: StoreError },

    /// The live change feed closed unexpectedly
    #[error("Change subscription for list {0} dropped")]
    SubscriptionDropped(ListId),

    /// A live subscription is already open for this session
    #[error("Session is already subscribed to list changes")]
    AlreadySubscribed,

    /// The operation needs a loaded list
    #[error("No list loaded")]
    NotLoaded,

    /// The controller was built outside a tokio runtime
    #[error("A tokio runtime is required to run the sync engine")]
    NoRuntime,

    /// An item failed validation
    #[error("Invalid item: {0}")]
    InvalidItem(#[from] CoreError),

    /// The final flush did not finish in time
    #[error("Final flush incomplete: {0}")]
    FlushTimedOut(#[from] ResilienceError),

    /// The session was ended by deleting its list
    #[error("List session has ended")]
    Disposed,

    /// A direct store call failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl SyncError {
    /// Returns the severity of this error
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::TransientSyncFailure { .. }
            | Self::NotificationDispatchFailure { .. }
            | Self::FlushTimedOut(_) => ErrorSeverity::Recoverable,

            Self::SubscriptionDropped(_) => ErrorSeverity::Degraded,

            Self::NotFound(_)
            | Self::AlreadySubscribed
            | Self::NotLoaded
            | Self::NoRuntime
            | Self::InvalidItem(_)
            | Self::Disposed
            | Self::Store(_) => ErrorSeverity::Fatal,
        }
    }

    /// Returns true if local state remains authoritative after this error
    pub fn is_recoverable(&self) -> bool {
        self.severity() == ErrorSeverity::Recoverable
    }
}
