// crates/sync-engine/src/report.rs
//! Where background failures go

use crate::error::{ErrorSeverity, SyncError};
use std::sync::{Arc, Mutex, PoisonError};

/// Receives errors that happen away from any caller
///
/// Failed background writes, notification failures and dropped
/// subscriptions are reported here instead of being returned.
pub trait SyncReporter: Send + Sync {
    fn report(&self, error: &SyncError);
}

/// Writes reports to the `log` facade, leveled by severity
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl SyncReporter for LogReporter {
    fn report(&self, error: &SyncError) {
        match error.severity() {
            ErrorSeverity::Recoverable => log::warn!("{}", error),
            ErrorSeverity::Degraded => log::warn!("[degraded] {}", error),
            ErrorSeverity::Fatal => log::error!("{}", error),
        }
    }
}

/// One report captured by [`CollectingReporter`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedError {
    pub severity: ErrorSeverity,
    pub message: String,
}

/// Keeps every report in memory and forwards it to the log
#[derive(Debug, Clone, Default)]
pub struct CollectingReporter {
    reports: Arc<Mutex<Vec<ReportedError>>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<ReportedError> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SyncReporter for CollectingReporter {
    fn report(&self, error: &SyncError) {
        LogReporter.report(error);
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ReportedError {
                severity: error.severity(),
                message: error.to_string(),
            });
    }
}
