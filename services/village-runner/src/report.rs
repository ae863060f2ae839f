//! Observer notifications
//!
//! Every notice goes to `tracing` and, when one is attached, to an
//! [`Observer`] such as a UI log pane.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::types::{Account, FarmTarget};

/// Severity of a notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for NoticeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoticeLevel::Debug => write!(f, "debug"),
            NoticeLevel::Info => write!(f, "info"),
            NoticeLevel::Warning => write!(f, "warning"),
            NoticeLevel::Error => write!(f, "error"),
        }
    }
}

/// One leveled text message
#[derive(Debug, Clone, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Presentation-side sink. Called from the engine's thread.
pub trait Observer: Send + Sync {
    fn notify(&self, notice: &Notice);

    /// Called after every sync that changed the account
    fn state_synced(&self, _account: &Account) {}

    /// Called after the farm list was replaced
    fn farm_list_updated(&self, _targets: &[FarmTarget]) {}
}

/// Fan-out to tracing and the optional observer
#[derive(Clone, Default)]
pub struct Reporter {
    observer: Option<Arc<dyn Observer>>,
}

impl Reporter {
    pub fn new(observer: Option<Arc<dyn Observer>>) -> Self {
        Self { observer }
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.emit(NoticeLevel::Debug, message.into());
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(NoticeLevel::Info, message.into());
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emit(NoticeLevel::Warning, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(NoticeLevel::Error, message.into());
    }

    pub fn state_synced(&self, account: &Account) {
        if let Some(observer) = &self.observer {
            observer.state_synced(account);
        }
    }

    pub fn farm_list_updated(&self, targets: &[FarmTarget]) {
        if let Some(observer) = &self.observer {
            observer.farm_list_updated(targets);
        }
    }

    fn emit(&self, level: NoticeLevel, message: String) {
        match level {
            NoticeLevel::Debug => debug!("{}", message),
            NoticeLevel::Info => info!("{}", message),
            NoticeLevel::Warning => warn!("{}", message),
            NoticeLevel::Error => error!("{}", message),
        }

        if let Some(observer) = &self.observer {
            observer.notify(&Notice {
                level,
                message,
                timestamp: Utc::now(),
            });
        }
    }
}

impl fmt::Debug for Reporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reporter")
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

/// Observer that keeps every notice in memory
#[derive(Debug, Default)]
pub struct MemoryObserver {
    notices: std::sync::Mutex<Vec<Notice>>,
    syncs: std::sync::atomic::AtomicUsize,
}

impl MemoryObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .map(|n| n.clone())
            .unwrap_or_default()
    }

    /// Messages containing `needle`
    pub fn matching(&self, needle: &str) -> Vec<String> {
        self.notices()
            .into_iter()
            .filter(|n| n.message.contains(needle))
            .map(|n| n.message)
            .collect()
    }

    pub fn sync_count(&self) -> usize {
        self.syncs.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl Observer for MemoryObserver {
    fn notify(&self, notice: &Notice) {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push(notice.clone());
        }
    }

    fn state_synced(&self, _account: &Account) {
        self.syncs.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }
}
