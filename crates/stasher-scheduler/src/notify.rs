//! Notifications: what the engine wants the operators to know.
//! The engine only produces them; the poll loop records and dispatches.

use serde::{Deserialize, Serialize};

/// A notification for the operators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Title/summary.
    pub title: String,
    /// Body content.
    pub body: String,
    pub priority: NotifyPriority,
    /// Which component raised it (scheduler, detector, operator).
    pub source: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Notification priority.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NotifyPriority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Notification {
    pub fn new(title: &str, body: &str, source: &str, priority: NotifyPriority) -> Self {
        Self {
            title: title.to_string(),
            body: body.to_string(),
            priority,
            source: source.to_string(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn info(title: &str, body: &str, source: &str) -> Self {
        Self::new(title, body, source, NotifyPriority::Normal)
    }

    pub fn warn(title: &str, body: &str, source: &str) -> Self {
        Self::new(title, body, source, NotifyPriority::High)
    }

    pub fn error(title: &str, body: &str, source: &str) -> Self {
        Self::new(title, body, source, NotifyPriority::Urgent)
    }

    pub fn is_failure(&self) -> bool {
        self.priority == NotifyPriority::Urgent
    }
}

const HISTORY_LIMIT: usize = 100;

/// In-memory notification history.
pub struct NotifyRouter {
    history: Vec<Notification>,
}

impl NotifyRouter {
    pub fn new() -> Self {
        Self {
            history: Vec::new(),
        }
    }

    /// Record a notification, logging it at a level matching its priority.
    pub fn record(&mut self, notification: Notification) {
        match notification.priority {
            NotifyPriority::Urgent => {
                tracing::error!("❌ [{}] {}: {}", notification.source, notification.title, notification.body)
            }
            NotifyPriority::High => {
                tracing::warn!("⚠️ [{}] {}: {}", notification.source, notification.title, notification.body)
            }
            NotifyPriority::Normal | NotifyPriority::Low => {
                tracing::info!("✅ [{}] {}: {}", notification.source, notification.title, notification.body)
            }
        }
        self.history.push(notification);
        // Ring buffer: keep last 100
        if self.history.len() > HISTORY_LIMIT {
            self.history.remove(0);
        }
    }

    /// Get notification history.
    pub fn history(&self) -> &[Notification] {
        &self.history
    }
}

impl Default for NotifyRouter {
    fn default() -> Self {
        Self::new()
    }
}
