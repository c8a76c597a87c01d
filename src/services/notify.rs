//! User-facing notifications.

use std::sync::Mutex;

use crate::error::ErrorEnvelope;

/// Sink for success and failure messages shown to the viewer.
pub trait Notifier: Send + Sync {
    fn success(&self, message: &str);

    fn failure(&self, error: &ErrorEnvelope);
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn success(&self, message: &str) {
        log::info!("{}", message);
    }

    fn failure(&self, error: &ErrorEnvelope) {
        log::error!("{}", error);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Success(String),
    Failure(ErrorEnvelope),
}

/// Keeps every notification in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.seen.lock().map(|n| n.clone()).unwrap_or_default()
    }

    pub fn failures(&self) -> Vec<ErrorEnvelope> {
        self.notifications()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Failure(e) => Some(e),
                Notification::Success(_) => None,
            })
            .collect()
    }

    fn push(&self, notification: Notification) {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(notification);
        }
    }
}

impl Notifier for RecordingNotifier {
    fn success(&self, message: &str) {
        self.push(Notification::Success(message.to_string()));
    }

    fn failure(&self, error: &ErrorEnvelope) {
        self.push(Notification::Failure(error.clone()));
    }
}
