//! Operator notification port.
//!
//! The engine raises alerts for terminal rejections, exhausted retries,
//! approaching reporting deadlines, and certificate lifecycle events. The
//! default sink writes structured log events; hosts plug in their own
//! channel by implementing [`Notifier`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        };
        f.write_str(label)
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, severity: Severity, message: &str, context: Value);
}

/// Default notifier: emits tracing events at the matching level.
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, severity: Severity, message: &str, context: Value) {
        match severity {
            Severity::Info => info!(%context, "{message}"),
            Severity::Warning => warn!(%context, "{message}"),
            Severity::Critical => error!(%context, "{message}"),
        }
    }
}

/// Captured notification, used by the recording test double.
#[derive(Debug, Clone)]
pub struct Notification {
    pub severity: Severity,
    pub message: String,
    pub context: Value,
}

/// Test double that records every notification in order.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.seen.lock().clone()
    }

    pub fn with_severity(&self, severity: Severity) -> Vec<Notification> {
        self.seen
            .lock()
            .iter()
            .filter(|n| n.severity == severity)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, severity: Severity, message: &str, context: Value) {
        self.seen.lock().push(Notification {
            severity,
            message: message.to_string(),
            context,
        });
    }
}
