//! In-memory diagnostics buffer backing the debug panel.
//!
//! Append-only; cleared only by explicit user action. Entries are mirrored
//! to `tracing` so the same events land in process logs.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use shared::domain::{LogEntry, LogLevel};
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub enum LogEvent {
    Appended(LogEntry),
    Cleared,
}

/// Cheaply cloneable handle; one buffer is constructed at startup and handed
/// to every component by reference rather than living in a global.
#[derive(Clone)]
pub struct LogBuffer {
    entries: Arc<Mutex<Vec<LogEntry>>>,
    events: broadcast::Sender<LogEvent>,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LogBuffer {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
            events,
        }
    }

    pub fn append(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        details: Option<serde_json::Value>,
    ) {
        let entry = LogEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            level,
            message: message.into(),
            details,
        };
        match level {
            LogLevel::Error => error!(details = ?entry.details, "{}", entry.message),
            LogLevel::Warning => warn!(details = ?entry.details, "{}", entry.message),
            LogLevel::Info | LogLevel::Success => {
                info!(details = ?entry.details, "{}", entry.message)
            }
        }
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry.clone());
        }
        let _ = self.events.send(LogEvent::Appended(entry));
    }

    pub fn info(&self, message: impl Into<String>, details: Option<serde_json::Value>) {
        self.append(LogLevel::Info, message, details);
    }

    pub fn success(&self, message: impl Into<String>, details: Option<serde_json::Value>) {
        self.append(LogLevel::Success, message, details);
    }

    pub fn warning(&self, message: impl Into<String>, details: Option<serde_json::Value>) {
        self.append(LogLevel::Warning, message, details);
    }

    pub fn error(&self, message: impl Into<String>, details: Option<serde_json::Value>) {
        self.append(LogLevel::Error, message, details);
    }

    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
        let _ = self.events.send(LogEvent::Cleared);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEvent> {
        self.events.subscribe()
    }
}
