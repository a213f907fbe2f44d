//! Append-only task log.
//!
//! Task lifecycle lines are written to a [`TaskJournal`], which stamps them and
//! fans them out to every registered [`LogSink`]. Severity is derived from the
//! message text so that any caller of `add_log` gets the same classification.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSeverity {
    Info,
    Started,
    Success,
    Failure,
    Timeout,
}

impl LogSeverity {
    /// Classify a message by keyword, case-insensitively. Failure keywords win
    /// over timeout, timeout over success, success over start.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));

        if has(&["failed", "error"]) {
            LogSeverity::Failure
        } else if has(&["timed out", "timeout"]) {
            LogSeverity::Timeout
        } else if has(&["succeeded", "success", "completed"]) {
            LogSeverity::Success
        } else if has(&["started", "launching"]) {
            LogSeverity::Started
        } else {
            LogSeverity::Info
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub severity: LogSeverity,
    pub message: String,
}

impl LogEntry {
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            timestamp: Local::now(),
            severity: LogSeverity::classify(&message),
            message,
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.timestamp.format("%H:%M:%S%.3f"), self.message)
    }
}

/// Destination for journal entries. Implementations must not block.
pub trait LogSink: Send + Sync {
    fn write(&self, entry: &LogEntry);
}

/// Forwards entries to `tracing`, mapping severity to level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn write(&self, entry: &LogEntry) {
        match entry.severity {
            LogSeverity::Failure => error!(target: "autotask::journal", "{}", entry.message),
            LogSeverity::Timeout => warn!(target: "autotask::journal", "{}", entry.message),
            _ => info!(target: "autotask::journal", "{}", entry.message),
        }
    }
}

/// Keeps every entry in memory, for display surfaces and tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.entries().into_iter().map(|e| e.message).collect()
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl LogSink for MemorySink {
    fn write(&self, entry: &LogEntry) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.clone());
    }
}

pub struct TaskJournal {
    sinks: RwLock<Vec<Arc<dyn LogSink>>>,
}

impl Default for TaskJournal {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskJournal {
    /// A journal that forwards to `tracing`.
    pub fn new() -> Self {
        Self::with_sinks(vec![Arc::new(TracingSink)])
    }

    pub fn with_sinks(sinks: Vec<Arc<dyn LogSink>>) -> Self {
        Self {
            sinks: RwLock::new(sinks),
        }
    }

    pub fn add_sink(&self, sink: Arc<dyn LogSink>) {
        self.sinks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sink);
    }

    pub fn log(&self, message: impl Into<String>) -> LogEntry {
        let entry = LogEntry::new(message);
        let sinks = self.sinks.read().unwrap_or_else(PoisonError::into_inner);
        for sink in sinks.iter() {
            sink.write(&entry);
        }
        entry
    }
}

impl fmt::Debug for TaskJournal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sinks = self.sinks.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("TaskJournal")
            .field("sinks", &sinks.len())
            .finish()
    }
}
