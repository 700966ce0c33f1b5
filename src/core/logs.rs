//! Log stream - Append-only console history of an instance

use chrono::Local;
use serde::{Deserialize, Serialize};

/// Kind of a console line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Info,
    Error,
    Warning,
    Input,
    Success,
    Raw,
    Termux,
    Docker,
}

impl LogKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Input => "input",
            Self::Success => "success",
            Self::Raw => "raw",
            Self::Termux => "termux",
            Self::Docker => "docker",
        }
    }
}

/// One console line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Wall-clock label; empty for continuation lines
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: LogKind,
    pub message: String,
}

impl LogEntry {
    /// A line stamped with the current local time
    pub fn now(kind: LogKind, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now().format("%H:%M:%S").to_string(),
            kind,
            message: message.into(),
        }
    }

    /// A continuation line without timestamp
    pub fn continuation(kind: LogKind, message: impl Into<String>) -> Self {
        Self {
            timestamp: String::new(),
            kind,
            message: message.into(),
        }
    }

    pub fn is_continuation(&self) -> bool {
        self.timestamp.is_empty()
    }

    /// Render the line the way a terminal shows it
    pub fn render(&self) -> String {
        let body = match self.kind {
            LogKind::Input => format!("$ {}", self.message),
            _ => self.message.clone(),
        };

        if self.is_continuation() || matches!(self.kind, LogKind::Raw | LogKind::Termux) {
            body
        } else {
            format!("[{}] {}", self.timestamp, body)
        }
    }
}

/// Append-only, unbounded sequence of log entries.
///
/// Insertion order is authoritative; timestamps are labels only and may be
/// out of order or empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogStream {
    entries: Vec<LogEntry>,
}

impl LogStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    /// Drop every entry; later appends start a fresh sequence
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    /// Entries appended after the first `from` entries
    pub fn since(&self, from: usize) -> &[LogEntry] {
        self.entries.get(from..).unwrap_or(&[])
    }

    pub fn render(&self) -> Vec<String> {
        self.entries.iter().map(LogEntry::render).collect()
    }
}
