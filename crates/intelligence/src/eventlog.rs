//! Per-operation event log
//!
//! Each sync or dispatch call owns exactly one [`EventLog`]. Entries are
//! appended in order and addressed afterwards by their sequence number, so
//! the only writer of an entry is whoever holds the log. Marking any entry
//! fatal trips the log; the owning coordinator checks [`EventLog::is_fatal`]
//! before every further step.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Log target used when mirroring entries to the `log` facade
pub const LOG_TARGET: &str = "veritech::event";

/// Severity of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for log::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => log::Level::Trace,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Info => log::Level::Info,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        }
    }
}

/// One structured entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub seq: u64,
    pub level: LogLevel,
    pub message: String,
    #[serde(default)]
    pub payload: Map<String, Value>,
    #[serde(default)]
    pub fatal: bool,
    pub timestamp: DateTime<Utc>,
}

/// Append-only log stream bound to a single operation
#[derive(Debug, Default)]
pub struct EventLog {
    /// Label used in mirrored log lines (usually the entity id)
    scope: String,
    entries: Vec<LogEntry>,
    fatal: Option<u64>,
}

impl EventLog {
    /// Create a fresh, isolated stream for one operation
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            entries: Vec::new(),
            fatal: None,
        }
    }

    /// Append an entry and return its sequence number
    pub fn log(&mut self, level: LogLevel, message: impl Into<String>, payload: Value) -> u64 {
        let seq = self.entries.len() as u64;
        let message = message.into();
        let payload = match payload {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };

        log::log!(
            target: LOG_TARGET,
            level.into(),
            "[{}] {}{}",
            self.scope,
            message,
            if payload.is_empty() {
                String::new()
            } else {
                format!(" {}", Value::Object(payload.clone()))
            }
        );

        self.entries.push(LogEntry {
            seq,
            level,
            message,
            payload,
            fatal: false,
            timestamp: Utc::now(),
        });
        seq
    }

    pub fn debug(&mut self, message: impl Into<String>, payload: Value) -> u64 {
        self.log(LogLevel::Debug, message, payload)
    }

    pub fn info(&mut self, message: impl Into<String>, payload: Value) -> u64 {
        self.log(LogLevel::Info, message, payload)
    }

    pub fn warn(&mut self, message: impl Into<String>, payload: Value) -> u64 {
        self.log(LogLevel::Warn, message, payload)
    }

    pub fn error(&mut self, message: impl Into<String>, payload: Value) -> u64 {
        self.log(LogLevel::Error, message, payload)
    }

    /// Set one payload field of an existing entry
    pub fn update_payload(&mut self, seq: u64, key: &str, value: impl Into<Value>) -> Result<()> {
        let entry = self.entry_mut(seq)?;
        entry.payload.insert(key.to_string(), value.into());
        Ok(())
    }

    /// Mark an entry fatal, aborting the owning operation
    pub fn mark_fatal(&mut self, seq: u64) -> Result<()> {
        let scope = self.scope.clone();
        let entry = self.entry_mut(seq)?;
        entry.fatal = true;
        log::error!(
            target: LOG_TARGET,
            "[{}] fatal: {} {}",
            scope,
            entry.message,
            Value::Object(entry.payload.clone())
        );
        // First fatal entry wins
        self.fatal.get_or_insert(seq);
        Ok(())
    }

    /// Append an error entry and mark it fatal in one step
    pub fn fatal(&mut self, message: impl Into<String>, payload: Value) -> u64 {
        let seq = self.log(LogLevel::Error, message, payload);
        if let Some(entry) = self.entries.last_mut() {
            entry.fatal = true;
        }
        self.fatal.get_or_insert(seq);
        seq
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal.is_some()
    }

    /// The first entry marked fatal
    pub fn fatal_entry(&self) -> Option<&LogEntry> {
        self.fatal.and_then(|seq| self.entries.get(seq as usize))
    }

    /// Human-readable reason for a fatal abort
    pub fn fatal_reason(&self) -> Option<String> {
        self.fatal_entry().map(|entry| match entry.payload.get("failure") {
            Some(Value::String(failure)) => format!("{}: {}", entry.message, failure),
            Some(other) => format!("{}: {}", entry.message, other),
            None => entry.message.clone(),
        })
    }

    /// Fail with `OperationAborted` if the stream has been tripped
    pub fn checkpoint(&self) -> Result<()> {
        match self.fatal {
            Some(entry) => Err(Error::OperationAborted { entry }),
            None => Ok(()),
        }
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

    pub fn into_entries(self) -> Vec<LogEntry> {
        self.entries
    }

    fn entry_mut(&mut self, seq: u64) -> Result<&mut LogEntry> {
        self.entries
            .get_mut(seq as usize)
            .ok_or(Error::UnknownLogEntry(seq))
    }
}
