//! Bounded per-session event log.
//!
//! Each session key gets a ring of the most recent entries, newest first.
//! Buffers are keyed by session key, not by session instance, so an operator
//! can still read why a session ended after it is gone.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

pub const DEFAULT_CAPACITY: usize = 200;

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub text: String,
}

pub struct LogSink {
    capacity: usize,
    buffers: RwLock<HashMap<String, VecDeque<LogEntry>>>,
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl LogSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            buffers: RwLock::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record an event for `key`, evicting the oldest entry once the buffer
    /// is full. Also emitted as a tracing event.
    pub fn append(&self, key: &str, text: impl Into<String>) {
        let text = text.into();
        tracing::info!(session_key = %key, "{text}");

        let entry = LogEntry {
            timestamp: Utc::now(),
            text,
        };
        let mut buffers = self.buffers.write();
        let buf = buffers.entry(key.to_owned()).or_default();
        buf.push_front(entry);
        while buf.len() > self.capacity {
            buf.pop_back();
        }
    }

    /// Entries for `key`, newest first. Unknown keys yield an empty list.
    pub fn read(&self, key: &str) -> Vec<LogEntry> {
        self.buffers
            .read()
            .get(key)
            .map(|buf| buf.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, key: &str) -> usize {
        self.buffers.read().get(key).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self, key: &str) -> bool {
        self.len(key) == 0
    }
}
