//! Free text messages from the satellite.
//!
//! Messages expire after a few seconds, and only the newest few are shown.
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use log::info;

/// One received text message.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLogEntry {
    /// Message text.
    pub body: String,
    /// When it was received.
    pub received_at: Instant,
}

/// Expiring mailbox of text messages.
#[derive(Debug, Clone)]
pub struct TextLog {
    entries: VecDeque<TextLogEntry>,
    ttl: Duration,
    display: usize,
}

impl TextLog {
    /// Create new text log.
    #[must_use]
    pub fn new(ttl: Duration, display: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            ttl,
            display,
        }
    }

    /// Add a message.
    pub fn push(&mut self, body: String, now: Instant) {
        info!("Satellite says: {body:?}");
        self.prune(now);
        self.entries.push_back(TextLogEntry {
            body,
            received_at: now,
        });
    }

    fn prune(&mut self, now: Instant) {
        while let Some(e) = self.entries.front() {
            if now.saturating_duration_since(e.received_at) > self.ttl {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    /// Number of stored messages, including expired ones not yet pruned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no messages are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop expired messages, and return the newest ones, oldest first.
    pub fn tail(&mut self, now: Instant) -> Vec<TextLogEntry> {
        self.prune(now);
        let skip = self.entries.len().saturating_sub(self.display);
        self.entries.iter().skip(skip).cloned().collect()
    }
}
