// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded in-memory log ring with filtered history and live subscriptions.
//!
//! Two locks: one on the ring, one on the subscription map, so a slow
//! subscribe/unsubscribe never blocks writers. Delivery uses `try_send`;
//! a full subscriber queue drops that entry for that subscriber only.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use regex::Regex;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use prox_core::{LogEntry, LogFilter};

/// Per-subscription delivery queue depth.
const SUBSCRIPTION_QUEUE: usize = 256;

/// Log buffer errors
#[derive(Debug, Error)]
pub enum LogError {
    #[error("invalid pattern: {0}")]
    InvalidPattern(#[source] regex::Error),
}

/// A filter with its pattern compiled once at subscription/query time.
#[derive(Debug, Clone)]
pub(crate) enum Matcher {
    All,
    Literal(String),
    Regex(Regex),
}

impl Matcher {
    pub(crate) fn compile(filter: &LogFilter) -> Result<Self, LogError> {
        match filter.pattern.as_deref() {
            None | Some("") => Ok(Matcher::All),
            Some(pat) if filter.regex => {
                Ok(Matcher::Regex(Regex::new(pat).map_err(LogError::InvalidPattern)?))
            }
            Some(pat) => Ok(Matcher::Literal(pat.to_string())),
        }
    }

    fn matches(&self, line: &str) -> bool {
        match self {
            Matcher::All => true,
            Matcher::Literal(pat) => line.contains(pat.as_str()),
            Matcher::Regex(re) => re.is_match(line),
        }
    }
}

struct Subscriber {
    filter: LogFilter,
    matcher: Matcher,
    tx: mpsc::Sender<LogEntry>,
}

impl Subscriber {
    fn wants(&self, entry: &LogEntry) -> bool {
        self.filter.matches_process(&entry.process) && self.matcher.matches(&entry.line)
    }
}

/// A live log subscription. Dropping the receiver without unsubscribing is
/// tolerated; the buffer notices the closed channel on the next delivery.
pub struct LogSubscription {
    pub id: u64,
    pub rx: mpsc::Receiver<LogEntry>,
}

struct Ring {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    /// Monotonic count of every entry ever written
    total: u64,
    closed: bool,
}

/// The shared log manager.
pub struct LogBuffer {
    ring: Mutex<Ring>,
    subscribers: Mutex<HashMap<u64, Subscriber>>,
    next_id: Mutex<u64>,
}

impl LogBuffer {
    /// Capacity 0 degrades to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ring: Mutex::new(Ring {
                entries: VecDeque::with_capacity(capacity),
                capacity,
                total: 0,
                closed: false,
            }),
            subscribers: Mutex::new(HashMap::new()),
            next_id: Mutex::new(1),
        }
    }

    /// Append an entry, evicting the oldest past capacity, then fan out.
    ///
    /// Never fails and never blocks on subscribers; writes after `close`
    /// are ignored.
    pub fn write(&self, entry: LogEntry) {
        {
            let mut ring = self.ring.lock();
            if ring.closed {
                return;
            }
            if ring.entries.len() == ring.capacity {
                ring.entries.pop_front();
            }
            ring.entries.push_back(entry.clone());
            ring.total += 1;
        }

        let subscribers = self.subscribers.lock();
        for sub in subscribers.values() {
            if sub.wants(&entry) {
                // Full or closed queue: drop for this subscriber only.
                let _ = sub.tx.try_send(entry.clone());
            }
        }
    }

    /// The `limit` most recent matching entries, newest first, plus the
    /// total number of entries ever written.
    pub fn query_last(
        &self,
        filter: &LogFilter,
        limit: usize,
    ) -> Result<(Vec<LogEntry>, u64), LogError> {
        let matcher = Matcher::compile(filter)?;

        let ring = self.ring.lock();
        let mut out = Vec::new();
        for entry in ring.entries.iter().rev() {
            if out.len() == limit {
                break;
            }
            if filter.matches_process(&entry.process) && matcher.matches(&entry.line) {
                out.push(entry.clone());
            }
        }
        Ok((out, ring.total))
    }

    /// Register a live subscription. The filter is validated eagerly: an
    /// invalid regex fails here and nowhere else.
    pub fn subscribe(&self, filter: LogFilter) -> Result<LogSubscription, LogError> {
        let matcher = Matcher::compile(&filter)?;
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_QUEUE);

        let id = {
            let mut next = self.next_id.lock();
            let id = *next;
            *next += 1;
            id
        };

        if self.ring.lock().closed {
            // Late subscribers on a closed buffer get an immediately-closed
            // channel rather than an error.
            drop(tx);
            return Ok(LogSubscription { id, rx });
        }

        self.subscribers.lock().insert(id, Subscriber { filter, matcher, tx });
        debug!(id, "log subscription added");
        Ok(LogSubscription { id, rx })
    }

    /// Remove a subscription, closing its queue.
    pub fn unsubscribe(&self, id: u64) {
        if self.subscribers.lock().remove(&id).is_some() {
            debug!(id, "log subscription removed");
        }
    }

    /// Close every subscription and ignore further writes. Idempotent.
    pub fn close(&self) {
        self.ring.lock().closed = true;
        self.subscribers.lock().clear();
    }

    /// Entries ever written.
    pub fn total(&self) -> u64 {
        self.ring.lock().total
    }

    /// Entries currently held.
    pub fn len(&self) -> usize {
        self.ring.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "logbuf_tests.rs"]
mod tests;
