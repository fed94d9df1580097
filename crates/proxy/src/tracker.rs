// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded ring of proxied request records with filtered subscriptions.
//!
//! Mirrors the log buffer's locking discipline: one lock for the ring, one
//! for the subscriber map, bounded `try_send` fan-out. The extra wrinkle is
//! the eviction callback: a record leaving the ring with populated details
//! may own capture files on disk, and the callback deletes them. Eviction
//! and insert happen under a single lock acquisition; the callback runs
//! after the lock is dropped, strictly before `record` returns.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use prox_core::{request_id, RequestFilter, RequestRecord};

/// Per-subscription delivery queue depth.
const SUBSCRIPTION_QUEUE: usize = 100;

type EvictionCallback = Box<dyn Fn(&str) + Send + Sync>;

struct Subscriber {
    filter: RequestFilter,
    tx: mpsc::Sender<RequestRecord>,
}

/// A live request-record subscription.
pub struct TrackerSubscription {
    pub id: u64,
    pub rx: mpsc::Receiver<RequestRecord>,
}

/// The shared request tracker.
pub struct RequestTracker {
    ring: Mutex<VecDeque<RequestRecord>>,
    capacity: usize,
    subscribers: Mutex<HashMap<u64, Subscriber>>,
    next_sub_id: AtomicU64,
    eviction: Mutex<Option<EvictionCallback>>,
    closed: AtomicBool,
}

impl RequestTracker {
    /// Capacity 0 degrades to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ring: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            subscribers: Mutex::new(HashMap::new()),
            next_sub_id: AtomicU64::new(1),
            eviction: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Install the eviction callback, replacing any previous one.
    pub fn set_eviction_callback(&self, callback: impl Fn(&str) + Send + Sync + 'static) {
        *self.eviction.lock() = Some(Box::new(callback));
    }

    /// Store a record, evicting the oldest past capacity, then fan out.
    ///
    /// An empty id is auto-assigned from the record's timestamp, method,
    /// and url. Records arriving after `close` are dropped.
    pub fn record(&self, mut record: RequestRecord) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        if record.id.is_empty() {
            let nanos = record.timestamp.timestamp_nanos_opt().unwrap_or_default();
            record.id = request_id(nanos, &record.method, &record.url);
        }

        // Evict and insert under one lock acquisition; concurrent record()
        // calls must never observe a half-rotated ring.
        let evicted = {
            let mut ring = self.ring.lock();
            let mut evicted = Vec::new();
            while ring.len() >= self.capacity {
                if let Some(old) = ring.pop_front() {
                    evicted.push(old);
                }
            }
            ring.push_back(record.clone());
            evicted
        };

        // Callbacks run without the ring lock, before this call returns.
        for old in evicted {
            if old.details.is_some() {
                if let Some(callback) = self.eviction.lock().as_ref() {
                    callback(&old.id);
                }
            }
        }

        let subscribers = self.subscribers.lock();
        for sub in subscribers.values() {
            if sub.filter.matches(&record) {
                // Full or closed queue: drop for this subscriber only.
                let _ = sub.tx.try_send(record.clone());
            }
        }
    }

    /// Matching records, newest first. `filter.limit` of 0 means no cap.
    pub fn recent(&self, filter: &RequestFilter) -> Vec<RequestRecord> {
        let limit = if filter.limit == 0 { usize::MAX } else { filter.limit };
        let ring = self.ring.lock();
        ring.iter().rev().filter(|r| filter.matches(r)).take(limit).cloned().collect()
    }

    pub fn get_by_id(&self, id: &str) -> Option<RequestRecord> {
        self.ring.lock().iter().find(|r| r.id == id).cloned()
    }

    /// Records currently held.
    pub fn count(&self) -> usize {
        self.ring.lock().len()
    }

    pub fn subscribe(&self, filter: RequestFilter) -> TrackerSubscription {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_QUEUE);
        let id = self.next_sub_id.fetch_add(1, Ordering::SeqCst);

        if !self.closed.load(Ordering::SeqCst) {
            self.subscribers.lock().insert(id, Subscriber { filter, tx });
            debug!(id, "request subscription added");
        }
        TrackerSubscription { id, rx }
    }

    pub fn unsubscribe(&self, id: u64) {
        if self.subscribers.lock().remove(&id).is_some() {
            debug!(id, "request subscription removed");
        }
    }

    /// Close every subscription and ignore further records. Idempotent.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.subscribers.lock().clear();
    }
}

#[cfg(test)]
#[path = "tracker_tests.rs"]
mod tests;
