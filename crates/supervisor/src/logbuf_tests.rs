// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use proptest::prelude::*;

use prox_core::LogStream;

use super::*;

fn entry(process: &str, line: &str) -> LogEntry {
    LogEntry::new(process, LogStream::Stdout, line)
}

fn filter(processes: &[&str], pattern: Option<&str>, regex: bool) -> LogFilter {
    LogFilter {
        processes: processes.iter().map(|s| s.to_string()).collect(),
        pattern: pattern.map(|s| s.to_string()),
        regex,
    }
}

#[test]
fn query_returns_newest_first() {
    let buf = LogBuffer::new(10);
    for i in 0..5 {
        buf.write(entry("web", &format!("line {i}")));
    }

    let (entries, total) = buf.query_last(&LogFilter::default(), 100).unwrap();
    assert_eq!(total, 5);
    let lines: Vec<_> = entries.iter().map(|e| e.line.as_str()).collect();
    assert_eq!(lines, ["line 4", "line 3", "line 2", "line 1", "line 0"]);
}

#[test]
fn overflow_drops_oldest() {
    let buf = LogBuffer::new(3);
    for i in 0..7 {
        buf.write(entry("web", &format!("line {i}")));
    }

    let (entries, total) = buf.query_last(&LogFilter::default(), 100).unwrap();
    assert_eq!(total, 7);
    let lines: Vec<_> = entries.iter().map(|e| e.line.as_str()).collect();
    assert_eq!(lines, ["line 6", "line 5", "line 4"]);
}

#[test]
fn capacity_zero_degrades_to_one() {
    let buf = LogBuffer::new(0);
    buf.write(entry("web", "a"));
    buf.write(entry("web", "b"));

    let (entries, _) = buf.query_last(&LogFilter::default(), 100).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].line, "b");
}

#[test]
fn query_limit_stops_at_matches() {
    let buf = LogBuffer::new(10);
    for i in 0..8 {
        buf.write(entry("web", &format!("line {i}")));
    }

    let (entries, _) = buf.query_last(&LogFilter::default(), 3).unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].line, "line 7");
}

#[test]
fn query_filters_by_process_and_literal_pattern() {
    let buf = LogBuffer::new(10);
    buf.write(entry("web", "GET /"));
    buf.write(entry("worker", "GET /"));
    buf.write(entry("web", "POST /"));

    let (entries, _) = buf.query_last(&filter(&["web"], Some("GET"), false), 100).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].process, "web");
    assert_eq!(entries[0].line, "GET /");
}

#[test]
fn literal_pattern_is_not_regex() {
    let buf = LogBuffer::new(10);
    buf.write(entry("web", "a.b"));
    buf.write(entry("web", "axb"));

    let (entries, _) = buf.query_last(&filter(&[], Some("a.b"), false), 100).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].line, "a.b");
}

#[test]
fn regex_pattern_matches() {
    let buf = LogBuffer::new(10);
    buf.write(entry("web", "status=200"));
    buf.write(entry("web", "status=500"));

    let (entries, _) = buf.query_last(&filter(&[], Some(r"status=5\d\d"), true), 100).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].line, "status=500");
}

#[test]
fn invalid_regex_fails_query_and_subscribe() {
    let buf = LogBuffer::new(10);
    let bad = filter(&[], Some("["), true);

    assert!(matches!(buf.query_last(&bad, 100), Err(LogError::InvalidPattern(_))));
    assert!(matches!(buf.subscribe(bad), Err(LogError::InvalidPattern(_))));
}

#[test]
fn empty_pattern_matches_everything() {
    let buf = LogBuffer::new(10);
    buf.write(entry("web", "anything"));

    let (entries, _) = buf.query_last(&filter(&[], Some(""), true), 100).unwrap();
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn subscription_delivers_matching_entries_only() {
    let buf = LogBuffer::new(10);
    let mut sub = buf.subscribe(filter(&["web"], Some("hit"), false)).unwrap();

    buf.write(entry("worker", "hit"));
    buf.write(entry("web", "miss"));
    buf.write(entry("web", "a hit line"));

    let got = sub.rx.recv().await.unwrap();
    assert_eq!(got.line, "a hit line");
    assert!(sub.rx.try_recv().is_err());
}

#[tokio::test]
async fn full_subscriber_queue_drops_without_blocking_writer() {
    let buf = LogBuffer::new(2048);
    let mut sub = buf.subscribe(LogFilter::default()).unwrap();

    // Overfill the bounded queue; writes must not error or block.
    for i in 0..600 {
        buf.write(entry("web", &format!("line {i}")));
    }

    // History is unaffected by subscriber drops.
    let (entries, total) = buf.query_last(&LogFilter::default(), 1000).unwrap();
    assert_eq!(total, 600);
    assert_eq!(entries.len(), 600);

    // The subscriber got a dense prefix and nothing more than its queue.
    let mut received = 0;
    while sub.rx.try_recv().is_ok() {
        received += 1;
    }
    assert!(received < 600);
    assert!(received > 0);
}

#[tokio::test]
async fn unsubscribe_closes_queue() {
    let buf = LogBuffer::new(10);
    let mut sub = buf.subscribe(LogFilter::default()).unwrap();

    buf.unsubscribe(sub.id);
    buf.write(entry("web", "after"));

    assert!(sub.rx.recv().await.is_none());
}

#[tokio::test]
async fn close_ends_subscriptions_and_ignores_writes() {
    let buf = LogBuffer::new(10);
    let mut sub = buf.subscribe(LogFilter::default()).unwrap();

    buf.close();
    buf.write(entry("web", "ignored"));
    buf.close(); // idempotent

    assert!(sub.rx.recv().await.is_none());
    assert_eq!(buf.total(), 0);
    assert!(buf.is_empty());
}

proptest! {
    // For any write sequence and capacity, the query window is the newest
    // min(n, capacity) entries in newest-first order.
    #[test]
    fn ring_window_property(lines in prop::collection::vec("[a-z]{0,8}", 0..64), cap in 1usize..16) {
        let buf = LogBuffer::new(cap);
        for line in &lines {
            buf.write(entry("p", line));
        }

        let (entries, total) = buf.query_last(&LogFilter::default(), usize::MAX).unwrap();
        prop_assert_eq!(total as usize, lines.len());
        prop_assert_eq!(entries.len(), lines.len().min(cap));

        let expected: Vec<_> = lines.iter().rev().take(cap).cloned().collect();
        let got: Vec<_> = entries.iter().map(|e| e.line.clone()).collect();
        prop_assert_eq!(got, expected);
    }
}
