// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use prox_core::LogFilter;

use super::*;

fn empty_env() -> BTreeMap<String, String> {
    BTreeMap::new()
}

fn lines_for(logbuf: &LogBuffer, process: &str) -> Vec<(LogStream, String)> {
    let filter = LogFilter { processes: vec![process.to_string()], ..Default::default() };
    let (entries, _) = logbuf.query_last(&filter, usize::MAX).unwrap();
    entries.into_iter().rev().map(|e| (e.stream, e.line)).collect()
}

#[tokio::test]
async fn captures_stdout_and_stderr_with_tags() {
    let logbuf = Arc::new(LogBuffer::new(100));
    let child = spawn(
        "tags",
        "echo out-line; echo err-line >&2",
        &empty_env(),
        None,
        Arc::clone(&logbuf),
    )
    .unwrap();

    child.wait().await.unwrap();

    let lines = lines_for(&logbuf, "tags");
    assert!(lines.contains(&(LogStream::Stdout, "out-line".to_string())));
    assert!(lines.contains(&(LogStream::Stderr, "err-line".to_string())));
}

#[tokio::test]
async fn passes_environment_to_child() {
    let logbuf = Arc::new(LogBuffer::new(100));
    let mut env = empty_env();
    env.insert("PROX_TEST_VALUE".to_string(), "marker-42".to_string());

    let child = spawn("env", "echo $PROX_TEST_VALUE", &env, None, Arc::clone(&logbuf)).unwrap();
    child.wait().await.unwrap();

    let lines = lines_for(&logbuf, "env");
    assert_eq!(lines, [(LogStream::Stdout, "marker-42".to_string())]);
}

#[tokio::test]
async fn grandchild_output_survives_child_exit() {
    let logbuf = Arc::new(LogBuffer::new(100));
    // The inner shell inherits the write fd and outlives its parent; its
    // late line must still be captured before wait() returns.
    let child = spawn(
        "grand",
        "( sleep 0.3; echo from-grandchild ) & echo from-child",
        &empty_env(),
        None,
        Arc::clone(&logbuf),
    )
    .unwrap();

    child.wait().await.unwrap();

    let lines = lines_for(&logbuf, "grand");
    assert!(lines.contains(&(LogStream::Stdout, "from-child".to_string())));
    assert!(lines.contains(&(LogStream::Stdout, "from-grandchild".to_string())));
}

#[tokio::test]
async fn oversized_lines_are_split_not_dropped() {
    let logbuf = Arc::new(LogBuffer::new(100));
    let total = LINE_BUF_MAX + LINE_BUF_MAX / 2;
    let command = format!("head -c {total} /dev/zero | tr '\\0' 'a'; echo");

    let child = spawn("big", &command, &empty_env(), None, Arc::clone(&logbuf)).unwrap();
    child.wait().await.unwrap();

    let lines = lines_for(&logbuf, "big");
    let reconstructed: usize = lines.iter().map(|(_, l)| l.len()).sum();
    assert_eq!(reconstructed, total);
    assert!(lines.iter().all(|(_, l)| l.len() <= LINE_BUF_MAX));
    assert!(lines.len() >= 2);
}

#[tokio::test]
async fn spawn_fails_on_bad_cwd() {
    let logbuf = Arc::new(LogBuffer::new(10));
    let cwd = PathBuf::from("/nonexistent/prox/cwd");

    let err = spawn("bad", "true", &empty_env(), Some(&cwd), logbuf).unwrap_err();
    assert!(matches!(err, RunnerError::Spawn { .. }));
}

#[tokio::test]
async fn signal_group_terminates_whole_tree() {
    let logbuf = Arc::new(LogBuffer::new(100));
    let child = spawn(
        "tree",
        "trap 'exit 0' TERM; sleep 30 & wait",
        &empty_env(),
        None,
        Arc::clone(&logbuf),
    )
    .unwrap();
    let pid = child.pid;

    // Give the shell a moment to install the trap.
    tokio::time::sleep(Duration::from_millis(200)).await;
    signal_group(pid, Signal::SIGTERM).unwrap();

    let status = tokio::time::timeout(Duration::from_secs(5), child.wait())
        .await
        .expect("child should exit after group TERM")
        .unwrap();
    assert!(status.code() == Some(0) || status.code().is_none());
}
