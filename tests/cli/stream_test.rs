//! Tests for stream supervision against fake `sh` children.

#![cfg(unix)]

use std::time::{Duration, Instant};

use futures_util::StreamExt;
use gemini_bridge::cli::{
    run_and_stream, LaunchSpec, SpawnError, StreamSupervisor, StreamTimings, SupervisorState,
};
use tokio_util::sync::CancellationToken;

fn sh(script: &str) -> LaunchSpec {
    LaunchSpec::new("sh").args(["-c", script])
}

fn fast_timings() -> StreamTimings {
    StreamTimings {
        poll_interval: Duration::from_millis(50),
        grace_period: Duration::from_millis(300),
        terminate_timeout: Duration::from_secs(1),
        join_timeout: Duration::from_secs(1),
    }
}

async fn collect(supervisor: &mut StreamSupervisor) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(line) = supervisor.next_line().await {
        lines.push(line);
    }
    lines
}

#[tokio::test]
async fn yields_every_line_in_order() {
    let spec = sh(r#"i=1; while [ $i -le 200 ]; do echo "line $i"; i=$((i+1)); done"#);
    let mut supervisor = StreamSupervisor::spawn(&spec, fast_timings()).unwrap();

    let lines = collect(&mut supervisor).await;
    let expected: Vec<String> = (1..=200).map(|i| format!("line {i}")).collect();
    assert_eq!(lines, expected);
    assert_eq!(supervisor.state(), SupervisorState::Closed);

    let stats = supervisor.stats();
    assert_eq!(stats.lines + stats.drained, 200);
    assert!(!stats.forced_kill);
}

#[tokio::test]
async fn stderr_is_merged_into_the_stream() {
    let spec = sh("echo out; echo err 1>&2; echo out2");
    let mut supervisor = StreamSupervisor::spawn(&spec, fast_timings()).unwrap();

    assert_eq!(collect(&mut supervisor).await, vec!["out", "err", "out2"]);
}

#[tokio::test]
async fn exit_without_completion_is_prompt() {
    let started = Instant::now();
    let spec = sh("echo a; echo b; exit 3");
    let mut supervisor = StreamSupervisor::spawn(&spec, fast_timings()).unwrap();

    assert_eq!(collect(&mut supervisor).await, vec!["a", "b"]);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn completion_terminates_child_after_grace() {
    let started = Instant::now();
    let spec = sh(concat!(
        r#"printf 'before\n{"type":"result","session_id":"s"}\nduring\n'; "#,
        "sleep 3 >/dev/null 2>&1; echo after"
    ));
    let mut supervisor = StreamSupervisor::spawn(&spec, fast_timings()).unwrap();

    let lines = collect(&mut supervisor).await;
    assert_eq!(
        lines,
        vec!["before", r#"{"type":"result","session_id":"s"}"#, "during"]
    );
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn stubborn_child_is_killed_and_late_output_cut() {
    let timings = StreamTimings {
        grace_period: Duration::from_millis(500),
        terminate_timeout: Duration::from_millis(300),
        ..fast_timings()
    };
    let spec = sh(concat!(
        "trap '' TERM; ",
        r#"echo '{"type":"turn.completed"}'; "#,
        "sleep 0.1; echo during; ",
        "sleep 1 >/dev/null 2>&1; echo late; ",
        "sleep 10 >/dev/null 2>&1"
    ));
    let started = Instant::now();
    let mut supervisor = StreamSupervisor::spawn(&spec, timings).unwrap();

    let lines = collect(&mut supervisor).await;
    assert_eq!(lines, vec![r#"{"type":"turn.completed"}"#, "during"]);
    assert!(supervisor.stats().forced_kill);
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn cancellation_stops_a_silent_child() {
    let cancel = CancellationToken::new();
    let spec = sh("echo start; sleep 10 >/dev/null 2>&1; echo never");
    let mut supervisor = StreamSupervisor::spawn(&spec, fast_timings())
        .unwrap()
        .with_cancellation(cancel.clone());

    assert_eq!(supervisor.next_line().await.as_deref(), Some("start"));

    let started = Instant::now();
    cancel.cancel();
    assert!(supervisor.next_line().await.is_none());
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(supervisor.state(), SupervisorState::Closed);
}

#[tokio::test]
async fn shutdown_discards_remaining_output() {
    let spec = sh("echo first; sleep 10 >/dev/null 2>&1");
    let mut supervisor = StreamSupervisor::spawn(&spec, fast_timings()).unwrap();

    assert_eq!(supervisor.next_line().await.as_deref(), Some("first"));
    supervisor.shutdown().await;
    assert_eq!(supervisor.state(), SupervisorState::Closed);
    assert!(supervisor.next_line().await.is_none());
}

#[tokio::test]
async fn stdin_is_closed() {
    let mut supervisor = StreamSupervisor::spawn(&sh("cat; echo done"), fast_timings()).unwrap();
    assert_eq!(collect(&mut supervisor).await, vec!["done"]);
}

#[tokio::test]
async fn utf8_environment_and_overrides() {
    let spec = sh(r#"echo "$PYTHONIOENCODING $PYTHONUTF8 $BRIDGE_TEST_VAR""#)
        .env("BRIDGE_TEST_VAR", "set");
    let mut supervisor = StreamSupervisor::spawn(&spec, fast_timings()).unwrap();

    assert_eq!(collect(&mut supervisor).await, vec!["utf-8 1 set"]);
}

#[tokio::test]
async fn malformed_utf8_is_replaced() {
    let spec = sh(r"printf 'ok \377\n'; printf 'caf\303\251\n'");
    let mut supervisor = StreamSupervisor::spawn(&spec, fast_timings()).unwrap();

    assert_eq!(collect(&mut supervisor).await, vec!["ok \u{fffd}", "café"]);
}

#[tokio::test]
async fn runs_in_working_dir() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().canonicalize().unwrap();
    let spec = sh("pwd -P").working_dir(&path);
    let mut supervisor = StreamSupervisor::spawn(&spec, fast_timings()).unwrap();

    assert_eq!(
        collect(&mut supervisor).await,
        vec![path.to_string_lossy().into_owned()]
    );
}

#[tokio::test]
async fn missing_executable_is_not_found() {
    let spec = LaunchSpec::new("/nonexistent/dir/gemini-bridge-missing");
    let err = StreamSupervisor::spawn(&spec, fast_timings()).unwrap_err();
    assert!(matches!(err, SpawnError::NotFound(_)), "got {err:?}");
}

#[tokio::test]
async fn run_and_stream_is_a_lazy_stream() {
    let stream = run_and_stream(&sh("echo one; echo two"), fast_timings()).unwrap();
    let lines: Vec<String> = stream.collect().await;
    assert_eq!(lines, vec!["one", "two"]);
}
