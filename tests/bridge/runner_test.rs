//! End-to-end tests for the bridge runner with fake children.

use std::time::Duration;

use gemini_bridge::bridge::{BridgeRunner, ResultEnvelope};
use gemini_bridge::cli::{LaunchSpec, StreamTimings};

fn fast_timings() -> StreamTimings {
    StreamTimings {
        poll_interval: Duration::from_millis(50),
        grace_period: Duration::from_millis(200),
        terminate_timeout: Duration::from_secs(1),
        join_timeout: Duration::from_secs(1),
    }
}

/// A runner whose child prints `output` verbatim.
#[cfg(unix)]
fn runner_printing(output: &str) -> BridgeRunner {
    let script = format!("cat <<'EOF'\n{output}\nEOF");
    BridgeRunner::new(LaunchSpec::new("sh").args(["-c".to_string(), script])).timings(fast_timings())
}

#[cfg(unix)]
#[tokio::test]
async fn assistant_messages_and_result() {
    let envelope = runner_printing(concat!(
        r#"{"type":"message","role":"assistant","content":"A"}"#,
        "\n",
        r#"{"type":"message","role":"assistant","content":"B"}"#,
        "\n",
        r#"{"type":"result","session_id":"s1"}"#,
    ))
    .run()
    .await;

    assert_eq!(
        envelope,
        ResultEnvelope {
            success: true,
            session_id: Some("s1".to_string()),
            agent_messages: Some("AB".to_string()),
            ..ResultEnvelope::default()
        }
    );
}

#[cfg(unix)]
#[tokio::test]
async fn tool_call_only_is_soft_failure() {
    let envelope = runner_printing(r#"{"type":"tool_call","session_id":"s2"}"#)
        .run()
        .await;

    assert!(!envelope.success);
    assert_eq!(envelope.session_id.as_deref(), Some("s2"));
    assert!(envelope.agent_messages.is_none());
    let error = envelope.error.unwrap();
    assert!(error.contains("agent_messages"), "{error}");
    assert!(error.contains("tool call"), "{error}");
}

#[cfg(unix)]
#[tokio::test]
async fn plain_text_only_reports_missing_session() {
    let envelope = runner_printing("Loaded cached credentials.\nQuota exceeded")
        .return_all_messages(true)
        .run()
        .await;

    assert!(!envelope.success);
    assert!(envelope.session_id.is_none());
    let error = envelope.error.unwrap();
    assert!(error.contains("SESSION_ID"), "{error}");
    assert!(error.contains("[non-json output]\nLoaded cached credentials.\nQuota exceeded"));
    assert_eq!(
        envelope.non_json_output,
        Some(vec![
            "Loaded cached credentials.".to_string(),
            "Quota exceeded".to_string()
        ])
    );
    assert_eq!(envelope.all_messages, Some(vec![]));
}

#[tokio::test]
async fn missing_executable_is_launch_failure() {
    let envelope = BridgeRunner::new(LaunchSpec::new("/nonexistent/dir/gemini"))
        .return_all_messages(true)
        .timings(fast_timings())
        .run()
        .await;

    assert!(!envelope.success);
    assert!(envelope
        .error
        .as_deref()
        .is_some_and(|e| e.starts_with("Failed to execute gemini:")));
    assert!(envelope.session_id.is_none());
    assert!(envelope.agent_messages.is_none());
    assert!(envelope.all_messages.is_none());
    assert!(envelope.non_json_output.is_none());
}

#[cfg(unix)]
#[tokio::test]
async fn unexpected_event_stops_aggregation() {
    let envelope = runner_printing(concat!(
        r#"{"type":"init","session_id":"s3"}"#,
        "\n",
        r#"{"type":"message","role":"assistant","content":"kept"}"#,
        "\n",
        r#"{"type":"message","role":"assistant","content":{"parts":[]}}"#,
        "\n",
        r#"{"type":"message","role":"assistant","content":"dropped"}"#,
    ))
    .return_all_messages(true)
    .run()
    .await;

    assert!(envelope.success);
    assert_eq!(envelope.session_id.as_deref(), Some("s3"));
    assert_eq!(envelope.agent_messages.as_deref(), Some("kept"));

    let all = envelope.all_messages.unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[2]["content"], serde_json::json!({"parts": []}));
}

#[cfg(unix)]
#[tokio::test]
async fn fenced_reply_is_stripped_unless_disabled() {
    let output = concat!(
        r#"{"type":"init","session_id":"s4"}"#,
        "\n",
        r#"{"type":"message","role":"assistant","content":"```python\nprint(1)\n```"}"#,
        "\n",
        r#"{"type":"result"}"#,
    );

    let stripped = runner_printing(output).run().await;
    assert_eq!(stripped.agent_messages.as_deref(), Some("print(1)"));

    let kept = runner_printing(output).strip_code_fences(false).run().await;
    assert_eq!(
        kept.agent_messages.as_deref(),
        Some("```python\nprint(1)\n```")
    );
}

#[cfg(unix)]
#[tokio::test]
async fn all_messages_returned_in_order() {
    let envelope = runner_printing(concat!(
        "warming up\n",
        r#"{"type":"init","session_id":"s5"}"#,
        "\n",
        r#"{"type":"message","role":"assistant","content":"hi"}"#,
        "\n",
        r#"{"type":"result","status":"success"}"#,
    ))
    .return_all_messages(true)
    .run()
    .await;

    assert!(envelope.success);
    let kinds: Vec<String> = envelope
        .all_messages
        .unwrap()
        .iter()
        .map(|m| m["type"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(kinds, vec!["init", "message", "result"]);
    assert_eq!(envelope.non_json_output, Some(vec!["warming up".to_string()]));
    assert!(envelope.error.is_none());
}

#[test]
fn envelope_round_trip_keeps_present_fields_only() {
    let envelope = ResultEnvelope {
        success: false,
        session_id: Some("s".to_string()),
        error: Some("boom".to_string()),
        non_json_output: Some(vec!["x".to_string()]),
        ..ResultEnvelope::default()
    };

    let json = envelope.to_json_pretty().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    let mut keys: Vec<&str> = value
        .as_object()
        .unwrap()
        .keys()
        .map(String::as_str)
        .collect();
    keys.sort_unstable();
    assert_eq!(keys, vec!["SESSION_ID", "error", "non_json_output", "success"]);

    let back: ResultEnvelope = serde_json::from_value(value).unwrap();
    assert_eq!(back, envelope);
}
