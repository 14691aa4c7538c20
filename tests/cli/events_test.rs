//! Tests for stream event parsing and completion detection.

use gemini_bridge::cli::{is_turn_completed, StreamEvent, TERMINAL_EVENT_TYPES};

#[test]
fn terminal_types_are_detected() {
    for kind in TERMINAL_EVENT_TYPES {
        let line = format!(r#"{{"type":"{kind}"}}"#);
        assert!(is_turn_completed(&line), "{kind} should complete the turn");
    }
}

#[test]
fn gemini_stream_sample() {
    let lines = [
        r#"{"type":"init","timestamp":"2025-01-01T00:00:00Z","session_id":"abc","model":"gemini-2.5-pro"}"#,
        r#"{"type":"message","role":"user","content":"hi"}"#,
        r#"{"type":"message","role":"assistant","content":"Hello","delta":true}"#,
        r#"{"type":"tool_use","tool_name":"read_file","parameters":{"path":"a"}}"#,
        r#"{"type":"result","status":"success","stats":{"total_tokens":10}}"#,
    ];

    let completed: Vec<bool> = lines.iter().map(|l| is_turn_completed(l)).collect();
    assert_eq!(completed, vec![false, false, false, false, true]);

    let init = StreamEvent::parse(lines[0]).unwrap();
    assert_eq!(init.kind(), Some("init"));
    assert_eq!(init.session_id().and_then(|v| v.as_str()), Some("abc"));

    let reply = StreamEvent::parse(lines[2]).unwrap();
    assert!(reply.is_assistant_message());
}

#[test]
fn detector_is_total() {
    let inputs = [
        "",
        " ",
        "Loaded cached credentials.",
        "{",
        "}",
        "null",
        "[]",
        r#"{"type":null}"#,
        "\u{fffd}\u{fffd}",
    ];
    for input in inputs {
        assert!(!is_turn_completed(input), "{input:?} must not complete");
    }
}
