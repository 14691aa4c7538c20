//! Text post-processing for prompts and assistant replies.

use std::sync::LazyLock;

use regex::Regex;

/// How many lines after a `--- ` header to look for the matching `+++ `.
const DIFF_HEADER_LOOKAHEAD: usize = 15;

static OUTER_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\A```[^\n`]*\n(.*?)```\z").expect("outer fence pattern is valid")
});

/// Strip a single outer Markdown code fence from an assistant reply.
///
/// The text is returned unchanged unless the whole reply (ignoring
/// surrounding whitespace) is one fenced block with no nested fences. A fenced
/// unified diff is always kept verbatim.
#[must_use]
pub fn strip_outer_code_fence(text: &str) -> String {
    let Some(captures) = OUTER_FENCE.captures(text.trim()) else {
        return text.to_string();
    };
    let inner = captures.get(1).map_or("", |m| m.as_str()).trim_matches('\n');

    if inner
        .lines()
        .any(|line| line.trim_start().starts_with("```"))
    {
        return text.to_string();
    }

    if contains_unified_diff(inner) {
        tracing::debug!("Keeping fenced unified diff verbatim");
        return text.to_string();
    }

    inner.to_string()
}

/// Returns true if `text` has a `--- ` line followed closely by a `+++ ` line.
#[must_use]
pub fn contains_unified_diff(text: &str) -> bool {
    let lines: Vec<&str> = text.lines().collect();
    lines.iter().enumerate().any(|(index, line)| {
        line.starts_with("--- ")
            && lines
                .iter()
                .skip(index + 1)
                .take(DIFF_HEADER_LOOKAHEAD - 1)
                .any(|next| next.starts_with("+++ "))
    })
}

/// Escape a prompt for the Windows command line.
#[must_use]
pub fn windows_escape(prompt: &str) -> String {
    let mut out = String::with_capacity(prompt.len());
    for ch in prompt.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\'' => out.push_str("\\'"),
            other => out.push(other),
        }
    }
    out
}

/// Apply platform-specific escaping to a prompt before launch.
#[must_use]
pub fn escape_prompt_for_platform(prompt: &str) -> String {
    if cfg!(windows) {
        windows_escape(prompt)
    } else {
        prompt.to_string()
    }
}
