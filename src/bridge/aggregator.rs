//! Folding output lines into transcript state.

use serde_json::Value;

use crate::cli::StreamEvent;

/// An event that parsed but has an unexpected structure.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AggregationError {
    /// Assistant message `content` that is not a string.
    #[error("assistant message content must be a string, got {0}")]
    NonStringContent(Value),
    /// A `session_id` that is not a string.
    #[error("session_id must be a string, got {0}")]
    NonStringSessionId(Value),
}

/// Accumulated state of one run's output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranscriptState {
    /// Concatenated assistant message text.
    pub agent_messages: String,
    /// First session identifier seen.
    pub session_id: Option<String>,
    /// Every structured event, when retained.
    pub all_messages: Option<Vec<Value>>,
    /// Lines that were not JSON objects.
    pub non_json_output: Vec<String>,
    /// Unexpected errors recorded while aggregating.
    pub errors: String,
}

/// Classifies output lines and accumulates a [`TranscriptState`].
#[derive(Debug, Clone, Default)]
pub struct EventAggregator {
    state: TranscriptState,
}

impl EventAggregator {
    /// Create an aggregator. Structured events are kept only if `retain_events`.
    #[must_use]
    pub fn new(retain_events: bool) -> Self {
        Self {
            state: TranscriptState {
                all_messages: retain_events.then(Vec::new),
                ..TranscriptState::default()
            },
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> &TranscriptState {
        &self.state
    }

    /// Fold one output line into the state.
    ///
    /// Lines that are not JSON objects are recorded as unstructured output
    /// and never fail.
    ///
    /// # Errors
    ///
    /// Returns `AggregationError` if a JSON object has an unexpected
    /// structure; aggregation should stop at that point.
    pub fn push_line(&mut self, line: &str) -> Result<(), AggregationError> {
        let line = line.trim();
        if !line.starts_with('{') {
            self.state.non_json_output.push(line.to_string());
            return Ok(());
        }

        let Some(event) = StreamEvent::parse(line) else {
            tracing::debug!(line, "Line looked like JSON but did not parse");
            self.state.non_json_output.push(line.to_string());
            return Ok(());
        };

        let content = assistant_text(&event);
        let session_id = session_text(&event);

        // An event that fails validation is still retained.
        if let Some(all) = self.state.all_messages.as_mut() {
            all.push(event.into_value());
        }

        let content = content?;
        let session_id = session_id?;

        if let Some(text) = content {
            self.state.agent_messages.push_str(&text);
        }

        if let Some(id) = session_id {
            if self.state.session_id.is_none() {
                tracing::info!(session_id = %id, "Captured session id");
                self.state.session_id = Some(id);
            } else if self.state.session_id.as_deref() != Some(id.as_str()) {
                tracing::debug!(session_id = %id, "Ignoring later session id");
            }
        }

        Ok(())
    }

    /// Record an unexpected error for the line that caused it.
    pub fn record_unexpected(&mut self, err: &AggregationError, line: &str) {
        self.state
            .errors
            .push_str(&format!("\n\n[unexpected error] Unexpected error: {err}. Line: {line:?}"));
    }

    /// Finish aggregation and return the state.
    #[must_use]
    pub fn finish(self) -> TranscriptState {
        self.state
    }
}

fn assistant_text(event: &StreamEvent) -> Result<Option<String>, AggregationError> {
    if !event.is_assistant_message() {
        return Ok(None);
    }
    match event.content() {
        None => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.clone())),
        Some(other) => Err(AggregationError::NonStringContent(other.clone())),
    }
}

fn session_text(event: &StreamEvent) -> Result<Option<String>, AggregationError> {
    match event.session_id() {
        None => Ok(None),
        Some(Value::String(id)) => Ok(Some(id.clone())),
        Some(other) => Err(AggregationError::NonStringSessionId(other.clone())),
    }
}
