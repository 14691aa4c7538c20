//! Result envelope rendering.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bridge::TranscriptState;
use crate::cli::SpawnError;
use crate::text::strip_outer_code_fence;

const MISSING_SESSION_ERROR: &str = "Failed to get `SESSION_ID` from the gemini session.";

const EMPTY_REPLY_ERROR: &str = "Failed to retrieve `agent_messages` data from the Gemini session. \
This might be due to Gemini performing a tool call. \
You can continue using the `SESSION_ID` to proceed with the conversation.";

/// The single structured result of a bridge run.
///
/// Absent fields are omitted from the JSON rather than written as `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub success: bool,
    #[serde(rename = "SESSION_ID", default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_messages: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_messages: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub non_json_output: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file_error: Option<String>,
}

impl ResultEnvelope {
    /// A failed envelope carrying only an error message.
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Render as indented JSON, keeping non-ASCII text as is.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Turns a run's outcome into a [`ResultEnvelope`].
#[derive(Debug, Clone, Copy)]
pub struct ResultBuilder {
    strip_code_fences: bool,
    return_all_messages: bool,
}

impl Default for ResultBuilder {
    fn default() -> Self {
        Self {
            strip_code_fences: true,
            return_all_messages: false,
        }
    }
}

impl ResultBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Strip one outer code fence from a successful reply.
    #[must_use]
    pub fn strip_code_fences(mut self, enabled: bool) -> Self {
        self.strip_code_fences = enabled;
        self
    }

    /// Include every structured event and the unstructured output.
    #[must_use]
    pub fn return_all_messages(mut self, enabled: bool) -> Self {
        self.return_all_messages = enabled;
        self
    }

    /// Envelope for a child that could not be launched.
    #[must_use]
    pub fn launch_failure(err: &SpawnError) -> ResultEnvelope {
        ResultEnvelope::failure(format!("Failed to execute gemini: {err}"))
    }

    /// Envelope for a run that streamed to completion.
    #[must_use]
    pub fn build(&self, state: TranscriptState) -> ResultEnvelope {
        let TranscriptState {
            agent_messages,
            session_id,
            all_messages,
            non_json_output,
            errors,
        } = state;

        let mut success = true;
        let mut error = errors;

        if session_id.is_none() {
            success = false;
            error = format!("{MISSING_SESSION_ERROR} \n\n{error}");
        }

        if success && agent_messages.is_empty() {
            success = false;
            error = format!("{EMPTY_REPLY_ERROR} \n\n{error}");
        }

        if !success && !non_json_output.is_empty() {
            error.push_str("\n\n[non-json output]\n");
            error.push_str(&non_json_output.join("\n"));
        }

        let mut envelope = if success {
            let agent_messages = if self.strip_code_fences {
                strip_outer_code_fence(&agent_messages)
            } else {
                agent_messages
            };
            if !error.is_empty() {
                tracing::warn!(error = %error.trim(), "Run succeeded with aggregation errors");
            }
            ResultEnvelope {
                success: true,
                session_id,
                agent_messages: Some(agent_messages),
                ..ResultEnvelope::default()
            }
        } else {
            ResultEnvelope {
                success: false,
                session_id,
                agent_messages: (!agent_messages.is_empty()).then_some(agent_messages),
                error: Some(error.trim_end().to_string()),
                ..ResultEnvelope::default()
            }
        };

        if self.return_all_messages {
            envelope.all_messages = Some(all_messages.unwrap_or_default());
            if !non_json_output.is_empty() {
                envelope.non_json_output = Some(non_json_output);
            }
        }

        envelope
    }
}
