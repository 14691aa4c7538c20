//! Prompt acquisition from inline text or a file.

use std::path::PathBuf;

/// Error type for prompt loading.
#[derive(thiserror::Error, Debug)]
pub enum PromptError {
    #[error("Failed to read --PROMPT_FILE: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Where the prompt text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptSource {
    Inline(String),
    File(PathBuf),
}

impl PromptSource {
    /// Resolve the prompt text.
    ///
    /// # Errors
    ///
    /// Returns `PromptError::ReadFile` if the file cannot be read as UTF-8.
    pub fn load(&self) -> Result<String, PromptError> {
        match self {
            Self::Inline(text) => Ok(text.clone()),
            Self::File(path) => {
                tracing::debug!(path = %path.display(), "Reading prompt file");
                std::fs::read_to_string(path).map_err(|source| PromptError::ReadFile {
                    path: path.clone(),
                    source,
                })
            }
        }
    }
}
