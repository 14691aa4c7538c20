//! Result persistence: output file resolution and envelope emission.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::bridge::ResultEnvelope;

/// Directory under the OS temp dir that receives relative output files.
pub const OUTPUT_DIR_NAME: &str = "codex_gemini_bridge";

/// Expand a leading `~` to the user's home directory.
#[must_use]
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

/// Resolve the `--output-file` value.
///
/// Absolute paths are used as is; relative paths land under
/// `<temp dir>/codex_gemini_bridge/`.
#[must_use]
pub fn resolve_output_file(path: Option<&Path>) -> Option<PathBuf> {
    let path = expand_home(path?);
    if path.is_absolute() {
        Some(path)
    } else {
        Some(std::env::temp_dir().join(OUTPUT_DIR_NAME).join(path))
    }
}

/// Absolute, forward-slash form of a path.
#[must_use]
pub fn posix_path(path: &Path) -> String {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let text = absolute.to_string_lossy();
    if cfg!(windows) {
        text.replace('\\', "/")
    } else {
        text.into_owned()
    }
}

fn write_file(path: &Path, json: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, json)
}

/// Write the envelope to `output_file` (if any) and to `out`.
///
/// A failed file write is recorded in `output_file_error` instead of
/// aborting. Returns the envelope as emitted.
///
/// # Errors
///
/// Returns an error only if serialization or writing to `out` fails.
pub fn emit_result<W: Write>(
    mut envelope: ResultEnvelope,
    output_file: Option<&Path>,
    out: &mut W,
) -> std::io::Result<ResultEnvelope> {
    if let Some(path) = output_file {
        if envelope.output_file.is_none() {
            envelope.output_file = Some(posix_path(path));
        }
    }

    let mut json = envelope.to_json_pretty()?;

    if let Some(path) = output_file {
        match write_file(path, &json) {
            Ok(()) => tracing::debug!(path = %path.display(), "Wrote result file"),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to write result file");
                envelope.output_file_error = Some(format!("Failed to write --output-file: {e}"));
                json = envelope.to_json_pretty()?;
            }
        }
    }

    writeln!(out, "{json}")?;
    out.flush()?;
    Ok(envelope)
}
