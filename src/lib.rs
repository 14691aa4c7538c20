//! Gemini Bridge - supervised Gemini CLI runs with a single JSON result.

pub mod bridge;
pub mod cli;
pub mod config;
pub mod output;
pub mod prompt;
pub mod text;
