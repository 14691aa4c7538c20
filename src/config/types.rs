//! Configuration types.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cli::{ApprovalMode, StreamTimings, DEFAULT_BINARY};

/// Timing configuration for the stream supervisor, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingsConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
    #[serde(default = "default_terminate_timeout_ms")]
    pub terminate_timeout_ms: u64,
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_grace_period_ms() -> u64 {
    300
}

fn default_terminate_timeout_ms() -> u64 {
    5000
}

fn default_join_timeout_ms() -> u64 {
    5000
}

impl Default for TimingsConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            grace_period_ms: default_grace_period_ms(),
            terminate_timeout_ms: default_terminate_timeout_ms(),
            join_timeout_ms: default_join_timeout_ms(),
        }
    }
}

impl From<&TimingsConfig> for StreamTimings {
    fn from(config: &TimingsConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            grace_period: Duration::from_millis(config.grace_period_ms),
            terminate_timeout: Duration::from_millis(config.terminate_timeout_ms),
            join_timeout: Duration::from_millis(config.join_timeout_ms),
        }
    }
}

/// Bridge configuration loaded from TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Gemini executable name or path.
    #[serde(default = "default_binary")]
    pub binary: String,
    /// Strip an outer code fence from replies unless the CLI says otherwise.
    #[serde(default = "default_strip_code_fences")]
    pub strip_code_fences: bool,
    /// Default approval mode when the CLI does not set one.
    #[serde(default)]
    pub approval_mode: Option<ApprovalMode>,
    /// Default model when the CLI does not set one.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub timings: TimingsConfig,
    /// Extra environment variables for the child.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_binary() -> String {
    DEFAULT_BINARY.to_string()
}

fn default_strip_code_fences() -> bool {
    true
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            strip_code_fences: default_strip_code_fences(),
            approval_mode: None,
            model: None,
            timings: TimingsConfig::default(),
            env: BTreeMap::new(),
        }
    }
}

impl BridgeConfig {
    /// Stream timings derived from this config.
    #[must_use]
    pub fn stream_timings(&self) -> StreamTimings {
        StreamTimings::from(&self.timings)
    }
}
