//! Stream supervisor state machine.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a supervised child process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupervisorState {
    #[default]
    Launched,
    Streaming,
    /// A turn-completed event was seen and the grace period elapsed.
    CompletionDetected,
    /// The child exited and the reader finished without a clean end marker.
    ProcessExitedExternally,
    /// The reader delivered its end marker.
    StreamEnded,
    /// The caller cancelled the run.
    Cancelled,
    Terminating,
    Drained,
    Closed,
}

impl SupervisorState {
    /// Returns true once the yield loop has ended for any reason.
    #[must_use]
    pub fn is_stopping(self) -> bool {
        !matches!(self, Self::Launched | Self::Streaming)
    }
}

/// State machine tracking the supervisor lifecycle.
#[derive(Debug, Clone)]
pub struct SupervisorStateMachine {
    state: SupervisorState,
    lines: usize,
    drained: usize,
    forced_kill: bool,
}

impl Default for SupervisorStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SupervisorStateMachine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: SupervisorState::Launched,
            lines: 0,
            drained: 0,
            forced_kill: false,
        }
    }

    #[must_use]
    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn transition(&mut self, new_state: SupervisorState) {
        tracing::debug!(from = ?self.state, to = ?new_state, "State transition");
        self.state = new_state;
    }

    pub fn record_line(&mut self) {
        self.lines = self.lines.saturating_add(1);
    }

    pub fn record_drained(&mut self, count: usize) {
        self.drained = self.drained.saturating_add(count);
    }

    pub fn record_forced_kill(&mut self) {
        self.forced_kill = true;
    }

    #[must_use]
    pub fn stats(&self) -> SupervisorStats {
        SupervisorStats {
            lines: self.lines,
            drained: self.drained,
            forced_kill: self.forced_kill,
        }
    }
}

/// Counters for one supervised run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorStats {
    /// Lines yielded from the main loop.
    pub lines: usize,
    /// Lines yielded by the final drain.
    pub drained: usize,
    /// Whether the child had to be killed.
    pub forced_kill: bool,
}
