//! Bridge runner connecting the stream supervisor, aggregator and result builder.

use tokio_util::sync::CancellationToken;

use crate::bridge::{EventAggregator, ResultBuilder, ResultEnvelope};
use crate::cli::{LaunchSpec, StreamSupervisor, StreamTimings};

/// Runs one supervised Gemini invocation and produces its envelope.
#[derive(Debug, Clone)]
pub struct BridgeRunner {
    launch: LaunchSpec,
    timings: StreamTimings,
    result: ResultBuilder,
    return_all_messages: bool,
    cancel: Option<CancellationToken>,
}

impl BridgeRunner {
    #[must_use]
    pub fn new(launch: LaunchSpec) -> Self {
        Self {
            launch,
            timings: StreamTimings::default(),
            result: ResultBuilder::new(),
            return_all_messages: false,
            cancel: None,
        }
    }

    #[must_use]
    pub fn timings(mut self, timings: StreamTimings) -> Self {
        self.timings = timings;
        self
    }

    #[must_use]
    pub fn strip_code_fences(mut self, enabled: bool) -> Self {
        self.result = self.result.strip_code_fences(enabled);
        self
    }

    #[must_use]
    pub fn return_all_messages(mut self, enabled: bool) -> Self {
        self.return_all_messages = enabled;
        self.result = self.result.return_all_messages(enabled);
        self
    }

    /// Set a cancellation token for graceful shutdown.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Launch the child, fold its output and build the envelope.
    ///
    /// Never fails: launch and protocol problems are reported in the
    /// envelope's `error` field.
    pub async fn run(&self) -> ResultEnvelope {
        let mut supervisor = match StreamSupervisor::spawn(&self.launch, self.timings) {
            Ok(supervisor) => supervisor,
            Err(e) => {
                tracing::error!(program = %self.launch.program(), error = %e, "Failed to launch child");
                return ResultBuilder::launch_failure(&e);
            }
        };
        if let Some(ref cancel) = self.cancel {
            supervisor = supervisor.with_cancellation(cancel.clone());
        }

        let mut aggregator = EventAggregator::new(self.return_all_messages);
        while let Some(line) = supervisor.next_line().await {
            tracing::trace!(%line, "Child output");
            if let Err(e) = aggregator.push_line(&line) {
                tracing::warn!(error = %e, "Unexpected event, stopping aggregation");
                aggregator.record_unexpected(&e, &line);
                let discarded = supervisor.shutdown().await;
                tracing::debug!(discarded, "Discarded output after aggregation stopped");
                break;
            }
        }

        let stats = supervisor.stats();
        tracing::info!(
            lines = stats.lines,
            drained = stats.drained,
            forced_kill = stats.forced_kill,
            "Child run finished"
        );

        self.result.build(aggregator.finish())
    }
}
