//! Streaming supervision of a child process's output.
//!
//! [`StreamSupervisor`] launches the child with stdout and stderr sharing a
//! single pipe, hands the read end to a background reader thread, and yields
//! lines to the caller while independently watching for process exit. Every
//! exit path (end of stream, detected completion, external death,
//! cancellation) converges on the same terminate, wait, kill-if-needed, join
//! and drain sequence.

use std::collections::VecDeque;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::cli::{
    spawn_reader, LaunchSpec, ReaderMessage, SpawnError, SupervisorState, SupervisorStateMachine,
    SupervisorStats,
};

/// How long a single queue poll waits before checking process liveness.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Delay between detecting completion and signalling the child.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(300);

/// How long to wait for the child to exit before killing it.
pub const DEFAULT_TERMINATE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to wait for the reader thread before detaching it.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Timing knobs for a supervised run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamTimings {
    pub poll_interval: Duration,
    pub grace_period: Duration,
    pub terminate_timeout: Duration,
    pub join_timeout: Duration,
}

impl Default for StreamTimings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            grace_period: DEFAULT_GRACE_PERIOD,
            terminate_timeout: DEFAULT_TERMINATE_TIMEOUT,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
        }
    }
}

/// Outcome of one poll-loop step.
enum Step {
    Stop(SupervisorState),
    Completion(Option<Instant>),
    Message(Option<ReaderMessage>),
    Idle,
}

/// Supervisor for a single child process and its output stream.
#[derive(Debug)]
pub struct StreamSupervisor {
    child: Child,
    line_rx: mpsc::UnboundedReceiver<ReaderMessage>,
    completion_rx: Option<oneshot::Receiver<Instant>>,
    terminate_at: Option<tokio::time::Instant>,
    reader: Option<JoinHandle<()>>,
    pending: VecDeque<String>,
    timings: StreamTimings,
    cancel: Option<CancellationToken>,
    state: SupervisorStateMachine,
}

impl StreamSupervisor {
    /// Launch the child described by `launch` and start reading its output.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError` if the output pipe, the child or the reader
    /// thread cannot be created.
    pub fn spawn(launch: &LaunchSpec, timings: StreamTimings) -> Result<Self, SpawnError> {
        let (pipe_reader, pipe_writer) = std::io::pipe()?;
        let stderr_writer = pipe_writer.try_clone()?;

        let mut cmd = launch.command();
        cmd.stdout(pipe_writer).stderr(stderr_writer);

        tracing::debug!(
            command = %launch.command_line(),
            cwd = ?launch.get_working_dir(),
            "Spawning child process"
        );
        let spawned = cmd.spawn();
        // The command holds our copies of the write end; EOF only arrives
        // once every copy is closed.
        drop(cmd);
        let child = spawned.map_err(|e| SpawnError::from_io(launch.program(), e))?;

        let (line_tx, line_rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = oneshot::channel();
        let reader = spawn_reader(pipe_reader, line_tx, completion_tx, timings.grace_period)?;

        tracing::info!(pid = ?child.id(), "Child process started");

        Ok(Self {
            child,
            line_rx,
            completion_rx: Some(completion_rx),
            terminate_at: None,
            reader: Some(reader),
            pending: VecDeque::new(),
            timings,
            cancel: None,
            state: SupervisorStateMachine::new(),
        })
    }

    /// Set a cancellation token; cancelling it terminates the child.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SupervisorState {
        self.state.state()
    }

    /// Counters for this run.
    #[must_use]
    pub fn stats(&self) -> SupervisorStats {
        self.state.stats()
    }

    /// Yield the next output line, or `None` once the run is closed.
    ///
    /// After the main loop stops, the shutdown sequence runs inside this call
    /// and any lines still queued are yielded before `None`.
    pub async fn next_line(&mut self) -> Option<String> {
        loop {
            match self.state.state() {
                SupervisorState::Launched => self.state.transition(SupervisorState::Streaming),
                SupervisorState::Streaming => {
                    if let Some(line) = self.poll_line().await {
                        self.state.record_line();
                        return Some(line);
                    }
                }
                SupervisorState::CompletionDetected
                | SupervisorState::ProcessExitedExternally
                | SupervisorState::StreamEnded
                | SupervisorState::Cancelled => {
                    self.state.transition(SupervisorState::Terminating);
                }
                SupervisorState::Terminating => {
                    self.shut_down().await;
                    self.state.transition(SupervisorState::Drained);
                }
                SupervisorState::Drained => {
                    if let Some(line) = self.pending.pop_front() {
                        return Some(line);
                    }
                    self.state.transition(SupervisorState::Closed);
                }
                SupervisorState::Closed => return None,
            }
        }
    }

    /// Stop early: terminate the child and run the shutdown sequence.
    ///
    /// Returns the number of queued lines that were discarded.
    pub async fn shutdown(&mut self) -> usize {
        if !self.state.state().is_stopping() {
            self.request_terminate();
            self.state.transition(SupervisorState::Cancelled);
        }

        let mut discarded = 0;
        while self.next_line().await.is_some() {
            discarded += 1;
        }
        discarded
    }

    /// Turn the supervisor into a lazy stream of lines.
    pub fn into_stream(self) -> impl futures_core::Stream<Item = String> {
        futures_util::stream::unfold(self, |mut supervisor| async move {
            supervisor.next_line().await.map(|line| (line, supervisor))
        })
    }

    /// Wait for the next line while in the streaming state.
    ///
    /// Returns `None` after moving to a stopping state.
    async fn poll_line(&mut self) -> Option<String> {
        loop {
            let step = tokio::select! {
                biased;

                () = wait_until(self.terminate_at) => Step::Stop(SupervisorState::CompletionDetected),
                () = wait_cancelled(self.cancel.as_ref()) => Step::Stop(SupervisorState::Cancelled),
                at = wait_completion(&mut self.completion_rx) => Step::Completion(at),
                msg = tokio::time::timeout(self.timings.poll_interval, self.line_rx.recv()) => {
                    msg.map_or(Step::Idle, Step::Message)
                }
            };

            match step {
                Step::Stop(reason) => {
                    tracing::info!(?reason, "Stopping child process");
                    self.request_terminate();
                    self.state.transition(reason);
                    return None;
                }
                Step::Completion(at) => {
                    self.completion_rx = None;
                    if let Some(at) = at {
                        let deadline =
                            tokio::time::Instant::from_std(at) + self.timings.grace_period;
                        self.terminate_at = Some(deadline);
                        tracing::debug!(
                            grace_ms = self.timings.grace_period.as_millis(),
                            "Turn completed, termination scheduled"
                        );
                    }
                }
                Step::Message(Some(ReaderMessage::Line(line))) => return Some(line),
                Step::Message(Some(ReaderMessage::Eof) | None) => {
                    if self.terminate_at.is_some() {
                        self.request_terminate();
                    }
                    self.state.transition(SupervisorState::StreamEnded);
                    return None;
                }
                Step::Idle => {
                    // Only reached when the reader ends without its end
                    // marker (it panicked). Both checks are needed: the child
                    // can exit while the reader is still flushing, and the
                    // reader can finish while the child lingers.
                    let exited = self.process_exited();
                    let reader_done = self.reader_finished();
                    if exited && reader_done {
                        self.state
                            .transition(SupervisorState::ProcessExitedExternally);
                        return None;
                    }
                }
            }
        }
    }

    fn process_exited(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(status) => status.is_some(),
            Err(e) => {
                tracing::debug!(error = %e, "Failed to query child status");
                true
            }
        }
    }

    fn reader_finished(&self) -> bool {
        self.reader.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Ask the child to exit without waiting for it.
    ///
    /// On Unix this sends SIGTERM; elsewhere it falls back to a kill.
    fn request_terminate(&mut self) {
        let Some(pid) = self.child.id() else {
            return;
        };

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let nix_pid = Pid::from_raw(i32::try_from(pid).unwrap_or(i32::MAX));
            if let Err(e) = kill(nix_pid, Signal::SIGTERM) {
                tracing::debug!(pid, error = %e, "Failed to send SIGTERM");
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = self.child.start_kill() {
                tracing::debug!(pid, error = %e, "Failed to kill child process");
            }
        }
    }

    /// Wait, kill if needed, join the reader and drain the queue.
    async fn shut_down(&mut self) {
        let timeout = self.timings.terminate_timeout;
        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(status)) => tracing::debug!(?status, "Child process exited"),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Failed to wait for child process, killing");
                self.force_kill().await;
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = timeout.as_millis(),
                    "Child process did not exit in time, killing"
                );
                self.force_kill().await;
            }
        }

        self.join_reader().await;

        let mut drained = 0;
        while let Ok(msg) = self.line_rx.try_recv() {
            if let ReaderMessage::Line(line) = msg {
                self.pending.push_back(line);
                drained += 1;
            }
        }
        if drained > 0 {
            tracing::debug!(lines = drained, "Drained queued output after shutdown");
        }
        self.state.record_drained(drained);
    }

    async fn force_kill(&mut self) {
        self.state.record_forced_kill();
        if let Err(e) = self.child.kill().await {
            tracing::warn!(error = %e, "Failed to kill child process");
        }
    }

    async fn join_reader(&mut self) {
        let Some(handle) = self.reader.take() else {
            return;
        };

        let deadline = tokio::time::Instant::now() + self.timings.join_timeout;
        while !handle.is_finished() {
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!("Output reader did not finish in time, detaching it");
                return;
            }
            tokio::time::sleep(JOIN_POLL_INTERVAL).await;
        }

        if handle.join().is_err() {
            tracing::warn!("Output reader thread panicked");
        }
    }
}

/// Launch a child and stream its output lines.
///
/// # Errors
///
/// Returns `SpawnError` if the child cannot be started.
pub fn run_and_stream(
    launch: &LaunchSpec,
    timings: StreamTimings,
) -> Result<impl futures_core::Stream<Item = String>, SpawnError> {
    Ok(StreamSupervisor::spawn(launch, timings)?.into_stream())
}

async fn wait_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn wait_cancelled(cancel: Option<&CancellationToken>) {
    match cancel {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

async fn wait_completion(rx: &mut Option<oneshot::Receiver<Instant>>) -> Option<Instant> {
    match rx {
        Some(rx) => rx.await.ok(),
        None => std::future::pending().await,
    }
}
