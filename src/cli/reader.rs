//! Background line reader for the child's combined output.
//!
//! The reader owns the read end of the output pipe and runs on its own OS
//! thread, so blocking reads never stall the supervisor's poll loop.

use std::io::{BufRead, BufReader, Read};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};

use crate::cli::is_turn_completed;

/// Message sent from the reader thread to the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderMessage {
    /// One output line, trailing whitespace removed.
    Line(String),
    /// The stream has ended; no more lines will follow.
    Eof,
}

/// Spawn the reader thread.
///
/// Lines go to `tx` in order, followed by exactly one [`ReaderMessage::Eof`].
/// The instant the first turn-completed line was read is sent on
/// `completion`; lines read more than `grace` after that instant are dropped
/// and reading stops.
///
/// # Errors
///
/// Returns an error if the OS refuses to create the thread.
pub fn spawn_reader<R>(
    stream: R,
    tx: mpsc::UnboundedSender<ReaderMessage>,
    completion: oneshot::Sender<Instant>,
    grace: Duration,
) -> std::io::Result<JoinHandle<()>>
where
    R: Read + Send + 'static,
{
    std::thread::Builder::new()
        .name("gemini-output-reader".to_string())
        .spawn(move || read_lines(stream, &tx, completion, grace))
}

fn read_lines<R: Read>(
    stream: R,
    tx: &mpsc::UnboundedSender<ReaderMessage>,
    completion: oneshot::Sender<Instant>,
    grace: Duration,
) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    let mut completion = Some(completion);
    let mut cutoff: Option<Instant> = None;
    let mut count: usize = 0;

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::debug!(error = %e, "Output stream read failed");
                break;
            }
        }

        if cutoff.is_some_and(|deadline| Instant::now() > deadline) {
            tracing::debug!("Discarding output received after the grace period");
            break;
        }

        let line = String::from_utf8_lossy(&buf).trim_end().to_string();
        let completed = cutoff.is_none() && is_turn_completed(&line);

        if tx.send(ReaderMessage::Line(line)).is_err() {
            tracing::debug!("Line consumer dropped, stopping reader");
            break;
        }
        count += 1;

        if completed {
            let now = Instant::now();
            cutoff = Some(now + grace);
            tracing::debug!(line = count, "Turn completion detected");
            if let Some(sender) = completion.take() {
                let _ = sender.send(now);
            }
        }
    }

    let _ = tx.send(ReaderMessage::Eof);
    drop(reader);
    tracing::debug!(lines = count, "Output reader finished");
}
