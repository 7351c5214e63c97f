// src/exec/job_runner.rs

//! Driver for a single worker process.
//!
//! Each job gets one driver task and two reader tasks (stdout, stderr), each
//! reader with its own [`OutputLineParser`]. The driver waits for either the
//! worker to exit or a cancellation signal, and emits exactly one terminal
//! event, after both readers have stopped producing events.
//!
//! A worker that exits may leave subprocesses behind that still hold its
//! output pipes. Draining is therefore raced against cancellation as well.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::JobError;
use crate::exec::registry::JobRegistry;
use crate::exec::sink::EventSink;
use crate::exec::{JobOutcome, JobReport, LogLine, Transcript};
use crate::fs::FileSystem;
use crate::progress::{self, ProgressState};
use crate::protocol::{ClassifiedLine, OutputLineParser};
use crate::resolve;
use crate::types::{DiagnosticLevel, JobId, OutputStream};

const READ_CHUNK: usize = 8 * 1024;

/// Everything a driver needs besides the child process itself.
pub(crate) struct JobContext {
    pub(crate) id: JobId,
    pub(crate) token: u64,
    pub(crate) registry: JobRegistry,
    pub(crate) sink: Arc<dyn EventSink>,
    pub(crate) fs: Arc<dyn FileSystem>,
    /// Relative result paths are resolved against this.
    pub(crate) base_dir: Option<PathBuf>,
    pub(crate) cancel_grace: Duration,
    pub(crate) drain_timeout: Duration,
}

/// Drive `child` to a terminal outcome and report it.
pub(crate) async fn run_job(
    ctx: JobContext,
    mut child: Child,
    cancel_rx: oneshot::Receiver<()>,
) -> JobReport {
    let id = ctx.id;
    let mut cancel = CancelSignal::new(cancel_rx);
    let mut readers = Readers {
        stdout: child
            .stdout
            .take()
            .map(|out| tokio::spawn(pump(out, OutputStream::Stdout, id, Arc::clone(&ctx.sink)))),
        stderr: child
            .stderr
            .take()
            .map(|err| tokio::spawn(pump(err, OutputStream::Stderr, id, Arc::clone(&ctx.sink)))),
    };

    let exited = tokio::select! {
        status = child.wait() => Some(status),
        () = cancel.requested() => None,
    };

    let (outcome, transcript) = match exited {
        Some(status) => {
            // The pid is free for reuse from here on.
            ctx.registry.mark_exited(id, ctx.token);

            // Like a process 'close': the exit is only handled once both
            // streams have been read to the end.
            let drained = tokio::select! {
                transcript = readers.join() => Some(transcript),
                () = cancel.requested() => None,
            };
            match drained {
                Some(transcript) => {
                    let outcome = settle(&ctx, status, &transcript, &mut cancel);
                    (outcome, transcript)
                }
                None => {
                    info!(job = %id, "job cancelled while draining output of exited worker");
                    (JobOutcome::Cancelled, readers.finish(ctx.drain_timeout).await)
                }
            }
        }
        None => {
            info!(job = %id, grace = ?ctx.cancel_grace, "job cancelled; waiting for worker to exit");
            match tokio::time::timeout(ctx.cancel_grace, child.wait()).await {
                Ok(Ok(status)) => debug!(job = %id, ?status, "cancelled worker exited"),
                Ok(Err(err)) => warn!(job = %id, error = %err, "waiting for cancelled worker failed"),
                Err(_) => {
                    warn!(job = %id, "worker ignored termination request; killing it");
                    if let Err(err) = child.kill().await {
                        warn!(job = %id, error = %err, "failed to kill worker");
                    }
                }
            }
            (JobOutcome::Cancelled, readers.finish(ctx.drain_timeout).await)
        }
    };

    info!(job = %id, status = ?outcome.status(), "job reached terminal state");
    ctx.sink.on_terminal(id, &outcome);
    JobReport {
        outcome,
        transcript,
    }
}

/// Decide the outcome of a worker that exited on its own.
fn settle(
    ctx: &JobContext,
    status: io::Result<ExitStatus>,
    transcript: &Transcript,
    cancel: &mut CancelSignal,
) -> JobOutcome {
    let id = ctx.id;
    let natural = match status {
        Ok(status) if status.success() => {
            info!(job = %id, "worker exited successfully; resolving result");
            let stdout = transcript.stdout_text();
            match resolve::resolve(&stdout, ctx.base_dir.as_deref(), ctx.fs.as_ref()) {
                Ok(result) => JobOutcome::Succeeded(result),
                Err(err) => JobOutcome::Failed(err),
            }
        }
        Ok(status) => {
            // Death by signal has no exit code.
            let code = status.code().unwrap_or(-1);
            info!(job = %id, exit_code = code, "worker exited with failure");
            JobOutcome::Failed(JobError::WorkerNonZeroExit { code })
        }
        Err(err) => {
            warn!(job = %id, error = %err, "waiting for worker failed");
            JobOutcome::Failed(JobError::Supervision {
                message: format!("waiting for worker: {err}"),
            })
        }
    };

    if ctx.registry.deregister(id, ctx.token) {
        natural
    } else if cancel.fired() {
        debug!(job = %id, "cancel claimed the job while it was exiting");
        JobOutcome::Cancelled
    } else {
        // Entry replaced by a newer job with the same id.
        natural
    }
}

/// Driver end of the registry's cancel channel.
struct CancelSignal(Option<oneshot::Receiver<()>>);

impl CancelSignal {
    fn new(rx: oneshot::Receiver<()>) -> Self {
        Self(Some(rx))
    }

    /// Resolves once `cancel` has fired. A dropped sender never resolves: it
    /// means the registry entry was replaced, not that the job was cancelled.
    /// Safe to call again after a previous call was dropped or resolved.
    async fn requested(&mut self) {
        if let Some(rx) = self.0.as_mut() {
            let fired = rx.await.is_ok();
            self.0 = None;
            if fired {
                return;
            }
        }
        std::future::pending::<()>().await
    }

    /// Whether `cancel` fired without anyone having awaited it.
    fn fired(&mut self) -> bool {
        let Some(rx) = self.0.as_mut() else {
            return false;
        };
        match rx.try_recv() {
            Err(TryRecvError::Empty) => false,
            result => {
                // The receiver must not be polled once it has yielded.
                self.0 = None;
                result.is_ok()
            }
        }
    }
}

/// The two reader tasks of a job. A slot is emptied once its reader has
/// been joined, so a join interrupted by a cancel can be resumed or aborted.
struct Readers {
    stdout: Option<JoinHandle<Vec<u8>>>,
    stderr: Option<JoinHandle<Vec<u8>>>,
}

impl Readers {
    /// Wait for both readers without limit.
    async fn join(&mut self) -> Transcript {
        let (stdout, stderr) = tokio::join!(
            join_reader(&mut self.stdout),
            join_reader(&mut self.stderr)
        );
        Transcript { stdout, stderr }
    }

    /// Wait at most `limit` for both readers. Readers still running then are
    /// aborted, so they cannot emit events after the terminal one.
    async fn finish(mut self, limit: Duration) -> Transcript {
        match tokio::time::timeout(limit, self.join()).await {
            Ok(transcript) => transcript,
            Err(_) => {
                debug!("output readers did not finish in time; aborting them");
                for reader in [self.stdout.take(), self.stderr.take()].into_iter().flatten() {
                    reader.abort();
                    let _ = reader.await;
                }
                Transcript::default()
            }
        }
    }
}

async fn join_reader(slot: &mut Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    let Some(reader) = slot.as_mut() else {
        return Vec::new();
    };
    let joined = reader.await;
    *slot = None;
    joined.unwrap_or_else(|err| {
        warn!(error = %err, "output reader task failed");
        Vec::new()
    })
}

/// Read one stream to the end, routing each classified line to the sink.
/// Returns the raw bytes read.
async fn pump<R>(mut stream: R, which: OutputStream, id: JobId, sink: Arc<dyn EventSink>) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let mut parser = OutputLineParser::new();
    let mut router = LineRouter::new(which, id, sink);
    let mut transcript = Vec::new();
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                transcript.extend_from_slice(&buf[..n]);
                for line in parser.feed(&buf[..n]) {
                    router.route(line);
                }
            }
            Err(err) => {
                warn!(job = %id, stream = %which, error = %err, "reading worker output failed");
                break;
            }
        }
    }

    if let Some(line) = parser.finish() {
        router.route(line);
    }
    transcript
}

/// Per-stream routing of classified lines into sink callbacks.
///
/// Only stdout carries progress; markers on stderr are logged like any other
/// stderr line.
struct LineRouter {
    stream: OutputStream,
    id: JobId,
    sink: Arc<dyn EventSink>,
    progress: ProgressState,
}

impl LineRouter {
    fn new(stream: OutputStream, id: JobId, sink: Arc<dyn EventSink>) -> Self {
        Self {
            stream,
            id,
            sink,
            progress: ProgressState::default(),
        }
    }

    fn route(&mut self, line: ClassifiedLine) {
        match self.stream {
            OutputStream::Stdout => self.route_stdout(line),
            OutputStream::Stderr => self.route_stderr(line),
        }
    }

    fn route_stdout(&mut self, line: ClassifiedLine) {
        match line {
            ClassifiedLine::Progress { marker } if marker.phase.is_known() => {
                let next = progress::apply(&self.progress, &marker);
                if next != self.progress {
                    self.progress = next;
                    self.sink.on_progress(self.id, &self.progress);
                }
            }
            ClassifiedLine::Progress { marker } => {
                debug!(job = %self.id, phase = %marker.phase, "unknown progress phase");
                self.log(Some(DiagnosticLevel::Debug), marker.to_string());
            }
            ClassifiedLine::Diagnostic { level, text } => self.log(Some(level), text),
            // Result markers are acted on only after a clean exit.
            line @ ClassifiedLine::ResultMarker { .. } => self.log(None, line.raw_text()),
            ClassifiedLine::PlainText { text } => self.log(None, text),
        }
    }

    fn route_stderr(&mut self, line: ClassifiedLine) {
        match line {
            ClassifiedLine::Diagnostic { level, text } => self.log(Some(level), text),
            other => self.log(Some(DiagnosticLevel::Error), other.raw_text()),
        }
    }

    fn log(&self, level: Option<DiagnosticLevel>, text: String) {
        let line = LogLine {
            stream: self.stream,
            level,
            text,
        };
        self.sink.on_log(self.id, &line);
    }
}
