// src/exec/sink.rs

//! Pluggable event sink abstraction.
//!
//! The supervisor talks to an `EventSink` instead of any particular UI or
//! event loop. Callbacks are synchronous and must not block: they run inside
//! the stream readers of the job.
//!
//! - [`ChannelSink`] forwards every callback as a [`JobEvent`] over an
//!   unbounded tokio channel, which is what the CLI uses.
//! - Tests can provide their own implementation that records events.

use tokio::sync::mpsc;
use tracing::trace;

use crate::exec::{JobEvent, JobOutcome, LogLine};
use crate::progress::ProgressState;
use crate::types::JobId;

/// Receiver of per-job events.
///
/// For a given job, `on_terminal` is called exactly once and nothing is
/// called for that job afterwards.
pub trait EventSink: Send + Sync {
    fn on_log(&self, job: JobId, line: &LogLine);
    fn on_progress(&self, job: JobId, state: &ProgressState);
    fn on_terminal(&self, job: JobId, outcome: &JobOutcome);
}

/// Sink that turns callbacks into [`JobEvent`]s on a channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<JobEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<JobEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: JobEvent) {
        // A dropped receiver means the host stopped listening.
        if self.tx.send(event).is_err() {
            trace!("event receiver dropped; discarding job event");
        }
    }
}

impl EventSink for ChannelSink {
    fn on_log(&self, job: JobId, line: &LogLine) {
        self.send(JobEvent::Log {
            job,
            line: line.clone(),
        });
    }

    fn on_progress(&self, job: JobId, state: &ProgressState) {
        self.send(JobEvent::Progress {
            job,
            state: state.clone(),
        });
    }

    fn on_terminal(&self, job: JobId, outcome: &JobOutcome) {
        self.send(JobEvent::Terminal {
            job,
            outcome: outcome.clone(),
        });
    }
}
