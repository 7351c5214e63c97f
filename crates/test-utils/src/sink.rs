//! Event sink that records everything it receives.

use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use workerwatch::exec::{EventSink, JobEvent, JobOutcome, LogLine};
use workerwatch::progress::ProgressState;
use workerwatch::types::JobId;

/// Records every event in arrival order. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<JobEvent>>>,
    changed: Arc<Notify>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: JobEvent) {
        self.events.lock().unwrap().push(event);
        self.changed.notify_waiters();
    }

    pub fn events(&self) -> Vec<JobEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn events_for(&self, job: JobId) -> Vec<JobEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.job() == job)
            .collect()
    }

    pub fn logs_for(&self, job: JobId) -> Vec<LogLine> {
        self.events_for(job)
            .into_iter()
            .filter_map(|e| match e {
                JobEvent::Log { line, .. } => Some(line),
                _ => None,
            })
            .collect()
    }

    pub fn progress_for(&self, job: JobId) -> Vec<ProgressState> {
        self.events_for(job)
            .into_iter()
            .filter_map(|e| match e {
                JobEvent::Progress { state, .. } => Some(state),
                _ => None,
            })
            .collect()
    }

    pub fn terminals_for(&self, job: JobId) -> Vec<JobOutcome> {
        self.events_for(job)
            .into_iter()
            .filter_map(|e| match e {
                JobEvent::Terminal { outcome, .. } => Some(outcome),
                _ => None,
            })
            .collect()
    }

    /// Wait until some recorded event for `job` satisfies `pred`.
    pub async fn wait_until<F>(&self, job: JobId, pred: F)
    where
        F: Fn(&JobEvent) -> bool,
    {
        loop {
            let changed = self.changed.notified();
            if self.events_for(job).iter().any(&pred) {
                return;
            }
            changed.await;
        }
    }

    /// Wait until a log line for `job` contains `needle`.
    pub async fn wait_for_log(&self, job: JobId, needle: &str) {
        self.wait_until(job, |e| {
            matches!(e, JobEvent::Log { line, .. } if line.text.contains(needle))
        })
        .await;
    }

    /// Wait for the terminal event of `job` and return its outcome.
    pub async fn wait_for_terminal(&self, job: JobId) -> JobOutcome {
        self.wait_until(job, JobEvent::is_terminal).await;
        self.terminals_for(job)
            .into_iter()
            .next()
            .expect("terminal event recorded")
    }
}

impl EventSink for RecordingSink {
    fn on_log(&self, job: JobId, line: &LogLine) {
        self.push(JobEvent::Log {
            job,
            line: line.clone(),
        });
    }

    fn on_progress(&self, job: JobId, state: &ProgressState) {
        self.push(JobEvent::Progress {
            job,
            state: state.clone(),
        });
    }

    fn on_terminal(&self, job: JobId, outcome: &JobOutcome) {
        self.push(JobEvent::Terminal {
            job,
            outcome: outcome.clone(),
        });
    }
}
