// src/exec/supervisor.rs

//! Job lifecycle entry point.
//!
//! [`Supervisor::spawn`] starts a worker, registers it under its pid and
//! hands it to a driver task ([`job_runner`](crate::exec::job_runner)).
//! [`Supervisor::cancel`] claims a running job and terminates its process
//! tree. Jobs are independent: a failure in one never touches another.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::errors::JobError;
use crate::exec::cancel::{CancelOutcome, CancellationController};
use crate::exec::command::WorkerCommand;
use crate::exec::job_runner::{JobContext, run_job};
use crate::exec::registry::{ClaimedWorker, JobRegistry};
use crate::exec::sink::EventSink;
use crate::exec::{JobOutcome, JobReport, Transcript};
use crate::fs::{FileSystem, RealFileSystem};
use crate::types::JobId;

/// Timing knobs for job supervision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorOptions {
    /// How long a cancelled worker may take to exit before it is killed.
    pub cancel_grace: Duration,
    /// How long output readers of a cancelled job may keep draining.
    pub drain_timeout: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            cancel_grace: Duration::from_secs(5),
            drain_timeout: Duration::from_secs(2),
        }
    }
}

impl SupervisorOptions {
    pub fn from_worker(worker: &WorkerConfig) -> Self {
        Self {
            cancel_grace: worker.cancel_grace,
            ..Self::default()
        }
    }
}

/// Handle to a spawned job.
#[derive(Debug)]
pub struct JobHandle {
    id: JobId,
    started_at: DateTime<Utc>,
    driver: JoinHandle<JobReport>,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Wait for the job's terminal outcome (the same value delivered to
    /// `on_terminal`).
    pub async fn wait(self) -> JobOutcome {
        self.report().await.outcome
    }

    /// Like [`wait`](Self::wait), also returning what the worker wrote to
    /// both streams.
    pub async fn report(self) -> JobReport {
        match self.driver.await {
            Ok(report) => report,
            Err(err) => {
                warn!(job = %self.id, error = %err, "job driver task failed");
                JobReport {
                    outcome: JobOutcome::Failed(JobError::Supervision {
                        message: format!("job driver task failed: {err}"),
                    }),
                    transcript: Transcript::default(),
                }
            }
        }
    }
}

pub struct Supervisor {
    registry: JobRegistry,
    sink: Arc<dyn EventSink>,
    fs: Arc<dyn FileSystem>,
    controller: CancellationController,
    options: SupervisorOptions,
}

impl Supervisor {
    pub fn new(sink: Arc<dyn EventSink>, options: SupervisorOptions) -> Self {
        Self {
            registry: JobRegistry::new(),
            sink,
            fs: Arc::new(RealFileSystem),
            controller: CancellationController::new(),
            options,
        }
    }

    /// Use a different filesystem for result resolution.
    pub fn with_filesystem(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn options(&self) -> SupervisorOptions {
        self.options
    }

    /// Start a worker and register it as a running job.
    ///
    /// A spawn failure is returned directly: there is no process, hence no
    /// job id and no events. Must be called from within a tokio runtime.
    pub fn spawn(&self, command: &WorkerCommand) -> Result<JobHandle, JobError> {
        info!(
            program = %command.program,
            args = ?command.redacted_args(),
            working_dir = ?command.working_dir,
            "starting worker process"
        );

        let child = command.to_tokio().spawn().map_err(|err| {
            let err = JobError::spawn(&command.program, &err);
            warn!(error = %err, "worker failed to start");
            err
        })?;

        let Some(pid) = child.id() else {
            return Err(JobError::Supervision {
                message: "worker exited before its pid could be read".to_string(),
            });
        };
        let id = JobId(pid);
        let started_at = Utc::now();

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let token = self.registry.register(id, started_at, cancel_tx);

        let ctx = JobContext {
            id,
            token,
            registry: self.registry.clone(),
            sink: Arc::clone(&self.sink),
            fs: Arc::clone(&self.fs),
            base_dir: command.working_dir.clone(),
            cancel_grace: self.options.cancel_grace,
            drain_timeout: self.options.drain_timeout,
        };
        let driver = tokio::spawn(run_job(ctx, child, cancel_rx));

        info!(job = %id, "worker started");
        Ok(JobHandle {
            id,
            started_at,
            driver,
        })
    }

    /// Request cancellation of a running job.
    ///
    /// Returns [`CancelOutcome::NotRegistered`] for an unknown id or a job
    /// that already reached a terminal state; nothing is emitted then.
    pub async fn cancel(&self, id: JobId) -> CancelOutcome {
        let Some(worker) = self.registry.cancel(id) else {
            debug!(job = %id, "cancel requested for a job that is not running");
            return CancelOutcome::NotRegistered;
        };

        let terminated = match worker {
            ClaimedWorker::Running => {
                info!(job = %id, "cancelling job");
                self.controller.terminate(id.0).await
            }
            ClaimedWorker::Exited => {
                // The pid itself may have been reused; only the worker's
                // process group can still be addressed safely.
                info!(job = %id, "cancelling job whose worker already exited");
                self.controller.terminate_leftovers(id.0).await
            }
        };
        if let Err(err) = terminated {
            warn!(job = %id, error = %err, "failed to signal worker process tree");
        }
        CancelOutcome::Cancelled
    }

    pub fn is_running(&self, id: JobId) -> bool {
        self.registry.contains(id)
    }

    pub fn running_jobs(&self) -> Vec<JobId> {
        self.registry.ids()
    }
}
