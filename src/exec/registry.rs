// src/exec/registry.rs

//! Registry of in-flight jobs.
//!
//! The only state shared between the job drivers and the cancellation entry
//! point. A single mutex is enough given the low number of concurrent jobs;
//! it is never held across an `.await`.
//!
//! Removing an entry is how the Running -> terminal transition is claimed:
//! the driver removes it when the worker exits, `cancel` removes it when a
//! cancellation is requested. Whoever removes it decides the outcome, so the
//! transition happens exactly once.
//!
//! An entry outlives its worker process while the driver drains output, so
//! entries also record whether the worker has been reaped: its pid may
//! belong to someone else by then.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tracing::warn;

use crate::types::JobId;

/// Registry record for one running job.
#[derive(Debug)]
struct JobEntry {
    started_at: DateTime<Utc>,
    /// Distinguishes entries that share a pid after a collision.
    token: u64,
    /// Fired by `cancel` to tell the driver its job was cancelled.
    cancel_tx: oneshot::Sender<()>,
    /// Set once the driver has reaped the worker.
    exited: bool,
}

/// State of the worker process of a job claimed by [`JobRegistry::cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ClaimedWorker {
    Running,
    /// Reaped, but the job was still draining output.
    Exited,
}

#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<Mutex<HashMap<JobId, JobEntry>>>,
    next_token: Arc<AtomicU64>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, JobEntry>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a job and return its token.
    ///
    /// If the id is already registered the new job replaces the old one
    /// (last registered wins). The old job can then no longer be cancelled
    /// through the registry.
    pub(crate) fn register(
        &self,
        id: JobId,
        started_at: DateTime<Utc>,
        cancel_tx: oneshot::Sender<()>,
    ) -> u64 {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let previous = self.lock().insert(
            id,
            JobEntry {
                started_at,
                token,
                cancel_tx,
                exited: false,
            },
        );
        if previous.is_some() {
            warn!(job = %id, "job id collision; replacing previously registered job");
        }
        token
    }

    /// Driver-side removal. Returns `false` if the entry was already taken
    /// (by `cancel`) or replaced by a newer job with the same id.
    pub(crate) fn deregister(&self, id: JobId, token: u64) -> bool {
        let mut jobs = self.lock();
        match jobs.get(&id) {
            Some(entry) if entry.token == token => {
                jobs.remove(&id);
                true
            }
            _ => false,
        }
    }

    /// Record that the worker of this job has been reaped.
    pub(crate) fn mark_exited(&self, id: JobId, token: u64) {
        if let Some(entry) = self.lock().get_mut(&id).filter(|e| e.token == token) {
            entry.exited = true;
        }
    }

    /// Cancel-side removal. Removes the entry and fires its cancel signal
    /// under the same lock, so a driver whose `deregister` fails can tell a
    /// cancellation apart from a replacement by checking its receiver.
    ///
    /// Returns `None` if the job is not (or no longer) registered.
    pub(crate) fn cancel(&self, id: JobId) -> Option<ClaimedWorker> {
        let entry = self.lock().remove(&id)?;
        // The driver may have already stopped listening; the entry being
        // gone is what matters.
        let _ = entry.cancel_tx.send(());
        Some(if entry.exited {
            ClaimedWorker::Exited
        } else {
            ClaimedWorker::Running
        })
    }

    pub fn contains(&self, id: JobId) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn started_at(&self, id: JobId) -> Option<DateTime<Utc>> {
        self.lock().get(&id).map(|entry| entry.started_at)
    }

    pub fn ids(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self.lock().keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
