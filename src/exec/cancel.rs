// src/exec/cancel.rs

//! Process-tree termination.
//!
//! The worker is expected to start subprocesses of its own, so terminating
//! only the direct child is not enough:
//!
//! - Windows has no POSIX process groups; `taskkill /t` kills the tree by id.
//! - Elsewhere workers lead their own process group. The process hierarchy
//!   is snapshotted first (children are re-parented once their parent dies),
//!   then the worker gets `SIGTERM`, then its group and every descendant get
//!   a best-effort `SIGTERM`. The snapshot catches descendants that moved to
//!   another group. Failing to signal them is logged only; the worker's own
//!   termination is what counts.
//!
//! Once the worker has been reaped its pid may be reused, so only its group
//! is signalled. The id of a group cannot be handed out again while the
//! group still has members.

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info};

/// Result of a `terminate` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminateOutcome {
    Terminated,
    /// The process had already exited.
    AlreadyGone,
}

/// Result of `Supervisor::cancel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    /// The job was running; its terminal event will report `Cancelled`.
    Cancelled,
    /// Unknown id, or the job already reached a terminal state. No-op.
    NotRegistered,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CancellationController;

impl CancellationController {
    pub fn new() -> Self {
        Self
    }

    /// Terminate the process `pid` and its descendants.
    pub async fn terminate(&self, pid: u32) -> Result<TerminateOutcome> {
        let outcome = platform::terminate_tree(pid).await?;
        info!(pid, ?outcome, "process tree termination requested");
        Ok(outcome)
    }

    /// Terminate whatever is left of the process group led by `pid`, whose
    /// leader has already exited and been reaped.
    pub async fn terminate_leftovers(&self, pid: u32) -> Result<TerminateOutcome> {
        let outcome = platform::terminate_group(pid)?;
        info!(pid, ?outcome, "leftover process group termination requested");
        Ok(outcome)
    }
}

#[cfg(unix)]
mod platform {
    use std::collections::{HashMap, HashSet};
    use std::io;

    use anyhow::{Context, Result};
    use sysinfo::{Pid, ProcessesToUpdate, System};

    use super::{TerminateOutcome, debug};

    pub(super) async fn terminate_tree(pid: u32) -> Result<TerminateOutcome> {
        // Scanning the process table reads /proc; keep it off the runtime threads.
        let descendants = tokio::task::spawn_blocking(move || descendants_of(pid))
            .await
            .context("joining process scan")?;

        let outcome = match signal(pid, libc::SIGTERM) {
            Ok(()) => TerminateOutcome::Terminated,
            Err(e) if e.raw_os_error() == Some(libc::ESRCH) => TerminateOutcome::AlreadyGone,
            Err(e) => return Err(e).with_context(|| format!("sending SIGTERM to {pid}")),
        };

        // Not a group leader unless spawned as a worker; ESRCH then.
        if let Err(e) = signal_group(pid, libc::SIGTERM) {
            debug!(pgid = pid, error = %e, "could not signal process group");
        }

        for child in descendants {
            if let Err(e) = signal(child, libc::SIGTERM) {
                debug!(pid = child, root = pid, error = %e, "could not signal descendant");
            }
        }

        Ok(outcome)
    }

    pub(super) fn terminate_group(pgid: u32) -> Result<TerminateOutcome> {
        match signal_group(pgid, libc::SIGTERM) {
            Ok(()) => Ok(TerminateOutcome::Terminated),
            Err(e) if e.raw_os_error() == Some(libc::ESRCH) => Ok(TerminateOutcome::AlreadyGone),
            Err(e) => Err(e).with_context(|| format!("sending SIGTERM to process group {pgid}")),
        }
    }

    fn signal(pid: u32, sig: libc::c_int) -> io::Result<()> {
        let pid = checked_pid(pid)?;
        // SAFETY: kill(2) with a positive pid signals exactly that process.
        let rc = unsafe { libc::kill(pid, sig) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    fn signal_group(pgid: u32, sig: libc::c_int) -> io::Result<()> {
        let pgid = checked_pid(pgid)?;
        // SAFETY: kill(2) with a negative pid signals every member of that group.
        let rc = unsafe { libc::kill(-pgid, sig) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    fn checked_pid(pid: u32) -> io::Result<libc::pid_t> {
        libc::pid_t::try_from(pid)
            .ok()
            .filter(|p| *p > 1)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid pid"))
    }

    /// All transitive children of `root`, excluding `root` itself.
    fn descendants_of(root: u32) -> Vec<u32> {
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::All, true);

        let mut children: HashMap<Pid, Vec<Pid>> = HashMap::new();
        for (pid, process) in system.processes() {
            if let Some(parent) = process.parent() {
                children.entry(parent).or_default().push(*pid);
            }
        }

        let root = Pid::from_u32(root);
        let mut stack = vec![root];
        let mut seen: HashSet<Pid> = HashSet::new();
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            if let Some(kids) = children.get(&current) {
                stack.extend(kids.iter().filter(|k| !seen.contains(k)).copied());
            }
        }

        seen.remove(&root);
        seen.into_iter().map(|pid| pid.as_u32()).collect()
    }
}

#[cfg(windows)]
mod platform {
    use std::process::Stdio;

    use anyhow::{Context, Result};
    use tokio::process::Command;

    use super::{TerminateOutcome, debug};

    pub(super) async fn terminate_tree(pid: u32) -> Result<TerminateOutcome> {
        let status = Command::new("taskkill")
            .args(["/pid", &pid.to_string(), "/f", "/t"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .context("running taskkill")?;

        if status.success() {
            Ok(TerminateOutcome::Terminated)
        } else {
            debug!(pid, code = ?status.code(), "taskkill reported failure; treating process as gone");
            Ok(TerminateOutcome::AlreadyGone)
        }
    }

    /// `taskkill /t` walks parent links, which are gone with the worker.
    pub(super) fn terminate_group(pid: u32) -> Result<TerminateOutcome> {
        debug!(pid, "worker already exited; no process tree left to address");
        Ok(TerminateOutcome::AlreadyGone)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Stdio;
    use std::time::Duration;
    use tokio::process::Command;

    #[tokio::test]
    async fn terminates_running_process() {
        let mut child = Command::new("sleep")
            .arg("30")
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let pid = child.id().unwrap();

        let outcome = CancellationController::new().terminate(pid).await.unwrap();
        assert_eq!(outcome, TerminateOutcome::Terminated);

        let status = tokio::time::timeout(Duration::from_secs(5), child.wait())
            .await
            .expect("process should exit after SIGTERM")
            .unwrap();
        assert!(!status.success());
    }

    #[cfg(target_os = "linux")]
    fn alive(pid: u32) -> bool {
        std::fs::read_to_string(format!("/proc/{pid}/stat"))
            .ok()
            .and_then(|stat| {
                let (_, rest) = stat.rsplit_once(')')?;
                rest.trim_start().chars().next()
            })
            .is_some_and(|state| state != 'Z' && state != 'X')
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn leftovers_of_a_reaped_leader_are_terminated() {
        let leader = Command::new("sh")
            .args(["-c", "sleep 30 >/dev/null 2>&1 & echo $!"])
            .stdout(Stdio::piped())
            .process_group(0)
            .spawn()
            .unwrap();
        let pgid = leader.id().unwrap();
        let out = leader.wait_with_output().await.unwrap();
        let orphan: u32 = String::from_utf8_lossy(&out.stdout).trim().parse().unwrap();
        assert!(alive(orphan));

        let outcome = CancellationController::new()
            .terminate_leftovers(pgid)
            .await
            .unwrap();
        assert_eq!(outcome, TerminateOutcome::Terminated);

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while alive(orphan) {
            assert!(std::time::Instant::now() < deadline, "orphan {orphan} survived");
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    #[tokio::test]
    async fn empty_group_is_already_gone() {
        let mut child = Command::new("true").process_group(0).spawn().unwrap();
        let pid = child.id().unwrap();
        child.wait().await.unwrap();

        let outcome = CancellationController::new()
            .terminate_leftovers(pid)
            .await
            .unwrap();
        assert_eq!(outcome, TerminateOutcome::AlreadyGone);
    }

    #[tokio::test]
    async fn reaped_process_is_already_gone() {
        let mut child = Command::new("true").spawn().unwrap();
        let pid = child.id().unwrap();
        child.wait().await.unwrap();

        let outcome = CancellationController::new().terminate(pid).await.unwrap();
        assert_eq!(outcome, TerminateOutcome::AlreadyGone);
    }
}
