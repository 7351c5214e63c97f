#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use workerwatch::exec::{Supervisor, SupervisorOptions};
use workerwatch_test_utils::RecordingSink;

pub fn supervisor(sink: &RecordingSink) -> Supervisor {
    supervisor_with(sink, SupervisorOptions::default())
}

pub fn supervisor_with(sink: &RecordingSink, options: SupervisorOptions) -> Supervisor {
    Supervisor::new(Arc::new(sink.clone()), options)
}

/// Whether `pid` names a live (non-zombie) process.
#[cfg(target_os = "linux")]
pub fn process_alive(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        // The state follows the parenthesised command name.
        Ok(stat) => stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.trim_start().chars().next())
            .is_some_and(|state| state != 'Z' && state != 'X'),
        Err(_) => false,
    }
}

/// Poll until `pid` is gone or `limit` elapses.
#[cfg(target_os = "linux")]
pub async fn wait_until_dead(pid: u32, limit: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if !process_alive(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    !process_alive(pid)
}
