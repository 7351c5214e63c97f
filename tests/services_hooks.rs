#![cfg(unix)]

use std::time::Duration;

use workerwatch::services::spawn_cleanup_detached;
use workerwatch_test_utils::ScriptWorker;
use workerwatch_test_utils::builders::ConfigFileBuilder;

#[test]
fn cleanup_hook_runs_detached_with_output_dir_substituted() {
    let worker = ScriptWorker::new("exit 0");
    let cfg = ConfigFileBuilder::new("/bin/sh", worker.script())
        .with_output_dir("out")
        .with_cleanup(&["-c", "mkdir -p '{output_dir}' && touch '{output_dir}/cleaned'"])
        .build_in(worker.dir());

    let pid = spawn_cleanup_detached(&cfg);
    assert!(pid.is_some());

    let marker = worker.dir().join("out/cleaned");
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while !marker.exists() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
    assert!(marker.exists(), "cleanup hook did not run");
}

#[test]
fn no_hook_configured_starts_nothing() {
    let worker = ScriptWorker::new("exit 0");
    let cfg = ConfigFileBuilder::new("/bin/sh", worker.script()).build_in(worker.dir());
    assert_eq!(spawn_cleanup_detached(&cfg), None);
}

#[test]
fn unstartable_hook_is_only_logged() {
    let worker = ScriptWorker::new("exit 0");
    let cfg = ConfigFileBuilder::new("/nonexistent/python3", worker.script())
        .with_cleanup(&["-c", "pass"])
        .build_in(worker.dir());
    assert_eq!(spawn_cleanup_detached(&cfg), None);
}
