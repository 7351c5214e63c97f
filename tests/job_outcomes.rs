#![cfg(unix)]

mod common;
use crate::common::supervisor;

use std::os::unix::fs::PermissionsExt;

use serde_json::json;

use workerwatch::errors::JobError;
use workerwatch::exec::{JobOutcome, WorkerCommand};
use workerwatch::types::{DiagnosticLevel, OutputStream};
use workerwatch_test_utils::{RecordingSink, ScriptWorker, init_tracing, with_timeout};

#[tokio::test]
async fn success_resolves_announced_result_file() {
    init_tracing();
    let out = tempfile::tempdir().unwrap();
    let result = out.path().join("r.json");
    std::fs::write(&result, r#"{"project_id":"p1","invoice_pairs":[]}"#).unwrap();
    let worker = ScriptWorker::new(&format!(
        r#"echo "PROGRESS:OVERALL_START:"
echo "[INFO] reading input"
echo "PROGRESS:SBERT_START:"
echo "PROGRESS:SBERT_PROGRESS:1:2"
echo "JSON_OUTPUT_PATH:{}"
echo "PROGRESS:OVERALL_END:""#,
        result.display()
    ));

    let sink = RecordingSink::new();
    let sup = supervisor(&sink);
    let handle = sup.spawn(&worker.command()).unwrap();
    let id = handle.id();

    let outcome = with_timeout(handle.wait()).await;
    match &outcome {
        JobOutcome::Succeeded(res) => {
            assert_eq!(res.artifact_path, result);
            assert_eq!(res.content, json!({"project_id": "p1", "invoice_pairs": []}));
        }
        other => panic!("expected success, got {other:?}"),
    }

    // The terminal event carries the same outcome and comes last.
    let events = sink.events_for(id);
    assert!(events.last().is_some_and(|e| e.is_terminal()));
    assert_eq!(sink.terminals_for(id), vec![outcome]);
    assert!(!sup.is_running(id));

    let percents: Vec<u8> = sink.progress_for(id).iter().map(|p| p.percent).collect();
    assert_eq!(percents, vec![0, 5, 18, 100]);

    let info = sink
        .logs_for(id)
        .into_iter()
        .find(|l| l.text.contains("reading input"))
        .expect("diagnostic forwarded");
    assert_eq!(info.level, Some(DiagnosticLevel::Info));
    assert_eq!(info.stream, OutputStream::Stdout);
}

#[tokio::test]
async fn relative_result_path_uses_working_dir() {
    let worker = ScriptWorker::new(
        r#"printf '{"project_id":"rel"}' > out.json
echo "JSON_OUTPUT_PATH:out.json""#,
    );

    let sink = RecordingSink::new();
    let outcome = with_timeout(supervisor(&sink).spawn(&worker.command()).unwrap().wait()).await;

    let result = outcome.result().expect("success");
    assert_eq!(result.artifact_path, worker.dir().join("out.json"));
    assert_eq!(result.summary().project_id.as_deref(), Some("rel"));
}

#[tokio::test]
async fn non_zero_exit_wins_over_output() {
    let worker = ScriptWorker::new(
        r#"echo "JSON_OUTPUT_PATH:/tmp/does-not-matter.json"
echo "something broke" >&2
exit 7"#,
    );

    let sink = RecordingSink::new();
    let handle = supervisor(&sink).spawn(&worker.command()).unwrap();
    let id = handle.id();
    let outcome = with_timeout(handle.wait()).await;

    assert_eq!(
        outcome,
        JobOutcome::Failed(JobError::WorkerNonZeroExit { code: 7 })
    );

    let stderr = sink
        .logs_for(id)
        .into_iter()
        .find(|l| l.stream == OutputStream::Stderr)
        .expect("stderr line forwarded");
    assert_eq!(stderr.text, "something broke");
    assert_eq!(stderr.level, Some(DiagnosticLevel::Error));
    assert_eq!(stderr.to_string(), "[stderr] something broke");
}

#[tokio::test]
async fn transcript_keeps_both_streams() {
    let worker = ScriptWorker::new(
        r#"echo "to stdout"
echo "to stderr" >&2
printf '{}' > r.json
echo "JSON_OUTPUT_PATH:r.json""#,
    );

    let sink = RecordingSink::new();
    let report = with_timeout(supervisor(&sink).spawn(&worker.command()).unwrap().report()).await;

    assert!(report.outcome.result().is_some());
    assert_eq!(report.transcript.stderr_text(), "to stderr\n");
    assert_eq!(
        report.transcript.stdout_text(),
        "to stdout\nJSON_OUTPUT_PATH:r.json\n"
    );
}

#[tokio::test]
async fn death_by_signal_reports_minus_one() {
    let worker = ScriptWorker::new("kill -9 $$");

    let sink = RecordingSink::new();
    let outcome = with_timeout(supervisor(&sink).spawn(&worker.command()).unwrap().wait()).await;

    assert_eq!(
        outcome,
        JobOutcome::Failed(JobError::WorkerNonZeroExit { code: -1 })
    );
}

#[tokio::test]
async fn clean_exit_without_marker_is_a_protocol_violation() {
    let worker = ScriptWorker::new(r#"echo "[WARNING] nothing to do""#);

    let sink = RecordingSink::new();
    let outcome = with_timeout(supervisor(&sink).spawn(&worker.command()).unwrap().wait()).await;

    assert_eq!(outcome, JobOutcome::Failed(JobError::MarkerNotFound));
}

#[tokio::test]
async fn missing_and_malformed_result_files() {
    let missing = ScriptWorker::new(r#"echo "JSON_OUTPUT_PATH:gone.json""#);
    let malformed = ScriptWorker::new(
        r#"echo "not json" > bad.json
echo "JSON_OUTPUT_PATH:bad.json""#,
    );

    let sink = RecordingSink::new();
    let sup = supervisor(&sink);

    let outcome = with_timeout(sup.spawn(&missing.command()).unwrap().wait()).await;
    match outcome.error() {
        Some(JobError::ResultFileMissing { path }) => {
            assert_eq!(path, &missing.dir().join("gone.json"))
        }
        other => panic!("expected ResultFileMissing, got {other:?}"),
    }

    let outcome = with_timeout(sup.spawn(&malformed.command()).unwrap().wait()).await;
    match outcome.error() {
        Some(err @ JobError::ResultParseError { .. }) => {
            assert_eq!(err.kind(), "result_parse_error")
        }
        other => panic!("expected ResultParseError, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_executable_is_reported_without_events() {
    let sink = RecordingSink::new();
    let sup = supervisor(&sink);

    let err = sup
        .spawn(&WorkerCommand::new("/nonexistent/bin/python3").arg("main.py"))
        .unwrap_err();

    assert!(matches!(
        err,
        JobError::SpawnFailure {
            executable_missing: true,
            ..
        }
    ));
    assert!(err.to_string().contains("PATH"));
    assert!(sink.events().is_empty());
    assert!(sup.registry().is_empty());
}

#[tokio::test]
async fn non_executable_file_is_not_reported_as_missing() {
    let worker = ScriptWorker::new("exit 0");
    let mut perms = std::fs::metadata(worker.script()).unwrap().permissions();
    perms.set_mode(0o644);
    std::fs::set_permissions(worker.script(), perms).unwrap();

    let sink = RecordingSink::new();
    let err = supervisor(&sink)
        .spawn(&WorkerCommand::new(worker.script().to_string_lossy()))
        .unwrap_err();

    assert!(matches!(
        err,
        JobError::SpawnFailure {
            executable_missing: false,
            ..
        }
    ));
}

#[tokio::test]
async fn environment_overrides_reach_the_worker() {
    let worker = ScriptWorker::new(
        r#"echo "mode=$WORKER_MODE"
printf '{}' > r.json
echo "JSON_OUTPUT_PATH:r.json""#,
    );

    let sink = RecordingSink::new();
    let handle = supervisor(&sink)
        .spawn(&worker.command().env("WORKER_MODE", "batch"))
        .unwrap();
    let id = handle.id();
    assert!(with_timeout(handle.wait()).await.result().is_some());

    assert!(sink.logs_for(id).iter().any(|l| l.text == "mode=batch"));
}
