// tests/config_loading.rs

use std::error::Error;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::NamedTempFile;
use workerwatch::config::load_and_validate;
use workerwatch::errors::WorkerwatchError;
use workerwatch::exec::WorkerCommand;
use workerwatch_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn sample_config_loads() -> TestResult {
    init_tracing();

    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let path = manifest_dir.join("configs/Workerwatch.toml");

    let cfg = load_and_validate(&path)?;
    let configs = manifest_dir.join("configs");

    assert_eq!(cfg.worker.program, "python3");
    assert_eq!(cfg.worker.script, configs.join("../backend/main.py"));
    assert_eq!(cfg.worker.working_dir, configs.join("../backend"));
    assert_eq!(cfg.worker.cancel_grace, Duration::from_secs(5));
    assert_eq!(cfg.credentials.api_key.as_deref(), Some("GEMINI_API_KEY"));
    assert!(cfg.hooks.cleanup_on_exit.is_some());

    let cmd = WorkerCommand::for_analysis(
        &cfg.worker,
        &PathBuf::from("invoices.csv"),
        &cfg.worker.output_dir,
        None,
    );
    assert_eq!(cmd.args[1..3], ["--input".to_string(), "invoices.csv".to_string()]);

    Ok(())
}

#[test]
fn missing_worker_section_is_a_toml_error() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[credentials]
api_key = "GEMINI_API_KEY"
"#
    )
    .unwrap();

    match load_and_validate(file.path()) {
        Err(WorkerwatchError::TomlError(e)) => assert!(e.to_string().contains("worker")),
        Err(e) => panic!("Expected TomlError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn empty_cleanup_hook_is_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[worker]
program = "python3"
script = "main.py"

[hooks]
cleanup_on_exit = []
"#
    )
    .unwrap();

    match load_and_validate(file.path()) {
        Err(WorkerwatchError::ConfigError(msg)) => assert!(msg.contains("cleanup_on_exit")),
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn invalid_env_name_is_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[worker]
program = "python3"
script = "main.py"

[worker.env]
"A=B" = "1"
"#
    )
    .unwrap();

    assert!(matches!(
        load_and_validate(file.path()),
        Err(WorkerwatchError::ConfigError(_))
    ));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = load_and_validate(dir.path().join("nope.toml"));
    assert!(matches!(result, Err(WorkerwatchError::IoError(_))));
}
