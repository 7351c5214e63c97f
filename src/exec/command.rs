// src/exec/command.rs

//! Worker invocation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Serialize;
use tokio::process::Command;

use crate::config::WorkerConfig;

/// Everything needed to start one worker process.
///
/// The worker inherits this process's environment; `env_overrides` are
/// applied on top.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env_overrides: BTreeMap<String, String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env_overrides: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_overrides.insert(key.into(), value.into());
        self
    }

    /// Standard analysis invocation:
    /// `<script> --input <path> --output_dir <dir> [--api_key <key>] [extra...]`.
    ///
    /// The API key travels as an argument, not through the environment.
    pub fn for_analysis(
        worker: &WorkerConfig,
        input: &Path,
        output_dir: &Path,
        api_key: Option<&str>,
    ) -> Self {
        let mut cmd = WorkerCommand::new(worker.program.clone())
            .arg(worker.script.to_string_lossy())
            .arg("--input")
            .arg(input.to_string_lossy())
            .arg("--output_dir")
            .arg(output_dir.to_string_lossy())
            .working_dir(worker.working_dir.clone());

        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            cmd = cmd.arg("--api_key").arg(key);
        }

        cmd = cmd.args(worker.extra_args.iter().cloned());
        for (key, value) in &worker.env {
            cmd = cmd.env(key.clone(), value.clone());
        }
        cmd
    }

    /// Argument vector safe to log: the value after `--api_key` is masked.
    pub fn redacted_args(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.args.len());
        let mut mask_next = false;
        for arg in &self.args {
            if mask_next {
                out.push("***".to_string());
                mask_next = false;
            } else {
                mask_next = arg == "--api_key";
                out.push(arg.clone());
            }
        }
        out
    }

    /// Build the tokio command with piped output streams.
    ///
    /// On unix the worker leads a new process group, so a terminal's Ctrl-C
    /// reaches it only through cancellation.
    pub(crate) fn to_tokio(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(&self.env_overrides)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        // Own group, so subprocesses left behind by the worker stay addressable.
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn worker() -> WorkerConfig {
        WorkerConfig {
            program: "python3".to_string(),
            script: PathBuf::from("/app/backend/main.py"),
            working_dir: PathBuf::from("/app/backend"),
            output_dir: PathBuf::from("/app/output"),
            extra_args: vec!["--verbose".to_string()],
            env: BTreeMap::from([("PYTHONUNBUFFERED".to_string(), "1".to_string())]),
            cancel_grace: Duration::from_secs(5),
        }
    }

    #[test]
    fn analysis_argument_vector() {
        let cmd = WorkerCommand::for_analysis(
            &worker(),
            Path::new("/data/invoices.csv"),
            Path::new("/app/output"),
            Some("secret"),
        );

        assert_eq!(cmd.program, "python3");
        assert_eq!(
            cmd.args,
            vec![
                "/app/backend/main.py",
                "--input",
                "/data/invoices.csv",
                "--output_dir",
                "/app/output",
                "--api_key",
                "secret",
                "--verbose",
            ]
        );
        assert_eq!(cmd.working_dir, Some(PathBuf::from("/app/backend")));
        assert_eq!(cmd.env_overrides.get("PYTHONUNBUFFERED").map(String::as_str), Some("1"));
        assert!(!cmd.redacted_args().contains(&"secret".to_string()));
    }

    #[test]
    fn empty_api_key_is_omitted() {
        let cmd = WorkerCommand::for_analysis(
            &worker(),
            Path::new("in.csv"),
            Path::new("out"),
            Some(""),
        );
        assert!(!cmd.args.iter().any(|a| a == "--api_key"));
    }
}
