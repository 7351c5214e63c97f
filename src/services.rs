// src/services.rs

//! Narrow interfaces to collaborators outside the job core.
//!
//! None of these take part in job tracking. Output actions only accept an
//! [`AnalysisResult`], which exists only for a job that succeeded.

use std::collections::HashMap;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ConfigFile;
use crate::fs::FileSystem;
use crate::resolve::AnalysisResult;

/// Lets the user pick the input file for a job.
pub trait FileDialog: Send + Sync {
    fn choose_input_file(&self) -> Option<PathBuf>;
}

/// Prompts on the terminal. Never prompts when stdin is not a TTY.
#[derive(Debug, Clone, Default)]
pub struct TerminalFileDialog;

impl FileDialog for TerminalFileDialog {
    fn choose_input_file(&self) -> Option<PathBuf> {
        if !std::io::stdin().is_terminal() {
            debug!("stdin is not a terminal; not prompting for an input file");
            return None;
        }

        let answer: String = match dialoguer::Input::new()
            .with_prompt("Input file (CSV or Excel)")
            .allow_empty(true)
            .interact_text()
        {
            Ok(answer) => answer,
            Err(err) => {
                warn!(error = %err, "input file prompt failed");
                return None;
            }
        };

        let answer = answer.trim();
        (!answer.is_empty()).then(|| PathBuf::from(answer))
    }
}

/// Read-only access to named secrets.
pub trait CredentialStore: Send + Sync {
    /// `None` for unknown names and empty values.
    fn get_credential(&self, name: &str) -> Option<String>;
}

/// Credentials from the process environment, after loading a `.env` file
/// from the current directory if there is one. Existing variables win over
/// `.env` entries.
#[derive(Debug, Clone, Default)]
pub struct EnvCredentialStore;

impl EnvCredentialStore {
    pub fn new() -> Self {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), "loaded .env file"),
            Err(err) if err.not_found() => {}
            Err(err) => warn!(error = %err, "ignoring unreadable .env file"),
        }
        Self
    }
}

impl CredentialStore for EnvCredentialStore {
    fn get_credential(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    values: HashMap<String, String>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get_credential(&self, name: &str) -> Option<String> {
        self.values.get(name).filter(|v| !v.is_empty()).cloned()
    }
}

/// Follow-up actions on a successful job's artifact.
#[derive(Debug, Clone)]
pub struct OutputActions {
    fs: Arc<dyn FileSystem>,
}

impl OutputActions {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    /// Open the folder containing the result file in the desktop's file
    /// manager. Does not wait for the file manager.
    pub fn open_output_folder(&self, result: &AnalysisResult) -> Result<PathBuf> {
        let folder = result
            .artifact_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();

        open::that_detached(&folder)
            .with_context(|| format!("opening output folder {}", folder.display()))?;
        info!(folder = %folder.display(), "opened output folder");
        Ok(folder)
    }

    /// Delete the result file in the background. Failures are logged.
    ///
    /// The returned handle may be dropped; awaiting it is only useful to
    /// observe completion.
    pub fn delete_result_file(&self, result: &AnalysisResult) -> JoinHandle<()> {
        let fs = Arc::clone(&self.fs);
        let path = result.artifact_path.clone();
        tokio::task::spawn_blocking(move || match fs.remove_file(&path) {
            Ok(()) => info!(path = %path.display(), "deleted result file"),
            Err(err) => warn!(path = %path.display(), error = %err, "failed to delete result file"),
        })
    }
}

/// Start the configured cleanup hook and return without waiting for it.
///
/// Runs the worker program with the `[hooks].cleanup_on_exit` arguments,
/// `{output_dir}` substituted. Returns the pid when a process was started.
pub fn spawn_cleanup_detached(config: &ConfigFile) -> Option<u32> {
    let args = config.hooks.cleanup_on_exit.as_ref()?;
    let worker = &config.worker;
    let output_dir = worker.output_dir.to_string_lossy();
    let args: Vec<String> = args
        .iter()
        .map(|arg| arg.replace("{output_dir}", &output_dir))
        .collect();

    let spawned = Command::new(&worker.program)
        .args(&args)
        .current_dir(&worker.working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();

    match spawned {
        Ok(child) => {
            info!(pid = child.id(), program = %worker.program, "cleanup hook started");
            Some(child.id())
        }
        Err(err) => {
            warn!(program = %worker.program, error = %err, "cleanup hook failed to start");
            None
        }
    }
}
