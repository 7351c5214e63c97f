// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [worker]
/// program = "python3"
/// script = "backend/main.py"
/// output_dir = "output"
///
/// [worker.env]
/// PYTHONUNBUFFERED = "1"
///
/// [credentials]
/// api_key = "GEMINI_API_KEY"
///
/// [hooks]
/// cleanup_on_exit = ["-c", "from main import cleanup_old_outputs; cleanup_old_outputs('{output_dir}')"]
/// ```
///
/// This is the unvalidated form; convert it with [`RawConfigFile::validate_in`]
/// or `ConfigFile::try_from`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    pub worker: WorkerSection,

    #[serde(default)]
    pub credentials: CredentialsSection,

    #[serde(default)]
    pub hooks: HooksSection,
}

/// `[worker]` section.
///
/// The executable is always explicit; there is no built-in interpreter
/// discovery.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSection {
    /// Interpreter or executable to run (`python3`, `/opt/env/bin/python`).
    ///
    /// Bare names are looked up on `PATH`; relative paths containing a
    /// separator are resolved against the config directory.
    pub program: String,

    /// Worker entry point, passed as the first argument.
    pub script: PathBuf,

    /// Working directory of the worker. Defaults to the script's directory
    /// so the worker's relative resource lookups succeed.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Passed as `--output_dir`.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Appended after the standard arguments.
    #[serde(default)]
    pub extra_args: Vec<String>,

    /// Environment overrides on top of the inherited environment.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// How long a cancelled worker gets to exit before it is killed.
    #[serde(default = "default_cancel_grace")]
    pub cancel_grace: String,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_cancel_grace() -> String {
    "5s".to_string()
}

/// `[credentials]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialsSection {
    /// Name of the credential forwarded as `--api_key`. When unset, or when
    /// the credential store has no value, the argument is omitted.
    #[serde(default)]
    pub api_key: Option<String>,
}

/// `[hooks]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HooksSection {
    /// Arguments for a best-effort cleanup run of the worker program at
    /// shutdown. `{output_dir}` is substituted.
    #[serde(default)]
    pub cleanup_on_exit: Option<Vec<String>>,
}

/// Validated worker settings with all paths resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub program: String,
    pub script: PathBuf,
    pub working_dir: PathBuf,
    pub output_dir: PathBuf,
    pub extra_args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub cancel_grace: Duration,
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub worker: WorkerConfig,
    pub credentials: CredentialsSection,
    pub hooks: HooksSection,
}

impl ConfigFile {
    /// Construct without validation. Used by `validate.rs`.
    pub(crate) fn new_unchecked(
        worker: WorkerConfig,
        credentials: CredentialsSection,
        hooks: HooksSection,
    ) -> Self {
        Self {
            worker,
            credentials,
            hooks,
        }
    }
}
