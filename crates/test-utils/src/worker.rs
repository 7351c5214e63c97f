//! Throwaway `/bin/sh` workers living in a temp directory.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use workerwatch::exec::WorkerCommand;

/// A shell script worker. The directory is removed on drop.
pub struct ScriptWorker {
    dir: TempDir,
    script: PathBuf,
}

impl ScriptWorker {
    /// Write `body` as `worker.sh` into a fresh temp directory.
    pub fn new(body: &str) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let script = dir.path().join("worker.sh");
        fs::write(&script, format!("#!/bin/sh\n{body}\n")).expect("write worker script");
        Self { dir, script }
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    /// Write a file next to the script and return its absolute path.
    pub fn write_file(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, contents).expect("write worker file");
        path
    }

    /// `sh worker.sh`, run from the script's directory.
    pub fn command(&self) -> WorkerCommand {
        WorkerCommand::new("/bin/sh")
            .arg(self.script.to_string_lossy())
            .working_dir(self.dir.path())
    }
}
