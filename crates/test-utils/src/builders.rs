#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use workerwatch::config::{
    ConfigFile, CredentialsSection, HooksSection, RawConfigFile, WorkerSection,
};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new(program: &str, script: impl Into<PathBuf>) -> Self {
        Self {
            config: RawConfigFile {
                worker: WorkerSection {
                    program: program.to_string(),
                    script: script.into(),
                    working_dir: None,
                    output_dir: PathBuf::from("output"),
                    extra_args: Vec::new(),
                    env: BTreeMap::new(),
                    cancel_grace: "5s".to_string(),
                },
                credentials: CredentialsSection::default(),
                hooks: HooksSection::default(),
            },
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.worker.output_dir = dir.into();
        self
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.config
            .worker
            .env
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_cancel_grace(mut self, grace: &str) -> Self {
        self.config.worker.cancel_grace = grace.to_string();
        self
    }

    pub fn with_api_key_credential(mut self, name: &str) -> Self {
        self.config.credentials.api_key = Some(name.to_string());
        self
    }

    pub fn with_cleanup(mut self, args: &[&str]) -> Self {
        self.config.hooks.cleanup_on_exit = Some(args.iter().map(|a| a.to_string()).collect());
        self
    }

    /// Validate with relative paths resolved against `base_dir`.
    pub fn build_in(self, base_dir: &Path) -> ConfigFile {
        self.config
            .validate_in(base_dir)
            .expect("Failed to build valid config from builder")
    }
}
