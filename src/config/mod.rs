// src/config/mod.rs

//! Configuration loading and validation for workerwatch.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate it and resolve relative paths against the config directory
//!   (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    ConfigFile, CredentialsSection, HooksSection, RawConfigFile, WorkerConfig, WorkerSection,
};
pub use validate::parse_duration;
