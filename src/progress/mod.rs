// src/progress/mod.rs

//! Normalized job progress.
//!
//! [`model::apply`] is a pure function over [`ProgressState`]; the supervisor
//! keeps one state per job and feeds it every progress marker read from the
//! worker's stdout.

pub mod model;

pub use model::{ProgressState, apply};
