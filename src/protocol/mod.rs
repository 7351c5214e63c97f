// src/protocol/mod.rs

//! Worker stdout/stderr text protocol.
//!
//! - [`marker`] defines the `PROGRESS:<PHASE>[:<field>]*` grammar.
//! - [`parser`] splits raw byte chunks into lines and classifies each one as
//!   plain text, a leveled diagnostic, a progress marker or the
//!   `JSON_OUTPUT_PATH:` result marker.

pub mod marker;
pub mod parser;

pub use marker::{Phase, ProgressMarker, PROGRESS_PREFIX, RESULT_PREFIX};
pub use parser::{ClassifiedLine, OutputLineParser, classify};
