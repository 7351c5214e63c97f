// src/protocol/parser.rs

//! Incremental line splitter + classifier for worker output.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::protocol::marker::{PROGRESS_PREFIX, ProgressMarker, RESULT_PREFIX};
use crate::types::DiagnosticLevel;

static LEVEL_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(ERROR|CRITICAL|WARNING|WARN|INFO|DEBUG)\]").expect("level regex is valid")
});

/// One terminated line of worker output, classified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClassifiedLine {
    PlainText { text: String },
    Diagnostic { level: DiagnosticLevel, text: String },
    Progress { marker: ProgressMarker },
    ResultMarker { path: String },
}

impl ClassifiedLine {
    /// The line as the worker printed it (markers re-rendered).
    pub fn raw_text(&self) -> String {
        match self {
            ClassifiedLine::PlainText { text } | ClassifiedLine::Diagnostic { text, .. } => {
                text.clone()
            }
            ClassifiedLine::Progress { marker } => marker.to_string(),
            ClassifiedLine::ResultMarker { path } => format!("{RESULT_PREFIX}{path}"),
        }
    }
}

/// Classify a single line (without its terminator).
///
/// Precedence: progress marker, result marker, leveled diagnostic, plain
/// text. Never fails.
pub fn classify(line: &str) -> ClassifiedLine {
    let trimmed = line.trim();

    if let Some(body) = trimmed.strip_prefix(PROGRESS_PREFIX) {
        return ClassifiedLine::Progress {
            marker: ProgressMarker::parse(body),
        };
    }

    if let Some(path) = trimmed.strip_prefix(RESULT_PREFIX) {
        return ClassifiedLine::ResultMarker {
            path: path.trim().to_string(),
        };
    }

    if let Some(level) = detect_level(line) {
        return ClassifiedLine::Diagnostic {
            level,
            text: line.to_string(),
        };
    }

    ClassifiedLine::PlainText {
        text: line.to_string(),
    }
}

/// First bracketed level token in the line, if any.
pub fn detect_level(line: &str) -> Option<DiagnosticLevel> {
    LEVEL_TOKEN
        .captures(line)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Splits raw byte chunks into lines and classifies them.
///
/// One instance per stream per job. Bytes of an unterminated trailing line
/// are kept until a `\n` arrives (or [`finish`](Self::finish) is called), so
/// the output does not depend on how the stream was chunked.
#[derive(Debug, Default)]
pub struct OutputLineParser {
    pending: Vec<u8>,
}

impl OutputLineParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<ClassifiedLine> {
        let mut out = Vec::new();
        let mut start = 0;

        for (idx, byte) in chunk.iter().enumerate() {
            if *byte != b'\n' {
                continue;
            }
            if self.pending.is_empty() {
                push_line(&chunk[start..idx], &mut out);
            } else {
                self.pending.extend_from_slice(&chunk[start..idx]);
                let line = std::mem::take(&mut self.pending);
                push_line(&line, &mut out);
            }
            start = idx + 1;
        }

        if start < chunk.len() {
            self.pending.extend_from_slice(&chunk[start..]);
        }

        out
    }

    /// Flush the unterminated trailing line at end of stream.
    pub fn finish(&mut self) -> Option<ClassifiedLine> {
        let line = std::mem::take(&mut self.pending);
        let mut out = Vec::new();
        push_line(&line, &mut out);
        out.pop()
    }

    /// Whether bytes of an unterminated line are buffered.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

fn push_line(raw: &[u8], out: &mut Vec<ClassifiedLine>) {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let text = String::from_utf8_lossy(raw);
    if text.trim().is_empty() {
        return;
    }
    out.push(classify(&text));
}
