// src/protocol/marker.rs

//! Progress marker grammar: `PROGRESS:<PHASE>[:<field>]*`.

use std::fmt;

use serde::Serialize;

pub const PROGRESS_PREFIX: &str = "PROGRESS:";
pub const RESULT_PREFIX: &str = "JSON_OUTPUT_PATH:";

/// Pipeline phase named by a progress marker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Phase {
    OverallStart,
    SbertStart,
    SbertProgress,
    SbertEnd,
    LlmClassificationStart,
    LlmTotalItems,
    LlmBatchStart,
    LlmBatchEnd,
    LlmItemStart,
    LlmItemEnd,
    LlmItemError,
    LlmClassificationEnd,
    LlmEnd,
    FormattingStart,
    OverallEnd,
    /// Tag this layer does not know. Forward-compatible, never an error.
    Unknown(String),
}

impl Phase {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "OVERALL_START" => Phase::OverallStart,
            "SBERT_START" => Phase::SbertStart,
            "SBERT_PROGRESS" => Phase::SbertProgress,
            "SBERT_END" => Phase::SbertEnd,
            "LLM_CLASSIFICATION_START" => Phase::LlmClassificationStart,
            "LLM_TOTAL_ITEMS" => Phase::LlmTotalItems,
            "LLM_BATCH_START" => Phase::LlmBatchStart,
            "LLM_BATCH_END" => Phase::LlmBatchEnd,
            "LLM_ITEM_START" => Phase::LlmItemStart,
            "LLM_ITEM_END" => Phase::LlmItemEnd,
            "LLM_ITEM_ERROR" => Phase::LlmItemError,
            "LLM_CLASSIFICATION_END" => Phase::LlmClassificationEnd,
            "LLM_END" => Phase::LlmEnd,
            "FORMATTING_START" => Phase::FormattingStart,
            "OVERALL_END" => Phase::OverallEnd,
            other => Phase::Unknown(other.to_string()),
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            Phase::OverallStart => "OVERALL_START",
            Phase::SbertStart => "SBERT_START",
            Phase::SbertProgress => "SBERT_PROGRESS",
            Phase::SbertEnd => "SBERT_END",
            Phase::LlmClassificationStart => "LLM_CLASSIFICATION_START",
            Phase::LlmTotalItems => "LLM_TOTAL_ITEMS",
            Phase::LlmBatchStart => "LLM_BATCH_START",
            Phase::LlmBatchEnd => "LLM_BATCH_END",
            Phase::LlmItemStart => "LLM_ITEM_START",
            Phase::LlmItemEnd => "LLM_ITEM_END",
            Phase::LlmItemError => "LLM_ITEM_ERROR",
            Phase::LlmClassificationEnd => "LLM_CLASSIFICATION_END",
            Phase::LlmEnd => "LLM_END",
            Phase::FormattingStart => "FORMATTING_START",
            Phase::OverallEnd => "OVERALL_END",
            Phase::Unknown(tag) => tag,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Phase::Unknown(_))
    }

    /// Phases whose single payload field is free text that may itself
    /// contain colons (the `LLM_END` summary is a JSON object).
    fn takes_raw_remainder(&self) -> bool {
        matches!(self, Phase::LlmEnd)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A parsed `PROGRESS:` line.
///
/// Fields are kept as strings; the typed accessors return `None` for
/// missing or malformed values so short markers degrade gracefully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressMarker {
    pub phase: Phase,
    pub fields: Vec<String>,
}

impl ProgressMarker {
    pub fn new(phase: Phase, fields: Vec<String>) -> Self {
        Self { phase, fields }
    }

    /// Parse the part of a line after `PROGRESS:`.
    pub fn parse(body: &str) -> Self {
        let (tag, rest) = match body.split_once(':') {
            Some((tag, rest)) => (tag.trim(), Some(rest)),
            None => (body.trim(), None),
        };
        let phase = Phase::from_tag(tag);

        let fields = match rest {
            None => Vec::new(),
            Some(rest) if phase.takes_raw_remainder() => vec![rest.trim().to_string()],
            Some(rest) => rest.split(':').map(|f| f.trim().to_string()).collect(),
        };

        Self { phase, fields }
    }

    pub fn text_field(&self, idx: usize) -> Option<&str> {
        self.fields
            .get(idx)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn int_field(&self, idx: usize) -> Option<u64> {
        self.text_field(idx).and_then(|s| s.parse().ok())
    }

    pub fn float_field(&self, idx: usize) -> Option<f64> {
        self.text_field(idx)
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|v| v.is_finite())
    }
}

impl fmt::Display for ProgressMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PROGRESS_PREFIX}{}", self.phase)?;
        for field in &self.fields {
            write!(f, ":{field}")?;
        }
        Ok(())
    }
}
