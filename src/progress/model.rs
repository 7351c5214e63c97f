// src/progress/model.rs

//! Pure mapping from progress markers onto one overall percentage.
//!
//! The 0-100 range is partitioned into fixed bands, one per pipeline phase:
//!
//! | band                  | range  |
//! |-----------------------|--------|
//! | start                 | 0      |
//! | similarity scan       | 5-30   |
//! | classification prep   | 30-35  |
//! | batch/item classify   | 35-90  |
//! | result formatting     | 90-100 |
//!
//! Absolute markers (`*_START` / `*_END`) set the percentage directly.
//! Fractional markers never lower it.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::protocol::{Phase, ProgressMarker};

const SBERT_BAND: Band = Band { start: 5, width: 25 };
const LLM_BAND: Band = Band { start: 35, width: 55 };

/// Keys used in [`ProgressState::phase_totals`].
pub const ITEMS_TOTAL: &str = "llm_items";
pub const BATCHES_TOTAL: &str = "llm_batches";
pub const PAIRS_TOTAL: &str = "sbert_pairs";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressState {
    pub percent: u8,
    pub status_text: String,
    /// Totals announced by earlier markers, remembered for later ones.
    pub phase_totals: BTreeMap<String, u64>,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self {
            percent: 0,
            status_text: "Waiting for worker...".to_string(),
            phase_totals: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Band {
    start: u8,
    width: u8,
}

impl Band {
    /// Linear position of `done / total` inside the band.
    ///
    /// A zero total contributes nothing.
    fn at(self, done: u64, total: u64) -> u8 {
        let fraction = if total == 0 {
            0.0
        } else {
            (done as f64 / total as f64).clamp(0.0, 1.0)
        };
        let offset = (fraction * f64::from(self.width)).round() as u8;
        self.start + offset.min(self.width)
    }
}

/// Apply one marker to a job's progress state.
///
/// Unknown phases and markers missing their numeric fields return the state
/// unchanged.
pub fn apply(state: &ProgressState, marker: &ProgressMarker) -> ProgressState {
    let mut next = state.clone();

    match &marker.phase {
        Phase::OverallStart => {
            next.phase_totals.clear();
            set(&mut next, 0, "Starting invoice analysis...");
        }
        Phase::SbertStart => set(&mut next, 5, "Starting similarity analysis..."),
        Phase::SbertProgress => {
            let (Some(current), Some(total)) = (marker.int_field(0), marker.int_field(1)) else {
                return next;
            };
            next.phase_totals.insert(PAIRS_TOTAL.to_string(), total);
            advance(
                &mut next,
                SBERT_BAND.at(current, total),
                format!("Comparing {current} of {total} invoice pairs..."),
            );
        }
        Phase::SbertEnd => set(
            &mut next,
            30,
            "Initial comparison complete. Starting detailed analysis...",
        ),
        Phase::LlmClassificationStart => set(&mut next, 35, "Preparing detailed invoice analysis..."),
        Phase::LlmTotalItems => {
            let Some(total) = marker.int_field(0) else {
                return next;
            };
            next.phase_totals.insert(ITEMS_TOTAL.to_string(), total);
            set(
                &mut next,
                35,
                format!("Preparing to examine {total} potential matches..."),
            );
        }
        Phase::LlmBatchStart => {
            let (Some(current), Some(total)) = (marker.int_field(0), marker.int_field(1)) else {
                return next;
            };
            next.phase_totals.insert(BATCHES_TOTAL.to_string(), total);
            advance(
                &mut next,
                LLM_BAND.at(current.saturating_sub(1), total),
                format!("Processing batch {current} of {total}..."),
            );
        }
        Phase::LlmBatchEnd => {
            let (Some(current), Some(total)) = (marker.int_field(0), marker.int_field(1)) else {
                return next;
            };
            let text = match marker.float_field(2) {
                Some(secs) => format!("Completed batch {current} of {total} in {secs:.1}s"),
                None => format!("Completed batch {current} of {total}"),
            };
            advance(&mut next, LLM_BAND.at(current, total), text);
        }
        Phase::LlmItemStart => {
            let (Some(current), Some(total)) = (marker.int_field(0), marker.int_field(1)) else {
                return next;
            };
            next.status_text = format!("Examining item {current} of {total}...");
        }
        Phase::LlmItemEnd => {
            let (Some(current), Some(total)) = (marker.int_field(0), marker.int_field(1)) else {
                return next;
            };
            let text = match marker.text_field(2) {
                Some(class) => format!("Completed item {current}/{total} ({class})"),
                None => format!("Completed item {current}/{total}"),
            };
            // Batch markers drive the bar when the worker announces batches.
            if next.phase_totals.contains_key(BATCHES_TOTAL) {
                next.status_text = text;
            } else {
                advance(&mut next, LLM_BAND.at(current, total), text);
            }
        }
        Phase::LlmItemError => {
            let (Some(current), Some(total)) = (marker.int_field(0), marker.int_field(1)) else {
                return next;
            };
            next.status_text = format!("Item {current} of {total} could not be classified");
        }
        Phase::LlmClassificationEnd => set(&mut next, 90, "Analysis complete."),
        Phase::LlmEnd => {
            let text = marker
                .text_field(0)
                .and_then(summary_text)
                .map(|stats| format!("Analysis finished. Results: {stats}"))
                .unwrap_or_else(|| "Analysis finished.".to_string());
            set(&mut next, 90, text);
        }
        Phase::FormattingStart => set(&mut next, 92, "Preparing final results..."),
        Phase::OverallEnd => set(&mut next, 100, "Process completed!"),
        Phase::Unknown(_) => {}
    }

    next
}

fn set(state: &mut ProgressState, percent: u8, text: impl Into<String>) {
    state.percent = percent.min(100);
    state.status_text = text.into();
}

fn advance(state: &mut ProgressState, percent: u8, text: String) {
    state.percent = state.percent.max(percent.min(100));
    state.status_text = text;
}

/// Render an `LLM_END` JSON summary object as `key: value, ...`.
fn summary_text(raw: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    let parts: Vec<String> = object
        .iter()
        .map(|(key, value)| match value {
            serde_json::Value::String(s) => format!("{key}: {s}"),
            other => format!("{key}: {other}"),
        })
        .collect();
    Some(parts.join(", "))
}
