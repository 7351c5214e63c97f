// src/resolve/summary.rs

//! Lenient read-only view over a result payload.
//!
//! Accepts both the flat layout (`project_id`, `invoice_pairs[].llm_classification`)
//! and the nested one (`project.id`, `pairs[].llmAnalysis.classification`).
//! Missing fields never fail; they just stay empty.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportSummary {
    pub project_id: Option<String>,
    pub project_name: Option<String>,
    pub pair_count: usize,
    /// Pairs per classification label (`Likely`, `Not likely`, ...).
    pub classifications: BTreeMap<String, usize>,
}

impl ReportSummary {
    pub fn from_value(value: &Value) -> Self {
        let project = value.get("project");

        let project_id = string_at(value, "project_id")
            .or_else(|| project.and_then(|p| string_at(p, "id")));
        let project_name = string_at(value, "project_name")
            .or_else(|| project.and_then(|p| string_at(p, "name")));

        let pairs = value
            .get("invoice_pairs")
            .or_else(|| value.get("pairs"))
            .and_then(Value::as_array);

        let mut classifications = BTreeMap::new();
        let pair_count = pairs.map_or(0, Vec::len);
        for pair in pairs.into_iter().flatten() {
            let label = string_at(pair, "llm_classification")
                .or_else(|| pair.get("llmAnalysis").and_then(|a| string_at(a, "classification")));
            if let Some(label) = label {
                *classifications.entry(label).or_insert(0) += 1;
            }
        }

        Self {
            project_id,
            project_name,
            pair_count,
            classifications,
        }
    }
}

fn string_at(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_flat_layout() {
        let summary = ReportSummary::from_value(&json!({
            "project_id": "p1",
            "project_name": "Q3 review",
            "invoice_pairs": [
                {"similarity": 0.97, "llm_classification": "Very likely"},
                {"similarity": 0.81, "llm_classification": "Not likely"},
                {"similarity": 0.90, "llm_classification": "Very likely"}
            ]
        }));

        assert_eq!(summary.project_id.as_deref(), Some("p1"));
        assert_eq!(summary.pair_count, 3);
        assert_eq!(summary.classifications.get("Very likely"), Some(&2));
    }

    #[test]
    fn reads_nested_layout_and_tolerates_gaps() {
        let summary = ReportSummary::from_value(&json!({
            "project": {"id": "project-1", "name": "Import"},
            "pairs": [
                {"llmAnalysis": {"classification": "Likely"}},
                {"score": 0.5}
            ]
        }));

        assert_eq!(summary.project_name.as_deref(), Some("Import"));
        assert_eq!(summary.pair_count, 2);
        assert_eq!(summary.classifications.len(), 1);
    }

    #[test]
    fn empty_object_gives_empty_summary() {
        assert_eq!(ReportSummary::from_value(&json!({})), ReportSummary::default());
    }
}
