//! Aggregation of individual analyses into ranked summary statistics.
//!
//! Pure and deterministic: ties are always broken by first occurrence in
//! the input, so the same records in the same order give identical output.

use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisRecord;

/// Label reported when no record carries a primary label.
pub const FALLBACK_LABEL: &str = "Mixed Aesthetics";

const TOP_LABELS: usize = 5;
const TOP_ATTRIBUTES: usize = 5;
const TOP_SOURCES: usize = 5;
const MAX_SUBCATEGORIES: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelCount {
    pub label: String,
    pub count: usize,
    pub percentage: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceCount {
    pub source: String,
    pub count: usize,
    pub subcategories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateSummary {
    pub total_analyzed: usize,
    pub top_labels: Vec<LabelCount>,
    pub top_attributes: Vec<String>,
    pub top_sources: Vec<SourceCount>,
    pub dominant_label: String,
    pub summary: String,
}

/// Insertion-ordered tally. Linear lookup keeps first-seen order without a
/// second index; inputs are a handful of records.
struct Tally<V> {
    entries: Vec<(String, usize, V)>,
}

impl<V: Default> Tally<V> {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    fn bump(&mut self, key: &str) -> &mut V {
        let idx = match self.entries.iter().position(|(k, _, _)| k == key) {
            Some(idx) => idx,
            None => {
                self.entries.push((key.to_string(), 0, V::default()));
                self.entries.len() - 1
            }
        };
        let entry = &mut self.entries[idx];
        entry.1 += 1;
        &mut entry.2
    }

    /// Sorted by count descending; `sort_by` is stable so ties keep
    /// first-seen order.
    fn ranked(mut self, limit: usize) -> Vec<(String, usize, V)> {
        self.entries.sort_by(|a, b| b.1.cmp(&a.1));
        self.entries.truncate(limit);
        self.entries
    }
}

fn percentage(count: usize, total: usize) -> u32 {
    ((count as f64 * 100.0) / total as f64).round() as u32
}

/// Summarizes `records`. Returns `None` when there is nothing to summarize.
pub fn aggregate(records: &[AnalysisRecord]) -> Option<AggregateSummary> {
    if records.is_empty() {
        return None;
    }

    let total = records.len();
    let mut labels: Tally<()> = Tally::new();
    let mut attributes: Tally<()> = Tally::new();
    let mut sources: Tally<Vec<String>> = Tally::new();

    for record in records {
        let analysis = &record.analysis;

        if !analysis.primary_label.is_empty() {
            labels.bump(&analysis.primary_label);
        }

        for attribute in &analysis.attributes {
            let normalized = attribute.trim().to_lowercase();
            if !normalized.is_empty() {
                attributes.bump(&normalized);
            }
        }

        for reference in &analysis.references {
            if reference.source.is_empty() {
                continue;
            }
            let subcategories = sources.bump(&reference.source);
            if !reference.subcategory.is_empty() && !subcategories.contains(&reference.subcategory)
            {
                subcategories.push(reference.subcategory.clone());
            }
        }
    }

    let top_labels: Vec<LabelCount> = labels
        .ranked(TOP_LABELS)
        .into_iter()
        .map(|(label, count, ())| LabelCount {
            label,
            count,
            percentage: percentage(count, total),
        })
        .collect();

    let top_attributes = attributes
        .ranked(TOP_ATTRIBUTES)
        .into_iter()
        .map(|(attribute, _, ())| attribute)
        .collect();

    let top_sources = sources
        .ranked(TOP_SOURCES)
        .into_iter()
        .map(|(source, count, mut subcategories)| {
            subcategories.truncate(MAX_SUBCATEGORIES);
            SourceCount {
                source,
                count,
                subcategories,
            }
        })
        .collect();

    let dominant_label = top_labels
        .first()
        .map(|l| l.label.clone())
        .unwrap_or_else(|| FALLBACK_LABEL.to_string());

    // First-seen summary for the dominant label wins.
    let summary = records
        .iter()
        .map(|r| &r.analysis)
        .find(|a| a.primary_label == dominant_label && !a.summary.is_empty())
        .map(|a| a.summary.clone())
        .unwrap_or_default();

    Some(AggregateSummary {
        total_analyzed: total,
        top_labels,
        top_attributes,
        top_sources,
        dominant_label,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalysisResult, ImageReference, SourceReference};

    fn record(id: &str, analysis: AnalysisResult) -> AnalysisRecord {
        AnalysisRecord {
            item_id: id.to_string(),
            image_reference: ImageReference::new(format!("https://img/{}.jpg", id)),
            analysis,
        }
    }

    fn labelled(id: &str, label: &str) -> AnalysisRecord {
        record(id, AnalysisResult::new(label, ""))
    }

    #[test]
    fn test_empty_input_is_none() {
        assert!(aggregate(&[]).is_none());
    }

    #[test]
    fn test_label_ranking_and_percentage() {
        let records = vec![labelled("1", "A"), labelled("2", "A"), labelled("3", "B")];
        let summary = aggregate(&records).unwrap();

        assert_eq!(summary.total_analyzed, 3);
        assert_eq!(
            summary.top_labels[0],
            LabelCount {
                label: "A".to_string(),
                count: 2,
                percentage: 67
            }
        );
        assert_eq!(summary.top_labels[1].percentage, 33);
        assert_eq!(summary.dominant_label, "A");
    }

    #[test]
    fn test_label_ties_keep_first_occurrence() {
        let records = vec![labelled("1", "B"), labelled("2", "A"), labelled("3", "A"), labelled("4", "B")];
        let summary = aggregate(&records).unwrap();
        assert_eq!(summary.top_labels[0].label, "B");
        assert_eq!(summary.top_labels[1].label, "A");
    }

    #[test]
    fn test_top_labels_capped_at_five() {
        let records: Vec<_> = (0..7).map(|i| labelled(&i.to_string(), &format!("L{}", i))).collect();
        let summary = aggregate(&records).unwrap();
        assert_eq!(summary.top_labels.len(), 5);
        assert_eq!(summary.top_labels[0].label, "L0");
        assert_eq!(summary.top_labels[4].label, "L4");
    }

    #[test]
    fn test_fallback_label_when_unlabelled() {
        let records = vec![labelled("1", ""), labelled("2", "")];
        let summary = aggregate(&records).unwrap();
        assert!(summary.top_labels.is_empty());
        assert_eq!(summary.dominant_label, FALLBACK_LABEL);
        assert_eq!(summary.summary, "");
    }

    #[test]
    fn test_attributes_are_normalized() {
        let records = vec![
            record("1", AnalysisResult::new("A", "").with_attributes(&["Trench Coat ", "loafers"])),
            record("2", AnalysisResult::new("A", "").with_attributes(&["trench coat", "  ", "Beret"])),
            record("3", AnalysisResult::new("A", "").with_attributes(&["LOAFERS", "trench COAT"])),
        ];
        let summary = aggregate(&records).unwrap();
        assert_eq!(summary.top_attributes, vec!["trench coat", "loafers", "beret"]);
    }

    #[test]
    fn test_source_tie_break_and_counts() {
        let records = vec![record(
            "1",
            AnalysisResult::new("A", "").with_references(vec![
                SourceReference::new("A", ""),
                SourceReference::new("B", ""),
                SourceReference::new("A", ""),
            ]),
        )];
        let summary = aggregate(&records).unwrap();
        assert_eq!(summary.top_sources[0].source, "A");
        assert_eq!(summary.top_sources[0].count, 2);
        assert_eq!(summary.top_sources[1].source, "B");
        assert_eq!(summary.top_sources[1].count, 1);
    }

    #[test]
    fn test_subcategories_distinct_and_capped() {
        let refs = ["FW20", "SS21", "FW20", "SS22", "FW23"]
            .iter()
            .map(|c| SourceReference::new("Yohji Yamamoto", c))
            .collect();
        let records = vec![record("1", AnalysisResult::new("A", "").with_references(refs))];
        let summary = aggregate(&records).unwrap();
        assert_eq!(summary.top_sources[0].count, 5);
        assert_eq!(summary.top_sources[0].subcategories, vec!["FW20", "SS21", "SS22"]);
    }

    #[test]
    fn test_summary_is_first_seen_for_dominant_label() {
        let records = vec![
            record("1", AnalysisResult::new("B", "b-summary")),
            record("2", AnalysisResult::new("A", "")),
            record("3", AnalysisResult::new("A", "first-a")),
            record("4", AnalysisResult::new("A", "second-a")),
        ];
        let summary = aggregate(&records).unwrap();
        assert_eq!(summary.dominant_label, "A");
        assert_eq!(summary.summary, "first-a");
    }

    #[test]
    fn test_deterministic_for_same_input() {
        let records = vec![
            record(
                "1",
                AnalysisResult::new("Gorpcore", "outdoor")
                    .with_attributes(&["fleece", "boots"])
                    .with_references(vec![SourceReference::new("Arc'teryx", "Veilance")]),
            ),
            record("2", AnalysisResult::new("Coastal", "breezy").with_attributes(&["linen"])),
        ];
        let first = serde_json::to_string(&aggregate(&records)).unwrap();
        let second = serde_json::to_string(&aggregate(&records)).unwrap();
        assert_eq!(first, second);
    }
}
