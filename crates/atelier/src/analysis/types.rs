//! Payload returned by the vision-analysis service.

use serde::{Deserialize, Serialize};

/// A reference to an analyzable image: an http(s) URL or a `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageReference(String);

impl ImageReference {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_data_url(&self) -> bool {
        self.0.starts_with("data:")
    }

    /// Shortened form for log lines; data URLs can be megabytes long.
    pub fn preview(&self) -> String {
        const MAX: usize = 80;
        match self.0.char_indices().nth(MAX) {
            Some((idx, _)) => format!("{}...", &self.0[..idx]),
            None => self.0.clone(),
        }
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ImageReference {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A stylistic reference (e.g. designer and collection) cited by an analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceReference {
    #[serde(default, alias = "designer")]
    pub source: String,
    #[serde(default, alias = "collection")]
    pub subcategory: String,
    /// Any further fields the service attached (links, years, ...).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SourceReference {
    pub fn new(source: &str, subcategory: &str) -> Self {
        Self {
            source: source.to_string(),
            subcategory: subcategory.to_string(),
            extra: serde_json::Map::new(),
        }
    }
}

/// Structured analysis of a single image.
///
/// The service's own field names (`aestheticName`, `coreGarments`,
/// `runwayReferences`) are accepted on input. Fields this crate doesn't
/// interpret are kept in `extra` so the payload round-trips unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    #[serde(default, alias = "aestheticName")]
    pub primary_label: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default, alias = "coreGarments")]
    pub attributes: Vec<String>,
    #[serde(default, alias = "runwayReferences")]
    pub references: Vec<SourceReference>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl AnalysisResult {
    pub fn new(primary_label: &str, summary: &str) -> Self {
        Self {
            primary_label: primary_label.to_string(),
            summary: summary.to_string(),
            attributes: Vec::new(),
            references: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_attributes(mut self, attributes: &[&str]) -> Self {
        self.attributes = attributes.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn with_references(mut self, references: Vec<SourceReference>) -> Self {
        self.references = references;
        self
    }
}

/// One successfully analyzed unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    pub item_id: String,
    pub image_reference: ImageReference,
    pub analysis: AnalysisResult,
}
