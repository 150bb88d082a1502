//! Board items and image-variant resolution.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::analysis::ImageReference;

/// One rendition of an item's image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageVariant {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMedia {
    /// Variants keyed by size name, e.g. `600x` or `400x300`.
    #[serde(default)]
    pub images: BTreeMap<String, ImageVariant>,
}

/// A candidate item from a board. Accepts the board API's pin shape
/// (`{id, title, media: {images: {...}}}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardItem {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub media: ItemMedia,
}

impl BoardItem {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            title: None,
            media: ItemMedia::default(),
        }
    }

    pub fn with_variant(mut self, name: &str, url: &str, width: Option<u32>) -> Self {
        self.media.images.insert(
            name.to_string(),
            ImageVariant {
                url: url.to_string(),
                width,
                height: None,
            },
        );
        self
    }
}

/// Picks the image reference to analyze for a board item.
pub trait ImageReferenceResolver: Send + Sync {
    fn resolve(&self, item: &BoardItem) -> Option<ImageReference>;
}

/// Preferred named variants first, then the widest variant that is not
/// wider than `max_width`.
#[derive(Debug, Clone)]
pub struct VariantResolver {
    preferred: Vec<String>,
    max_width: u32,
}

impl VariantResolver {
    pub fn new(preferred: Vec<String>, max_width: u32) -> Self {
        Self {
            preferred,
            max_width,
        }
    }
}

impl Default for VariantResolver {
    fn default() -> Self {
        Self::new(vec!["600x".to_string(), "400x300".to_string()], 1200)
    }
}

impl ImageReferenceResolver for VariantResolver {
    fn resolve(&self, item: &BoardItem) -> Option<ImageReference> {
        let images = &item.media.images;

        let preferred = self
            .preferred
            .iter()
            .filter_map(|name| images.get(name))
            .find(|variant| !variant.url.is_empty());

        let chosen = preferred.or_else(|| {
            images
                .values()
                .filter(|v| !v.url.is_empty())
                .filter(|v| v.width.is_some_and(|w| w <= self.max_width))
                .max_by_key(|v| v.width)
        })?;

        Some(ImageReference::new(chosen.url.as_str()))
    }
}
