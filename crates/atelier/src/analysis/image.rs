//! Turns an image reference into a base64 payload plus MIME type.

use std::sync::LazyLock;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use regex::Regex;
use reqwest::Client;

use super::{AnalysisError, ImageReference};

static RE_DATA_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^data:([^;,]+);base64,(.+)$").unwrap());

/// MIME type assumed when a fetched image carries no `Content-Type`.
pub const DEFAULT_MIME_TYPE: &str = "image/png";

/// Image bytes ready to be sent to the analysis service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedImage {
    /// Base64 (standard alphabet, padded).
    pub data: String,
    pub mime_type: String,
}

/// Splits a `data:<mime>;base64,<payload>` URL. Returns `None` for anything
/// else, including non-base64 data URLs.
pub fn parse_data_url(reference: &str) -> Option<PreparedImage> {
    let caps = RE_DATA_URL.captures(reference)?;
    Some(PreparedImage {
        mime_type: caps[1].to_string(),
        data: caps[2].to_string(),
    })
}

/// Prepares `image` for upload, fetching it over HTTP when it is a URL.
pub async fn prepare_image(
    client: &Client,
    image: &ImageReference,
) -> Result<PreparedImage, AnalysisError> {
    if image.is_data_url() {
        return parse_data_url(image.as_str()).ok_or_else(|| {
            AnalysisError::ImagePreparation("Malformed data URL".to_string())
        });
    }

    let url = image.as_str();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(AnalysisError::ImagePreparation(format!(
            "Unsupported image reference: {}",
            image.preview()
        )));
    }

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| AnalysisError::ImagePreparation(format!("Failed to fetch image: {}", e)))?;

    if !response.status().is_success() {
        return Err(AnalysisError::ImagePreparation(format!(
            "Failed to fetch image: {}",
            response.status()
        )));
    }

    let mime_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());

    let bytes = response
        .bytes()
        .await
        .map_err(|e| AnalysisError::ImagePreparation(format!("Failed to read image: {}", e)))?;

    log::debug!("Fetched {} bytes ({}) from {}", bytes.len(), mime_type, image.preview());

    Ok(PreparedImage {
        data: BASE64.encode(&bytes),
        mime_type,
    })
}
