//! reqwest adapter for the remote vision-analysis endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::image::prepare_image;
use super::{AnalysisError, AnalysisResult, AnalysisService, ImageReference};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeRequest<'a> {
    image_data: &'a str,
    mime_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    #[serde(default)]
    success: bool,
    data: Option<AnalysisResult>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// Posts `{imageData, mimeType}` with a bearer token and expects
/// `{success: true, data: {...}}` back.
pub struct HttpAnalysisService {
    client: Client,
    endpoint: String,
}

impl HttpAnalysisService {
    pub fn new(
        endpoint: &str,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, AnalysisError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(|e| AnalysisError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

/// Maps a non-success status (and its body, if any) to an analysis error.
fn error_for_status(status: StatusCode, body: &str) -> AnalysisError {
    match status {
        StatusCode::UNAUTHORIZED => AnalysisError::Unauthorized,
        StatusCode::TOO_MANY_REQUESTS => AnalysisError::RateLimited,
        StatusCode::INTERNAL_SERVER_ERROR => {
            let message = serde_json::from_str::<ErrorBody>(body)
                .ok()
                .and_then(|b| b.error)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "Server error. Please try again later.".to_string());
            AnalysisError::Server(message)
        }
        other => AnalysisError::Rejected {
            status: other.as_u16(),
        },
    }
}

fn parse_success_body(body: &str) -> Result<AnalysisResult, AnalysisError> {
    let parsed: AnalyzeResponse = serde_json::from_str(body)
        .map_err(|e| AnalysisError::InvalidResponse(e.to_string()))?;

    match (parsed.success, parsed.data) {
        (true, Some(data)) => Ok(data),
        _ => Err(AnalysisError::InvalidResponse(
            "missing success flag or data".to_string(),
        )),
    }
}

#[async_trait]
impl AnalysisService for HttpAnalysisService {
    async fn analyze(
        &self,
        image: &ImageReference,
        credential: &SecretString,
    ) -> Result<AnalysisResult, AnalysisError> {
        let prepared = prepare_image(&self.client, image).await?;

        let request = AnalyzeRequest {
            image_data: &prepared.data,
            mime_type: &prepared.mime_type,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(credential.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| AnalysisError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AnalysisError::Network(e.to_string()))?;

        if !status.is_success() {
            log::warn!("Analysis service returned {}", status);
            return Err(error_for_status(status, &body));
        }

        parse_success_body(&body)
    }
}
