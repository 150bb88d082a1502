//! Analysis invoker: the uniform "image reference → analysis | failure"
//! contract used by both job classes.
//!
//! The remote vision service and the credential source are collaborators
//! behind traits; `http` and `credentials` provide the default adapters.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::Serialize;
use thiserror::Error;

pub mod credentials;
pub mod http;
pub mod image;
pub mod types;

pub use credentials::{AuthError, CredentialProvider, RefreshingCredential, StaticCredential};
pub use http::HttpAnalysisService;
pub use types::{AnalysisRecord, AnalysisResult, ImageReference, SourceReference};

/// Errors from a single analysis call. Job controllers only ever look at
/// the rendered message.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Please sign in to analyze images. Authentication is required to use this feature.")]
    NotSignedIn,

    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Failed to prepare image: {0}")]
    ImagePreparation(String),

    #[error("Network error calling analysis service: {0}")]
    Network(String),

    #[error("Session expired. Please sign out and sign in again.")]
    Unauthorized,

    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited,

    #[error("{0}")]
    Server(String),

    #[error("Analysis failed: {status}")]
    Rejected { status: u16 },

    #[error("Invalid response from analysis service: {0}")]
    InvalidResponse(String),
}

/// Remote vision-analysis collaborator.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Analyzes one image. `credential` is the bearer token to present.
    async fn analyze(
        &self,
        image: &ImageReference,
        credential: &SecretString,
    ) -> Result<AnalysisResult, AnalysisError>;
}

/// Readiness of the analysis path, as reported to callers before they start
/// a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub ready: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub needs_sign_in: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Wraps a service and a credential source behind one call.
#[derive(Clone)]
pub struct AnalysisInvoker {
    service: Arc<dyn AnalysisService>,
    credentials: Arc<dyn CredentialProvider>,
}

impl AnalysisInvoker {
    pub fn new(service: Arc<dyn AnalysisService>, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            service,
            credentials,
        }
    }

    /// Fetches a credential and runs the analysis.
    pub async fn invoke(&self, image: &ImageReference) -> Result<AnalysisResult, AnalysisError> {
        let credential = self
            .credentials
            .credential()
            .await?
            .ok_or(AnalysisError::NotSignedIn)?;

        log::debug!("Invoking analysis for {}", image.preview());
        self.service.analyze(image, &credential).await
    }

    /// Checks whether a credential is currently obtainable.
    pub async fn service_status(&self) -> ServiceStatus {
        match self.credentials.credential().await {
            Ok(Some(_)) => ServiceStatus {
                ready: true,
                needs_sign_in: false,
                error: None,
            },
            Ok(None) => ServiceStatus {
                ready: false,
                needs_sign_in: true,
                error: Some("Please sign in to use the analysis feature.".to_string()),
            },
            Err(e) => ServiceStatus {
                ready: false,
                needs_sign_in: false,
                error: Some(format!("Unable to check service status: {}", e)),
            },
        }
    }
}
