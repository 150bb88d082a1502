//! Bearer credentials for the analysis service.
//!
//! `RefreshingCredential` caches an ID token with an expiry and exchanges a
//! refresh token at the token endpoint once it lapses.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;

/// Tokens are treated as expired this long before the server says so.
const EXPIRY_SKEW: Duration = Duration::from_secs(60);

/// Maximum length for error bodies echoed into messages.
const MAX_ERROR_BODY_LENGTH: usize = 200;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Failed to create HTTP client: {0}")]
    Client(String),
}

/// Source of the bearer credential. `Ok(None)` means "signed out".
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn credential(&self) -> Result<Option<SecretString>, AuthError>;
}

/// A fixed credential, or none at all (signed out).
pub struct StaticCredential {
    token: Option<SecretString>,
}

impl StaticCredential {
    pub fn new(token: &str) -> Self {
        Self {
            token: Some(SecretString::from(token.to_string())),
        }
    }

    pub fn from_secret(token: Option<SecretString>) -> Self {
        Self { token }
    }

    pub fn signed_out() -> Self {
        Self { token: None }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredential {
    async fn credential(&self) -> Result<Option<SecretString>, AuthError> {
        Ok(self.token.clone())
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    /// Seconds, sent as a string by the token service.
    expires_in: String,
}

struct TokenState {
    id_token: Option<SecretString>,
    expires_at: Option<DateTime<Utc>>,
    refresh_token: Option<SecretString>,
}

/// Cached ID token refreshed through a secure-token endpoint.
#[derive(Clone)]
pub struct RefreshingCredential {
    client: Client,
    token_url: String,
    state: Arc<Mutex<TokenState>>,
}

impl RefreshingCredential {
    /// Creates a credential source. `token_url` must include any API key
    /// query parameter the endpoint expects.
    pub fn new(
        token_url: &str,
        id_token: Option<SecretString>,
        refresh_token: Option<SecretString>,
        request_timeout: Duration,
    ) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| AuthError::Client(e.to_string()))?;

        Ok(Self {
            client,
            token_url: token_url.to_string(),
            state: Arc::new(Mutex::new(TokenState {
                id_token,
                expires_at: None,
                refresh_token,
            })),
        })
    }

    /// Seeds the cache with a token whose lifetime is known.
    pub async fn set_token(&self, id_token: SecretString, expires_in: Duration) {
        let mut state = self.state.lock().await;
        state.id_token = Some(id_token);
        state.expires_at = Some(expiry_from(Utc::now(), expires_in));
    }

    async fn refresh(&self, refresh_token: &SecretString) -> Result<RefreshResponse, AuthError> {
        log::info!("Refreshing analysis service ID token");

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.expose_secret()),
        ];

        let response = self
            .client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::RefreshFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::RefreshFailed(format!(
                "{}: {}",
                status,
                truncate(&body, MAX_ERROR_BODY_LENGTH)
            )));
        }

        response
            .json::<RefreshResponse>()
            .await
            .map_err(|e| AuthError::RefreshFailed(format!("Invalid refresh response: {}", e)))
    }
}

#[async_trait]
impl CredentialProvider for RefreshingCredential {
    async fn credential(&self) -> Result<Option<SecretString>, AuthError> {
        let mut state = self.state.lock().await;

        let still_valid = match state.expires_at {
            Some(expires_at) => Utc::now() < expires_at,
            // Unknown lifetime: trust the token until the service rejects it.
            None => true,
        };
        if still_valid {
            if let Some(token) = &state.id_token {
                return Ok(Some(token.clone()));
            }
        }

        let refresh_token = match &state.refresh_token {
            Some(token) => token.clone(),
            None => return Ok(None),
        };

        match self.refresh(&refresh_token).await {
            Ok(refreshed) => {
                let lifetime = refreshed
                    .expires_in
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .unwrap_or(Duration::from_secs(3600));
                let token = SecretString::from(refreshed.id_token);
                state.id_token = Some(token.clone());
                state.refresh_token = Some(SecretString::from(refreshed.refresh_token));
                state.expires_at = Some(expiry_from(Utc::now(), lifetime));
                log::info!("ID token refreshed");
                Ok(Some(token))
            }
            Err(e) => {
                log::warn!("Token refresh failed, treating as signed out: {}", e);
                state.id_token = None;
                Ok(None)
            }
        }
    }
}

fn expiry_from(now: DateTime<Utc>, lifetime: Duration) -> DateTime<Utc> {
    let effective = lifetime.saturating_sub(EXPIRY_SKEW);
    now + chrono::Duration::from_std(effective).unwrap_or_else(|_| chrono::Duration::zero())
}

fn truncate(body: &str, max: usize) -> String {
    match body.char_indices().nth(max) {
        Some((idx, _)) => format!("{}... (truncated)", &body[..idx]),
        None => body.to_string(),
    }
}
