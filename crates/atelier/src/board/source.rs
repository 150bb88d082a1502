//! Paginated source of board items.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::BoardItem;
use crate::analysis::{AuthError, CredentialProvider};

#[derive(Debug, Error)]
pub enum BoardSourceError {
    #[error("Please sign in to load boards.")]
    NotSignedIn,

    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Network error fetching board items: {0}")]
    Network(String),

    #[error("Board source returned {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid response from board source: {0}")]
    InvalidResponse(String),
}

/// One page of items plus the continuation bookmark.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BoardPage {
    #[serde(default, alias = "pins")]
    pub items: Vec<BoardItem>,
    #[serde(default)]
    pub bookmark: Option<String>,
}

#[async_trait]
pub trait BoardSource: Send + Sync {
    async fn fetch_page(
        &self,
        board_id: &str,
        bookmark: Option<&str>,
    ) -> Result<BoardPage, BoardSourceError>;
}

/// Upper bound on pages requested for one board, whatever the bookmarks say.
pub const MAX_PAGES: usize = 25;

/// Follows bookmarks until the board is exhausted, `limit` items have been
/// collected, a page comes back empty or `MAX_PAGES` pages were fetched.
/// The result never exceeds `limit`.
pub async fn collect_board_items(
    source: &dyn BoardSource,
    board_id: &str,
    limit: usize,
) -> Result<Vec<BoardItem>, BoardSourceError> {
    let mut items = Vec::new();
    let mut bookmark: Option<String> = None;

    for page_number in 1..=MAX_PAGES {
        let page = source.fetch_page(board_id, bookmark.as_deref()).await?;
        if page.items.is_empty() {
            log::debug!("Board {} page {} is empty, stopping", board_id, page_number);
            break;
        }
        items.extend(page.items);

        match page.bookmark.filter(|b| !b.is_empty()) {
            Some(next) if items.len() < limit => bookmark = Some(next),
            _ => break,
        }

        if page_number == MAX_PAGES {
            log::warn!(
                "Board {} still has pages after {}, stopping at {} items",
                board_id,
                MAX_PAGES,
                items.len()
            );
        }
    }

    items.truncate(limit);
    log::info!("Collected {} items from board {}", items.len(), board_id);
    Ok(items)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PageRequest<'a> {
    board_id: &'a str,
    bookmark: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    access_token: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PageResponse {
    #[serde(default)]
    success: bool,
    data: Option<BoardPage>,
    error: Option<String>,
}

/// Board source backed by an HTTP endpoint that proxies the board API.
pub struct HttpBoardSource {
    client: Client,
    endpoint: String,
    credentials: Arc<dyn CredentialProvider>,
    /// Token for the board provider itself, forwarded in the request body.
    access_token: Option<SecretString>,
}

impl HttpBoardSource {
    pub fn new(
        endpoint: &str,
        credentials: Arc<dyn CredentialProvider>,
        access_token: Option<SecretString>,
        request_timeout: Duration,
    ) -> Result<Self, BoardSourceError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| BoardSourceError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            credentials,
            access_token,
        })
    }
}

#[async_trait]
impl BoardSource for HttpBoardSource {
    async fn fetch_page(
        &self,
        board_id: &str,
        bookmark: Option<&str>,
    ) -> Result<BoardPage, BoardSourceError> {
        let credential = self
            .credentials
            .credential()
            .await?
            .ok_or(BoardSourceError::NotSignedIn)?;

        let request = PageRequest {
            board_id,
            bookmark,
            access_token: self.access_token.as_ref().map(|t| t.expose_secret()),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(credential.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| BoardSourceError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BoardSourceError::Network(e.to_string()))?;

        let parsed: PageResponse = serde_json::from_str(&body).map_err(|e| {
            if status.is_success() {
                BoardSourceError::InvalidResponse(e.to_string())
            } else {
                BoardSourceError::Rejected {
                    status: status.as_u16(),
                    message: "Failed to fetch pins".to_string(),
                }
            }
        })?;

        match (status.is_success() && parsed.success, parsed.data) {
            (true, Some(page)) => Ok(page),
            (true, None) => Err(BoardSourceError::InvalidResponse("missing data".to_string())),
            (false, _) => Err(BoardSourceError::Rejected {
                status: status.as_u16(),
                message: parsed
                    .error
                    .unwrap_or_else(|| "Failed to fetch pins".to_string()),
            }),
        }
    }
}
