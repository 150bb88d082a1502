//! Request/response envelope spoken by transient callers.
//!
//! A request is a JSON object with an `action` tag; every response is
//! `{success, data?, error?}`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::analysis::ImageReference;
use crate::board::BoardItem;
use crate::jobs::{JobClass, JobRequest, Orchestrator};

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed request: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unknown action")]
    UnknownAction(String),

    #[error("Invalid {action} request: {message}")]
    InvalidRequest { action: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    #[serde(rename_all = "camelCase")]
    StartImageAnalysis {
        #[serde(alias = "imageUrl")]
        image_reference: ImageReference,
    },
    GetImageAnalysisStatus,
    CancelImageAnalysis,
    ClearImageAnalysis,
    #[serde(rename_all = "camelCase")]
    StartBoardAnalysis {
        board_id: String,
        #[serde(default, alias = "boardName")]
        display_name: String,
        #[serde(default, alias = "boardPinCount")]
        declared_total: Option<usize>,
        #[serde(default, alias = "pins")]
        items: Vec<BoardItem>,
    },
    GetBoardAnalysisStatus,
    CancelBoardAnalysis,
    ClearBoardAnalysis,
    CheckServiceStatus,
}

impl Request {
    pub const ACTIONS: [&'static str; 9] = [
        "startImageAnalysis",
        "getImageAnalysisStatus",
        "cancelImageAnalysis",
        "clearImageAnalysis",
        "startBoardAnalysis",
        "getBoardAnalysisStatus",
        "cancelBoardAnalysis",
        "clearBoardAnalysis",
        "checkServiceStatus",
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok(data: Option<Value>) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Decodes one request, telling unknown actions apart from bad payloads.
pub fn parse_request(raw: &str) -> Result<Request, ProtocolError> {
    let value: Value = serde_json::from_str(raw)?;
    let action = value
        .get("action")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    if !Request::ACTIONS.contains(&action.as_str()) {
        return Err(ProtocolError::UnknownAction(action));
    }

    serde_json::from_value(value).map_err(|e| ProtocolError::InvalidRequest {
        action,
        message: e.to_string(),
    })
}

fn to_data<T: Serialize>(value: &T) -> Response {
    match serde_json::to_value(value) {
        Ok(data) => Response::ok(Some(data)),
        Err(e) => Response::failure(format!("Failed to encode response: {}", e)),
    }
}

async fn status(orchestrator: &Orchestrator, class: JobClass) -> Response {
    match orchestrator.get_status(class).await {
        Ok(status) => to_data(&status),
        Err(e) => Response::failure(e.to_string()),
    }
}

async fn cancel(orchestrator: &Orchestrator, class: JobClass) -> Response {
    match orchestrator.cancel(class).await {
        Ok(cancelled) => Response::ok(Some(json!({ "cancelled": cancelled }))),
        Err(e) => Response::failure(e.to_string()),
    }
}

async fn clear(orchestrator: &Orchestrator, class: JobClass) -> Response {
    match orchestrator.clear(class).await {
        Ok(cleared) => Response::ok(Some(json!({ "cleared": cleared }))),
        Err(e) => Response::failure(e.to_string()),
    }
}

/// Executes one request. Starting a job returns once the initial record is
/// written; nothing here waits for a job to finish. A board request without
/// items pulls them from the orchestrator's board source, if it has one.
pub async fn dispatch(orchestrator: &Orchestrator, request: Request) -> Response {
    match request {
        Request::StartImageAnalysis { image_reference } => {
            match orchestrator.start_image_job(image_reference).await {
                Ok(ticket) => to_data(&ticket),
                Err(e) => Response::failure(e.to_string()),
            }
        }
        Request::GetImageAnalysisStatus => status(orchestrator, JobClass::SingleImage).await,
        Request::CancelImageAnalysis => cancel(orchestrator, JobClass::SingleImage).await,
        Request::ClearImageAnalysis => clear(orchestrator, JobClass::SingleImage).await,
        Request::StartBoardAnalysis {
            board_id,
            display_name,
            declared_total,
            items,
        } => match orchestrator
            .start_job(JobRequest::Board {
                board_id,
                display_name,
                declared_total,
                items,
            })
            .await
        {
            Ok(ticket) => to_data(&ticket),
            Err(e) => Response::failure(e.to_string()),
        },
        Request::GetBoardAnalysisStatus => status(orchestrator, JobClass::Board).await,
        Request::CancelBoardAnalysis => cancel(orchestrator, JobClass::Board).await,
        Request::ClearBoardAnalysis => clear(orchestrator, JobClass::Board).await,
        Request::CheckServiceStatus => to_data(&orchestrator.service_status().await),
    }
}

/// Parses and executes one raw JSON request.
pub async fn dispatch_raw(orchestrator: &Orchestrator, raw: &str) -> Response {
    match parse_request(raw) {
        Ok(request) => dispatch(orchestrator, request).await,
        Err(e) => {
            log::warn!("Rejected request: {}", e);
            Response::failure(e.to_string())
        }
    }
}
