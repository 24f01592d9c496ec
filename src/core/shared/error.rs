use axum::{response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest error detail recorded in an `AGENT_TRIAGE_FAILED` audit entry.
pub const MAX_ERROR_DETAIL: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Classification,
    Retrieval,
    Drafting,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Classification => "classification",
            Self::Retrieval => "retrieval",
            Self::Drafting => "drafting",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Version conflict on {id}: expected {expected}, found {actual}")]
    Conflict { id: String, expected: u64, actual: u64 },
    #[error("Malformed document: {0}")]
    Malformed(String),
    #[error("Backend error: {0}")]
    Backend(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TriageError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("{stage} failed: {message}")]
    Upstream {
        stage: PipelineStage,
        message: String,
    },
    #[error("Not implemented: {0}")]
    NotImplemented(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Audit write failed: {0}")]
    AuditWrite(String),
    #[error("Decision failed: {0}")]
    Decision(String),
    #[error("Dispatch failed: {0}")]
    Dispatch(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TriageError {
    pub fn upstream(stage: PipelineStage, err: impl fmt::Display) -> Self {
        Self::Upstream {
            stage,
            message: err.to_string(),
        }
    }

    /// Error text cut down to what the audit trail keeps.
    pub fn truncated_detail(&self) -> String {
        self.to_string().chars().take(MAX_ERROR_DETAIL).collect()
    }
}

impl IntoResponse for TriageError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;
        let status = match &self {
            Self::NotFound(_) | Self::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Store(StoreError::Conflict { .. }) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
