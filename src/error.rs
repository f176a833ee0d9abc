// src/error.rs
// Turn-level errors and their HTTP mapping.

use crate::assistant::AssistantError;
use crate::memory::llm_provider::LLMError;
use crate::memory::query::RagError;
use crate::retriever::IndexError;
use crate::session::SessionError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Message content is empty")]
    EmptyInput,
    #[error("No quick reply at index {0}")]
    InvalidQuickReply(usize),
    #[error("Session {0} not found")]
    SessionNotFound(Uuid),
    /// Carries the user-facing text.
    #[error("{0}")]
    NoDocuments(String),
    #[error(transparent)]
    Index(IndexError),
    #[error(transparent)]
    LLM(#[from] LLMError),
    #[error(transparent)]
    Assistant(AssistantError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<SessionError> for ChatError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::EmptyInput => ChatError::EmptyInput,
            other => ChatError::Internal(other.to_string()),
        }
    }
}

impl From<IndexError> for ChatError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::NoDocuments(dir) => ChatError::NoDocuments(format!("No PDF documents found in {}", dir)),
            other => ChatError::Index(other),
        }
    }
}

impl From<RagError> for ChatError {
    fn from(err: RagError) -> Self {
        match err {
            RagError::Index(e) => e.into(),
            RagError::LLM(e) => ChatError::LLM(e),
        }
    }
}

impl From<AssistantError> for ChatError {
    fn from(err: AssistantError) -> Self {
        match err {
            AssistantError::Session(e) => e.into(),
            other => ChatError::Assistant(other),
        }
    }
}

/// Short id for correlating a response with log lines.
pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()[..8].to_string()
}

impl ResponseError for ChatError {
    fn status_code(&self) -> StatusCode {
        match self {
            ChatError::EmptyInput | ChatError::InvalidQuickReply(_) => StatusCode::BAD_REQUEST,
            ChatError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            ChatError::NoDocuments(_) => StatusCode::SERVICE_UNAVAILABLE,
            ChatError::LLM(_) => StatusCode::BAD_GATEWAY,
            ChatError::Assistant(AssistantError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            ChatError::Assistant(AssistantError::Cancelled) => StatusCode::GONE,
            ChatError::Assistant(_) => StatusCode::BAD_GATEWAY,
            ChatError::Index(_) | ChatError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let request_id = generate_request_id();
        let status = self.status_code();
        if status.is_server_error() {
            error!(request_id = %request_id, status = status.as_u16(), error = %self, "Request failed");
        }
        HttpResponse::build(status).json(json!({
            "status": "error",
            "message": self.to_string(),
            "request_id": request_id
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ChatError::EmptyInput.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ChatError::SessionNotFound(Uuid::new_v4()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ChatError::from(IndexError::NoDocuments("data".into())).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ChatError::from(RagError::LLM(LLMError::ConnectionFailed("x".into()))).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ChatError::from(AssistantError::Timeout(Duration::from_secs(120))).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn test_session_errors_convert() {
        assert!(matches!(ChatError::from(SessionError::EmptyInput), ChatError::EmptyInput));
        assert!(matches!(
            ChatError::from(AssistantError::Session(SessionError::EmptyInput)),
            ChatError::EmptyInput
        ));
    }
}
