// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use commitlog::LogError;
use thiserror::Error;

use crate::api::ErrorBody;

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("{0}")]
    PermissionDenied(String),
    #[error("{0}")]
    Unauthenticated(String),
    #[error("offset out of range: {0}")]
    OffsetOutOfRange(u64),
    #[error("Log error: {0}")]
    Log(LogError),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl NodeError {
    pub fn status(&self) -> StatusCode {
        match self {
            NodeError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            NodeError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            NodeError::OffsetOutOfRange(_) => StatusCode::NOT_FOUND,
            NodeError::Log(LogError::RecordTooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            NodeError::Log(_) => StatusCode::INTERNAL_SERVER_ERROR,
            NodeError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            NodeError::Network(_) => StatusCode::BAD_GATEWAY,
            NodeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            NodeError::PermissionDenied(_) => "permission_denied",
            NodeError::Unauthenticated(_) => "unauthenticated",
            NodeError::OffsetOutOfRange(_) => "offset_out_of_range",
            NodeError::Log(LogError::RecordTooLarge { .. }) => "record_too_large",
            NodeError::Log(_) => "log",
            NodeError::InvalidInput(_) => "invalid_input",
            NodeError::Network(_) => "network",
            NodeError::Internal(_) => "internal",
        }
    }

    pub fn is_out_of_range(&self) -> bool {
        matches!(self, NodeError::OffsetOutOfRange(_))
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error: self.to_string(),
            code: self.code().to_string(),
            offset: match self {
                NodeError::OffsetOutOfRange(offset) => Some(*offset),
                _ => None,
            },
        }
    }

    /// Rebuild an error from a status code and error body sent by a peer.
    pub fn from_remote(status: StatusCode, body: ErrorBody) -> Self {
        match body.code.as_str() {
            "permission_denied" => NodeError::PermissionDenied(body.error),
            "unauthenticated" => NodeError::Unauthenticated(body.error),
            "offset_out_of_range" => NodeError::OffsetOutOfRange(body.offset.unwrap_or_default()),
            "invalid_input" => NodeError::InvalidInput(body.error),
            _ => NodeError::Network(format!("{}: {}", status, body.error)),
        }
    }
}

impl IntoResponse for NodeError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.to_body())).into_response()
    }
}

impl From<LogError> for NodeError {
    fn from(e: LogError) -> Self {
        match e {
            LogError::OffsetOutOfRange(offset) => NodeError::OffsetOutOfRange(offset),
            other => NodeError::Log(other),
        }
    }
}

impl From<JsonRejection> for NodeError {
    fn from(e: JsonRejection) -> Self {
        NodeError::InvalidInput(e.body_text())
    }
}

impl From<QueryRejection> for NodeError {
    fn from(e: QueryRejection) -> Self {
        NodeError::InvalidInput(e.body_text())
    }
}

impl From<reqwest::Error> for NodeError {
    fn from(e: reqwest::Error) -> Self {
        NodeError::Network(e.to_string())
    }
}
