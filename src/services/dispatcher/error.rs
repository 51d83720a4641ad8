use http::StatusCode;
use thiserror::Error;

use crate::services::registry::ParseStatusError;
use crate::services::retry::TriggerError;

/// 分发错误类型，每种错误对应唯一的 HTTP 状态码
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Request path: {path} not supported by eureka mock.")]
    Unroutable { path: String },

    #[error("{accept} is not allowed (use application/json)")]
    UnsupportedMediaType { accept: String },

    #[error("Malformed trigger value: {0}")]
    Trigger(#[from] TriggerError),

    #[error("Invalid FailHeartbeatResponseCode metadata value: {value}")]
    InvalidFailureCode { value: String },

    #[error("Invalid response status code: {code}")]
    InvalidStatusCode { code: u32 },

    #[error("Invalid status change: {0}")]
    InvalidStatus(#[from] ParseStatusError),

    #[error("Missing 'value' query parameter for status change")]
    MissingStatusValue,

    #[error("Malformed registration body: {0}")]
    MalformedBody(String),

    #[error("Failed to encode response: {0}")]
    Encode(#[source] serde_json::Error),
}

impl DispatchError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DispatchError::Unroutable { .. } => StatusCode::NOT_FOUND,
            DispatchError::MalformedBody(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
