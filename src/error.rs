use axum::Json;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::result::ApiResponse;
use crate::utils::error_codes;

/// 客户端所有可能的失败类型
///
/// Values are recorded in view state (`RefreshCycle::last_error`, the signal
/// banner, the chat "paused" line), so they carry plain strings instead of
/// source errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VibeError {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Location unavailable")]
    LocationUnavailable,

    #[error("Timed out waiting for a location fix")]
    Timeout,

    #[error("Nearby query failed: {0}")]
    QueryFailed(String),

    #[error("Failed to send vibe: {0}")]
    SignalSendFailed(String),

    #[error("Failed to resolve conversation: {0}")]
    ConversationResolutionFailed(String),

    #[error("Realtime channel disconnected: {0}")]
    ChannelDisconnected(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("{0}")]
    Validation(String),

    #[error("Not signed in")]
    Unauthenticated,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl VibeError {
    /// The bare reason, without the variant's prefix, for re-wrapping.
    pub fn reason(&self) -> String {
        match self {
            VibeError::QueryFailed(r)
            | VibeError::SignalSendFailed(r)
            | VibeError::ConversationResolutionFailed(r)
            | VibeError::ChannelDisconnected(r)
            | VibeError::Backend(r)
            | VibeError::Validation(r)
            | VibeError::Config(r) => r.clone(),
            other => other.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            VibeError::PermissionDenied => StatusCode::FORBIDDEN,
            VibeError::Validation(_) => StatusCode::BAD_REQUEST,
            VibeError::Unauthenticated => StatusCode::UNAUTHORIZED,
            VibeError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            VibeError::LocationUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            VibeError::QueryFailed(_)
            | VibeError::SignalSendFailed(_)
            | VibeError::ConversationResolutionFailed(_)
            | VibeError::ChannelDisconnected(_)
            | VibeError::Backend(_) => StatusCode::BAD_GATEWAY,
            VibeError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn api_code(&self) -> i32 {
        match self {
            VibeError::Validation(_) => error_codes::VALIDATION_ERROR,
            VibeError::Unauthenticated => error_codes::AUTH_FAILED,
            VibeError::PermissionDenied => error_codes::PERMISSION_DENIED,
            VibeError::LocationUnavailable | VibeError::Timeout => error_codes::LOCATION_ERROR,
            VibeError::QueryFailed(_)
            | VibeError::SignalSendFailed(_)
            | VibeError::ConversationResolutionFailed(_)
            | VibeError::ChannelDisconnected(_)
            | VibeError::Backend(_) => error_codes::BACKEND_ERROR,
            VibeError::Config(_) => error_codes::INTERNAL_ERROR,
        }
    }
}

impl From<reqwest::Error> for VibeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            VibeError::Timeout
        } else {
            VibeError::Backend(e.to_string())
        }
    }
}

impl IntoResponse for VibeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(ApiResponse::<()> {
            code: self.api_code(),
            msg: self.to_string(),
            resp_data: None,
        });

        (status, body).into_response()
    }
}
