//! Mapping of application errors onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::AppError;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::UnknownAgent(_) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Precondition(_) => StatusCode::CONFLICT,
            Self::AgentUnreachable(_) | Self::AgentCommandFailed(_) => StatusCode::BAD_GATEWAY,
            Self::TransferStalled(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Config(_) | Self::Db(_) | Self::Io(_) | Self::Internal(_) => {
                error!(err = %self, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
