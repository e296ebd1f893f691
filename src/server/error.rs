use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::chat::error::ChatError;

use super::handlers::ChatResponse;

/// Maps chat failures onto the `{success: false, error}` envelope.
#[derive(Debug)]
pub struct ApiError(pub ChatError);

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ChatError::InvalidInput => {
                tracing::warn!("Rejected chat request: {}", self.0);
                StatusCode::BAD_REQUEST
            }
            ChatError::Unexpected(_) => {
                tracing::error!("Chat error: {}", self.0);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(ChatResponse::failure(self.0.user_notice()))).into_response()
    }
}
