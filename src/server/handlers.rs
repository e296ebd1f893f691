use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::chat::context::ContextMessage;
use crate::chat::error::ChatError;
use crate::chat::persona;

use super::error::ApiError;
use super::session::BrowserSession;
use super::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ChatResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChatResponse {
    pub fn reply(response: String) -> Self {
        Self {
            success: true,
            response: Some(response),
            error: None,
        }
    }

    pub fn failure(notice: &str) -> Self {
        Self {
            success: false,
            response: None,
            error: Some(notice.to_string()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClearHistoryResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub history: Vec<ContextMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GreetingResponse {
    pub success: bool,
    pub greeting: String,
}

/// GET /greeting (and GET / without static files) - start (or resume) a
/// session and return the greeting.
pub async fn greeting(
    State(state): State<AppState>,
    session: BrowserSession,
) -> (BrowserSession, Json<GreetingResponse>) {
    if session.is_fresh() {
        info!("New browser session {}", session.key);
    }
    let greeting = state.chat.greeting().to_string();
    (
        session,
        Json(GreetingResponse {
            success: true,
            greeting,
        }),
    )
}

/// POST /chat - run one message through the assistant.
pub async fn chat(
    State(state): State<AppState>,
    session: BrowserSession,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<(BrowserSession, Json<ChatResponse>), ApiError> {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!("Unreadable chat request body: {}", rejection);
            return Err(ChatError::InvalidInput.into());
        }
    };

    let reply = state.chat.send(&session.key, &request.message).await?;
    if reply.degraded {
        warn!("Session {} answered with the fallback notice", session.key);
    }

    Ok((session, Json(ChatResponse::reply(reply.response))))
}

/// POST /clear_history
pub async fn clear_history(
    State(state): State<AppState>,
    session: BrowserSession,
) -> Result<(BrowserSession, Json<ClearHistoryResponse>), ApiError> {
    state.chat.clear(&session.key)?;
    Ok((
        session,
        Json(ClearHistoryResponse {
            success: true,
            message: persona::HISTORY_CLEARED.to_string(),
        }),
    ))
}

/// GET /get_history
pub async fn get_history(
    State(state): State<AppState>,
    session: BrowserSession,
) -> (BrowserSession, Json<HistoryResponse>) {
    let history = state.chat.history(&session.key);
    (session, Json(HistoryResponse { history }))
}

/// GET /health
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
