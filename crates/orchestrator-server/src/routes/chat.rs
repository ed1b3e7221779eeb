use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use orchestrator::agent::{convert_history, HistoryEntry};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    message: String,
    #[serde(default)]
    conversation_history: Vec<HistoryEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatResponse {
    response: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

/// The caller's GitHub token: a bearer header wins over the session cookie, which wins
/// over the process-wide fallback
fn credential(headers: &HeaderMap, cookie_name: &str, fallback: Option<&str>) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());

    let cookie = || {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|cookies| cookies.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, value)| *name == cookie_name && !value.is_empty())
            .map(|(_, value)| value)
    };

    bearer
        .or_else(cookie)
        .or(fallback.filter(|token| !token.is_empty()))
        .map(str::to_string)
}

async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return error_response(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };
    if request.message.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "message is required");
    }

    let credential = credential(
        &headers,
        &state.cookie_name,
        state.fallback_token.as_deref(),
    );
    let history = convert_history(&request.conversation_history);

    let reply = state
        .agent
        .reply(&request.message, &history, credential.as_deref());
    match tokio::time::timeout(state.request_timeout, reply).await {
        Ok(Ok(response)) => Json(ChatResponse { response }).into_response(),
        Ok(Err(e)) => {
            tracing::error!("chat request failed: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
        Err(_) => {
            tracing::error!(
                timeout_secs = state.request_timeout.as_secs(),
                "chat request timed out"
            );
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "request timed out")
        }
    }
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .with_state(state)
}
