use axum::{
    extract::State,
    http::StatusCode,
    response::Html,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::state::AppState;

const REPLY_HEADER: &str = "**AI Assistant:**\n\n";
const INDEX_PAGE: &str = include_str!("../../static/index.html");

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
enum ChatResponse {
    Response(String),
    Error(String),
}

impl ChatResponse {
    fn error(status: StatusCode, message: &str) -> (StatusCode, Json<ChatResponse>) {
        (status, Json(ChatResponse::Error(message.to_string())))
    }
}

async fn chat_handler(
    State(state): State<AppState>,
    request: Option<Json<ChatRequest>>,
) -> (StatusCode, Json<ChatResponse>) {
    let message = request
        .and_then(|Json(request)| request.message)
        .filter(|message| !message.trim().is_empty());
    let Some(message) = message else {
        return ChatResponse::error(StatusCode::BAD_REQUEST, "Message is required");
    };

    let mut agent = state.agent.lock().await;
    match agent.ask(message).await {
        Ok(reply) => (
            StatusCode::OK,
            Json(ChatResponse::Response(format!("{}{}", REPLY_HEADER, reply))),
        ),
        Err(e) => {
            error!(error = ?e, "Error processing chat request");
            ChatResponse::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "An error occurred while processing your request.",
            )
        }
    }
}

async fn reset_handler(State(state): State<AppState>) -> (StatusCode, Json<ChatResponse>) {
    state.agent.lock().await.reset();
    info!("Conversation reset");
    (
        StatusCode::OK,
        Json(ChatResponse::Response("Conversation reset.".to_string())),
    )
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_PAGE)
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/chat", post(chat_handler))
        .route("/reset", post(reset_handler))
        .with_state(state)
}
