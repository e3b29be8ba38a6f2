use axum::{Extension, Json};
use serde_json::{json, Value as JsonValue};

use crate::config::FeedbackMode;
use crate::state::AppState;

/// GET /health
pub async fn health_check(Extension(state): Extension<AppState>) -> Json<JsonValue> {
    let feedback = match state.feedback.mode() {
        FeedbackMode::RuleBased => "rule-based",
        FeedbackMode::OpenAi { .. } => "openai",
        FeedbackMode::Ollama { .. } => "ollama",
    };
    Json(json!({
        "status": "ok",
        "engine": state.engine.state(),
        "engineQueue": state.engine.queue_size(),
        "feedback": feedback,
        "multiplayer": state.games.is_configured(),
    }))
}
