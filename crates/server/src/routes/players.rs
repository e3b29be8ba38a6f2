use axum::{extract::Path, Extension, Json};
use serde_json::{json, Value as JsonValue};

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/players/{platform}/{username}/exists
pub async fn player_exists(
    Extension(state): Extension<AppState>,
    Path((platform, username)): Path<(String, String)>,
) -> Result<Json<JsonValue>, AppError> {
    let exists = match platform.as_str() {
        "lichess" => state.lichess.verify_username(&username).await,
        "chesscom" | "chess_com" => state.chess_com.verify_username(&username).await,
        other => return Err(AppError::BadRequest(format!("Unknown platform: {other}"))),
    };
    Ok(Json(json!({
        "platform": platform,
        "username": username,
        "exists": exists,
    })))
}
