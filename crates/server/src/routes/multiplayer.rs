use axum::{extract::Path, Extension, Json};

use crate::error::AppError;
use crate::state::AppState;
use crate::sync::MultiplayerGameState;

/// GET /api/multiplayer/games/{game_id}
pub async fn get_game(
    Extension(state): Extension<AppState>,
    Path(game_id): Path<String>,
) -> Result<Json<MultiplayerGameState>, AppError> {
    Ok(Json(state.games.fetch_state(&game_id).await?))
}
