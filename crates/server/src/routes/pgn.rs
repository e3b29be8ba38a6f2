use axum::Json;
use chess_core::{pgn, Source};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use crate::error::AppError;

#[derive(Deserialize)]
pub struct ParsePgnRequest {
    pub pgn: String,
}

/// POST /api/pgn/parse
///
/// Manual import of one or more games. Records that fail to replay are
/// skipped and counted.
pub async fn parse_pgn(Json(body): Json<ParsePgnRequest>) -> Result<Json<JsonValue>, AppError> {
    if body.pgn.trim().is_empty() {
        return Err(AppError::BadRequest("PGN text is empty".into()));
    }

    let mut games = Vec::new();
    let mut skipped = 0usize;
    for record in pgn::split_games(&body.pgn) {
        match pgn::to_game(&record, Source::Manual) {
            Ok(game) => games.push(game),
            Err(e) => {
                tracing::warn!("Skipping PGN record: {e}");
                skipped += 1;
            }
        }
    }

    Ok(Json(json!({
        "count": games.len(),
        "games": games,
        "skipped": skipped,
    })))
}
