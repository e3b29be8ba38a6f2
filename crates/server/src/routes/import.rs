use axum::{extract::Path, extract::Query, Extension, Json};
use chess_core::Game;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use crate::clients::chess_com::ChessComQuery;
use crate::clients::lichess::LichessQuery;
use crate::clients::ImportError;
use crate::error::AppError;
use crate::state::AppState;

const MAX_IMPORT: usize = 500;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LichessImportQuery {
    pub max: Option<usize>,
    pub rated: Option<bool>,
    pub perf_type: Option<String>,
    pub since: Option<i64>,
    pub until: Option<i64>,
}

#[derive(Deserialize)]
pub struct ChessComImportQuery {
    pub max: Option<usize>,
    pub year: Option<i32>,
    pub month: Option<u32>,
}

/// Games collected before a failure are still returned, with the error
/// alongside. A failure with nothing collected is an error response.
fn import_response(result: Result<Vec<Game>, ImportError>) -> Result<Json<JsonValue>, AppError> {
    let (games, error) = match result {
        Ok(games) => (games, None),
        Err(e) if e.partial.is_empty() => return Err(e.source.into()),
        Err(e) => {
            tracing::warn!("{e}");
            let message = e.to_string();
            (e.partial, Some(message))
        }
    };
    Ok(Json(json!({
        "count": games.len(),
        "games": games,
        "error": error,
    })))
}

/// GET /api/import/lichess/{username}
pub async fn import_lichess(
    Extension(state): Extension<AppState>,
    Path(username): Path<String>,
    Query(q): Query<LichessImportQuery>,
) -> Result<Json<JsonValue>, AppError> {
    let query = LichessQuery {
        max: q.max.unwrap_or(100).min(MAX_IMPORT),
        rated: q.rated,
        perf_type: q.perf_type,
        since: q.since,
        until: q.until,
    };
    import_response(state.lichess.fetch_user_games(&username, &query, None).await)
}

/// GET /api/import/chesscom/{username}
pub async fn import_chess_com(
    Extension(state): Extension<AppState>,
    Path(username): Path<String>,
    Query(q): Query<ChessComImportQuery>,
) -> Result<Json<JsonValue>, AppError> {
    let query = ChessComQuery {
        max: q.max.unwrap_or(100).min(MAX_IMPORT),
        year: q.year,
        month: q.month,
    };
    import_response(state.chess_com.fetch_user_games(&username, &query, None).await)
}
