use axum::{Extension, Json};
use coach_engine::{FeedbackRequest, FeedbackResponse, MoveClassification};
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

/// POST /api/analyze-move
///
/// Coaching text for a move the client has already classified.
pub async fn analyze_move(
    Extension(state): Extension<AppState>,
    Json(request): Json<FeedbackRequest>,
) -> Json<FeedbackResponse> {
    Json(state.feedback.generate(&request).await)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewMoveRequest {
    pub fen: String,
    /// UCI or SAN
    #[serde(rename = "move")]
    pub played: String,
    pub depth: Option<u32>,
}

/// POST /api/review-move
pub async fn review_move(
    Extension(state): Extension<AppState>,
    Json(body): Json<ReviewMoveRequest>,
) -> Result<Json<MoveClassification>, AppError> {
    let pos = chess_core::position::parse_fen(&body.fen)?;
    coach_engine::analysis::parse_played_move(&pos, &body.played)?;

    let reviewer = match body.depth {
        Some(depth) => state.reviewer.clone().with_depth(depth.clamp(1, 30)),
        None => state.reviewer.clone(),
    };
    Ok(Json(reviewer.review(&body.fen, &body.played).await))
}
