pub mod analysis;
pub mod health;
pub mod import;
pub mod multiplayer;
pub mod pgn;
pub mod players;

use axum::{
    routing::{get, post},
    Extension, Router,
};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health
        .route("/health", get(health::health_check))
        // Move analysis
        .route("/api/analyze-move", post(analysis::analyze_move))
        .route("/api/review-move", post(analysis::review_move))
        // Game import
        .route("/api/import/lichess/{username}", get(import::import_lichess))
        .route("/api/import/chesscom/{username}", get(import::import_chess_com))
        .route("/api/pgn/parse", post(pgn::parse_pgn))
        // Players
        .route("/api/players/{platform}/{username}/exists", get(players::player_exists))
        // Multiplayer
        .route("/api/multiplayer/games/{game_id}", get(multiplayer::get_game))
        .layer(Extension(state))
        .layer(CompressionLayer::new())
        .layer(cors)
}
