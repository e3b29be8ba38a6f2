//! Integration tests: the HTTP API over stub platforms and a scripted engine.

mod common;

use std::sync::Arc;

use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use reqwest::Client;
use serde_json::{json, Value};
use server::config::Config;
use server::routes::router;
use server::sync::{GameSync, MemoryStore, PlayerColor};
use server::AppState;

use common::{chess_com_record, sample_pgn, scripted_engine, serve, serve_with, Script};

/// One player with a good recent archive and a missing older one.
async fn platform_stub() -> String {
    serve_with(|base| {
        let base = base.to_string();
        Router::new()
            .route(
                "/player/{user}",
                get(|Path(user): Path<String>| async move {
                    if user == "magnus" {
                        Ok(Json(json!({"username": "magnus"})))
                    } else {
                        Err(StatusCode::NOT_FOUND)
                    }
                }),
            )
            .route(
                "/player/{user}/games/archives",
                get(move |Path(user): Path<String>| {
                    let base = base.clone();
                    async move {
                        if user != "magnus" {
                            return Err(StatusCode::NOT_FOUND);
                        }
                        Ok(Json(json!({
                            "archives": [
                                format!("{base}/player/magnus/games/2024/01"),
                                format!("{base}/player/magnus/games/2024/02"),
                            ]
                        })))
                    }
                }),
            )
            .route(
                "/player/{user}/games/{year}/{month}",
                get(|Path((_, _, month)): Path<(String, String, String)>| async move {
                    if month != "02" {
                        return Err(StatusCode::NOT_FOUND);
                    }
                    let games: Vec<Value> = (0..3).map(chess_com_record).collect();
                    Ok(Json(json!({ "games": games })))
                }),
            )
    })
    .await
}

async fn start_api(games: Option<GameSync>) -> String {
    let platform = platform_stub().await;
    let config = Config {
        chess_com_base_url: platform.clone(),
        lichess_base_url: platform,
        chess_com_rate_limit: 6000,
        lichess_rate_limit: 6000,
        ..Config::default()
    };
    let script = Script::new()
        .on("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w", &[("cp 20", "e2e4")])
        .on("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b", &[("cp -15", "e7e5")])
        .on("rnbqkbnr/pppppppp/8/8/8/5P2/PPPPP1PP/RNBQKBNR b", &[("cp 520", "e7e5")]);
    let engine = scripted_engine(script).await;

    let mut state = AppState::new(config, engine).unwrap();
    if let Some(games) = games {
        state = state.with_game_sync(games);
    }
    serve(router(state)).await
}

#[tokio::test]
async fn health_reports_components() {
    let api = start_api(None).await;
    let body: Value = Client::new()
        .get(format!("{api}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["engine"], "ready");
    assert_eq!(body["feedback"], "rule-based");
    assert_eq!(body["multiplayer"], false);
}

#[tokio::test]
async fn import_returns_partial_games_with_error() {
    let api = start_api(None).await;
    let resp = Client::new()
        .get(format!("{api}/api/import/chesscom/magnus?max=10"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["count"], 3);
    assert_eq!(body["games"].as_array().unwrap().len(), 3);
    assert!(body["error"].as_str().unwrap().starts_with("Import stopped after 3 games"));
}

#[tokio::test]
async fn import_of_unknown_user_is_not_found() {
    let api = start_api(None).await;
    let resp = Client::new()
        .get(format!("{api}/api/import/chesscom/nobody"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["detail"], "User not found");
}

#[tokio::test]
async fn player_exists_endpoint() {
    let api = start_api(None).await;
    let client = Client::new();
    let body: Value = client
        .get(format!("{api}/api/players/chesscom/magnus/exists"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["exists"], true);

    let body: Value = client
        .get(format!("{api}/api/players/chesscom/nobody/exists"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["exists"], false);

    let resp = client
        .get(format!("{api}/api/players/fics/magnus/exists"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn pgn_parse_counts_skipped_records() {
    let api = start_api(None).await;
    let text = format!(
        "{}\n\n[Event \"Broken\"]\n\n1. e4 Ke7 *\n\n{}",
        sample_pgn(1),
        sample_pgn(2)
    );
    let body: Value = Client::new()
        .post(format!("{api}/api/pgn/parse"))
        .json(&json!({ "pgn": text }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["count"], 2);
    assert_eq!(body["skipped"], 1);
    assert_eq!(body["games"][1]["metadata"]["white"], "white2");
    assert_eq!(body["games"][0]["metadata"]["source"], "manual");
}

#[tokio::test]
async fn analyze_move_falls_back_to_rules() {
    let api = start_api(None).await;
    let body: Value = Client::new()
        .post(format!("{api}/api/analyze-move"))
        .json(&json!({
            "moveNotation": "f3",
            "evalDiff": 535,
            "gamePhase": "opening",
            "bestMove": "e4",
            "afterEvalPlayer": -520
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["category"], "🚨 Blunder");
    assert!(!body["feedback"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn review_move_classifies_with_engine() {
    let api = start_api(None).await;
    let client = Client::new();
    let body: Value = client
        .post(format!("{api}/api/review-move"))
        .json(&json!({
            "fen": chess_core::START_FEN,
            "move": "f2f3"
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["move"], "f3 - 🚨 Blunder");
    assert_eq!(body["evaluation"], 535);
    assert_eq!(body["bestMove"], "e4");

    let resp = client
        .post(format!("{api}/api/review-move"))
        .json(&json!({ "fen": "not a fen", "move": "e4" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn multiplayer_requires_store() {
    let api = start_api(None).await;
    let resp = Client::new()
        .get(format!("{api}/api/multiplayer/games/abc"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn multiplayer_game_state_is_served() {
    let store = MemoryStore::new();
    let host = GameSync::new(Some(Arc::new(store.clone())), "http://localhost:3000");
    let created = host.create_game(PlayerColor::White).await.unwrap();

    let api = start_api(Some(GameSync::new(Some(Arc::new(store)), "http://localhost:3000"))).await;
    let client = Client::new();
    let body: Value = client
        .get(format!("{api}/api/multiplayer/games/{}", created.game_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["currentTurn"], "white");
    assert_eq!(body["playerWhite"]["id"], host.player_id());

    let resp = client
        .get(format!("{api}/api/multiplayer/games/missing"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
