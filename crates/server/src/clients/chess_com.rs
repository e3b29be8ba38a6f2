use std::time::Duration;

use chess_core::{pgn, Game, Source};
use reqwest::Client;
use serde_json::Value;

use super::rate_limiter::RateLimiter;
use super::{check_status, http_client, ClientError, ImportError, ProgressFn};

#[derive(Debug, Clone)]
pub struct ChessComQuery {
    pub max: usize,
    pub year: Option<i32>,
    pub month: Option<u32>,
}

impl Default for ChessComQuery {
    fn default() -> Self {
        Self {
            max: 100,
            year: None,
            month: None,
        }
    }
}

pub struct ChessComClient {
    client: Client,
    base_url: String,
    limiter: RateLimiter,
}

impl ChessComClient {
    pub fn new(base_url: &str, limiter: RateLimiter, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            limiter,
        })
    }

    async fn get_json(&self, url: String, what: &'static str) -> Result<Value, ClientError> {
        let client = self.client.clone();
        self.limiter
            .request(move || {
                let req = client.get(&url);
                async move {
                    let resp = check_status(req.send().await?, what)?;
                    resp.json::<Value>()
                        .await
                        .map_err(|e| ClientError::Decode(e.to_string()))
                }
            })
            .await
    }

    /// Monthly archive URLs, newest first, filtered by year and month.
    pub async fn fetch_archives(
        &self,
        username: &str,
        year: Option<i32>,
        month: Option<u32>,
    ) -> Result<Vec<String>, ClientError> {
        let url = format!("{}/player/{}/games/archives", self.base_url, username);
        let data = self.get_json(url, "User").await?;

        let mut archives: Vec<String> = data["archives"]
            .as_array()
            .map(|list| {
                list.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        if let Some(year) = year {
            let needle = format!("/{year}/");
            archives.retain(|url| url.contains(&needle));
        }
        if let Some(month) = month {
            let suffix = format!("/{month:02}");
            archives.retain(|url| url.trim_end_matches('/').ends_with(&suffix));
        }

        archives.reverse();
        Ok(archives)
    }

    /// Walk archives newest first until `query.max` games are collected; no
    /// archive is requested once the cap is reached.
    pub async fn fetch_user_games(
        &self,
        username: &str,
        query: &ChessComQuery,
        on_progress: Option<ProgressFn>,
    ) -> Result<Vec<Game>, ImportError> {
        let max = query.max;
        let archives = self
            .fetch_archives(username, query.year, query.month)
            .await
            .map_err(|e| ImportError::new(e, Vec::new()))?;

        let mut games: Vec<Game> = Vec::new();
        for archive_url in archives {
            if games.len() >= max {
                break;
            }
            let data = match self.get_json(archive_url.clone(), "Archive").await {
                Ok(data) => data,
                Err(e) => return Err(ImportError::new(e, games)),
            };

            for record in data["games"].as_array().into_iter().flatten() {
                if games.len() >= max {
                    break;
                }
                if let Some(game) = game_from_json(record) {
                    games.push(game);
                }
            }
            tracing::debug!(archive = %archive_url, count = games.len(), "Fetched Chess.com archive");

            if let Some(progress) = &on_progress {
                progress(games.len().min(max), max);
            }
        }

        tracing::info!(username, count = games.len(), "Fetched Chess.com games");
        Ok(games)
    }

    /// Single game by id or full game URL.
    pub async fn fetch_game(&self, game_id: &str) -> Result<Game, ClientError> {
        let id = if game_id.contains("chess.com") {
            game_id.trim_end_matches('/').rsplit('/').next().unwrap_or(game_id)
        } else {
            game_id
        };
        let url = format!("{}/game/{}", self.base_url, id);
        let data = self.get_json(url, "Game").await?;
        game_from_json(&data).ok_or_else(|| ClientError::Decode("game has no usable PGN".into()))
    }

    pub async fn verify_username(&self, username: &str) -> bool {
        let url = format!("{}/player/{}", self.base_url, username);
        self.get_json(url, "User").await.is_ok()
    }

    pub async fn player_stats(&self, username: &str) -> Result<Value, ClientError> {
        let url = format!("{}/player/{}/stats", self.base_url, username);
        self.get_json(url, "User").await
    }
}

/// Normalize one archive record; `None` for variants and unusable PGN.
pub fn game_from_json(data: &Value) -> Option<Game> {
    let rules = data["rules"].as_str().unwrap_or("chess");
    if rules != "chess" {
        tracing::debug!(rules, "Skipping variant game");
        return None;
    }
    let pgn_text = data["pgn"].as_str().filter(|s| !s.is_empty())?;
    let mut game = match pgn::to_game(pgn_text, Source::Chesscom) {
        Ok(game) => game,
        Err(e) => {
            tracing::warn!(url = ?data.get("url"), "Skipping Chess.com game: {e}");
            return None;
        }
    };

    let meta = &mut game.metadata;
    if let Some(id) = data["url"]
        .as_str()
        .and_then(|url| url.trim_end_matches('/').rsplit('/').next())
        .filter(|id| !id.is_empty())
    {
        meta.id = id.to_string();
    }
    if let Some(name) = data["white"]["username"].as_str() {
        meta.white = name.to_string();
    }
    if let Some(name) = data["black"]["username"].as_str() {
        meta.black = name.to_string();
    }
    meta.white_rating = data["white"]["rating"].as_i64().map(|r| r as i32);
    meta.black_rating = data["black"]["rating"].as_i64().map(|r| r as i32);
    meta.result = parse_result(data["white"]["result"].as_str(), data["black"]["result"].as_str())
        .to_string();
    if let Some(date) = data["end_time"]
        .as_i64()
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
    {
        meta.date = date.format("%Y-%m-%d").to_string();
    }
    meta.time_control = data["time_class"]
        .as_str()
        .or_else(|| data["time_control"].as_str())
        .map(str::to_string);
    meta.source = Source::Chesscom;
    Some(game)
}

fn parse_result(white: Option<&str>, black: Option<&str>) -> &'static str {
    if white == Some("win") {
        return "1-0";
    }
    if black == Some("win") {
        return "0-1";
    }
    if is_draw(white) || is_draw(black) {
        "1/2-1/2"
    } else {
        "*"
    }
}

fn is_draw(result: Option<&str>) -> bool {
    matches!(
        result,
        Some("agreed" | "stalemate" | "repetition" | "insufficient" | "50move" | "timevsinsufficient")
    )
}
