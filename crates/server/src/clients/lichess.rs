use std::time::Duration;

use chess_core::{pgn, Game, Source};
use futures::StreamExt;
use reqwest::Client;
use serde_json::Value;

use super::rate_limiter::RateLimiter;
use super::{check_status, http_client, ClientError, ImportError, ProgressFn};

#[derive(Debug, Clone)]
pub struct LichessQuery {
    pub max: usize,
    pub rated: Option<bool>,
    pub perf_type: Option<String>,
    /// Epoch milliseconds
    pub since: Option<i64>,
    pub until: Option<i64>,
}

impl Default for LichessQuery {
    fn default() -> Self {
        Self {
            max: 100,
            rated: None,
            perf_type: None,
            since: None,
            until: None,
        }
    }
}

impl LichessQuery {
    fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("max", self.max.to_string())];
        if let Some(rated) = self.rated {
            params.push(("rated", rated.to_string()));
        }
        if let Some(perf) = &self.perf_type {
            params.push(("perfType", perf.clone()));
        }
        if let Some(since) = self.since {
            params.push(("since", since.to_string()));
        }
        if let Some(until) = self.until {
            params.push(("until", until.to_string()));
        }
        params.push(("pgnInJson", "true".to_string()));
        params.push(("clocks", "false".to_string()));
        params.push(("evals", "false".to_string()));
        params.push(("opening", "true".to_string()));
        params
    }
}

pub struct LichessClient {
    client: Client,
    base_url: String,
    limiter: RateLimiter,
}

impl LichessClient {
    pub fn new(base_url: &str, limiter: RateLimiter, timeout: Duration) -> Result<Self, ClientError> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            limiter,
        })
    }

    /// Fetch up to `query.max` games. The NDJSON body is read as a stream
    /// and abandoned once enough games have been parsed. The limiter slot is
    /// held until the body is done, so the next request waits for it.
    pub async fn fetch_user_games(
        &self,
        username: &str,
        query: &LichessQuery,
        on_progress: Option<ProgressFn>,
    ) -> Result<Vec<Game>, ImportError> {
        let url = format!("{}/api/games/user/{}", self.base_url, username);
        let params = query.params();
        let client = self.client.clone();
        let max = query.max;

        let (games, failure) = self
            .limiter
            .request(move || {
                let req = client
                    .get(&url)
                    .query(&params)
                    .header("Accept", "application/x-ndjson");
                let on_progress = on_progress.clone();
                async move {
                    let resp = check_status(req.send().await?, "User")?;
                    Ok(read_games(resp, max, on_progress.as_ref()).await)
                }
            })
            .await
            .map_err(|e| ImportError::new(e, Vec::new()))?;

        if let Some(e) = failure {
            return Err(ImportError::new(e, games));
        }
        tracing::info!(username, count = games.len(), "Fetched Lichess games");
        Ok(games)
    }

    /// Single game exported as PGN.
    pub async fn fetch_game(&self, game_id: &str) -> Result<Game, ClientError> {
        let url = format!("{}/game/export/{}", self.base_url, game_id);
        let client = self.client.clone();
        let text = self
            .limiter
            .request(move || {
                let req = client.get(&url).header("Accept", "application/x-chess-pgn");
                async move { Ok(check_status(req.send().await?, "Game")?.text().await?) }
            })
            .await?;
        let mut game =
            pgn::to_game(&text, Source::Lichess).map_err(|e| ClientError::Decode(e.to_string()))?;
        game.metadata.id = game_id.to_string();
        Ok(game)
    }

    pub async fn verify_username(&self, username: &str) -> bool {
        let url = format!("{}/api/user/{}", self.base_url, username);
        let client = self.client.clone();
        self.limiter
            .request(move || {
                let req = client.get(&url);
                async move { check_status(req.send().await?, "User").map(|_| ()) }
            })
            .await
            .is_ok()
    }
}

/// Parse NDJSON records until `max` games or the end of the body. A broken
/// stream ends the read and is returned with the games parsed so far.
async fn read_games(
    resp: reqwest::Response,
    max: usize,
    on_progress: Option<&ProgressFn>,
) -> (Vec<Game>, Option<ClientError>) {
    let mut games: Vec<Game> = Vec::new();
    let mut buffer: Vec<u8> = Vec::new();
    let mut body = resp.bytes_stream();

    let handle_line = |line: &[u8], games: &mut Vec<Game>| {
        let line = String::from_utf8_lossy(line);
        let line = line.trim();
        if line.is_empty() || games.len() >= max {
            return;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(data) => {
                if let Some(game) = game_from_json(&data) {
                    games.push(game);
                    if let Some(progress) = on_progress {
                        progress(games.len(), max);
                    }
                }
            }
            Err(e) => tracing::warn!("Failed to parse Lichess game JSON: {e}"),
        }
    };

    let mut failure: Option<ClientError> = None;
    while games.len() < max {
        match body.next().await {
            Some(Ok(chunk)) => {
                buffer.extend_from_slice(&chunk);
                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    handle_line(&line[..], &mut games);
                }
            }
            Some(Err(e)) => {
                failure = Some(e.into());
                break;
            }
            None => {
                handle_line(&buffer[..], &mut games);
                break;
            }
        }
    }

    if games.is_empty() && failure.is_none() {
        if let Some(progress) = on_progress {
            progress(0, max);
        }
    }
    (games, failure)
}

/// Normalize one NDJSON game record; `None` when it has no usable PGN.
pub fn game_from_json(data: &Value) -> Option<Game> {
    let pgn_text = data.get("pgn").and_then(|v| v.as_str()).filter(|s| !s.is_empty())?;
    let mut game = match pgn::to_game(pgn_text, Source::Lichess) {
        Ok(game) => game,
        Err(e) => {
            tracing::warn!(id = ?data.get("id"), "Skipping Lichess game: {e}");
            return None;
        }
    };

    let meta = &mut game.metadata;
    if let Some(id) = data.get("id").and_then(|v| v.as_str()) {
        meta.id = id.to_string();
    }
    let players = &data["players"];
    if let Some(name) = players["white"]["user"]["name"].as_str() {
        meta.white = name.to_string();
    }
    if let Some(name) = players["black"]["user"]["name"].as_str() {
        meta.black = name.to_string();
    }
    meta.white_rating = players["white"]["rating"].as_i64().map(|r| r as i32);
    meta.black_rating = players["black"]["rating"].as_i64().map(|r| r as i32);
    meta.result = parse_result(data["winner"].as_str(), data["status"].as_str()).to_string();
    if let Some(date) = data["createdAt"]
        .as_i64()
        .and_then(chrono::DateTime::from_timestamp_millis)
    {
        meta.date = date.format("%Y-%m-%d").to_string();
    }
    meta.time_control = parse_time_control(&data["clock"]);
    if let Some(opening) = data["opening"]["name"].as_str() {
        meta.opening = Some(opening.to_string());
    }
    meta.source = Source::Lichess;
    Some(game)
}

fn parse_result(winner: Option<&str>, status: Option<&str>) -> &'static str {
    match winner {
        Some("white") => "1-0",
        Some("black") => "0-1",
        _ => match status {
            Some("draw") | Some("stalemate") => "1/2-1/2",
            _ => "*",
        },
    }
}

fn parse_time_control(clock: &Value) -> Option<String> {
    let initial = clock.get("initial")?.as_i64()?;
    let increment = clock.get("increment")?.as_i64()?;
    Some(format!("{initial}+{increment}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_game_from_json_overrides_metadata() {
        let data = json!({
            "id": "abcd1234",
            "createdAt": 1_700_000_000_000i64,
            "status": "mate",
            "winner": "white",
            "players": {
                "white": {"user": {"name": "Alice"}, "rating": 1850},
                "black": {"user": {"name": "Bob"}, "rating": 1790}
            },
            "clock": {"initial": 300, "increment": 3},
            "opening": {"name": "Italian Game"},
            "pgn": "[Event \"Rated blitz game\"]\n\n1. e4 e5 2. Bc4 Nc6 3. Qh5 Nf6 4. Qxf7# 1-0"
        });
        let game = game_from_json(&data).unwrap();
        assert_eq!(game.metadata.id, "abcd1234");
        assert_eq!(game.metadata.white, "Alice");
        assert_eq!(game.metadata.white_rating, Some(1850));
        assert_eq!(game.metadata.result, "1-0");
        assert_eq!(game.metadata.date, "2023-11-14");
        assert_eq!(game.metadata.time_control.as_deref(), Some("300+3"));
        assert_eq!(game.metadata.opening.as_deref(), Some("Italian Game"));
        assert_eq!(game.moves.len(), 7);
    }

    #[test]
    fn test_unparseable_game_is_skipped() {
        assert!(game_from_json(&json!({"id": "x"})).is_none());
        assert!(game_from_json(&json!({"id": "x", "pgn": "1. e4 Ke7 2. Qh5 Kxh5"})).is_none());
    }

    #[test]
    fn test_draw_result() {
        assert_eq!(parse_result(None, Some("stalemate")), "1/2-1/2");
        assert_eq!(parse_result(None, Some("aborted")), "*");
        assert_eq!(parse_result(Some("black"), Some("resign")), "0-1");
    }

    #[test]
    fn test_query_params() {
        let query = LichessQuery {
            max: 25,
            rated: Some(true),
            perf_type: Some("blitz".into()),
            ..LichessQuery::default()
        };
        let params = query.params();
        assert!(params.contains(&("max", "25".to_string())));
        assert!(params.contains(&("perfType", "blitz".to_string())));
        assert!(params.contains(&("pgnInJson", "true".to_string())));
        assert!(!params.iter().any(|(k, _)| *k == "since"));
    }
}
