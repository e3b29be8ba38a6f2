#![allow(dead_code)]

use std::net::SocketAddr;

use axum::Router;
use coach_engine::{EngineConfig, EngineController, EngineLink};
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Hand-driven engine
// ---------------------------------------------------------------------------

/// The engine side of a link, driven line by line from the test.
pub struct FakeEngine {
    commands: mpsc::UnboundedReceiver<String>,
    lines: mpsc::UnboundedSender<String>,
}

pub fn fake_link() -> (EngineLink, FakeEngine) {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (line_tx, line_rx) = mpsc::unbounded_channel();
    (
        EngineLink::from_channels(cmd_tx, line_rx),
        FakeEngine {
            commands: cmd_rx,
            lines: line_tx,
        },
    )
}

impl FakeEngine {
    /// Skip commands until one starts with `prefix`.
    pub async fn expect(&mut self, prefix: &str) -> String {
        loop {
            let cmd = self.commands.recv().await.expect("controller hung up");
            if cmd.starts_with(prefix) {
                return cmd;
            }
        }
    }

    pub fn say(&self, line: &str) {
        self.lines.send(line.to_string()).expect("controller hung up");
    }

    /// Answer the current search with a single line.
    pub async fn answer(&mut self, score: &str, best: &str) -> String {
        let position = self.expect("position fen ").await;
        self.expect("go").await;
        self.say(&format!("info depth 10 score {score} pv {best}"));
        self.say(&format!("bestmove {best}"));
        position.trim_start_matches("position fen ").to_string()
    }
}

// ---------------------------------------------------------------------------
// Scripted engine
// ---------------------------------------------------------------------------

/// Ranked engine lines for positions whose FEN starts with a given prefix.
/// Each line is a UCI score (`"cp 30"`, `"mate 2"`) and its first move.
#[derive(Clone, Default)]
pub struct Script {
    entries: Vec<(String, Vec<(String, String)>)>,
    fallback: Vec<(String, String)>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    /// `fen_prefix` is usually the board and side to move, which avoids
    /// depending on en passant and clock fields.
    pub fn on(mut self, fen_prefix: &str, lines: &[(&str, &str)]) -> Self {
        self.entries.push((fen_prefix.to_string(), owned(lines)));
        self
    }

    pub fn otherwise(mut self, lines: &[(&str, &str)]) -> Self {
        self.fallback = owned(lines);
        self
    }

    fn lines_for(&self, fen: &str) -> &[(String, String)] {
        self.entries
            .iter()
            .find(|(prefix, _)| fen.starts_with(prefix.as_str()))
            .map(|(_, lines)| lines.as_slice())
            .unwrap_or(self.fallback.as_slice())
    }
}

fn owned(lines: &[(&str, &str)]) -> Vec<(String, String)> {
    lines
        .iter()
        .map(|(score, mv)| (score.to_string(), mv.to_string()))
        .collect()
}

/// A link whose engine answers every search from `script`.
pub fn scripted_link(script: Script) -> EngineLink {
    let (link, mut engine) = fake_link();
    tokio::spawn(async move {
        let mut fen = String::new();
        let mut multipv = 1usize;
        while let Some(cmd) = engine.commands.recv().await {
            if cmd == "uci" {
                engine.say("id name Scripted");
                engine.say("uciok");
            } else if let Some(rest) = cmd.strip_prefix("position fen ") {
                fen = rest.to_string();
            } else if let Some(value) = cmd.strip_prefix("setoption name MultiPV value ") {
                multipv = value.parse().unwrap_or(1);
            } else if let Some(args) = cmd.strip_prefix("go depth ") {
                let depth = args.split_whitespace().next().unwrap_or("1");
                let lines = script.lines_for(&fen);
                for (rank, (score, mv)) in lines.iter().take(multipv).enumerate() {
                    engine.say(&format!(
                        "info depth {depth} multipv {} score {score} pv {mv}",
                        rank + 1
                    ));
                }
                match lines.first() {
                    Some((_, best)) => engine.say(&format!("bestmove {best}")),
                    None => {
                        engine.say(&format!("info depth {depth} score mate 0"));
                        engine.say("bestmove (none)");
                    }
                }
            } else if cmd == "quit" {
                break;
            }
        }
    });
    link
}

/// A ready controller backed by a scripted engine.
pub async fn scripted_engine(script: Script) -> EngineController {
    let controller = EngineController::new(EngineConfig::default());
    controller
        .attach(scripted_link(script))
        .await
        .expect("scripted handshake");
    controller
}

// ---------------------------------------------------------------------------
// Local HTTP stubs
// ---------------------------------------------------------------------------

/// Serve `app` on an ephemeral local port and return its base URL.
pub async fn serve(app: Router) -> String {
    serve_with(|_| app).await
}

/// Like [`serve`], for routers that need to know their own base URL.
pub async fn serve_with(build: impl FnOnce(&str) -> Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub server");
    let addr: SocketAddr = listener.local_addr().expect("local addr");
    let base = format!("http://{addr}");
    let app = build(&base);
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("stub server");
    });
    base
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// A short finished game in PGN, unique per `n`.
pub fn sample_pgn(n: usize) -> String {
    format!(
        "[Event \"Casual\"]\n[Site \"https://example.org/{n}\"]\n[White \"white{n}\"]\n[Black \"black{n}\"]\n[Result \"0-1\"]\n\n1. f3 e5 2. g4 Qh4# 0-1\n"
    )
}

/// A Chess.com archive record.
pub fn chess_com_record(n: usize) -> serde_json::Value {
    serde_json::json!({
        "url": format!("https://www.chess.com/game/live/{n}"),
        "end_time": 1_700_000_000i64 + n as i64,
        "rules": "chess",
        "time_class": "blitz",
        "white": {"username": format!("white{n}"), "rating": 1500, "result": "checkmated"},
        "black": {"username": format!("black{n}"), "rating": 1510, "result": "win"},
        "pgn": sample_pgn(n),
    })
}
