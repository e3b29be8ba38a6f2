//! UCI protocol: outbound command formatting and inbound line parsing.

/// Score as reported by the engine, relative to the side to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    Cp(i32),
    Mate(i32),
}

/// Fields of one `info` line. Every field is optional because engines emit
/// many partial lines (`currmove`, `string`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfoLine {
    pub depth: Option<u32>,
    pub multipv: Option<u32>,
    pub score: Option<Score>,
    pub nodes: Option<u64>,
    pub time_ms: Option<u64>,
    pub pv: Vec<String>,
}

impl InfoLine {
    /// A line only counts as an evaluation update when it carries both a
    /// depth and a score.
    pub fn is_evaluation(&self) -> bool {
        self.depth.is_some() && self.score.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineResponse {
    UciOk,
    ReadyOk,
    Info(InfoLine),
    BestMove { best: String, ponder: Option<String> },
    Error(String),
    Other(String),
}

impl EngineResponse {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        let mut parts = trimmed.split_whitespace();
        match parts.next() {
            Some("uciok") => EngineResponse::UciOk,
            Some("readyok") => EngineResponse::ReadyOk,
            Some("info") => EngineResponse::Info(parse_info(trimmed)),
            Some("bestmove") => match parts.next() {
                Some(best) => {
                    let ponder = match (parts.next(), parts.next()) {
                        (Some("ponder"), Some(p)) => Some(p.to_string()),
                        _ => None,
                    };
                    EngineResponse::BestMove {
                        best: best.to_string(),
                        ponder,
                    }
                }
                None => EngineResponse::Other(trimmed.to_string()),
            },
            Some("Unknown") | Some("Error") | Some("error") => {
                EngineResponse::Error(trimmed.to_string())
            }
            _ => EngineResponse::Other(trimmed.to_string()),
        }
    }
}

/// Parse an `info` line. Malformed values leave their field unset.
pub fn parse_info(line: &str) -> InfoLine {
    let mut info = InfoLine::default();
    let mut parts = line.split_whitespace().skip(1);
    while let Some(token) = parts.next() {
        match token {
            "depth" => info.depth = parts.next().and_then(|s| s.parse().ok()),
            "multipv" => info.multipv = parts.next().and_then(|s| s.parse().ok()),
            "score" => {
                info.score = match (parts.next(), parts.next().and_then(|s| s.parse().ok())) {
                    (Some("cp"), Some(v)) => Some(Score::Cp(v)),
                    (Some("mate"), Some(v)) => Some(Score::Mate(v)),
                    _ => None,
                }
            }
            "nodes" => info.nodes = parts.next().and_then(|s| s.parse().ok()),
            "time" => info.time_ms = parts.next().and_then(|s| s.parse().ok()),
            "pv" => {
                // PV runs to the end of the line
                info.pv = parts.by_ref().map(str::to_string).collect();
            }
            // Free text; nothing after it is structured.
            "string" => break,
            _ => {}
        }
    }
    info
}

// --- Outbound commands -------------------------------------------------------

pub fn position_fen(fen: &str) -> String {
    format!("position fen {fen}")
}

/// Depth-bounded search, optionally also capped in wall-clock time.
pub fn go(depth: u32, movetime_ms: Option<u64>) -> String {
    match movetime_ms {
        Some(ms) => format!("go depth {depth} movetime {ms}"),
        None => format!("go depth {depth}"),
    }
}

pub fn set_option(name: &str, value: &str) -> String {
    format!("setoption name {name} value {value}")
}

pub const UCI: &str = "uci";
pub const STOP: &str = "stop";
pub const QUIT: &str = "quit";
