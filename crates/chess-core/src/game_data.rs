use serde::{Deserialize, Serialize};

/// Platform a game was imported from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Lichess,
    Chesscom,
    Manual,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Lichess => "lichess",
            Source::Chesscom => "chesscom",
            Source::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameMetadata {
    pub id: String,
    pub white: String,
    pub black: String,
    pub result: String, // "1-0", "0-1", "1/2-1/2", "*"
    pub date: String,
    pub white_rating: Option<i32>,
    pub black_rating: Option<i32>,
    pub time_control: Option<String>,
    pub opening: Option<String>,
    pub source: Source,
}

/// One replayed move with full detail from the rule engine.
///
/// `flags` uses single-letter codes: `n` quiet, `b` double pawn push,
/// `e` en passant, `c` capture, `p` promotion, `k`/`q` castling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChessMove {
    pub from: String,
    pub to: String,
    pub promotion: Option<char>,
    pub san: String,
    pub lan: String,
    pub before: String,
    pub after: String,
    pub color: char,
    pub piece: char,
    pub captured: Option<char>,
    pub flags: String,
}

impl ChessMove {
    pub fn is_capture(&self) -> bool {
        self.captured.is_some()
    }

    pub fn is_check(&self) -> bool {
        self.san.ends_with('+') || self.san.ends_with('#')
    }

    pub fn is_checkmate(&self) -> bool {
        self.san.ends_with('#')
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub metadata: GameMetadata,
    pub pgn: String,
    pub moves: Vec<ChessMove>,
}

impl Game {
    /// Every move starts from the position the previous one produced.
    pub fn is_contiguous(&self) -> bool {
        self.moves.windows(2).all(|w| w[0].after == w[1].before)
    }

    pub fn san_moves(&self) -> Vec<String> {
        self.moves.iter().map(|m| m.san.clone()).collect()
    }
}
