//! Thin helpers over shakmaty: FEN, SAN and UCI conversion, piece naming,
//! and the per-move detail record used by imported games.

use serde::{Deserialize, Serialize};
use shakmaty::fen::Fen;
use shakmaty::san::San;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, CastlingSide, Chess, EnPassantMode, Move, Position, Role};

use crate::error::ChessError;
use crate::game_data::ChessMove;

pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

pub fn parse_fen(fen: &str) -> Result<Chess, ChessError> {
    let parsed: Fen = fen
        .trim()
        .parse()
        .map_err(|_| ChessError::InvalidFen(fen.to_string()))?;
    parsed
        .into_position(CastlingMode::Standard)
        .map_err(|_| ChessError::InvalidFen(fen.to_string()))
}

pub fn fen_of(pos: &Chess) -> String {
    Fen::from_position(pos, EnPassantMode::Legal).to_string()
}

/// Resolve a long-algebraic move (`e2e4`, `e7e8q`) against a position.
pub fn parse_uci_move(pos: &Chess, uci: &str) -> Result<Move, ChessError> {
    let parsed: UciMove = uci
        .trim()
        .parse()
        .map_err(|_| ChessError::IllegalMove(uci.to_string()))?;
    parsed
        .to_move(pos)
        .map_err(|_| ChessError::IllegalMove(uci.to_string()))
}

/// Resolve a SAN token, tolerating check marks and annotation glyphs.
pub fn parse_san_move(pos: &Chess, san: &str) -> Result<Move, ChessError> {
    let cleaned = san.trim().trim_end_matches(['+', '#', '!', '?']);
    let parsed: San = cleaned
        .parse()
        .map_err(|_| ChessError::IllegalMove(san.to_string()))?;
    parsed
        .to_move(pos)
        .map_err(|_| ChessError::IllegalMove(san.to_string()))
}

/// SAN including the `+`/`#` suffix.
pub fn san_of(pos: &Chess, mv: Move) -> String {
    let mut san = San::from_move(pos, mv).to_string();
    let mut after = pos.clone();
    after.play_unchecked(mv);
    if after.is_checkmate() {
        san.push('#');
    } else if after.is_check() {
        san.push('+');
    }
    san
}

pub fn uci_of(mv: Move) -> String {
    mv.to_uci(CastlingMode::Standard).to_string()
}

pub fn uci_to_san(fen: &str, uci: &str) -> Result<String, ChessError> {
    let pos = parse_fen(fen)?;
    let mv = parse_uci_move(&pos, uci)?;
    Ok(san_of(&pos, mv))
}

pub fn san_to_uci(fen: &str, san: &str) -> Result<String, ChessError> {
    let pos = parse_fen(fen)?;
    let mv = parse_san_move(&pos, san)?;
    Ok(uci_of(mv))
}

pub fn piece_name(role: Role) -> &'static str {
    match role {
        Role::Pawn => "pawn",
        Role::Knight => "knight",
        Role::Bishop => "bishop",
        Role::Rook => "rook",
        Role::Queen => "queen",
        Role::King => "king",
    }
}

/// Material value in pawns. The king is not material.
pub fn piece_value(role: Role) -> u32 {
    match role {
        Role::Pawn => 1,
        Role::Knight | Role::Bishop => 3,
        Role::Rook => 5,
        Role::Queen => 9,
        Role::King => 0,
    }
}

/// Build the detailed move record for `mv` played from `pos`.
pub fn describe_move(pos: &Chess, mv: Move) -> ChessMove {
    let before = fen_of(pos);
    let san = san_of(pos, mv);
    let mut after_pos = pos.clone();
    after_pos.play_unchecked(mv);
    let after = fen_of(&after_pos);

    // Castling is recorded by the king's destination, not the rook square.
    let to = match mv.castling_side() {
        Some(side) => side.king_to(pos.turn()).to_string(),
        None => mv.to().to_string(),
    };
    let from = mv.from().map(|sq| sq.to_string()).unwrap_or_default();

    let mut flags = String::new();
    match mv {
        Move::EnPassant { .. } => flags.push('e'),
        Move::Castle { .. } => {
            flags.push(if mv.castling_side() == Some(CastlingSide::KingSide) { 'k' } else { 'q' })
        }
        Move::Normal { role, from, to, capture, .. } => {
            if capture.is_some() {
                flags.push('c');
            } else if role == Role::Pawn && from.distance(to) == 2 {
                flags.push('b');
            }
        }
        Move::Put { .. } => {}
    }
    if mv.promotion().is_some() {
        flags.push('p');
    }
    if flags.is_empty() {
        flags.push('n');
    }

    ChessMove {
        from,
        to,
        promotion: mv.promotion().map(|r| r.char()),
        san,
        lan: uci_of(mv),
        before,
        after,
        color: pos.turn().char(),
        piece: mv.role().char(),
        captured: mv.capture().map(|r| r.char()),
        flags,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GamePhase {
    Opening,
    Middlegame,
    Endgame,
}

impl GamePhase {
    /// Phase by full-move number, as used when coaching a single move.
    pub fn from_move_number(move_number: u32) -> Self {
        match move_number {
            0..=10 => GamePhase::Opening,
            11..=25 => GamePhase::Middlegame,
            _ => GamePhase::Endgame,
        }
    }

    /// Phase from ply count and remaining material.
    pub fn from_position(pos: &Chess, plies: usize) -> Self {
        if plies < 20 {
            return GamePhase::Opening;
        }
        let board = pos.board();
        if board.occupied().count() < 12 || board.queens().is_empty() {
            GamePhase::Endgame
        } else {
            GamePhase::Middlegame
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GamePhase::Opening => "opening",
            GamePhase::Middlegame => "middlegame",
            GamePhase::Endgame => "endgame",
        }
    }
}
