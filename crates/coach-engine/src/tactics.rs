//! Tactical pattern detection for a single move: captures, hanging pieces,
//! missed captures and threats the engine's move would have created.

use serde::Serialize;
use shakmaty::{Bitboard, Chess, Color, Move, Position, Role, Square};

use chess_core::position::{piece_name, piece_value};

/// One observation about a move. Rendered either with material values
/// (technical) or in plain coaching language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TacticalNote {
    Captured {
        piece: String,
        value: u32,
    },
    Hanging {
        piece: String,
        square: String,
        value: u32,
    },
    MissedCapture {
        best_san: String,
        piece: String,
        square: String,
        value: u32,
    },
    CreatesThreats {
        best_san: String,
        count: usize,
    },
    Positional {
        best_san: String,
    },
    /// The engine's move could not be replayed; no concrete suggestion.
    StrongerAvailable,
    Verdict(Verdict),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "band", content = "pawns", rename_all = "camelCase")]
pub enum Verdict {
    RoughlyEqual,
    SlightlyInaccurate,
    LosesPawns(i32),
    SeriousMistake(i32),
}

impl TacticalNote {
    pub fn technical(&self) -> String {
        match self {
            TacticalNote::Captured { piece, value } => {
                format!("You captured a {piece} (worth {value} points).")
            }
            TacticalNote::Hanging { piece, square, value } => format!(
                "Your {piece} on {square} is now attacked and can be captured (losing {value} points)."
            ),
            TacticalNote::MissedCapture { best_san, piece, square, value } => format!(
                "Stockfish's {best_san} would have captured the opponent's {piece} on {square} (winning {value} points)."
            ),
            TacticalNote::CreatesThreats { best_san, count } => format!(
                "Stockfish's {best_san} creates {count} threat(s) against opponent pieces."
            ),
            TacticalNote::Positional { best_san } => {
                format!("Stockfish's {best_san} improves piece placement and position.")
            }
            TacticalNote::StrongerAvailable => "A stronger continuation was available.".to_string(),
            TacticalNote::Verdict(verdict) => match verdict {
                Verdict::RoughlyEqual => "Your move is roughly equal to the best move.".to_string(),
                Verdict::SlightlyInaccurate => {
                    "Your move is slightly inaccurate but acceptable.".to_string()
                }
                Verdict::LosesPawns(n) => {
                    format!("Your move loses about {n} pawn(s) worth of advantage.")
                }
                Verdict::SeriousMistake(n) => {
                    format!("This is a serious mistake, losing {n}+ pawn(s) of advantage.")
                }
            },
        }
    }

    /// Coaching language: no point values, no engine name.
    pub fn plain(&self) -> String {
        match self {
            TacticalNote::Captured { piece, .. } => format!("You captured a {piece}."),
            TacticalNote::Hanging { piece, square, .. } => {
                format!("Your {piece} on {square} is now attacked and can be captured.")
            }
            TacticalNote::MissedCapture { best_san, piece, square, .. } => format!(
                "The best move was {best_san}, capturing the opponent's {piece} on {square}."
            ),
            TacticalNote::CreatesThreats { best_san, count } => format!(
                "The best move was {best_san}, creating {count} threat(s) against opponent pieces."
            ),
            TacticalNote::Positional { best_san } => {
                format!("The best move was {best_san}, improving piece placement and position.")
            }
            TacticalNote::StrongerAvailable => "A stronger continuation was available.".to_string(),
            TacticalNote::Verdict(verdict) => match verdict {
                Verdict::RoughlyEqual => "Excellent move!".to_string(),
                Verdict::SlightlyInaccurate => {
                    "Decent move, but there was something slightly better.".to_string()
                }
                Verdict::LosesPawns(_) => "Your move weakens your position.".to_string(),
                Verdict::SeriousMistake(_) => {
                    "This is a serious mistake that significantly weakens your position.".to_string()
                }
            },
        }
    }
}

pub fn render_technical(notes: &[TacticalNote]) -> String {
    notes.iter().map(TacticalNote::technical).collect::<Vec<_>>().join(" ")
}

pub fn render_plain(notes: &[TacticalNote]) -> String {
    notes.iter().map(TacticalNote::plain).collect::<Vec<_>>().join(" ")
}

/// Square the moved piece ends on (the king's square for castling).
fn landing_square(pos: &Chess, mv: Move) -> Square {
    match mv.castling_side() {
        Some(side) => side.king_to(pos.turn()),
        None => mv.to(),
    }
}

pub fn capture_note(mv: Move) -> Option<TacticalNote> {
    mv.capture().map(|role| TacticalNote::Captured {
        piece: piece_name(role).to_string(),
        value: piece_value(role),
    })
}

/// The moved piece can be taken by a legal reply.
pub fn hanging_note(before: &Chess, mv: Move) -> Option<TacticalNote> {
    let square = landing_square(before, mv);
    let role = match mv.promotion() {
        Some(promoted) => promoted,
        None => mv.role(),
    };
    if role == Role::King {
        return None;
    }
    let mut after = before.clone();
    after.play_unchecked(mv);
    let attacked = after
        .legal_moves()
        .iter()
        .any(|reply| reply.is_capture() && reply.to() == square);
    attacked.then(|| TacticalNote::Hanging {
        piece: piece_name(role).to_string(),
        square: square.to_string(),
        value: piece_value(role),
    })
}

/// Opponent pieces (king excluded) attacked by `side`.
pub fn attacked_targets(pos: &Chess, side: Color) -> Bitboard {
    let board = pos.board();
    let targets = board.by_color(!side) & !board.kings();
    let mut attacked = Bitboard::EMPTY;
    for sq in board.by_color(side) {
        attacked |= board.attacks_from(sq) & targets;
    }
    attacked
}

/// What the engine's move would have done that the played move did not.
pub fn best_move_note(before: &Chess, best: Move, played: Move, best_san: &str) -> TacticalNote {
    if let Some(role) = best.capture() {
        let square = best.to();
        return TacticalNote::MissedCapture {
            best_san: best_san.to_string(),
            piece: piece_name(role).to_string(),
            square: square.to_string(),
            value: piece_value(role),
        };
    }

    let mover = before.turn();
    let mut after_best = before.clone();
    after_best.play_unchecked(best);
    let mut after_played = before.clone();
    after_played.play_unchecked(played);

    let new_threats =
        attacked_targets(&after_best, mover) & !attacked_targets(&after_played, mover);
    match new_threats.count() {
        0 => TacticalNote::Positional {
            best_san: best_san.to_string(),
        },
        count => TacticalNote::CreatesThreats {
            best_san: best_san.to_string(),
            count,
        },
    }
}
