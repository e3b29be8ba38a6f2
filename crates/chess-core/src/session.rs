//! Local game state as an explicit state machine.
//!
//! Every transition recomputes the derived fields (turn, check, game-over,
//! result) in the same call, so they can never drift from the position.

use std::collections::HashMap;

use serde::Serialize;
use shakmaty::{Chess, Color, Move, Position, Role, Square};

use crate::error::ChessError;
use crate::game_data::ChessMove;
use crate::pgn;
use crate::position::{describe_move, fen_of, parse_fen, parse_san_move, parse_uci_move, GamePhase};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum GameOutcome {
    WhiteWins,
    BlackWins,
    Draw,
}

impl GameOutcome {
    pub fn as_pgn(&self) -> &'static str {
        match self {
            GameOutcome::WhiteWins => "1-0",
            GameOutcome::BlackWins => "0-1",
            GameOutcome::Draw => "1/2-1/2",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TerminationReason {
    Checkmate,
    Stalemate,
    InsufficientMaterial,
    FiftyMoveRule,
    ThreefoldRepetition,
}

/// Snapshot of the derived fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub fen: String,
    pub turn: char,
    pub in_check: bool,
    pub is_game_over: bool,
    pub result: Option<GameOutcome>,
    pub termination: Option<TerminationReason>,
}

#[derive(Debug, Clone)]
pub struct GameSession {
    start: Chess,
    position: Chess,
    history: Vec<ChessMove>,
    status: SessionStatus,
}

impl Default for GameSession {
    fn default() -> Self {
        Self::from_position(Chess::default())
    }
}

impl GameSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fen(fen: &str) -> Result<Self, ChessError> {
        Ok(Self::from_position(parse_fen(fen)?))
    }

    fn from_position(start: Chess) -> Self {
        let mut session = GameSession {
            position: start.clone(),
            start,
            history: Vec::new(),
            status: SessionStatus {
                fen: String::new(),
                turn: 'w',
                in_check: false,
                is_game_over: false,
                result: None,
                termination: None,
            },
        };
        session.recompute();
        session
    }

    // --- Transitions --------------------------------------------------------

    /// Apply a move given by squares; `promotion` defaults to a queen when a
    /// pawn reaches the last rank.
    pub fn apply_move(
        &mut self,
        from: &str,
        to: &str,
        promotion: Option<char>,
    ) -> Result<ChessMove, ChessError> {
        let illegal = || ChessError::IllegalMove(format!("{}{}", from, to));
        if self.status.is_game_over {
            return Err(illegal());
        }
        let from_sq: Square = from.parse().map_err(|_| illegal())?;
        let to_sq: Square = to.parse().map_err(|_| illegal())?;
        let promotion = promotion.and_then(Role::from_char);

        let candidates: Vec<Move> = self
            .position
            .legal_moves()
            .into_iter()
            .filter(|mv| mv.from() == Some(from_sq) && Self::lands_on(mv, to_sq, self.position.turn()))
            .collect();

        let mv = candidates
            .iter()
            .find(|mv| match mv.promotion() {
                None => true,
                Some(role) => role == promotion.unwrap_or(Role::Queen),
            })
            .copied()
            .ok_or_else(illegal)?;
        Ok(self.play(mv))
    }

    pub fn apply_san(&mut self, san: &str) -> Result<ChessMove, ChessError> {
        if self.status.is_game_over {
            return Err(ChessError::IllegalMove(san.to_string()));
        }
        let mv = parse_san_move(&self.position, san)?;
        Ok(self.play(mv))
    }

    pub fn apply_uci(&mut self, uci: &str) -> Result<ChessMove, ChessError> {
        if self.status.is_game_over {
            return Err(ChessError::IllegalMove(uci.to_string()));
        }
        let mv = parse_uci_move(&self.position, uci)?;
        Ok(self.play(mv))
    }

    /// Take back the last move.
    pub fn undo(&mut self) -> Option<ChessMove> {
        let last = self.history.pop()?;
        self.rebuild_position();
        Some(last)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn load_position(&mut self, fen: &str) -> Result<(), ChessError> {
        *self = Self::from_fen(fen)?;
        Ok(())
    }

    /// Replace the session with the game in `pgn_text`.
    pub fn load_pgn(&mut self, pgn_text: &str) -> Result<(), ChessError> {
        let parsed = pgn::parse_single(pgn_text);
        let mut next = match parsed.headers.get("FEN") {
            Some(fen) => Self::from_fen(fen)?,
            None => Self::default(),
        };
        for token in &parsed.moves {
            next.apply_san(token)?;
        }
        *self = next;
        Ok(())
    }

    /// Adopt a remote move list (SAN), replaying it from the start position.
    /// The local state is untouched if any move fails to replay.
    pub fn sync_from_remote(&mut self, history: &[String]) -> Result<(), ChessError> {
        let mut next = Self::from_position(self.start.clone());
        for san in history {
            next.apply_san(san)?;
        }
        *self = next;
        Ok(())
    }

    fn play(&mut self, mv: Move) -> ChessMove {
        let record = describe_move(&self.position, mv);
        self.position.play_unchecked(mv);
        self.history.push(record.clone());
        self.recompute();
        record
    }

    fn rebuild_position(&mut self) {
        let mut pos = self.start.clone();
        for record in &self.history {
            // History entries were legal when recorded from this same start.
            if let Ok(mv) = parse_uci_move(&pos, &record.lan) {
                pos.play_unchecked(mv);
            }
        }
        self.position = pos;
        self.recompute();
    }

    fn lands_on(mv: &Move, to: Square, turn: Color) -> bool {
        match mv.castling_side() {
            Some(side) => side.king_to(turn) == to || mv.to() == to,
            None => mv.to() == to,
        }
    }

    fn recompute(&mut self) {
        let pos = &self.position;
        let termination = if pos.is_checkmate() {
            Some(TerminationReason::Checkmate)
        } else if pos.is_stalemate() {
            Some(TerminationReason::Stalemate)
        } else if pos.is_insufficient_material() {
            Some(TerminationReason::InsufficientMaterial)
        } else if pos.halfmoves() >= 100 {
            Some(TerminationReason::FiftyMoveRule)
        } else if self.is_threefold_repetition() {
            Some(TerminationReason::ThreefoldRepetition)
        } else {
            None
        };

        let result = termination.map(|reason| match reason {
            TerminationReason::Checkmate => match pos.turn() {
                Color::White => GameOutcome::BlackWins,
                Color::Black => GameOutcome::WhiteWins,
            },
            _ => GameOutcome::Draw,
        });

        self.status = SessionStatus {
            fen: fen_of(pos),
            turn: pos.turn().char(),
            in_check: pos.is_check(),
            is_game_over: termination.is_some(),
            result,
            termination,
        };
    }

    fn is_threefold_repetition(&self) -> bool {
        let mut seen: HashMap<String, usize> = HashMap::new();
        let start_key = repetition_key(&fen_of(&self.start));
        seen.insert(start_key, 1);
        for record in &self.history {
            let count = seen.entry(repetition_key(&record.after)).or_insert(0);
            *count += 1;
            if *count >= 3 {
                return true;
            }
        }
        false
    }

    // --- Queries ------------------------------------------------------------

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn fen(&self) -> &str {
        &self.status.fen
    }

    pub fn turn(&self) -> Color {
        self.position.turn()
    }

    pub fn is_game_over(&self) -> bool {
        self.status.is_game_over
    }

    pub fn result(&self) -> Option<GameOutcome> {
        self.status.result
    }

    pub fn position(&self) -> &Chess {
        &self.position
    }

    pub fn history(&self) -> &[ChessMove] {
        &self.history
    }

    pub fn san_history(&self) -> Vec<String> {
        self.history.iter().map(|m| m.san.clone()).collect()
    }

    pub fn last_move(&self) -> Option<&ChessMove> {
        self.history.last()
    }

    /// Legal moves in long-algebraic notation.
    pub fn legal_moves(&self) -> Vec<String> {
        self.position
            .legal_moves()
            .into_iter()
            .map(crate::position::uci_of)
            .collect()
    }

    pub fn game_phase(&self) -> GamePhase {
        GamePhase::from_position(&self.position, self.history.len())
    }

    /// FEN after `plies` moves of the current history.
    pub fn position_at(&self, plies: usize) -> Option<String> {
        match plies {
            0 => Some(fen_of(&self.start)),
            n => self.history.get(n - 1).map(|m| m.after.clone()),
        }
    }

    /// The game so far as PGN text.
    pub fn pgn(&self) -> String {
        let mut headers = std::collections::BTreeMap::new();
        let start_fen = fen_of(&self.start);
        if start_fen != fen_of(&Chess::default()) {
            headers.insert("SetUp".to_string(), "1".to_string());
            headers.insert("FEN".to_string(), start_fen);
        }
        headers.insert(
            "Result".to_string(),
            self.status
                .result
                .map(|r| r.as_pgn().to_string())
                .unwrap_or_else(|| "*".to_string()),
        );
        pgn::create(&headers, &self.san_history())
    }
}

/// Placement, side to move, castling and en passant: the fields that decide
/// whether two positions repeat.
fn repetition_key(fen: &str) -> String {
    fen.split_whitespace().take(4).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_and_undo_recompute_status() {
        let mut session = GameSession::new();
        session.apply_move("e2", "e4", None).unwrap();
        assert_eq!(session.status().turn, 'b');
        assert_eq!(session.history().len(), 1);

        session.apply_san("e5").unwrap();
        session.apply_uci("d1h5").unwrap();
        assert_eq!(session.turn(), Color::Black);

        let undone = session.undo().unwrap();
        assert_eq!(undone.san, "Qh5");
        assert_eq!(session.status().turn, 'w');
        assert_eq!(
            session.fen(),
            "rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2"
        );
    }

    #[test]
    fn test_illegal_move_leaves_state_untouched() {
        let mut session = GameSession::new();
        let before = session.status().clone();
        assert!(session.apply_move("e2", "e5", None).is_err());
        assert!(session.apply_san("Nf6").is_err());
        assert_eq!(session.status(), &before);
    }

    #[test]
    fn test_checkmate_result() {
        let mut session = GameSession::new();
        for san in ["f3", "e5", "g4", "Qh4#"] {
            session.apply_san(san).unwrap();
        }
        assert!(session.is_game_over());
        assert!(session.status().in_check);
        assert_eq!(session.result(), Some(GameOutcome::BlackWins));
        assert_eq!(session.status().termination, Some(TerminationReason::Checkmate));
        assert!(session.apply_san("Kf2").is_err());

        session.undo();
        assert!(!session.is_game_over());
        assert_eq!(session.result(), None);
    }

    #[test]
    fn test_threefold_repetition() {
        let mut session = GameSession::new();
        for san in ["Nf3", "Nf6", "Ng1", "Ng8", "Nf3", "Nf6", "Ng1", "Ng8"] {
            session.apply_san(san).unwrap();
        }
        assert_eq!(session.status().termination, Some(TerminationReason::ThreefoldRepetition));
        assert_eq!(session.result(), Some(GameOutcome::Draw));
    }

    #[test]
    fn test_promotion_defaults_to_queen() {
        let mut session = GameSession::from_fen("8/P6k/8/8/8/8/8/K7 w - - 0 1").unwrap();
        let mv = session.apply_move("a7", "a8", None).unwrap();
        assert_eq!(mv.promotion, Some('q'));

        let mut session = GameSession::from_fen("8/P6k/8/8/8/8/8/K7 w - - 0 1").unwrap();
        let mv = session.apply_move("a7", "a8", Some('n')).unwrap();
        assert_eq!(mv.san, "a8=N");
    }

    #[test]
    fn test_castling_by_king_destination() {
        let mut session = GameSession::from_fen(
            "r1bqk2r/pppp1ppp/2n2n2/2b1p3/2B1P3/5N2/PPPP1PPP/RNBQK2R w KQkq - 4 4",
        )
        .unwrap();
        let mv = session.apply_move("e1", "g1", None).unwrap();
        assert_eq!(mv.san, "O-O");
    }

    #[test]
    fn test_sync_from_remote_is_atomic() {
        let mut session = GameSession::new();
        session.apply_san("d4").unwrap();
        let bad = vec!["d4".to_string(), "Ke7".to_string()];
        assert!(session.sync_from_remote(&bad).is_err());
        assert_eq!(session.history().len(), 1);

        let good = vec!["d4".to_string(), "d5".to_string(), "c4".to_string()];
        session.sync_from_remote(&good).unwrap();
        assert_eq!(session.san_history(), good);
        assert_eq!(session.status().turn, 'b');
    }

    #[test]
    fn test_load_pgn_and_export() {
        let mut session = GameSession::new();
        session.load_pgn("1. e4 e5 2. Nf3 Nc6 *").unwrap();
        assert_eq!(session.history().len(), 4);
        assert_eq!(session.position_at(0).as_deref(), Some(crate::position::START_FEN));
        let text = session.pgn();
        assert_eq!(pgn::extract_moves_only(&text), vec!["e4", "e5", "Nf3", "Nc6"]);

        session.reset();
        assert!(session.history().is_empty());
        assert_eq!(session.fen(), crate::position::START_FEN);
    }
}
