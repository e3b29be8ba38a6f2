//! Move quality classification: evaluation difference, severity bands and
//! the tactical explanation of a single move, plus game-level accuracy.
//!
//! All scores handed in are the engine's, relative to the side to move in
//! the evaluated position.

use serde::Serialize;
use shakmaty::{Chess, Move, Position};
use tracing::{debug, warn};

use chess_core::position::{self, GamePhase};
use chess_core::ChessError;

use crate::controller::{EngineController, EvalOptions};
use crate::error::EngineError;
use crate::evaluation::{Evaluation, MATE_SCORE};
use crate::tactics::{self, TacticalNote, Verdict};

/// Within this many centipawns of the best line the move counts as best.
const THRESHOLD_PLAYED_BEST: i32 = 25;
/// Within this many centipawns the move is reported as good.
const THRESHOLD_GOOD: i32 = 75;

/// Per-move loss cap used for accuracy.
const MAX_CP_LOSS: i32 = 500;

/// Depth used when reviewing a move during play.
pub const REVIEW_DEPTH: u32 = 8;

pub const UNABLE_TO_ANALYZE: &str = "Unable to analyze this move.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MoveCategory {
    Blunder,
    MajorMistake,
    Mistake,
    Inaccuracy,
    Okay,
    Good,
    Excellent,
    Brilliant,
    Best,
}

impl MoveCategory {
    pub fn label(&self) -> &'static str {
        match self {
            MoveCategory::Blunder => "🚨 Blunder",
            MoveCategory::MajorMistake => "❌ Major Mistake",
            MoveCategory::Mistake => "⚠️ Mistake",
            MoveCategory::Inaccuracy => "⚠️ Inaccuracy",
            MoveCategory::Okay => "✓ Okay",
            MoveCategory::Good => "✅ Good",
            MoveCategory::Excellent => "⭐ Excellent",
            MoveCategory::Brilliant => "💎 Brilliant",
            MoveCategory::Best => "🌟 Best",
        }
    }
}

pub fn category_for_diff(diff: i32) -> MoveCategory {
    if diff > 500 {
        MoveCategory::Blunder
    } else if diff > 300 {
        MoveCategory::MajorMistake
    } else if diff > 150 {
        MoveCategory::Mistake
    } else if diff > 75 {
        MoveCategory::Inaccuracy
    } else if diff > 25 {
        MoveCategory::Okay
    } else if diff > -25 {
        MoveCategory::Good
    } else if diff > -100 {
        MoveCategory::Excellent
    } else if diff > -200 {
        MoveCategory::Brilliant
    } else {
        MoveCategory::Best
    }
}

/// Closing sentence band; shares its thresholds with the categories.
pub fn verdict_for_diff(diff: i32) -> Verdict {
    let pawns = (diff as f64 / 100.0).round() as i32;
    if diff < 25 {
        Verdict::RoughlyEqual
    } else if diff < 100 {
        Verdict::SlightlyInaccurate
    } else if diff < 300 {
        Verdict::LosesPawns(pawns)
    } else {
        Verdict::SeriousMistake(pawns)
    }
}

/// The three searches a classification is built from.
#[derive(Debug, Clone)]
pub struct MoveEvaluations {
    /// Position before the move; carries the engine's best move.
    pub before: Evaluation,
    /// Position after the engine's best move, when it could be replayed.
    pub after_best: Option<Evaluation>,
    /// Position after the move actually played.
    pub after_player: Evaluation,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveClassification {
    /// `"{san} - {category label}"`, or just the SAN when analysis failed.
    #[serde(rename = "move")]
    pub label: String,
    pub san: String,
    pub category: Option<MoveCategory>,
    /// Centipawns lost against the best continuation.
    pub evaluation: i32,
    pub played_best: bool,
    pub is_good: bool,
    /// Suggested move in SAN, only when the player missed it.
    pub best_move: Option<String>,
    pub notes: Vec<TacticalNote>,
    pub explanation: String,
    pub feedback: String,
    pub phase: GamePhase,
    pub is_capture: bool,
    pub is_check: bool,
    pub is_checkmate: bool,
}

impl MoveClassification {
    /// Result used when the engine could not review the move.
    pub fn unavailable(san: &str, phase: GamePhase) -> Self {
        Self {
            label: san.to_string(),
            san: san.to_string(),
            category: None,
            evaluation: 0,
            played_best: false,
            is_good: true,
            best_move: None,
            notes: Vec::new(),
            explanation: UNABLE_TO_ANALYZE.to_string(),
            feedback: UNABLE_TO_ANALYZE.to_string(),
            phase,
            is_capture: san.contains('x'),
            is_check: san.contains('+') || san.contains('#'),
            is_checkmate: san.contains('#'),
        }
    }
}

/// Played move given either as UCI (`e2e4`) or SAN (`e4`).
pub fn parse_played_move(pos: &Chess, played: &str) -> Result<Move, ChessError> {
    position::parse_uci_move(pos, played).or_else(|_| position::parse_san_move(pos, played))
}

/// Centipawn loss of the played move against the best line, both from the
/// mover's point of view. Mates count as +/-[`MATE_SCORE`].
pub fn evaluation_diff(evals: &MoveEvaluations) -> i32 {
    let best_for_mover = match &evals.after_best {
        Some(after_best) => -after_best.cp_equivalent(),
        None => evals.before.cp_equivalent(),
    };
    let player_for_mover = -evals.after_player.cp_equivalent();
    (best_for_mover - player_for_mover).clamp(-MATE_SCORE, MATE_SCORE)
}

/// Classify one move. Deterministic in its inputs.
pub fn classify_move(
    before_fen: &str,
    played: &str,
    evals: &MoveEvaluations,
) -> Result<MoveClassification, ChessError> {
    let before = position::parse_fen(before_fen)?;
    let mv = parse_played_move(&before, played)?;
    let detail = position::describe_move(&before, mv);
    let phase = GamePhase::from_move_number(before.fullmoves().get());

    let best = evals
        .before
        .best_move
        .as_deref()
        .and_then(|uci| position::parse_uci_move(&before, uci).ok());
    let exact_best = best == Some(mv);

    let diff = if exact_best { 0 } else { evaluation_diff(evals) };
    let played_best = diff < THRESHOLD_PLAYED_BEST;
    let category = if exact_best {
        MoveCategory::Best
    } else {
        category_for_diff(diff)
    };

    let mut notes: Vec<TacticalNote> = Vec::new();
    notes.extend(tactics::capture_note(mv));
    notes.extend(tactics::hanging_note(&before, mv));

    let mut best_san = None;
    if !played_best {
        match best {
            Some(best) => {
                let san = position::san_of(&before, best);
                notes.push(tactics::best_move_note(&before, best, mv, &san));
                best_san = Some(san);
            }
            None => {
                if let Some(uci) = evals.before.best_move.as_deref() {
                    debug!(best = uci, fen = before_fen, "Best move not playable here");
                }
                notes.push(TacticalNote::StrongerAvailable);
            }
        }
    }
    notes.push(TacticalNote::Verdict(verdict_for_diff(diff)));

    let best_move = best_san.filter(|san| *san != detail.san);

    Ok(MoveClassification {
        label: format!("{} - {}", detail.san, category.label()),
        category: Some(category),
        evaluation: diff,
        played_best,
        is_good: diff < THRESHOLD_GOOD,
        best_move,
        explanation: tactics::render_technical(&notes),
        feedback: tactics::render_plain(&notes),
        notes,
        phase,
        is_capture: detail.is_capture(),
        is_check: detail.is_check(),
        is_checkmate: detail.is_checkmate(),
        san: detail.san,
    })
}

/// Drives the engine through the three searches a classification needs.
#[derive(Clone)]
pub struct MoveReviewer {
    engine: EngineController,
    depth: u32,
}

impl MoveReviewer {
    pub fn new(engine: EngineController) -> Self {
        Self {
            engine,
            depth: REVIEW_DEPTH,
        }
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    /// Review a move; engine failures degrade to [`MoveClassification::unavailable`].
    pub async fn review(&self, before_fen: &str, played: &str) -> MoveClassification {
        match self.try_review(before_fen, played).await {
            Ok(classification) => classification,
            Err(e) => {
                warn!(error = %e, fen = before_fen, played, "Move analysis failed");
                let phase = position::parse_fen(before_fen)
                    .map(|pos| GamePhase::from_move_number(pos.fullmoves().get()))
                    .unwrap_or(GamePhase::Opening);
                let san = position::parse_fen(before_fen)
                    .and_then(|pos| {
                        parse_played_move(&pos, played).map(|mv| position::san_of(&pos, mv))
                    })
                    .unwrap_or_else(|_| played.to_string());
                MoveClassification::unavailable(&san, phase)
            }
        }
    }

    pub async fn try_review(
        &self,
        before_fen: &str,
        played: &str,
    ) -> Result<MoveClassification, EngineError> {
        let evals = self.evaluate_move(before_fen, played).await?;
        Ok(classify_move(before_fen, played, &evals)?)
    }

    /// Run the before, after-best and after-played searches.
    pub async fn evaluate_move(
        &self,
        before_fen: &str,
        played: &str,
    ) -> Result<MoveEvaluations, EngineError> {
        let pos = position::parse_fen(before_fen)?;
        let mv = parse_played_move(&pos, played)?;
        let options = EvalOptions::depth(self.depth);

        let before = self.engine.evaluate(before_fen, options).await?;

        let mut after = pos.clone();
        after.play_unchecked(mv);
        let after_fen = position::fen_of(&after);
        let after_player = self.engine.evaluate(&after_fen, options).await?;

        let best = before
            .best_move
            .as_deref()
            .and_then(|uci| position::parse_uci_move(&pos, uci).ok());
        let after_best = match best {
            Some(best) if best == mv => Some(after_player.clone()),
            Some(best) => {
                let mut after_best = pos;
                after_best.play_unchecked(best);
                let fen = position::fen_of(&after_best);
                Some(self.engine.evaluate(&fen, options).await?)
            }
            None => None,
        };

        Ok(MoveEvaluations {
            before,
            after_best,
            after_player,
        })
    }
}

/// Accuracy from average centipawn loss: `100 * sqrt(1 / (1 + acpl / 100))`.
pub fn calculate_accuracy(total_cp_loss: i32, move_count: u32) -> f64 {
    if move_count == 0 {
        return 100.0;
    }
    let acpl = total_cp_loss as f64 / move_count as f64;
    let accuracy = 100.0 * (1.0 / (1.0 + acpl / 100.0)).sqrt();
    accuracy.clamp(0.0, 100.0)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSummary {
    pub moves: u32,
    pub total_cp_loss: i32,
    pub accuracy: f64,
    pub best: u32,
    pub good: u32,
    pub inaccuracies: u32,
    pub mistakes: u32,
    pub blunders: u32,
}

impl GameSummary {
    /// Classifications without a category (failed reviews) are skipped.
    pub fn from_classifications(classifications: &[MoveClassification]) -> Self {
        let mut summary = GameSummary::default();
        for c in classifications {
            let Some(category) = c.category else {
                continue;
            };
            summary.moves += 1;
            summary.total_cp_loss += c.evaluation.clamp(0, MAX_CP_LOSS);
            match category {
                MoveCategory::Blunder => summary.blunders += 1,
                MoveCategory::MajorMistake | MoveCategory::Mistake => summary.mistakes += 1,
                MoveCategory::Inaccuracy => summary.inaccuracies += 1,
                _ if c.played_best => summary.best += 1,
                _ => summary.good += 1,
            }
        }
        summary.accuracy = calculate_accuracy(summary.total_cp_loss, summary.moves);
        summary
    }
}
