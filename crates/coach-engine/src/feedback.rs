//! Coaching text for a classified move when no language model is used, and
//! the prompt handed to one when it is.

use serde::{Deserialize, Serialize};

use chess_core::position::GamePhase;

use crate::analysis::{category_for_diff, MoveClassification};

pub const REWRITE_SYSTEM_MESSAGE: &str = "Only replace phrases about \"advantage\" and \"points\" with simpler words. Keep everything else word-for-word. Add one chess tip at the end. Never say \"here is\" or use meta language.";

/// Input of the feedback endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeedbackRequest {
    /// Plain-language analysis of the move, rewritten by a language model.
    pub cleaned_analysis: Option<String>,
    pub move_notation: Option<String>,
    pub eval_diff: Option<i32>,
    pub game_phase: Option<GamePhase>,
    pub is_capture: bool,
    /// Suggested move in SAN.
    pub best_move: Option<String>,
    pub played_best_move: bool,
    /// Score after the played move, from the player's side.
    pub after_eval_player: Option<i32>,
}

impl FeedbackRequest {
    pub fn from_classification(c: &MoveClassification, after_eval_player: i32) -> Self {
        Self {
            cleaned_analysis: Some(c.feedback.clone()),
            move_notation: Some(c.san.clone()),
            eval_diff: Some(c.evaluation),
            game_phase: Some(c.phase),
            is_capture: c.is_capture,
            best_move: c.best_move.clone(),
            played_best_move: c.played_best,
            after_eval_player: Some(after_eval_player),
        }
    }

    pub fn diff(&self) -> i32 {
        self.eval_diff.unwrap_or(0)
    }

    pub fn category_label(&self) -> &'static str {
        category_for_diff(self.diff()).label()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackResponse {
    pub feedback: String,
    pub category: String,
}

impl FeedbackResponse {
    pub fn rule_based(request: &FeedbackRequest) -> Self {
        Self {
            feedback: fallback_feedback(request),
            category: request.category_label().to_string(),
        }
    }

    /// Used when the language model fails: the cleaned analysis as is.
    pub fn passthrough(request: &FeedbackRequest) -> Self {
        Self {
            feedback: request
                .cleaned_analysis
                .clone()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| crate::analysis::UNABLE_TO_ANALYZE.to_string()),
            category: request.category_label().to_string(),
        }
    }
}

/// User prompt asking a model to simplify the cleaned analysis.
pub fn rewrite_prompt(cleaned_analysis: &str) -> String {
    format!(
        "Rewrite this text by replacing technical jargon with simple language:\n\n\
         \"{cleaned_analysis}\"\n\n\
         Rules:\n\
         - Replace \"loses about X pawn(s) worth of advantage\" with \"weakens your position\"\n\
         - Replace \"slightly inaccurate\" with \"not the strongest\"\n\
         - Keep all piece names, squares, and tactical facts exactly the same\n\
         - Add one chess tip at the very end\n\n\
         Output only the final text, no explanation."
    )
}

/// One-line summary of a score from the player's side.
pub fn position_context(evaluation: i32) -> &'static str {
    if evaluation.abs() < 50 {
        "📊 Position is equal"
    } else if evaluation > 300 {
        "📊 You're winning"
    } else if evaluation < -300 {
        "📊 You're losing"
    } else if evaluation > 100 {
        "📊 You have an advantage"
    } else if evaluation < -100 {
        "📊 Opponent has an advantage"
    } else if evaluation > 0 {
        "📊 Slight edge for you"
    } else {
        "📊 Opponent has a slight edge"
    }
}

/// Rule-based coaching text: a verdict, a phase or capture specific tip and
/// the position context.
pub fn fallback_feedback(request: &FeedbackRequest) -> String {
    let diff = request.diff();
    let phase = request.game_phase.unwrap_or(GamePhase::Opening);
    let best = request.best_move.as_deref();
    let mut text = String::new();

    if request.played_best_move {
        text.push_str("🌟 Best move! You found Stockfish's top choice. ");
        text.push_str(if request.is_capture {
            "This tactical capture is precisely what the position demanded. Always calculate forced sequences carefully. "
        } else {
            match phase {
                GamePhase::Opening => "Excellent opening play - you're following strong principles like development and center control. ",
                GamePhase::Middlegame => "Sharp calculation! This creates maximum pressure. Remember: in the middlegame, initiative often matters more than material. ",
                GamePhase::Endgame => "Perfect endgame technique. You're converting correctly. Key endgame principle: activate your king! ",
            }
        });
    } else if diff < 25 {
        text.push_str("✅ Excellent! Your move is nearly as good as Stockfish's top choice. ");
        text.push_str("This shows strong understanding of the position. When multiple moves are similarly good, trust your intuition.");
    } else if diff < 75 {
        text.push_str("✓ Good move, though not the absolute best. ");
        if let Some(best) = best {
            text.push_str(&format!("Stockfish slightly prefers {best} here. "));
        }
        text.push_str(match phase {
            GamePhase::Opening => "Remember: develop with purpose, not just to develop.",
            _ => "Always look for the most forcing moves first.",
        });
    } else if diff < 150 {
        text.push_str("⚠️ Inaccuracy. ");
        if let Some(best) = best {
            text.push_str(&format!("The best move was {best}. "));
        }
        text.push_str(match phase {
            GamePhase::Opening => "Focus on piece development and center control. Knights before bishops in most openings!",
            GamePhase::Middlegame => "Look for more active piece placement. Every piece should have a purpose.",
            GamePhase::Endgame => "In the endgame, precision is everything. Calculate concrete variations.",
        });
    } else if diff < 300 {
        text.push_str("❌ Mistake. ");
        if let Some(best) = best {
            text.push_str(&format!("{best} was much stronger here. "));
        }
        text.push_str(if request.is_capture {
            "This capture may have walked into a tactical shot. Always ask: \"What does this move allow my opponent?\" "
        } else {
            "Before moving, always check for opponent threats. \"See the whole board!\""
        });
    } else if diff < 500 {
        text.push_str("🚨 Major mistake! ");
        if let Some(best) = best {
            text.push_str(&format!("Playing {best} instead was critical. "));
        }
        text.push_str("This significantly weakens your position. Important principle: When in doubt, improve your worst-placed piece.");
    } else {
        text.push_str("😱 Blunder! ");
        if let Some(best) = best {
            text.push_str(&format!("{best} was essential here. "));
        }
        text.push_str(if request.is_capture {
            "This capture was a trap! Lesson: Not every check or capture is good - calculate first."
        } else {
            "You may have hung a piece or missed a key defensive move. Take your time on critical positions!"
        });
    }

    let context = position_context(request.after_eval_player.unwrap_or(0));
    format!("{}\n\n{context}", text.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(diff: i32) -> FeedbackRequest {
        FeedbackRequest {
            eval_diff: Some(diff),
            ..FeedbackRequest::default()
        }
    }

    #[test]
    fn test_position_context() {
        assert_eq!(position_context(0), "📊 Position is equal");
        assert_eq!(position_context(-49), "📊 Position is equal");
        assert_eq!(position_context(400), "📊 You're winning");
        assert_eq!(position_context(-301), "📊 You're losing");
        assert_eq!(position_context(150), "📊 You have an advantage");
        assert_eq!(position_context(-150), "📊 Opponent has an advantage");
        assert_eq!(position_context(80), "📊 Slight edge for you");
        assert_eq!(position_context(-80), "📊 Opponent has a slight edge");
    }

    #[test]
    fn test_blunder_feedback_mentions_best_move() {
        let mut req = request(600);
        req.best_move = Some("Nxe5".into());
        req.after_eval_player = Some(-450);
        let text = fallback_feedback(&req);
        assert!(text.starts_with("😱 Blunder! Nxe5 was essential here."));
        assert!(text.ends_with("📊 You're losing"));
        assert_eq!(req.category_label(), "🚨 Blunder");
    }

    #[test]
    fn test_best_move_tip_depends_on_phase() {
        let mut req = request(0);
        req.played_best_move = true;
        req.game_phase = Some(GamePhase::Endgame);
        assert!(fallback_feedback(&req).contains("activate your king"));

        req.is_capture = true;
        assert!(fallback_feedback(&req).contains("tactical capture"));
    }

    #[test]
    fn test_request_deserializes_camel_case() {
        let req: FeedbackRequest = serde_json::from_str(
            r#"{"cleanedAnalysis":"Excellent move!","evalDiff":120,"gamePhase":"middlegame","isCapture":false}"#,
        )
        .unwrap();
        assert_eq!(req.diff(), 120);
        assert_eq!(req.game_phase, Some(GamePhase::Middlegame));
        assert_eq!(req.category_label(), "⚠️ Inaccuracy");
        assert!(fallback_feedback(&req).contains("Every piece should have a purpose"));
    }

    #[test]
    fn test_passthrough_falls_back_to_generic_text() {
        let resp = FeedbackResponse::passthrough(&request(10));
        assert_eq!(resp.feedback, "Unable to analyze this move.");
        assert_eq!(resp.category, "✅ Good");
    }
}
