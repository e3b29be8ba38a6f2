pub mod analysis;
pub mod config;
pub mod controller;
pub mod difficulty;
pub mod error;
pub mod evaluation;
pub mod feedback;
pub mod play;
pub mod stockfish;
pub mod tactics;
pub mod uci;

pub use analysis::{
    calculate_accuracy, category_for_diff, classify_move, GameSummary, MoveCategory,
    MoveClassification, MoveEvaluations, MoveReviewer,
};
pub use config::EngineConfig;
pub use controller::{EngineController, EngineState, EvalOptions, PendingEvaluation};
pub use difficulty::{DifficultyPreset, DifficultySettings};
pub use error::EngineError;
pub use evaluation::{Evaluation, PvLine, ScoreKind, MATE_SCORE};
pub use feedback::{FeedbackRequest, FeedbackResponse};
pub use play::{PlayConfig, PlayError, PlayEvent, PlaySession};
pub use stockfish::EngineLink;
pub use tactics::TacticalNote;
