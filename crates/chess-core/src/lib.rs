pub mod error;
pub mod game_data;
pub mod pgn;
pub mod position;
pub mod session;

pub use error::ChessError;
pub use game_data::{ChessMove, Game, GameMetadata, Source};
pub use position::{GamePhase, START_FEN};
pub use session::{GameOutcome, GameSession, SessionStatus, TerminationReason};
