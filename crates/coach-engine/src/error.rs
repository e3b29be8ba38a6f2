//! Engine error types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The engine process could not be started or has exited.
    #[error("Chess engine unavailable: {0}. Check STOCKFISH_PATH points to a UCI engine binary.")]
    Unavailable(String),

    #[error("Engine controller destroyed")]
    Destroyed,

    #[error("Engine I/O error: {0}")]
    Io(String),

    #[error("Engine protocol error: {0}")]
    Protocol(String),

    #[error("Invalid position: {0}")]
    InvalidPosition(String),
}

impl From<chess_core::ChessError> for EngineError {
    fn from(e: chess_core::ChessError) -> Self {
        EngineError::InvalidPosition(e.to_string())
    }
}
