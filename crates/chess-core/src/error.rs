use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChessError {
    #[error("Invalid FEN: {0}")]
    InvalidFen(String),

    #[error("Illegal move: {0}")]
    IllegalMove(String),

    #[error("Invalid PGN: {0}")]
    InvalidPgn(String),

    #[error("PGN contains no moves")]
    EmptyGame,
}
