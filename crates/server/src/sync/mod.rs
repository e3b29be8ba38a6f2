//! Two-player games over a shared realtime store.

pub mod firebase;
pub mod game_sync;
pub mod memory;
pub mod session;
pub mod store;

pub use firebase::FirebaseStore;
pub use game_sync::{CreatedGame, GameSync, JoinedGame, MultiplayerGameState, PlayerColor, PlayerInfo};
pub use memory::MemoryStore;
pub use session::MultiplayerSession;
pub use store::{RealtimeStore, Snapshots};

use chess_core::ChessError;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Multiplayer is not configured. Set FIREBASE_DATABASE_URL to enable it.")]
    NotConfigured,

    #[error("Game not found")]
    GameNotFound,

    #[error("Game is full")]
    GameFull,

    #[error("It is not your turn")]
    NotYourTurn,

    #[error("Realtime store error: {0}")]
    Store(String),

    #[error("Invalid game state: {0}")]
    Decode(String),

    #[error(transparent)]
    Move(#[from] ChessError),
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Decode(e.to_string())
    }
}
