//! Local side of a two-player game.
//!
//! A move is applied to the local [`GameSession`] first and then synced; a
//! failed sync takes it back. Remote updates are adopted only when the remote
//! history is strictly longer than the local one, so a client never replays
//! its own move as the opponent's.
//!
//! Both players write the same record and the last write wins. Two moves
//! sent at nearly the same moment are not reconciled.

use chess_core::{ChessMove, GameSession};
use serde_json::{json, Map};
use tokio::sync::mpsc;

use super::game_sync::{CreatedGame, GameSync, MultiplayerGameState, PlayerColor};
use super::SyncError;

pub struct MultiplayerSession {
    sync: GameSync,
    game_id: String,
    color: PlayerColor,
    game: GameSession,
    opponent_connected: bool,
}

impl MultiplayerSession {
    pub async fn create(sync: GameSync, color: PlayerColor) -> Result<(Self, CreatedGame), SyncError> {
        let created = sync.create_game(color).await?;
        let session = Self {
            sync,
            game_id: created.game_id.clone(),
            color,
            game: GameSession::new(),
            opponent_connected: false,
        };
        Ok((session, created))
    }

    pub async fn join(sync: GameSync, game_id: &str) -> Result<Self, SyncError> {
        let joined = sync.join_game(game_id).await?;
        let mut session = Self {
            sync,
            game_id: game_id.to_string(),
            color: joined.color,
            game: GameSession::new(),
            opponent_connected: true,
        };
        if joined.state.history.is_empty() {
            session.game.load_position(&joined.state.fen)?;
        } else {
            session.adopt(&joined.state)?;
        }
        Ok(session)
    }

    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    pub fn color(&self) -> PlayerColor {
        self.color
    }

    pub fn game(&self) -> &GameSession {
        &self.game
    }

    pub fn opponent_connected(&self) -> bool {
        self.opponent_connected
    }

    pub fn is_my_turn(&self) -> bool {
        !self.game.is_game_over() && PlayerColor::from(self.game.turn()) == self.color
    }

    /// Apply locally, then sync. The local move is taken back if the sync
    /// fails.
    pub async fn make_move(
        &mut self,
        from: &str,
        to: &str,
        promotion: Option<char>,
    ) -> Result<ChessMove, SyncError> {
        if !self.is_my_turn() {
            return Err(SyncError::NotYourTurn);
        }
        let mv = self.game.apply_move(from, to, promotion)?;

        if let Err(e) = self.sync.make_move(&self.game_id, &mv, self.game.fen()).await {
            tracing::warn!(game_id = %self.game_id, "Move sync failed, reverting: {e}");
            self.game.undo();
            return Err(e);
        }

        if let Some(result) = self.game.result() {
            let mut fields = Map::new();
            fields.insert("result".into(), json!(result.as_pgn()));
            if let Err(e) = self.sync.update_game_state(&self.game_id, fields).await {
                tracing::warn!(game_id = %self.game_id, "Failed to record result: {e}");
            }
        }
        Ok(mv)
    }

    /// Handle one remote snapshot. Returns `true` when it carried new moves.
    pub fn apply_remote(&mut self, state: &MultiplayerGameState) -> Result<bool, SyncError> {
        self.opponent_connected = state
            .player(self.color.opposite())
            .is_some_and(|p| p.connected);

        if state.history.len() <= self.game.history().len() {
            return Ok(false);
        }
        self.adopt(state)?;
        Ok(true)
    }

    pub async fn listen(&self) -> Result<mpsc::UnboundedReceiver<MultiplayerGameState>, SyncError> {
        self.sync.listen_for_moves(&self.game_id).await
    }

    pub async fn leave(&self) -> Result<(), SyncError> {
        self.sync.disconnect(&self.game_id, self.color).await
    }

    fn adopt(&mut self, state: &MultiplayerGameState) -> Result<(), SyncError> {
        let sans: Vec<String> = state.history.iter().map(|m| m.san.clone()).collect();
        self.game.sync_from_remote(&sans)?;
        Ok(())
    }
}
