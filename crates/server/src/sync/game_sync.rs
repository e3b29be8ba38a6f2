use std::sync::Arc;

use chess_core::{ChessMove, START_FEN};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use shakmaty::Color;
use tokio::sync::mpsc;

use super::store::{random_suffix, RealtimeStore};
use super::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerColor {
    White,
    Black,
}

impl PlayerColor {
    pub fn opposite(self) -> Self {
        match self {
            PlayerColor::White => PlayerColor::Black,
            PlayerColor::Black => PlayerColor::White,
        }
    }

    fn field(self) -> &'static str {
        match self {
            PlayerColor::White => "playerWhite",
            PlayerColor::Black => "playerBlack",
        }
    }
}

impl From<Color> for PlayerColor {
    fn from(color: Color) -> Self {
        match color {
            Color::White => PlayerColor::White,
            Color::Black => PlayerColor::Black,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub id: String,
    pub connected: bool,
    pub color: PlayerColor,
}

fn unfinished() -> String {
    "*".to_string()
}

/// The shared record of one game. Absent fields default so partially
/// written records still decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiplayerGameState {
    pub fen: String,
    #[serde(default)]
    pub history: Vec<ChessMove>,
    #[serde(default)]
    pub player_white: Option<PlayerInfo>,
    #[serde(default)]
    pub player_black: Option<PlayerInfo>,
    pub current_turn: PlayerColor,
    #[serde(default = "unfinished")]
    pub result: String,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub last_move_at: i64,
}

impl MultiplayerGameState {
    pub fn player(&self, color: PlayerColor) -> Option<&PlayerInfo> {
        match color {
            PlayerColor::White => self.player_white.as_ref(),
            PlayerColor::Black => self.player_black.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedGame {
    pub game_id: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct JoinedGame {
    pub color: PlayerColor,
    pub state: MultiplayerGameState,
}

/// One player's handle on the shared game records. Without a store every
/// operation fails with [`SyncError::NotConfigured`].
#[derive(Clone)]
pub struct GameSync {
    store: Option<Arc<dyn RealtimeStore>>,
    player_id: String,
    app_base_url: String,
}

impl GameSync {
    pub fn new(store: Option<Arc<dyn RealtimeStore>>, app_base_url: &str) -> Self {
        let player_id = format!(
            "player_{}_{}",
            chrono::Utc::now().timestamp_millis(),
            random_suffix(7).to_ascii_lowercase()
        );
        Self {
            store,
            player_id,
            app_base_url: app_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.store.is_some()
    }

    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    fn store(&self) -> Result<&Arc<dyn RealtimeStore>, SyncError> {
        self.store.as_ref().ok_or(SyncError::NotConfigured)
    }

    fn game_path(game_id: &str) -> String {
        format!("games/{game_id}")
    }

    fn me(&self, color: PlayerColor) -> PlayerInfo {
        PlayerInfo {
            id: self.player_id.clone(),
            connected: true,
            color,
        }
    }

    pub async fn fetch_state(&self, game_id: &str) -> Result<MultiplayerGameState, SyncError> {
        let value = self
            .store()?
            .get(&Self::game_path(game_id))
            .await?
            .ok_or(SyncError::GameNotFound)?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn create_game(&self, color: PlayerColor) -> Result<CreatedGame, SyncError> {
        let store = self.store()?;
        let now = chrono::Utc::now().timestamp_millis();
        let state = MultiplayerGameState {
            fen: START_FEN.to_string(),
            history: Vec::new(),
            player_white: (color == PlayerColor::White).then(|| self.me(color)),
            player_black: (color == PlayerColor::Black).then(|| self.me(color)),
            current_turn: PlayerColor::White,
            result: unfinished(),
            created_at: now,
            last_move_at: now,
        };
        let game_id = store.push("games", serde_json::to_value(&state)?).await?;
        self.watch_connection(&game_id, color).await?;

        tracing::info!(game_id = %game_id, ?color, "Created multiplayer game");
        Ok(CreatedGame {
            url: format!("{}/play/friend/{}", self.app_base_url, game_id),
            game_id,
        })
    }

    /// Take the free seat, white first.
    pub async fn join_game(&self, game_id: &str) -> Result<JoinedGame, SyncError> {
        let store = self.store()?;
        let mut state = self.fetch_state(game_id).await?;
        let color = if state.player_white.is_none() {
            PlayerColor::White
        } else if state.player_black.is_none() {
            PlayerColor::Black
        } else {
            return Err(SyncError::GameFull);
        };

        let me = self.me(color);
        let mut fields = Map::new();
        fields.insert(color.field().to_string(), serde_json::to_value(&me)?);
        store.update(&Self::game_path(game_id), fields).await?;
        self.watch_connection(game_id, color).await?;

        match color {
            PlayerColor::White => state.player_white = Some(me),
            PlayerColor::Black => state.player_black = Some(me),
        }
        tracing::info!(game_id, ?color, "Joined multiplayer game");
        Ok(JoinedGame { color, state })
    }

    /// Every change to the game record, including connection flips. The
    /// stream ends when the game is deleted.
    pub async fn listen_for_moves(
        &self,
        game_id: &str,
    ) -> Result<mpsc::UnboundedReceiver<MultiplayerGameState>, SyncError> {
        let mut raw = self.store()?.subscribe(&Self::game_path(game_id)).await?;
        let (tx, rx) = mpsc::unbounded_channel();
        let game_id = game_id.to_string();
        tokio::spawn(async move {
            while let Some(value) = raw.recv().await {
                if value.is_null() {
                    continue;
                }
                match serde_json::from_value::<MultiplayerGameState>(value) {
                    Ok(state) => {
                        if tx.send(state).is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!(game_id = %game_id, "Ignoring malformed game state: {e}"),
                }
            }
        });
        Ok(rx)
    }

    /// Append a move the caller has already applied locally.
    pub async fn make_move(&self, game_id: &str, mv: &ChessMove, new_fen: &str) -> Result<(), SyncError> {
        let store = self.store()?;
        let state = self.fetch_state(game_id).await?;
        let mut history = state.history;
        history.push(mv.clone());

        let mut fields = Map::new();
        fields.insert("fen".into(), json!(new_fen));
        fields.insert("history".into(), serde_json::to_value(&history)?);
        fields.insert("currentTurn".into(), serde_json::to_value(state.current_turn.opposite())?);
        fields.insert("lastMoveAt".into(), json!(chrono::Utc::now().timestamp_millis()));
        store.update(&Self::game_path(game_id), fields).await
    }

    pub async fn update_game_state(&self, game_id: &str, fields: Map<String, Value>) -> Result<(), SyncError> {
        self.store()?.update(&Self::game_path(game_id), fields).await
    }

    /// Mark the seat offline and drop the presence hook registered on join.
    pub async fn disconnect(&self, game_id: &str, color: PlayerColor) -> Result<(), SyncError> {
        let store = self.store()?;
        let path = format!("{}/{}/connected", Self::game_path(game_id), color.field());
        store.set(&path, json!(false)).await?;
        store.cancel_on_disconnect(&path).await
    }

    /// Run the presence hooks of every game this client still sits in.
    /// A no-op without a store.
    pub async fn shutdown(&self) -> Result<(), SyncError> {
        match &self.store {
            Some(store) => store.disconnect().await,
            None => Ok(()),
        }
    }

    pub async fn game_exists(&self, game_id: &str) -> Result<bool, SyncError> {
        Ok(self.store()?.get(&Self::game_path(game_id)).await?.is_some())
    }

    /// The seat this player holds in the game, if any.
    pub async fn player_color(&self, game_id: &str) -> Result<Option<PlayerColor>, SyncError> {
        let state = match self.fetch_state(game_id).await {
            Ok(state) => state,
            Err(SyncError::GameNotFound) => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok([PlayerColor::White, PlayerColor::Black]
            .into_iter()
            .find(|color| state.player(*color).is_some_and(|p| p.id == self.player_id)))
    }

    async fn watch_connection(&self, game_id: &str, color: PlayerColor) -> Result<(), SyncError> {
        let store = self.store()?;
        let path = format!("{}/{}/connected", Self::game_path(game_id), color.field());
        store.on_disconnect_set(&path, json!(false)).await?;
        store.set(&path, json!(true)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::MemoryStore;

    fn pair() -> (GameSync, GameSync) {
        let store = MemoryStore::new();
        let host = GameSync::new(Some(Arc::new(store.clone())), "http://localhost:3000/");
        let guest = GameSync::new(Some(Arc::new(store.connection())), "http://localhost:3000");
        (host, guest)
    }

    #[tokio::test]
    async fn test_unconfigured_sync_fails_cleanly() {
        let sync = GameSync::new(None, "http://localhost:3000");
        assert!(!sync.is_configured());
        assert!(matches!(sync.create_game(PlayerColor::White).await, Err(SyncError::NotConfigured)));
        assert!(matches!(sync.game_exists("x").await, Err(SyncError::NotConfigured)));
    }

    #[tokio::test]
    async fn test_create_and_join() {
        let (host, guest) = pair();
        let created = host.create_game(PlayerColor::Black).await.unwrap();
        assert_eq!(created.url, format!("http://localhost:3000/play/friend/{}", created.game_id));
        assert!(guest.game_exists(&created.game_id).await.unwrap());

        let joined = guest.join_game(&created.game_id).await.unwrap();
        assert_eq!(joined.color, PlayerColor::White);
        assert_eq!(joined.state.fen, START_FEN);
        assert!(joined.state.history.is_empty());
        assert_eq!(host.player_color(&created.game_id).await.unwrap(), Some(PlayerColor::Black));
        assert_eq!(guest.player_color(&created.game_id).await.unwrap(), Some(PlayerColor::White));

        let third = GameSync::new(guest.store.clone(), "http://localhost:3000");
        assert!(matches!(third.join_game(&created.game_id).await, Err(SyncError::GameFull)));
        assert!(matches!(third.join_game("missing").await, Err(SyncError::GameNotFound)));
    }

    #[tokio::test]
    async fn test_disconnect_clears_connected_flag() {
        let (host, guest) = pair();
        let created = host.create_game(PlayerColor::White).await.unwrap();
        guest.join_game(&created.game_id).await.unwrap();

        guest.disconnect(&created.game_id, PlayerColor::Black).await.unwrap();
        let state = host.fetch_state(&created.game_id).await.unwrap();
        assert!(state.player(PlayerColor::White).unwrap().connected);
        assert!(!state.player(PlayerColor::Black).unwrap().connected);
    }
}
