use std::sync::Arc;

use coach_engine::{EngineController, MoveReviewer};

use crate::clients::chess_com::ChessComClient;
use crate::clients::lichess::LichessClient;
use crate::clients::llm::FeedbackClient;
use crate::clients::rate_limiter::RateLimiter;
use crate::clients::ClientError;
use crate::config::Config;
use crate::sync::{FirebaseStore, GameSync, RealtimeStore, SyncError};

/// Shared handles behind every route.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub lichess: Arc<LichessClient>,
    pub chess_com: Arc<ChessComClient>,
    pub feedback: Arc<FeedbackClient>,
    pub engine: EngineController,
    pub reviewer: MoveReviewer,
    pub games: GameSync,
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

impl AppState {
    /// Build clients from `config`. The engine is taken as is; attaching a
    /// process to it is up to the caller.
    pub fn new(config: Config, engine: EngineController) -> Result<Self, StateError> {
        let lichess = LichessClient::new(
            &config.lichess_base_url,
            RateLimiter::new(config.lichess_rate_limit),
            config.http_timeout,
        )?;
        let chess_com = ChessComClient::new(
            &config.chess_com_base_url,
            RateLimiter::new(config.chess_com_rate_limit),
            config.http_timeout,
        )?;
        let feedback = FeedbackClient::new(config.feedback.clone(), config.http_timeout)?;

        let store: Option<Arc<dyn RealtimeStore>> = match &config.realtime {
            Some(realtime) => Some(Arc::new(FirebaseStore::new(realtime, config.http_timeout)?)),
            None => None,
        };
        let games = GameSync::new(store, &config.app_base_url);

        Ok(Self {
            lichess: Arc::new(lichess),
            chess_com: Arc::new(chess_com),
            feedback: Arc::new(feedback),
            reviewer: MoveReviewer::new(engine.clone()),
            engine,
            games,
            config: Arc::new(config),
        })
    }

    /// Replace the multiplayer handle, e.g. with one over an in-memory store.
    pub fn with_game_sync(mut self, games: GameSync) -> Self {
        self.games = games;
        self
    }
}
