//! A game against the engine.
//!
//! Every transition that hands the move to the engine schedules exactly one
//! engine-turn task. Transitions bump a generation counter and abort the
//! pending task, so a reply computed for an older position is never applied.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use shakmaty::Color;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use chess_core::{ChessError, ChessMove, GameOutcome, GameSession, SessionStatus};

use crate::controller::{EngineController, EvalOptions};
use crate::difficulty::{self, DifficultySettings};
use crate::error::EngineError;

/// Upper bound on ranked lines requested when picking a deliberate mistake.
const MAX_ERROR_LINES: u32 = 20;

#[derive(Debug, Clone)]
pub struct PlayConfig {
    pub engine_color: Color,
    pub settings: DifficultySettings,
    /// Pause before the engine starts searching.
    pub think_delay: Duration,
}

impl PlayConfig {
    pub fn new(engine_color: Color, rating: u32) -> Self {
        Self {
            engine_color,
            settings: difficulty::calculate(rating),
            think_delay: Duration::from_millis(500),
        }
    }

    pub fn with_think_delay(mut self, delay: Duration) -> Self {
        self.think_delay = delay;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlayEvent {
    #[serde(rename_all = "camelCase")]
    MoveMade {
        san: String,
        fen: String,
        by_engine: bool,
    },
    GameOver {
        result: GameOutcome,
    },
    Reset {
        fen: String,
    },
    EngineError {
        message: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum PlayError {
    #[error("It is not your turn")]
    NotYourTurn,
    #[error(transparent)]
    Chess(#[from] ChessError),
}

struct PlayState {
    game: GameSession,
    config: PlayConfig,
    generation: u64,
    engine_task: Option<JoinHandle<()>>,
}

struct Shared {
    engine: EngineController,
    state: Mutex<PlayState>,
    events: broadcast::Sender<PlayEvent>,
}

#[derive(Clone)]
pub struct PlaySession {
    shared: Arc<Shared>,
}

impl PlaySession {
    /// Start a game from the initial position. If the engine has White its
    /// first move is scheduled right away.
    pub async fn start(engine: EngineController, config: PlayConfig) -> Self {
        engine.set_skill_level(config.settings.skill_level);
        let (events, _) = broadcast::channel(64);
        let session = Self {
            shared: Arc::new(Shared {
                engine,
                state: Mutex::new(PlayState {
                    game: GameSession::new(),
                    config,
                    generation: 0,
                    engine_task: None,
                }),
                events,
            }),
        };
        {
            let mut state = session.shared.state.lock().await;
            session.schedule_engine_turn(&mut state);
        }
        session
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayEvent> {
        self.shared.events.subscribe()
    }

    /// Player move given as UCI or SAN.
    pub async fn play(&self, notation: &str) -> Result<ChessMove, PlayError> {
        let mut state = self.shared.state.lock().await;
        Self::check_player_turn(&state)?;
        let applied = state
            .game
            .apply_uci(notation)
            .or_else(|_| state.game.apply_san(notation))?;
        self.after_player_move(&mut state, &applied);
        Ok(applied)
    }

    pub async fn play_move(
        &self,
        from: &str,
        to: &str,
        promotion: Option<char>,
    ) -> Result<ChessMove, PlayError> {
        let mut state = self.shared.state.lock().await;
        Self::check_player_turn(&state)?;
        let applied = state.game.apply_move(from, to, promotion)?;
        self.after_player_move(&mut state, &applied);
        Ok(applied)
    }

    /// Take back the last player move (and the engine reply after it).
    pub async fn undo(&self) -> Vec<ChessMove> {
        let mut state = self.shared.state.lock().await;
        Self::cancel_engine_turn(&mut state);
        let engine_color = state.config.engine_color;
        let mut undone = Vec::new();
        while let Some(mv) = state.game.undo() {
            let by_player = mv.color != engine_color.char();
            undone.push(mv);
            if by_player {
                break;
            }
        }
        self.schedule_engine_turn(&mut state);
        undone
    }

    pub async fn reset(&self) {
        let mut state = self.shared.state.lock().await;
        Self::cancel_engine_turn(&mut state);
        state.game.reset();
        let _ = self.shared.events.send(PlayEvent::Reset {
            fen: state.game.fen().to_string(),
        });
        self.schedule_engine_turn(&mut state);
    }

    pub async fn load_position(&self, fen: &str) -> Result<(), PlayError> {
        let mut state = self.shared.state.lock().await;
        state.game.load_position(fen)?;
        Self::cancel_engine_turn(&mut state);
        let _ = self.shared.events.send(PlayEvent::Reset {
            fen: state.game.fen().to_string(),
        });
        self.schedule_engine_turn(&mut state);
        Ok(())
    }

    /// New settings apply from the next engine turn.
    pub async fn set_difficulty(&self, settings: DifficultySettings) {
        let mut state = self.shared.state.lock().await;
        self.shared.engine.set_skill_level(settings.skill_level);
        state.config.settings = settings;
    }

    pub async fn status(&self) -> SessionStatus {
        self.shared.state.lock().await.game.status().clone()
    }

    pub async fn history(&self) -> Vec<ChessMove> {
        self.shared.state.lock().await.game.history().to_vec()
    }

    pub async fn pgn(&self) -> String {
        self.shared.state.lock().await.game.pgn()
    }

    /// An engine turn is scheduled or running.
    pub async fn is_thinking(&self) -> bool {
        let state = self.shared.state.lock().await;
        state
            .engine_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    fn check_player_turn(state: &PlayState) -> Result<(), PlayError> {
        if state.game.turn() == state.config.engine_color {
            return Err(PlayError::NotYourTurn);
        }
        Ok(())
    }

    fn after_player_move(&self, state: &mut PlayState, applied: &ChessMove) {
        state.generation += 1;
        self.announce(state, applied, false);
        self.schedule_engine_turn(state);
    }

    fn announce(&self, state: &PlayState, applied: &ChessMove, by_engine: bool) {
        let _ = self.shared.events.send(PlayEvent::MoveMade {
            san: applied.san.clone(),
            fen: applied.after.clone(),
            by_engine,
        });
        if let Some(result) = state.game.result() {
            info!(result = result.as_pgn(), "Game over");
            let _ = self.shared.events.send(PlayEvent::GameOver { result });
        }
    }

    fn cancel_engine_turn(state: &mut PlayState) {
        state.generation += 1;
        if let Some(task) = state.engine_task.take() {
            task.abort();
        }
    }

    /// Schedule the engine's reply if it is the engine's move.
    fn schedule_engine_turn(&self, state: &mut PlayState) {
        if state.game.is_game_over() || state.game.turn() != state.config.engine_color {
            return;
        }

        let settings = state.config.settings;
        // Decide on a deliberate mistake before the task; the thread RNG
        // cannot cross an await.
        let error_index = difficulty::should_make_error(&settings)
            .then(|| difficulty::error_move_index(&settings));
        let turn = EngineTurn {
            generation: state.generation,
            fen: state.game.fen().to_string(),
            depth: settings.search_depth,
            move_time_ms: settings.move_time_ms,
            error_index,
            delay: state.config.think_delay,
        };
        debug!(generation = turn.generation, ?error_index, "Scheduling engine turn");

        let session = self.clone();
        state.engine_task = Some(tokio::spawn(async move {
            session.run_engine_turn(turn).await;
        }));
    }

    async fn run_engine_turn(self, turn: EngineTurn) {
        tokio::time::sleep(turn.delay).await;

        let chosen = match self.choose_move(&turn).await {
            Ok(uci) => uci,
            Err(e) => {
                warn!(error = %e, fen = %turn.fen, "Engine turn failed");
                let _ = self.shared.events.send(PlayEvent::EngineError {
                    message: e.to_string(),
                });
                return;
            }
        };

        let mut state = self.shared.state.lock().await;
        if state.generation != turn.generation {
            debug!(generation = turn.generation, "Discarding stale engine move");
            return;
        }
        match state.game.apply_uci(&chosen) {
            Ok(applied) => {
                state.generation += 1;
                state.engine_task = None;
                self.announce(&state, &applied, true);
            }
            Err(e) => {
                warn!(error = %e, uci = %chosen, "Engine move rejected");
                let _ = self.shared.events.send(PlayEvent::EngineError {
                    message: e.to_string(),
                });
            }
        }
    }

    /// Best move, or the line at the error index when a mistake was drawn.
    async fn choose_move(&self, turn: &EngineTurn) -> Result<String, EngineError> {
        let multipv = match turn.error_index {
            Some(index) => (index as u32 + 1).min(MAX_ERROR_LINES),
            None => 1,
        };
        let options = EvalOptions::depth(turn.depth)
            .with_multipv(multipv)
            .with_movetime(turn.move_time_ms as u64);
        let eval = self.shared.engine.evaluate(&turn.fen, options).await?;

        if let Some(index) = turn.error_index {
            let line = eval.lines.get(index).or(eval.lines.last());
            if let Some(uci) = line.and_then(|l| l.first_move()) {
                debug!(index, uci, "Playing deliberate mistake");
                return Ok(uci.to_string());
            }
        }
        eval.best_move
            .ok_or_else(|| EngineError::Protocol("engine reported no legal move".into()))
    }
}

struct EngineTurn {
    generation: u64,
    fen: String,
    depth: u32,
    move_time_ms: u32,
    error_index: Option<usize>,
    delay: Duration,
}
