//! Single-flight request/response adapter over the streamed UCI protocol.
//!
//! All queue and current-job state lives in one worker task. Public methods
//! only send requests to it, so the "at most one current job" invariant holds
//! without locks: the current job is an owned `Option` slot that only the
//! worker touches.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::evaluation::{Evaluation, PvLine, ScoreKind};
use crate::stockfish::EngineLink;
use crate::uci::{self, EngineResponse, InfoLine, Score};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Uninitialized,
    Initializing,
    Ready,
    Destroyed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalOptions {
    /// Search depth; the controller's default depth when `None`.
    pub depth: Option<u32>,
    /// Higher is served first.
    pub priority: i32,
    /// Number of ranked lines to collect.
    pub multipv: u32,
    /// Wall-clock cap sent alongside the depth.
    pub movetime_ms: Option<u64>,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            depth: None,
            priority: 0,
            multipv: 1,
            movetime_ms: None,
        }
    }
}

impl EvalOptions {
    pub fn depth(depth: u32) -> Self {
        Self {
            depth: Some(depth),
            ..Self::default()
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_multipv(mut self, multipv: u32) -> Self {
        self.multipv = multipv.max(1);
        self
    }

    pub fn with_movetime(mut self, ms: u64) -> Self {
        self.movetime_ms = Some(ms);
        self
    }
}

type Reply = oneshot::Sender<Result<Evaluation, EngineError>>;

struct AnalysisJob {
    id: u64,
    fen: String,
    depth: u32,
    priority: i32,
    multipv: u32,
    movetime_ms: Option<u64>,
    reply: Reply,
}

struct ActiveJob {
    job: AnalysisJob,
    provisional: Option<Evaluation>,
    lines: BTreeMap<u32, PvLine>,
    deadline: Option<Instant>,
}

enum Request {
    Attach(EngineLink, oneshot::Sender<Result<(), EngineError>>),
    Evaluate(AnalysisJob),
    Stop,
    SetOption(String, String),
    Destroy(oneshot::Sender<()>),
}

/// Eventual result of a submitted job.
///
/// Resolves to [`EngineError::Destroyed`] if the controller goes away
/// before the job completes.
pub struct PendingEvaluation {
    rx: oneshot::Receiver<Result<Evaluation, EngineError>>,
}

impl PendingEvaluation {
    fn failed(error: EngineError) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(error));
        Self { rx }
    }
}

impl Future for PendingEvaluation {
    type Output = Result<Evaluation, EngineError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or(Err(EngineError::Destroyed)))
    }
}

/// Handle to the engine worker. Cheap to clone; all clones drive the same
/// engine.
#[derive(Clone)]
pub struct EngineController {
    requests: mpsc::UnboundedSender<Request>,
    state: watch::Receiver<EngineState>,
    queued: Arc<AtomicUsize>,
    next_id: Arc<AtomicU64>,
    config: Arc<EngineConfig>,
}

impl EngineController {
    /// Create an uninitialized controller. Jobs submitted now are queued
    /// until an engine is attached and has completed the handshake.
    pub fn new(config: EngineConfig) -> Self {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(EngineState::Uninitialized);
        let queued = Arc::new(AtomicUsize::new(0));

        let worker = Worker {
            requests: request_rx,
            state: state_tx,
            link: None,
            queue: Vec::new(),
            current: None,
            handshake_deadline: None,
            ready_waiters: Vec::new(),
            pending_options: Vec::new(),
            active_multipv: 1,
            queued: queued.clone(),
            config: config.clone(),
        };
        tokio::spawn(worker.run());

        Self {
            requests: request_tx,
            state: state_rx,
            queued,
            next_id: Arc::new(AtomicU64::new(1)),
            config: Arc::new(config),
        }
    }

    /// Spawn the configured engine binary and wait for the handshake.
    pub async fn init(&self) -> Result<(), EngineError> {
        let link = EngineLink::spawn(&self.config.stockfish_path)?;
        info!(path = %self.config.stockfish_path, "Starting chess engine");
        self.attach(link).await
    }

    /// Attach an engine link and wait for its handshake.
    pub async fn attach(&self, link: EngineLink) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(Request::Attach(link, tx))
            .map_err(|_| EngineError::Destroyed)?;
        rx.await.unwrap_or(Err(EngineError::Destroyed))
    }

    /// Attach a link without waiting; the handshake completes in the
    /// background while jobs queue up.
    pub fn attach_in_background(&self, link: EngineLink) {
        let (tx, _rx) = oneshot::channel();
        let _ = self.requests.send(Request::Attach(link, tx));
    }

    /// Enqueue a job and return its eventual evaluation.
    pub fn submit(&self, fen: &str, options: EvalOptions) -> PendingEvaluation {
        if let Err(e) = chess_core::position::parse_fen(fen) {
            return PendingEvaluation::failed(e.into());
        }

        let (tx, rx) = oneshot::channel();
        let job = AnalysisJob {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            fen: fen.trim().to_string(),
            depth: options.depth.unwrap_or(self.config.default_depth),
            priority: options.priority,
            multipv: options.multipv.max(1),
            movetime_ms: options.movetime_ms,
            reply: tx,
        };

        self.queued.fetch_add(1, Ordering::SeqCst);
        if self.requests.send(Request::Evaluate(job)).is_err() {
            // The worker is gone; the dropped reply resolves as Destroyed.
            self.queued.fetch_sub(1, Ordering::SeqCst);
        }
        PendingEvaluation { rx }
    }

    pub async fn evaluate(
        &self,
        fen: &str,
        options: EvalOptions,
    ) -> Result<Evaluation, EngineError> {
        self.submit(fen, options).await
    }

    /// Best move in long-algebraic notation.
    pub async fn get_best_move(&self, fen: &str, depth: Option<u32>) -> Result<String, EngineError> {
        let options = EvalOptions {
            depth,
            ..EvalOptions::default()
        };
        self.evaluate(fen, options)
            .await?
            .best_move
            .ok_or_else(|| EngineError::Protocol("engine reported no legal move".into()))
    }

    /// Ask the engine to finish the current search early. The current job
    /// still resolves with whatever the engine reports.
    pub fn stop(&self) {
        let _ = self.requests.send(Request::Stop);
    }

    /// Buffered until the engine is ready.
    pub fn set_option(&self, name: &str, value: &str) {
        let _ = self
            .requests
            .send(Request::SetOption(name.to_string(), value.to_string()));
    }

    pub fn set_skill_level(&self, level: f32) {
        let level = level.round().clamp(0.0, 20.0) as u32;
        self.set_option("Skill Level", &level.to_string());
    }

    /// Terminate the engine and reject the current and every queued job.
    /// The controller is unusable afterwards.
    pub async fn destroy(&self) {
        let (tx, rx) = oneshot::channel();
        if self.requests.send(Request::Destroy(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Jobs waiting to be dispatched (excluding the current one).
    pub fn queue_size(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == EngineState::Ready
    }

    /// Resolve once the engine is ready; fails if the controller is destroyed
    /// first.
    pub async fn wait_ready(&self) -> Result<(), EngineError> {
        let mut state = self.state.clone();
        let reached = state
            .wait_for(|s| matches!(s, EngineState::Ready | EngineState::Destroyed))
            .await
            .map(|s| *s)
            .map_err(|_| EngineError::Destroyed)?;
        match reached {
            EngineState::Ready => Ok(()),
            _ => Err(EngineError::Destroyed),
        }
    }

    pub fn default_depth(&self) -> u32 {
        self.config.default_depth
    }
}

// --- Worker ------------------------------------------------------------------

struct Worker {
    requests: mpsc::UnboundedReceiver<Request>,
    state: watch::Sender<EngineState>,
    link: Option<EngineLink>,
    /// Sorted by descending priority, FIFO among equals.
    queue: Vec<AnalysisJob>,
    current: Option<ActiveJob>,
    handshake_deadline: Option<Instant>,
    ready_waiters: Vec<oneshot::Sender<Result<(), EngineError>>>,
    pending_options: Vec<(String, String)>,
    active_multipv: u32,
    queued: Arc<AtomicUsize>,
    config: EngineConfig,
}

async fn next_line(link: &mut Option<EngineLink>) -> Option<String> {
    match link {
        Some(link) => link.next_line().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

impl Worker {
    async fn run(mut self) {
        loop {
            let search_deadline = self.current.as_ref().and_then(|c| c.deadline);
            tokio::select! {
                request = self.requests.recv() => match request {
                    Some(Request::Destroy(ack)) => {
                        self.destroy().await;
                        let _ = ack.send(());
                        break;
                    }
                    Some(request) => self.handle_request(request).await,
                    None => {
                        // Every handle dropped
                        self.destroy().await;
                        break;
                    }
                },
                line = next_line(&mut self.link) => match line {
                    Some(line) => self.handle_line(&line),
                    None => self.engine_lost("engine process exited").await,
                },
                _ = sleep_until(search_deadline) => self.search_timed_out(),
                _ = sleep_until(self.handshake_deadline) => {
                    self.engine_lost("no uciok from engine").await;
                }
            }
        }
    }

    async fn handle_request(&mut self, request: Request) {
        match request {
            Request::Attach(link, waiter) => {
                if self.link.is_some() {
                    warn!("Engine already attached; discarding new link");
                    let _ = waiter.send(Err(EngineError::Protocol("engine already attached".into())));
                    link.terminate().await;
                    return;
                }
                if let Err(e) = link.send(uci::UCI) {
                    let _ = waiter.send(Err(EngineError::Unavailable(e.to_string())));
                    return;
                }
                self.link = Some(link);
                self.ready_waiters.push(waiter);
                self.handshake_deadline = Some(Instant::now() + self.config.handshake_timeout);
                self.active_multipv = 1;
                self.set_state(EngineState::Initializing);
            }
            Request::Evaluate(job) => {
                debug!(id = job.id, priority = job.priority, depth = job.depth, "Job queued");
                let at = self
                    .queue
                    .iter()
                    .position(|queued| queued.priority < job.priority)
                    .unwrap_or(self.queue.len());
                self.queue.insert(at, job);
                self.dispatch_next();
            }
            Request::Stop => {
                if self.current.is_some() {
                    self.send(uci::STOP);
                }
            }
            Request::SetOption(name, value) => {
                if self.is_ready() {
                    self.send(&uci::set_option(&name, &value));
                } else {
                    self.pending_options.push((name, value));
                }
            }
            Request::Destroy(_) => {}
        }
    }

    fn handle_line(&mut self, line: &str) {
        match EngineResponse::parse(line) {
            EngineResponse::UciOk => self.on_handshake(),
            EngineResponse::Info(info) => self.on_info(info),
            EngineResponse::BestMove { best, .. } => self.on_bestmove(&best),
            EngineResponse::Error(message) => warn!(message, "Engine reported an error"),
            EngineResponse::ReadyOk | EngineResponse::Other(_) => {}
        }
    }

    fn on_handshake(&mut self) {
        if *self.state.borrow() != EngineState::Initializing {
            return;
        }
        self.handshake_deadline = None;
        for (name, value) in self.config.startup_options() {
            self.send(&uci::set_option(&name, &value));
        }
        for (name, value) in std::mem::take(&mut self.pending_options) {
            self.send(&uci::set_option(&name, &value));
        }
        self.set_state(EngineState::Ready);
        info!(queued = self.queue.len(), "Chess engine ready");
        for waiter in self.ready_waiters.drain(..) {
            let _ = waiter.send(Ok(()));
        }
        self.dispatch_next();
    }

    fn on_info(&mut self, info: InfoLine) {
        let Some(active) = self.current.as_mut() else {
            return;
        };
        // Lines without depth and score never overwrite the provisional result.
        let Some(eval) = Evaluation::from_info(&info) else {
            return;
        };
        let rank = info.multipv.unwrap_or(1);
        if active.job.multipv > 1 {
            let (kind, value) = match info.score {
                Some(Score::Mate(v)) => (ScoreKind::Mate, v),
                Some(Score::Cp(v)) => (ScoreKind::Cp, v),
                None => return,
            };
            active.lines.insert(
                rank,
                PvLine {
                    rank,
                    kind,
                    value,
                    pv: info.pv.clone(),
                },
            );
        }
        if rank == 1 {
            active.provisional = Some(eval);
        }
    }

    fn on_bestmove(&mut self, best: &str) {
        let Some(active) = self.current.take() else {
            warn!(best, "bestmove with no current job; ignoring");
            return;
        };
        let ActiveJob {
            job,
            provisional,
            lines,
            ..
        } = active;

        let result = match provisional {
            Some(mut eval) => {
                eval.best_move = match best {
                    "(none)" | "0000" => None,
                    mv => Some(mv.to_string()),
                };
                eval.lines = lines.into_values().collect();
                debug!(id = job.id, value = eval.value, depth = eval.depth, "Job resolved");
                Ok(eval)
            }
            None => Err(EngineError::Protocol(
                "search finished without an evaluation".into(),
            )),
        };
        let _ = job.reply.send(result);
        self.dispatch_next();
    }

    fn search_timed_out(&mut self) {
        if let Some(active) = self.current.as_mut() {
            warn!(id = active.job.id, fen = %active.job.fen, "Search deadline passed; sending stop");
            active.deadline = None;
            self.send(uci::STOP);
        }
    }

    fn dispatch_next(&mut self) {
        if !self.is_ready() || self.current.is_some() {
            return;
        }
        while !self.queue.is_empty() {
            let job = self.queue.remove(0);
            self.queued.fetch_sub(1, Ordering::SeqCst);
            if job.reply.is_closed() {
                debug!(id = job.id, "Caller went away; skipping job");
                continue;
            }

            if job.multipv != self.active_multipv {
                self.send(&uci::set_option("MultiPV", &job.multipv.to_string()));
                self.active_multipv = job.multipv;
            }
            self.send(&uci::position_fen(&job.fen));
            self.send(&uci::go(job.depth, job.movetime_ms));

            let deadline = self.config.search_timeout.map(|t: Duration| Instant::now() + t);
            self.current = Some(ActiveJob {
                job,
                provisional: None,
                lines: BTreeMap::new(),
                deadline,
            });
            return;
        }
    }

    /// The engine went away: fail everything and return to uninitialized.
    async fn engine_lost(&mut self, reason: &str) {
        warn!(reason, "Chess engine unavailable");
        self.handshake_deadline = None;
        if let Some(link) = self.link.take() {
            link.terminate().await;
        }
        let error = EngineError::Unavailable(reason.to_string());
        for waiter in self.ready_waiters.drain(..) {
            let _ = waiter.send(Err(error.clone()));
        }
        self.reject_all(error);
        self.set_state(EngineState::Uninitialized);
    }

    async fn destroy(&mut self) {
        self.handshake_deadline = None;
        self.reject_all(EngineError::Destroyed);
        for waiter in self.ready_waiters.drain(..) {
            let _ = waiter.send(Err(EngineError::Destroyed));
        }
        if let Some(link) = self.link.take() {
            link.terminate().await;
        }
        self.set_state(EngineState::Destroyed);
        info!("Engine controller destroyed");
    }

    fn reject_all(&mut self, error: EngineError) {
        if let Some(active) = self.current.take() {
            let _ = active.job.reply.send(Err(error.clone()));
        }
        let rejected = self.queue.len();
        for job in self.queue.drain(..) {
            let _ = job.reply.send(Err(error.clone()));
        }
        self.queued.fetch_sub(rejected, Ordering::SeqCst);
    }

    fn send(&self, cmd: &str) {
        let failed = match &self.link {
            Some(link) => link.send(cmd).is_err(),
            None => true,
        };
        if failed {
            warn!(cmd, "Engine input unavailable; command dropped");
        }
    }

    fn is_ready(&self) -> bool {
        *self.state.borrow() == EngineState::Ready
    }

    fn set_state(&self, state: EngineState) {
        self.state.send_replace(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    struct FakeEngine {
        commands: mpsc::UnboundedReceiver<String>,
        lines: mpsc::UnboundedSender<String>,
    }

    fn fake_link() -> (EngineLink, FakeEngine) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (line_tx, line_rx) = mpsc::unbounded_channel();
        (
            EngineLink::from_channels(cmd_tx, line_rx),
            FakeEngine {
                commands: cmd_rx,
                lines: line_tx,
            },
        )
    }

    impl FakeEngine {
        async fn expect(&mut self, prefix: &str) -> String {
            loop {
                let cmd = self.commands.recv().await.expect("controller hung up");
                if cmd.starts_with(prefix) {
                    return cmd;
                }
            }
        }

        fn say(&self, line: &str) {
            self.lines.send(line.to_string()).expect("controller hung up");
        }
    }

    #[tokio::test]
    async fn test_handshake_then_evaluate() {
        let controller = EngineController::new(EngineConfig::default());
        let (link, mut engine) = fake_link();
        controller.attach_in_background(link);

        engine.expect("uci").await;
        assert_eq!(controller.state(), EngineState::Initializing);
        engine.say("id name Fake");
        engine.say("uciok");
        controller.wait_ready().await.unwrap();

        let pending = controller.submit(FEN, EvalOptions::depth(12));
        assert_eq!(engine.expect("position").await, format!("position fen {FEN}"));
        assert_eq!(engine.expect("go").await, "go depth 12");
        engine.say("info depth 11 score cp 30 nodes 900 pv e2e4");
        engine.say("info depth 12 currmove d2d4 currmovenumber 2");
        engine.say("info depth 12 score cp 28 nodes 1200 time 15 pv e2e4 e7e5");
        engine.say("bestmove e2e4 ponder e7e5");

        let eval = pending.await.unwrap();
        assert_eq!(eval.kind, ScoreKind::Cp);
        assert_eq!(eval.value, 28);
        assert_eq!(eval.depth, 12);
        assert_eq!(eval.nodes, Some(1200));
        assert_eq!(eval.best_move.as_deref(), Some("e2e4"));
    }

    #[tokio::test]
    async fn test_movetime_sent_with_depth() {
        let controller = EngineController::new(EngineConfig::default());
        let (link, mut engine) = fake_link();
        controller.attach_in_background(link);
        engine.expect("uci").await;
        engine.say("uciok");

        let pending = controller.submit(FEN, EvalOptions::depth(6).with_movetime(250));
        assert_eq!(engine.expect("go").await, "go depth 6 movetime 250");
        engine.say("info depth 6 score cp 10 pv g1f3");
        engine.say("bestmove g1f3");
        assert_eq!(pending.await.unwrap().value, 10);
    }

    #[tokio::test]
    async fn test_options_buffered_until_ready() {
        let controller = EngineController::new(EngineConfig::default());
        controller.set_skill_level(25.0);
        let (link, mut engine) = fake_link();
        controller.attach_in_background(link);
        engine.expect("uci").await;
        engine.say("uciok");
        assert_eq!(
            engine.expect("setoption").await,
            "setoption name Skill Level value 20"
        );
    }

    #[tokio::test]
    async fn test_stop_still_resolves() {
        let controller = EngineController::new(EngineConfig::default());
        let (link, mut engine) = fake_link();
        controller.attach_in_background(link);
        engine.expect("uci").await;
        engine.say("uciok");

        let pending = controller.submit(FEN, EvalOptions::depth(30));
        engine.expect("go").await;
        engine.say("info depth 5 score cp 12 pv d2d4");
        controller.stop();
        engine.expect("stop").await;
        engine.say("bestmove d2d4");
        let eval = pending.await.unwrap();
        assert_eq!(eval.best_move.as_deref(), Some("d2d4"));
    }

    #[tokio::test]
    async fn test_search_deadline_sends_stop() {
        let config = EngineConfig {
            search_timeout: Some(Duration::from_millis(20)),
            ..EngineConfig::default()
        };
        let controller = EngineController::new(config);
        let (link, mut engine) = fake_link();
        controller.attach_in_background(link);
        engine.expect("uci").await;
        engine.say("uciok");

        let pending = controller.submit(FEN, EvalOptions::depth(40));
        engine.expect("go").await;
        engine.say("info depth 9 score mate 4 pv d1h5");
        engine.expect("stop").await;
        engine.say("bestmove d1h5");
        let eval = pending.await.unwrap();
        assert_eq!(eval.kind, ScoreKind::Mate);
        assert_eq!(eval.value, 4);
    }

    #[tokio::test]
    async fn test_invalid_fen_rejected_without_queueing() {
        let controller = EngineController::new(EngineConfig::default());
        let result = controller.evaluate("garbage", EvalOptions::default()).await;
        assert!(matches!(result, Err(EngineError::InvalidPosition(_))));
        assert_eq!(controller.queue_size(), 0);
    }

    #[tokio::test]
    async fn test_engine_exit_rejects_jobs() {
        let controller = EngineController::new(EngineConfig::default());
        let (link, mut engine) = fake_link();
        controller.attach_in_background(link);
        engine.expect("uci").await;
        engine.say("uciok");

        let pending = controller.submit(FEN, EvalOptions::default());
        engine.expect("go").await;
        drop(engine);
        assert!(matches!(pending.await, Err(EngineError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_multipv_lines_collected() {
        let controller = EngineController::new(EngineConfig::default());
        let (link, mut engine) = fake_link();
        controller.attach_in_background(link);
        engine.expect("uci").await;
        engine.say("uciok");

        let pending = controller.submit(FEN, EvalOptions::depth(8).with_multipv(3));
        assert_eq!(
            engine.expect("setoption").await,
            "setoption name MultiPV value 3"
        );
        engine.expect("go").await;
        engine.say("info depth 8 multipv 1 score cp 40 pv e2e4 e7e5");
        engine.say("info depth 8 multipv 2 score cp 35 pv d2d4 d7d5");
        engine.say("info depth 8 multipv 3 score cp -10 pv g2g4 e7e5");
        engine.say("bestmove e2e4");

        let eval = pending.await.unwrap();
        assert_eq!(eval.value, 40);
        assert_eq!(eval.lines.len(), 3);
        assert_eq!(eval.lines[2].first_move(), Some("g2g4"));
    }
}
