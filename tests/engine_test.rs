//! Integration tests: EngineController queueing and lifecycle against a
//! hand-driven engine.

mod common;

use coach_engine::{EngineConfig, EngineController, EngineError, EngineState, EvalOptions};
use common::fake_link;

const START: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
const AFTER_E4: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";
const AFTER_D4: &str = "rnbqkbnr/pppppppp/8/8/3P4/8/PPP1PPPP/RNBQKBNR b KQkq - 0 1";

#[tokio::test]
async fn jobs_queued_before_handshake_run_by_priority() {
    let controller = EngineController::new(EngineConfig::default());
    let low = controller.submit(START, EvalOptions::depth(5).with_priority(1));
    let high = controller.submit(AFTER_E4, EvalOptions::depth(5).with_priority(5));
    let mid = controller.submit(AFTER_D4, EvalOptions::depth(5).with_priority(3));
    assert_eq!(controller.queue_size(), 3);
    assert_eq!(controller.state(), EngineState::Uninitialized);

    let (link, mut engine) = fake_link();
    controller.attach_in_background(link);
    engine.expect("uci").await;
    engine.say("uciok");

    assert_eq!(engine.answer("cp -25", "e7e5").await, AFTER_E4);
    assert_eq!(engine.answer("cp -10", "d7d5").await, AFTER_D4);
    assert_eq!(engine.answer("cp 30", "e2e4").await, START);

    assert_eq!(high.await.unwrap().value, -25);
    assert_eq!(mid.await.unwrap().value, -10);
    let low = low.await.unwrap();
    assert_eq!(low.value, 30);
    assert_eq!(low.best_move.as_deref(), Some("e2e4"));
    assert_eq!(controller.queue_size(), 0);
}

#[tokio::test]
async fn equal_priorities_run_in_submission_order() {
    let controller = EngineController::new(EngineConfig::default());
    let (link, mut engine) = fake_link();
    controller.attach_in_background(link);
    engine.expect("uci").await;
    engine.say("uciok");
    controller.wait_ready().await.unwrap();

    let first = controller.submit(START, EvalOptions::depth(4));
    let second = controller.submit(AFTER_E4, EvalOptions::depth(4));
    let third = controller.submit(AFTER_D4, EvalOptions::depth(4));

    assert_eq!(engine.answer("cp 1", "e2e4").await, START);
    assert_eq!(engine.answer("cp 2", "e7e5").await, AFTER_E4);
    assert_eq!(engine.answer("cp 3", "d7d5").await, AFTER_D4);
    assert_eq!(first.await.unwrap().value, 1);
    assert_eq!(second.await.unwrap().value, 2);
    assert_eq!(third.await.unwrap().value, 3);
}

#[tokio::test]
async fn destroy_rejects_current_and_queued_jobs() {
    let controller = EngineController::new(EngineConfig::default());
    let (link, mut engine) = fake_link();
    controller.attach_in_background(link);
    engine.expect("uci").await;
    engine.say("uciok");
    controller.wait_ready().await.unwrap();

    let current = controller.submit(START, EvalOptions::depth(20));
    let queued_a = controller.submit(AFTER_E4, EvalOptions::depth(20));
    let queued_b = controller.submit(AFTER_D4, EvalOptions::depth(20));
    engine.expect("go").await;
    engine.say("info depth 3 score cp 12 pv e2e4");

    controller.destroy().await;
    engine.expect("quit").await;

    assert!(matches!(current.await, Err(EngineError::Destroyed)));
    assert!(matches!(queued_a.await, Err(EngineError::Destroyed)));
    assert!(matches!(queued_b.await, Err(EngineError::Destroyed)));
    assert_eq!(controller.state(), EngineState::Destroyed);
    assert_eq!(controller.queue_size(), 0);

    let after = controller.evaluate(START, EvalOptions::depth(1)).await;
    assert!(matches!(after, Err(EngineError::Destroyed)));
    assert!(controller.wait_ready().await.is_err());
}

#[tokio::test]
async fn best_move_helper_uses_default_depth() {
    let controller = EngineController::new(EngineConfig::default());
    let (link, mut engine) = fake_link();
    controller.attach_in_background(link);
    engine.expect("uci").await;
    engine.say("uciok");

    let depth = controller.default_depth();
    let best = tokio::spawn({
        let controller = controller.clone();
        async move { controller.get_best_move(START, None).await }
    });
    engine.expect("position").await;
    assert_eq!(engine.expect("go").await, format!("go depth {depth}"));
    engine.say("info depth 1 score cp 20 pv g1f3");
    engine.say("bestmove g1f3");
    assert_eq!(best.await.unwrap().unwrap(), "g1f3");
}
