//! Session and client behavior against a live mockfish process.

mod common;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rchess_engines::{
    EngineError, EngineKind, EngineOptions, SessionState, MATE_SCORE, STARTPOS_FEN,
};

const BLACK_TO_MOVE_FEN: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1";

fn depth(n: u8) -> EngineOptions {
    EngineOptions {
        depth: Some(n),
        ..Default::default()
    }
}

#[test]
fn startpos_search_reports_bestmove_and_eval() {
    let client = common::client_with(EngineKind::Classical, &[], 5_000);
    let result = client.get_best_move(STARTPOS_FEN, &depth(1)).unwrap();
    assert_eq!(result.best_move, "e2e4");
    assert_eq!(result.ponder.as_deref(), Some("e7e5"));
    assert_eq!(result.depth, 1);
    assert_eq!(result.evaluation, 23);
    assert_eq!(result.mate, None);
    assert_eq!(result.pv[0], "e2e4");
    assert!(result.multipv.is_empty());
    assert_eq!(client.session().state(), SessionState::Ready);
    assert_eq!(client.searches(), 1);
}

#[test]
fn handshake_records_reported_identity() {
    let client = common::client_with(
        EngineKind::Classical,
        &[("MOCKFISH_NAME", "Mockfish 9000")],
        5_000,
    );
    client.get_best_move(STARTPOS_FEN, &depth(1)).unwrap();
    let identity = client.session().reported_identity();
    assert_eq!(identity.name.as_deref(), Some("Mockfish 9000"));
    assert!(identity.author.is_some());
}

#[test]
fn black_to_move_flips_evaluation_to_white_perspective() {
    let client = common::client_with(EngineKind::Classical, &[("MOCKFISH_CP", "50")], 5_000);
    let result = client.get_best_move(BLACK_TO_MOVE_FEN, &depth(8)).unwrap();
    assert_eq!(result.evaluation, -50);
    assert_eq!(result.mate, None);
}

#[test]
fn mate_scores_use_the_sentinel_evaluation() {
    let client = common::client_with(EngineKind::Classical, &[("MOCKFISH_MATE", "2")], 5_000);
    let result = client.get_best_move(STARTPOS_FEN, &depth(8)).unwrap();
    assert_eq!(result.mate, Some(2));
    assert_eq!(result.evaluation, MATE_SCORE);
}

#[test]
fn multipv_lines_come_back_ranked() {
    let client = common::client_with(EngineKind::Classical, &[], 5_000);
    let options = EngineOptions {
        depth: Some(10),
        multi_pv: Some(3),
        ..Default::default()
    };
    let result = client.analyze_position(STARTPOS_FEN, &options).unwrap();
    assert_eq!(result.best_move, "e2e4");
    assert_eq!(result.multipv.len(), 3);
    let ranks: Vec<u8> = result.multipv.iter().map(|l| l.rank).collect();
    assert_eq!(ranks, vec![1, 2, 3]);
    assert_eq!(result.multipv[0].best_move, "e2e4");
    assert_eq!(result.multipv[1].best_move, "d2d4");
    assert_eq!(result.multipv[2].best_move, "g1f3");
    // Lines weaken as the rank grows.
    assert!(result.multipv[0].evaluation > result.multipv[1].evaluation);
    assert!(result.multipv[1].evaluation > result.multipv[2].evaluation);
    // The primary line is mirrored in the top-level fields.
    assert_eq!(result.evaluation, result.multipv[0].evaluation);
}

#[test]
fn overlapping_search_is_rejected_busy() {
    let client = Arc::new(common::client_with(
        EngineKind::Classical,
        &[("MOCKFISH_DELAY_MS", "400")],
        5_000,
    ));
    client.session().initialize().unwrap();

    let slow = Arc::clone(&client);
    let first = thread::spawn(move || slow.get_best_move(STARTPOS_FEN, &depth(5)));
    thread::sleep(Duration::from_millis(120));
    let second = client.get_best_move(STARTPOS_FEN, &depth(5));

    assert!(matches!(second, Err(EngineError::Busy)));
    let first = first.join().unwrap().unwrap();
    assert_eq!(first.best_move, "e2e4");
    // The winner left the session reusable.
    assert_eq!(client.session().state(), SessionState::Ready);
}

#[test]
fn timed_out_search_recovers_and_discards_stale_bestmove() {
    let client = common::client_with(
        EngineKind::Classical,
        &[("MOCKFISH_MODE", "mute-once")],
        600,
    );

    let err = client.get_best_move(STARTPOS_FEN, &depth(5)).unwrap_err();
    assert!(matches!(err, EngineError::AnalysisTimeout { timeout_ms: 600 }));
    assert_eq!(client.session().state(), SessionState::Ready);

    // The stop acknowledgement of the dead search announces a2a3; it must
    // never be attributed to the next search.
    let started = Instant::now();
    let result = client.get_best_move(STARTPOS_FEN, &depth(5)).unwrap();
    assert_eq!(result.best_move, "e2e4");
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[test]
fn recovery_when_a_timed_out_engine_never_answers_stop() {
    // The first search is swallowed whole: no bestmove on go, none on
    // stop. No output is ever owed for it, and the next search's own
    // bestmove must not be discarded in its place.
    let client = common::client_with(
        EngineKind::Classical,
        &[("MOCKFISH_MODE", "ignore-once")],
        600,
    );

    let err = client.get_best_move(STARTPOS_FEN, &depth(5)).unwrap_err();
    assert!(matches!(err, EngineError::AnalysisTimeout { .. }));
    assert_eq!(client.session().state(), SessionState::Ready);

    let result = client.get_best_move(STARTPOS_FEN, &depth(5)).unwrap();
    assert_eq!(result.best_move, "e2e4");
}

#[test]
fn quit_is_not_blocked_by_a_slow_handshake() {
    let client = Arc::new(common::client_with(
        EngineKind::Classical,
        &[("MOCKFISH_HANDSHAKE_DELAY_MS", "800")],
        5_000,
    ));

    let initializer = Arc::clone(&client);
    let handle = thread::spawn(move || initializer.session().initialize());
    thread::sleep(Duration::from_millis(150));

    let started = Instant::now();
    client.quit();
    assert!(started.elapsed() < Duration::from_millis(400));
    assert_eq!(client.session().state(), SessionState::Terminated);

    // The initializer observes the termination instead of resurrecting
    // the session.
    assert!(matches!(handle.join().unwrap(), Err(EngineError::Terminated)));
    assert_eq!(client.session().state(), SessionState::Terminated);
}

#[test]
fn crash_mid_search_terminates_the_session() {
    let client = common::client_with(EngineKind::Classical, &[("MOCKFISH_MODE", "crash")], 5_000);
    let err = client.get_best_move(STARTPOS_FEN, &depth(5)).unwrap_err();
    assert!(matches!(err, EngineError::Crashed { .. }));
    assert_eq!(client.session().state(), SessionState::Terminated);

    // Terminated is terminal: no silent respawn.
    let err = client.get_best_move(STARTPOS_FEN, &depth(5)).unwrap_err();
    assert!(matches!(err, EngineError::Terminated));
}

#[test]
fn quit_makes_the_session_unusable() {
    let client = common::client_with(EngineKind::Classical, &[], 5_000);
    client.get_best_move(STARTPOS_FEN, &depth(1)).unwrap();
    client.quit();
    assert_eq!(client.session().state(), SessionState::Terminated);
    let err = client.get_best_move(STARTPOS_FEN, &depth(1)).unwrap_err();
    assert!(matches!(err, EngineError::Terminated));
}

#[test]
fn stop_without_a_search_is_a_noop() {
    let client = common::client_with(EngineKind::Classical, &[], 5_000);
    client.get_best_move(STARTPOS_FEN, &depth(1)).unwrap();
    client.stop();
    assert_eq!(client.session().state(), SessionState::Ready);
    // Still searchable afterwards.
    let result = client.get_best_move(STARTPOS_FEN, &depth(2)).unwrap();
    assert_eq!(result.best_move, "e2e4");
}

#[test]
fn set_option_is_rejected_before_initialization() {
    let client = common::client_with(EngineKind::Classical, &[], 5_000);
    let err = client.set_option("Hash", "64").unwrap_err();
    assert!(matches!(err, EngineError::Unavailable { .. }));

    client.session().initialize().unwrap();
    client.set_option("Hash", "64").unwrap();
}

#[test]
fn quick_eval_returns_only_the_evaluation() {
    let client = common::client_with(EngineKind::Classical, &[("MOCKFISH_CP", "77")], 5_000);
    assert_eq!(client.quick_eval(STARTPOS_FEN).unwrap(), 77);
}
