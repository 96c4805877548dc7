//! Multi-engine comparison, fallback and health probing with mockfish
//! personalities standing in for real engines.

mod common;

use std::sync::Arc;

use rchess_engines::types::UNAVAILABLE;
use rchess_engines::{
    EngineError, EngineFactory, EngineKind, EngineOptions, STARTPOS_FEN,
};

fn factory_with(specs: &[(EngineKind, &[(&str, &str)])]) -> EngineFactory {
    let mut factory = EngineFactory::new();
    for (kind, envs) in specs {
        factory.register(Arc::new(common::client_with(*kind, envs, 5_000)));
    }
    factory
}

fn depth(n: u8) -> EngineOptions {
    EngineOptions {
        depth: Some(n),
        ..Default::default()
    }
}

#[test]
fn unanimous_engines_reach_consensus() {
    let factory = factory_with(&[
        (EngineKind::Classical, &[("MOCKFISH_CP", "20")]),
        (EngineKind::Neural, &[("MOCKFISH_CP", "30")]),
        (EngineKind::Hybrid, &[("MOCKFISH_CP", "40")]),
    ]);

    let comparison = factory.analyze_with_all_engines(STARTPOS_FEN, &depth(6));
    assert_eq!(comparison.analyses.len(), 3);
    let consensus = comparison.consensus.unwrap();
    assert!(consensus.agreed);
    assert_eq!(consensus.best_move.as_deref(), Some("e2e4"));
    assert_eq!(consensus.evaluation, Some(30));
    assert!(comparison.disagreement.is_none());
}

#[test]
fn comparison_honors_multipv_options() {
    let factory = factory_with(&[(EngineKind::Classical, &[]), (EngineKind::Neural, &[])]);
    let options = EngineOptions {
        depth: Some(6),
        multi_pv: Some(2),
        ..Default::default()
    };

    let comparison = factory.analyze_with_all_engines(STARTPOS_FEN, &options);
    assert_eq!(comparison.analyses.len(), 2);
    for analysis in &comparison.analyses {
        assert_eq!(analysis.result.multipv.len(), 2);
        assert_eq!(analysis.result.multipv[0].best_move, "e2e4");
    }
    assert!(comparison.consensus.unwrap().agreed);
}

#[test]
fn split_verdicts_record_disagreement_and_failures() {
    let factory = factory_with(&[
        (EngineKind::Classical, &[]),
        (EngineKind::Neural, &[("MOCKFISH_BESTMOVE", "d2d4")]),
        (EngineKind::Hybrid, &[("MOCKFISH_MODE", "crash")]),
    ]);

    let comparison = factory.analyze_with_all_engines(STARTPOS_FEN, &depth(6));
    // The crashed engine is excluded, not fatal.
    assert_eq!(comparison.analyses.len(), 2);
    assert!(!comparison.consensus.unwrap().agreed);
    let disagreement = comparison.disagreement.unwrap();
    assert_eq!(disagreement[&EngineKind::Classical], "e2e4");
    assert_eq!(disagreement[&EngineKind::Neural], "d2d4");
    assert_eq!(disagreement[&EngineKind::Hybrid], UNAVAILABLE);
}

#[test]
fn failed_preferred_engine_falls_back_to_classical() {
    let factory = factory_with(&[
        (EngineKind::Classical, &[("MOCKFISH_BESTMOVE", "g1f3")]),
        (EngineKind::Neural, &[("MOCKFISH_MODE", "crash")]),
    ]);

    let result = factory
        .get_best_move_with_fallback(EngineKind::Neural, STARTPOS_FEN, &depth(6))
        .unwrap();
    assert_eq!(result.best_move, "g1f3");
}

#[test]
fn classical_failure_has_no_fallback() {
    let factory = factory_with(&[
        (EngineKind::Classical, &[("MOCKFISH_MODE", "crash")]),
        (EngineKind::Neural, &[]),
    ]);

    let err = factory
        .get_best_move_with_fallback(EngineKind::Classical, STARTPOS_FEN, &depth(6))
        .unwrap_err();
    assert!(matches!(err, EngineError::Crashed { .. }));
}

#[test]
fn unregistered_preferred_engine_is_unavailable() {
    let factory = factory_with(&[(EngineKind::Classical, &[])]);
    let err = factory
        .get_best_move_with_fallback(EngineKind::Hybrid, STARTPOS_FEN, &depth(6))
        .unwrap_err();
    assert!(matches!(err, EngineError::Unavailable { .. }));
}

#[test]
fn health_check_reports_per_engine_status() {
    let factory = factory_with(&[
        (EngineKind::Classical, &[]),
        (EngineKind::Neural, &[("MOCKFISH_MODE", "crash")]),
    ]);

    let health = factory.health_check();
    assert!(health[&EngineKind::Classical]);
    assert!(!health[&EngineKind::Neural]);
}

#[test]
fn quit_all_terminates_every_engine() {
    let factory = factory_with(&[(EngineKind::Classical, &[]), (EngineKind::Neural, &[])]);
    factory
        .get_best_move_with_fallback(EngineKind::Classical, STARTPOS_FEN, &depth(2))
        .unwrap();
    factory.quit_all();
    let err = factory
        .get_best_move_with_fallback(EngineKind::Classical, STARTPOS_FEN, &depth(2))
        .unwrap_err();
    assert!(matches!(err, EngineError::Terminated));
}
