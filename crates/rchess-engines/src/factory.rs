//! Multi-engine orchestration: parallel comparison, fallback, health.
//!
//! The factory holds the closed registry of engine clients and fans a
//! position out to all of them at once. Cross-engine calls need no mutual
//! exclusion — every engine owns its own process and session — so each
//! engine gets its own thread and a per-engine failure merely excludes
//! that engine from the aggregate.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

use crate::client::EngineClient;
use crate::config::EnginesConfig;
use crate::error::{EngineError, EngineResult};
use crate::types::{
    AnalysisResult, ComparisonAnalysis, Consensus, EngineAnalysis, EngineKind, EngineOptions,
    STARTPOS_FEN, UNAVAILABLE,
};

/// Engine used when a preferred engine fails and a fallback is allowed.
const DEFAULT_ENGINE: EngineKind = EngineKind::Classical;

pub struct EngineFactory {
    clients: BTreeMap<EngineKind, Arc<EngineClient>>,
}

impl EngineFactory {
    pub fn new() -> Self {
        EngineFactory {
            clients: BTreeMap::new(),
        }
    }

    /// Build clients for every engine the config declares.
    pub fn from_config(config: &EnginesConfig) -> Self {
        let mut factory = EngineFactory::new();
        for kind in config.configured_kinds() {
            if let Some(entry) = config.entry(kind) {
                factory.register(Arc::new(EngineClient::from_entry(kind, entry, &config.search)));
            }
        }
        factory
    }

    pub fn register(&mut self, client: Arc<EngineClient>) {
        self.clients.insert(client.kind(), client);
    }

    pub fn client(&self, kind: EngineKind) -> Option<&Arc<EngineClient>> {
        self.clients.get(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = EngineKind> + '_ {
        self.clients.keys().copied()
    }

    /// Same position to every registered engine in parallel. Failing
    /// engines are excluded from `analyses`; the comparison itself never
    /// fails wholesale.
    pub fn analyze_with_all_engines(
        &self,
        fen: &str,
        options: &EngineOptions,
    ) -> ComparisonAnalysis {
        let outcomes = self.fan_out(fen, options);

        let mut analyses = Vec::new();
        let mut failed: Vec<EngineKind> = Vec::new();
        for (kind, outcome) in outcomes {
            match outcome {
                Ok(result) => {
                    let info = self.clients[&kind].info().clone();
                    analyses.push(EngineAnalysis {
                        engine: kind,
                        result,
                        info,
                    });
                }
                Err(e) => {
                    log::warn!("engine '{kind}' excluded from comparison: {e}");
                    failed.push(kind);
                }
            }
        }

        let (consensus, disagreement) = summarize(&analyses, &failed);
        ComparisonAnalysis {
            position: fen.to_string(),
            analyses,
            consensus,
            disagreement,
        }
    }

    fn fan_out(
        &self,
        fen: &str,
        options: &EngineOptions,
    ) -> Vec<(EngineKind, EngineResult<AnalysisResult>)> {
        thread::scope(|scope| {
            let handles: Vec<_> = self
                .clients
                .iter()
                .map(|(kind, client)| {
                    let kind = *kind;
                    let multi = options.multi_pv.unwrap_or(1) > 1;
                    let handle = scope.spawn(move || {
                        if multi {
                            client.analyze_position(fen, options)
                        } else {
                            client.get_best_move(fen, options)
                        }
                    });
                    (kind, handle)
                })
                .collect();
            handles
                .into_iter()
                .map(|(kind, handle)| match handle.join() {
                    Ok(outcome) => (kind, outcome),
                    Err(_) => (
                        kind,
                        Err(EngineError::Crashed {
                            engine: kind.to_string(),
                        }),
                    ),
                })
                .collect()
        })
    }

    /// Preferred engine first; on failure fall back to the classical
    /// default. If the preferred engine already is the default, the
    /// original error propagates unmodified.
    pub fn get_best_move_with_fallback(
        &self,
        preferred: EngineKind,
        fen: &str,
        options: &EngineOptions,
    ) -> EngineResult<AnalysisResult> {
        let client = self.clients.get(&preferred).ok_or_else(|| EngineError::Unavailable {
            engine: preferred.to_string(),
            reason: "engine not registered".to_string(),
        })?;

        match client.get_best_move(fen, options) {
            Ok(result) => Ok(result),
            Err(err) if preferred != DEFAULT_ENGINE => {
                let Some(fallback) = self.clients.get(&DEFAULT_ENGINE) else {
                    return Err(err);
                };
                log::warn!(
                    "engine '{preferred}' failed ({err}); falling back to '{DEFAULT_ENGINE}'"
                );
                fallback.get_best_move(fen, options)
            }
            Err(err) => Err(err),
        }
    }

    /// Probe every registered engine with a depth-1 search of the starting
    /// position. Operational monitoring only — never on the request path.
    pub fn health_check(&self) -> BTreeMap<EngineKind, bool> {
        let options = EngineOptions {
            depth: Some(1),
            ..Default::default()
        };
        self.fan_out(STARTPOS_FEN, &options)
            .into_iter()
            .map(|(kind, outcome)| (kind, outcome.is_ok()))
            .collect()
    }

    /// Shut down every registered engine.
    pub fn quit_all(&self) {
        for client in self.clients.values() {
            client.quit();
        }
    }
}

impl Default for EngineFactory {
    fn default() -> Self {
        Self::new()
    }
}

/// Consensus rule: exactly one distinct best move across succeeding
/// engines means agreement, with the rounded mean evaluation; anything
/// else records every engine's move (or the unavailable sentinel).
fn summarize(
    analyses: &[EngineAnalysis],
    failed: &[EngineKind],
) -> (Option<Consensus>, Option<BTreeMap<EngineKind, String>>) {
    if analyses.is_empty() && failed.is_empty() {
        return (None, None);
    }

    let mut distinct: Vec<&str> = Vec::new();
    for a in analyses {
        if !distinct.contains(&a.result.best_move.as_str()) {
            distinct.push(&a.result.best_move);
        }
    }

    if distinct.len() == 1 {
        let mean = analyses.iter().map(|a| f64::from(a.result.evaluation)).sum::<f64>()
            / analyses.len() as f64;
        let consensus = Consensus {
            agreed: true,
            best_move: Some(distinct[0].to_string()),
            evaluation: Some(mean.round() as i32),
        };
        return (Some(consensus), None);
    }

    let mut disagreement = BTreeMap::new();
    for a in analyses {
        disagreement.insert(a.engine, a.result.best_move.clone());
    }
    for kind in failed {
        disagreement.insert(*kind, UNAVAILABLE.to_string());
    }
    (
        Some(Consensus {
            agreed: false,
            best_move: None,
            evaluation: None,
        }),
        Some(disagreement),
    )
}
