//! Capability-specific wrapper over one engine session.
//!
//! A client binds an [`EngineKind`] to its identity metadata, default
//! options and a lazily initialized session. The first operation spawns
//! the process; a spawn or handshake failure surfaces as
//! `EngineError::Unavailable` so callers (manager, factory) can treat the
//! engine as degraded instead of failing wholesale.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::config::{EngineEntry, SearchSettings};
use crate::error::EngineResult;
use crate::session::EngineSession;
use crate::types::{AnalysisResult, EngineInfo, EngineKind, EngineOptions, SupportedFeatures};

pub struct EngineClient {
    kind: EngineKind,
    info: EngineInfo,
    session: EngineSession,
    default_depth: u8,
    quick_depth: u8,
    default_multipv: u8,
    /// Searches issued through this client, for diagnostics.
    searches: AtomicU64,
}

impl EngineClient {
    pub fn from_entry(kind: EngineKind, entry: &EngineEntry, search: &SearchSettings) -> Self {
        let mut info = default_info(kind);
        if let Some(name) = &entry.name {
            info.name = name.clone();
        }
        if let Some(strength) = entry.strength {
            info.strength = strength;
        }

        let default_options = vec![
            ("Threads".to_string(), entry.threads.to_string()),
            ("Hash".to_string(), entry.hash_mb.to_string()),
        ];
        let envs: Vec<(String, String)> =
            entry.env.iter().map(|(k, v)| (k.clone(), v.clone())).collect();

        let session = EngineSession::new(
            kind.as_str(),
            &entry.path,
            envs,
            default_options,
            Duration::from_millis(search.timeout_ms),
        );

        EngineClient {
            kind,
            info,
            session,
            default_depth: search.default_depth,
            quick_depth: search.quick_depth,
            default_multipv: search.default_multipv,
            searches: AtomicU64::new(0),
        }
    }

    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    pub fn info(&self) -> &EngineInfo {
        &self.info
    }

    pub fn session(&self) -> &EngineSession {
        &self.session
    }

    /// Searches issued through this client so far.
    pub fn searches(&self) -> u64 {
        self.searches.load(Ordering::Relaxed)
    }

    fn run(&self, fen: &str, options: &EngineOptions, multipv: u8) -> EngineResult<AnalysisResult> {
        self.session.initialize()?;
        self.searches.fetch_add(1, Ordering::Relaxed);
        self.session.run_search(fen, options.go_limit(self.default_depth), multipv)
    }

    /// Single-line search for the best move.
    pub fn get_best_move(&self, fen: &str, options: &EngineOptions) -> EngineResult<AnalysisResult> {
        self.run(fen, options, 1)
    }

    /// Multi-line search; the result's `multipv` lists one line per rank,
    /// ascending, with the primary line mirrored in the top-level fields.
    pub fn analyze_position(
        &self,
        fen: &str,
        options: &EngineOptions,
    ) -> EngineResult<AnalysisResult> {
        let multipv = options.multi_pv.unwrap_or(self.default_multipv).max(1);
        self.run(fen, options, multipv)
    }

    /// Fixed shallow-depth search returning only the evaluation
    /// (centipawns, White perspective).
    pub fn quick_eval(&self, fen: &str) -> EngineResult<i32> {
        let options = EngineOptions {
            depth: Some(self.quick_depth),
            ..Default::default()
        };
        Ok(self.run(fen, &options, 1)?.evaluation)
    }

    /// Forward a raw `setoption`; legal only when the session is `Ready`.
    pub fn set_option(&self, name: &str, value: &str) -> EngineResult<()> {
        self.session.set_option(name, value)
    }

    pub fn stop(&self) {
        self.session.stop();
    }

    pub fn quit(&self) {
        self.session.quit();
    }
}

/// Baseline identity per engine variant; config entries may override name
/// and strength.
fn default_info(kind: EngineKind) -> EngineInfo {
    match kind {
        EngineKind::Classical => EngineInfo {
            name: "Stockfish".to_string(),
            version: None,
            author: None,
            kind,
            strength: 3200,
            features: SupportedFeatures {
                multi_pv: true,
                analysis: true,
                skill_level: true,
                limited_strength: true,
            },
        },
        EngineKind::Neural => EngineInfo {
            name: "Leela Chess Zero".to_string(),
            version: None,
            author: None,
            kind,
            strength: 3400,
            features: SupportedFeatures {
                multi_pv: true,
                analysis: true,
                skill_level: false,
                limited_strength: false,
            },
        },
        EngineKind::Hybrid => EngineInfo {
            name: "Komodo Dragon".to_string(),
            version: None,
            author: None,
            kind,
            strength: 3300,
            features: SupportedFeatures {
                multi_pv: true,
                analysis: true,
                skill_level: true,
                limited_strength: true,
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_overrides_identity_defaults() {
        let mut entry = EngineEntry::new("/nonexistent/engine");
        entry.name = Some("Patched Fish".to_string());
        entry.strength = Some(2900);
        let client = EngineClient::from_entry(
            EngineKind::Classical,
            &entry,
            &SearchSettings::default(),
        );
        assert_eq!(client.info().name, "Patched Fish");
        assert_eq!(client.info().strength, 2900);
        assert_eq!(client.kind(), EngineKind::Classical);
        assert!(client.info().features.multi_pv);
    }

    #[test]
    fn spawn_failure_is_unavailable() {
        let entry = EngineEntry::new("/nonexistent/engine-binary");
        let client =
            EngineClient::from_entry(EngineKind::Neural, &entry, &SearchSettings::default());
        let err = client
            .get_best_move(crate::types::STARTPOS_FEN, &EngineOptions::default())
            .unwrap_err();
        assert!(matches!(err, crate::error::EngineError::Unavailable { .. }));
        // Nothing was searched.
        assert_eq!(client.searches(), 0);
    }
}
