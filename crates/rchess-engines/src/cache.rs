//! Opportunistic analysis cache.
//!
//! The cache sits in front of the engine queue and must never become a
//! reliability dependency: every backend fault is logged and treated as a
//! miss (lookups) or a no-op (write-backs). Disabled mode is a first-class
//! state, not an error.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::CacheSettings;
use crate::process::lock;
use crate::types::AnalysisResult;

/// Backend fault. Deliberately stringly: the cache layer only ever logs it.
#[derive(Debug, thiserror::Error)]
#[error("cache backend fault: {0}")]
pub struct CacheFault(pub String);

/// External key-value collaborator: get / set-with-TTL / delete / key-scan.
/// An out-of-process store (Redis, …) would be another implementation of
/// this trait; the orchestration layer does not care.
pub trait KvBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, CacheFault>;
    fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheFault>;
    fn delete(&self, key: &str) -> Result<(), CacheFault>;
    /// Keys starting with `prefix`.
    fn scan_keys(&self, prefix: &str) -> Result<Vec<String>, CacheFault>;
}

/// In-process backend with lazy expiry.
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>, CacheFault> {
        let mut entries = lock(&self.entries);
        match entries.get(key) {
            Some((_, expiry)) if *expiry <= Instant::now() => {
                entries.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheFault> {
        lock(&self.entries).insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheFault> {
        lock(&self.entries).remove(key);
        Ok(())
    }

    fn scan_keys(&self, prefix: &str) -> Result<Vec<String>, CacheFault> {
        let now = Instant::now();
        let mut entries = lock(&self.entries);
        entries.retain(|_, (_, expiry)| *expiry > now);
        Ok(entries.keys().filter(|k| k.starts_with(prefix)).cloned().collect())
    }
}

/// What gets cached per `(fen, depth)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CachedAnalysis {
    pub best_move: String,
    /// Centipawns, White perspective.
    pub evaluation: i32,
    pub depth: u32,
    pub timestamp: DateTime<Utc>,
}

impl CachedAnalysis {
    pub fn from_result(result: &AnalysisResult) -> Self {
        CachedAnalysis {
            best_move: result.best_move.clone(),
            evaluation: result.evaluation,
            depth: result.depth,
            timestamp: Utc::now(),
        }
    }

    /// Rehydrate into the upstream result shape. Cache entries carry only
    /// the primary line.
    pub fn into_result(self) -> AnalysisResult {
        AnalysisResult {
            best_move: self.best_move.clone(),
            ponder: None,
            evaluation: self.evaluation,
            depth: self.depth,
            seldepth: None,
            nodes: None,
            nps: None,
            time_ms: None,
            mate: None,
            pv: vec![self.best_move],
            multipv: Vec::new(),
        }
    }
}

/// Cache front used by the engine manager.
#[derive(Clone)]
pub struct AnalysisCache {
    backend: Option<Arc<dyn KvBackend>>,
    ttl: Duration,
}

impl AnalysisCache {
    pub fn new(backend: Arc<dyn KvBackend>, ttl: Duration) -> Self {
        AnalysisCache {
            backend: Some(backend),
            ttl,
        }
    }

    /// No-cache mode: every lookup misses, every store is a no-op.
    pub fn disabled() -> Self {
        AnalysisCache {
            backend: None,
            ttl: Duration::ZERO,
        }
    }

    /// Memory-backed cache per settings, or disabled.
    pub fn from_settings(settings: &CacheSettings) -> Self {
        if settings.enabled {
            AnalysisCache::new(
                Arc::new(MemoryBackend::new()),
                Duration::from_secs(settings.ttl_secs),
            )
        } else {
            AnalysisCache::disabled()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    fn key(fen: &str, depth: u32) -> String {
        format!("analysis:{fen}:{depth}")
    }

    fn prefix(fen: &str) -> String {
        format!("analysis:{fen}:")
    }

    /// Deepest cached entry for `fen` with `depth >= requested_depth` that
    /// is still inside the TTL. Any backend fault degrades to a miss.
    pub fn lookup(&self, fen: &str, requested_depth: u32) -> Option<CachedAnalysis> {
        let backend = self.backend.as_ref()?;

        let keys = match backend.scan_keys(&Self::prefix(fen)) {
            Ok(keys) => keys,
            Err(e) => {
                log::warn!("cache scan failed, treating as miss: {e}");
                return None;
            }
        };

        let mut best: Option<CachedAnalysis> = None;
        for key in keys {
            let value = match backend.get(&key) {
                Ok(Some(v)) => v,
                Ok(None) => continue,
                Err(e) => {
                    log::warn!("cache get failed, treating as miss: {e}");
                    continue;
                }
            };
            let entry: CachedAnalysis = match serde_json::from_str(&value) {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("corrupt cache entry at {key}, dropping: {e}");
                    let _ = backend.delete(&key);
                    continue;
                }
            };
            if entry.depth < requested_depth {
                continue;
            }
            // TTL double-check for backends without native expiry.
            let age = Utc::now().signed_duration_since(entry.timestamp);
            if age.num_seconds() < 0 || age.num_seconds() as u64 >= self.ttl.as_secs() {
                continue;
            }
            if best.as_ref().map(|b| entry.depth > b.depth).unwrap_or(true) {
                best = Some(entry);
            }
        }
        best
    }

    /// Best-effort write-back; failures are logged and ignored.
    pub fn store(&self, fen: &str, entry: &CachedAnalysis) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        let value = match serde_json::to_string(entry) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("failed to encode cache entry: {e}");
                return;
            }
        };
        if let Err(e) = backend.set_with_ttl(&Self::key(fen, entry.depth), &value, self.ttl) {
            log::warn!("cache write-back failed, ignoring: {e}");
        }
    }

    /// Drop every cached entry for a position.
    pub fn invalidate(&self, fen: &str) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        match backend.scan_keys(&Self::prefix(fen)) {
            Ok(keys) => {
                for key in keys {
                    if let Err(e) = backend.delete(&key) {
                        log::warn!("cache delete failed, ignoring: {e}");
                    }
                }
            }
            Err(e) => log::warn!("cache scan failed during invalidation: {e}"),
        }
    }
}
