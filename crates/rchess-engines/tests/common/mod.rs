//! Shared helpers for integration tests driving the mockfish binary.
#![allow(dead_code)]

use rchess_engines::config::{CacheSettings, EngineEntry, SearchSettings};
use rchess_engines::{AnalysisCache, EngineClient, EngineKind, EngineManager};
use std::sync::Arc;

pub fn mockfish_exe() -> &'static str {
    env!("CARGO_BIN_EXE_mockfish")
}

pub fn entry_with(envs: &[(&str, &str)]) -> EngineEntry {
    let mut entry = EngineEntry::new(mockfish_exe());
    entry.env = envs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    entry
}

pub fn settings(timeout_ms: u64) -> SearchSettings {
    SearchSettings {
        timeout_ms,
        ..Default::default()
    }
}

pub fn client_with(kind: EngineKind, envs: &[(&str, &str)], timeout_ms: u64) -> EngineClient {
    EngineClient::from_entry(kind, &entry_with(envs), &settings(timeout_ms))
}

pub fn manager_with(
    envs: &[(&str, &str)],
    cache_enabled: bool,
    timeout_ms: u64,
) -> EngineManager {
    let client = Arc::new(client_with(EngineKind::Classical, envs, timeout_ms));
    let cache = if cache_enabled {
        AnalysisCache::from_settings(&CacheSettings {
            enabled: true,
            ttl_secs: 3600,
        })
    } else {
        AnalysisCache::disabled()
    };
    EngineManager::new(client, cache, settings(timeout_ms))
}
