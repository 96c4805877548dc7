//! Engine configuration.
//!
//! Loaded from a TOML file supplying per-engine executable paths and
//! default thread/hash settings, plus cache and search tuning. Every field
//! except the engine paths has a sensible default.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::types::EngineKind;

/// Default hard wall-clock bound per search (ms).
pub const DEFAULT_SEARCH_TIMEOUT_MS: u64 = 60_000;
/// Default cache entry lifetime: 24 hours.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// One engine's executable and its default options.
#[derive(Clone, Debug, Deserialize)]
pub struct EngineEntry {
    /// Path to the UCI binary.
    pub path: PathBuf,
    #[serde(default = "default_threads")]
    pub threads: u32,
    #[serde(default = "default_hash_mb")]
    pub hash_mb: u32,
    /// Display-name override; per-kind identity defaults apply otherwise.
    #[serde(default)]
    pub name: Option<String>,
    /// ELO estimate override.
    #[serde(default)]
    pub strength: Option<u32>,
    /// Extra environment for the spawned process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl EngineEntry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        EngineEntry {
            path: path.into(),
            threads: default_threads(),
            hash_mb: default_hash_mb(),
            name: None,
            strength: None,
            env: BTreeMap::new(),
        }
    }
}

fn default_threads() -> u32 {
    1
}

fn default_hash_mb() -> u32 {
    128
}

/// The `[engines.*]` tables. Absent kinds are simply not registered.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct EngineTable {
    pub classical: Option<EngineEntry>,
    pub neural: Option<EngineEntry>,
    pub hybrid: Option<EngineEntry>,
}

/// Cache tuning.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            enabled: true,
            ttl_secs: DEFAULT_CACHE_TTL_SECS,
        }
    }
}

/// Search tuning: the hard timeout and the fixed-depth presets used by the
/// manager's convenience wrappers.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Hard wall-clock bound per search (ms), independent of depth.
    pub timeout_ms: u64,
    pub default_depth: u8,
    pub deep_depth: u8,
    pub quick_depth: u8,
    pub default_multipv: u8,
}

impl Default for SearchSettings {
    fn default() -> Self {
        SearchSettings {
            timeout_ms: DEFAULT_SEARCH_TIMEOUT_MS,
            default_depth: 20,
            deep_depth: 25,
            quick_depth: 12,
            default_multipv: 3,
        }
    }
}

/// Top-level configuration.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct EnginesConfig {
    pub engines: EngineTable,
    pub cache: CacheSettings,
    pub search: SearchSettings,
}

impl EnginesConfig {
    /// Load and parse a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn entry(&self, kind: EngineKind) -> Option<&EngineEntry> {
        match kind {
            EngineKind::Classical => self.engines.classical.as_ref(),
            EngineKind::Neural => self.engines.neural.as_ref(),
            EngineKind::Hybrid => self.engines.hybrid.as_ref(),
        }
    }

    /// Kinds that have an engine configured.
    pub fn configured_kinds(&self) -> Vec<EngineKind> {
        EngineKind::ALL.into_iter().filter(|k| self.entry(*k).is_some()).collect()
    }
}
