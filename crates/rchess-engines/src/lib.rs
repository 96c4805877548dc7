//! Chess engine orchestration layer.
//!
//! Drives external UCI engines as child processes and layers, bottom up:
//! process plumbing ([`process`]), the per-engine session state machine
//! ([`session`]), capability-specific clients ([`client`]), the
//! serializing/caching manager ([`manager`]) and the multi-engine factory
//! ([`factory`]). Line-level protocol parsing lives in the `rchess-uci`
//! crate.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod factory;
pub mod manager;
pub mod process;
pub mod session;
pub mod types;

pub use cache::{AnalysisCache, CachedAnalysis, KvBackend, MemoryBackend};
pub use client::EngineClient;
pub use config::{EngineEntry, EnginesConfig, SearchSettings};
pub use error::{EngineError, EngineResult};
pub use factory::EngineFactory;
pub use manager::EngineManager;
pub use session::{EngineSession, SessionState};
pub use types::{
    AnalysisResult, ComparisonAnalysis, Consensus, EngineInfo, EngineKind, EngineOptions,
    GoLimit, MATE_SCORE, STARTPOS_FEN,
};
