//! Shared data model: engine identity, search options and analysis results.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use rchess_uci::MATE_SCORE;

/// Standard chess starting position.
pub const STARTPOS_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Sentinel recorded in a comparison's disagreement map for engines that
/// failed to produce a move.
pub const UNAVAILABLE: &str = "unavailable";

/// Closed set of engine variants the orchestration layer knows about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    Classical,
    Neural,
    Hybrid,
}

impl EngineKind {
    pub const ALL: [EngineKind; 3] = [EngineKind::Classical, EngineKind::Neural, EngineKind::Hybrid];

    pub fn as_str(self) -> &'static str {
        match self {
            EngineKind::Classical => "classical",
            EngineKind::Neural => "neural",
            EngineKind::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "classical" => Ok(EngineKind::Classical),
            "neural" => Ok(EngineKind::Neural),
            "hybrid" => Ok(EngineKind::Hybrid),
            other => Err(format!("unknown engine kind: {other}")),
        }
    }
}

/// Capability flags advertised per engine.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SupportedFeatures {
    pub multi_pv: bool,
    pub analysis: bool,
    pub skill_level: bool,
    pub limited_strength: bool,
}

/// Identity and strength metadata for one engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub kind: EngineKind,
    /// ELO estimate.
    pub strength: u32,
    pub features: SupportedFeatures,
}

/// Caller-supplied search options. All fields optional; effective values
/// fall back to per-client defaults.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    pub depth: Option<u8>,
    pub multi_pv: Option<u8>,
    pub threads: Option<u32>,
    pub hash_mb: Option<u32>,
    pub time_limit_ms: Option<u64>,
    pub nodes: Option<u64>,
}

impl EngineOptions {
    /// Search limit that should drive the `go` command. At most one of
    /// depth/time/nodes drives a search; depth wins, then time, then nodes.
    pub fn go_limit(&self, fallback_depth: u8) -> GoLimit {
        if let Some(d) = self.depth {
            GoLimit::Depth(d)
        } else if let Some(t) = self.time_limit_ms {
            GoLimit::MoveTime(t)
        } else if let Some(n) = self.nodes {
            GoLimit::Nodes(n)
        } else {
            GoLimit::Depth(fallback_depth)
        }
    }

    /// Depth used for cache keying, falling back to the client default.
    pub fn requested_depth(&self, fallback_depth: u8) -> u32 {
        u32::from(self.depth.unwrap_or(fallback_depth))
    }
}

/// Effective limit for exactly one `go` command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GoLimit {
    Depth(u8),
    MoveTime(u64),
    Nodes(u64),
}

impl GoLimit {
    pub fn to_go_command(self) -> String {
        match self {
            GoLimit::Depth(d) => format!("go depth {d}"),
            GoLimit::MoveTime(ms) => format!("go movetime {ms}"),
            GoLimit::Nodes(n) => format!("go nodes {n}"),
        }
    }
}

/// One secondary line of a MultiPV search, ascending by rank.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PvLine {
    /// 1-based MultiPV rank.
    pub rank: u8,
    pub best_move: String,
    /// Centipawns, White perspective.
    pub evaluation: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mate: Option<i32>,
    pub depth: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seldepth: Option<u32>,
    pub pv: Vec<String>,
}

/// Final result of one search.
///
/// `evaluation` is centipawns from White's perspective; the sign flip from
/// the engine's side-to-move convention happens once, at the session's
/// protocol boundary. A forced mate sets `mate` and pins `evaluation` to
/// `±MATE_SCORE` with a consistent sign.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub best_move: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ponder: Option<String>,
    pub evaluation: i32,
    pub depth: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seldepth: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nps: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mate: Option<i32>,
    /// Principal variation, raw engine tokens.
    pub pv: Vec<String>,
    /// Per-line results for MultiPV searches, ascending by rank. Empty for
    /// single-line searches.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub multipv: Vec<PvLine>,
}

/// One engine's contribution to a multi-engine comparison.
#[derive(Clone, Debug, Serialize)]
pub struct EngineAnalysis {
    pub engine: EngineKind,
    pub result: AnalysisResult,
    pub info: EngineInfo,
}

/// Agreement summary across succeeding engines.
#[derive(Clone, Debug, Serialize)]
pub struct Consensus {
    pub agreed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_move: Option<String>,
    /// Rounded mean of all succeeding engines' evaluations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<i32>,
}

/// Result of fanning one position out to every registered engine.
#[derive(Clone, Debug, Serialize)]
pub struct ComparisonAnalysis {
    pub position: String,
    pub analyses: Vec<EngineAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consensus: Option<Consensus>,
    /// Per-engine best move, or [`UNAVAILABLE`] for engines that failed.
    /// Present only when the engines did not agree.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disagreement: Option<BTreeMap<EngineKind, String>>,
}
