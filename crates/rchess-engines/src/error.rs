//! Error types for engine orchestration.

/// Failures surfaced by sessions, clients and the manager queue.
///
/// A session-level failure rejects only the request that hit it; the
/// manager queue keeps draining and the factory treats any per-engine
/// error as exclusion from its aggregate, never as a fatal failure.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    /// Spawn or handshake failure; the engine never became usable.
    #[error("engine '{engine}' unavailable: {reason}")]
    Unavailable { engine: String, reason: String },

    /// The engine process exited unexpectedly mid-search.
    #[error("engine '{engine}' crashed during analysis")]
    Crashed { engine: String },

    /// The search exceeded the wall-clock bound.
    #[error("analysis exceeded the {timeout_ms}ms wall-clock bound")]
    AnalysisTimeout { timeout_ms: u64 },

    /// Caller violated the single-in-flight contract directly against a
    /// session. Overlapping searches are the manager's job to queue, not
    /// the session's.
    #[error("engine session is already analyzing")]
    Busy,

    /// Operation issued after `quit()` or a crash-forced termination.
    #[error("engine session has terminated")]
    Terminated,

    /// Stream-level fault on an established session.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
