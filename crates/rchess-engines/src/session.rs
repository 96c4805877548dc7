//! Engine session: one child process, one UCI handshake, one search at a
//! time.
//!
//! The session is the layer that turns the line protocol's implicit state
//! into an explicit machine: `Uninitialized → Initializing → Ready →
//! Analyzing → Ready`, with `Terminated` as the terminal state after
//! `quit()` or a crash. It enforces the single-in-flight-search contract
//! (`Busy` on overlap — queuing is the manager's job, not the session's)
//! and owns the hard wall-clock timeout that backstops cooperative `stop`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rchess_uci::{parse_line, Fragment, IdFields, InfoFields, Score};

use crate::error::{EngineError, EngineResult};
use crate::process::{lock, UciProcess};
use crate::types::{AnalysisResult, GoLimit, PvLine};

/// Bound on the wait for `uciok` after `uci`.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
/// Bound on the wait for `readyok` after `isready`.
const READY_TIMEOUT: Duration = Duration::from_secs(30);
/// Channel poll step inside search/handshake loops.
const POLL_STEP: Duration = Duration::from_millis(50);

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No process spawned yet.
    Uninitialized,
    /// Handshake in progress.
    Initializing,
    /// Idle, accepting searches.
    Ready,
    /// Exactly one search in flight.
    Analyzing,
    /// Quit or crashed; no further operations possible.
    Terminated,
}

impl SessionState {
    pub fn can_start_search(&self) -> bool {
        matches!(self, SessionState::Ready)
    }

    pub fn is_live(&self) -> bool {
        matches!(self, SessionState::Ready | SessionState::Analyzing)
    }
}

/// Identity the engine reported via `id` lines during the handshake.
#[derive(Clone, Debug, Default)]
pub struct ReportedIdentity {
    pub name: Option<String>,
    pub author: Option<String>,
}

pub struct EngineSession {
    name: String,
    path: PathBuf,
    envs: Vec<(String, String)>,
    /// Applied between `uciok` and `isready` (`Threads`, `Hash`, …).
    default_options: Vec<(String, String)>,
    search_timeout: Duration,
    state: Mutex<SessionState>,
    proc: Mutex<Option<Arc<UciProcess>>>,
    /// Serializes concurrent initializers. `quit()` only needs the proc
    /// slot, so it stays responsive during a slow handshake.
    init: Mutex<()>,
    identity: Mutex<ReportedIdentity>,
    /// Monotonically increasing search generation, for log attribution.
    generation: AtomicU64,
    /// Set when a search times out; the next search resynchronizes on
    /// `isready`/`readyok` before trusting any engine output.
    needs_resync: AtomicBool,
    /// Last MultiPV value sent, to avoid redundant setoption traffic.
    last_multipv: AtomicU32,
}

impl EngineSession {
    pub fn new(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        envs: Vec<(String, String)>,
        default_options: Vec<(String, String)>,
        search_timeout: Duration,
    ) -> Self {
        EngineSession {
            name: name.into(),
            path: path.into(),
            envs,
            default_options,
            search_timeout,
            state: Mutex::new(SessionState::Uninitialized),
            proc: Mutex::new(None),
            init: Mutex::new(()),
            identity: Mutex::new(ReportedIdentity::default()),
            generation: AtomicU64::new(0),
            needs_resync: AtomicBool::new(false),
            last_multipv: AtomicU32::new(1),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    pub fn reported_identity(&self) -> ReportedIdentity {
        lock(&self.identity).clone()
    }

    fn set_state(&self, next: SessionState) {
        *lock(&self.state) = next;
    }

    fn unavailable(&self, reason: impl Into<String>) -> EngineError {
        EngineError::Unavailable {
            engine: self.name.clone(),
            reason: reason.into(),
        }
    }

    fn crashed(&self) -> EngineError {
        EngineError::Crashed {
            engine: self.name.clone(),
        }
    }

    /// Spawn the process and run the UCI handshake: `uci` → `uciok`,
    /// default options, `isready` → `readyok`. Idempotent once `Ready`.
    /// The handshake runs outside the proc slot lock; the spawned process
    /// is installed only on success, and only if no concurrent `quit()`
    /// terminated the session in the meantime.
    pub fn initialize(&self) -> EngineResult<()> {
        let _init = lock(&self.init);
        {
            let mut st = lock(&self.state);
            match *st {
                SessionState::Ready | SessionState::Analyzing => return Ok(()),
                SessionState::Terminated => return Err(EngineError::Terminated),
                SessionState::Uninitialized | SessionState::Initializing => {
                    *st = SessionState::Initializing;
                }
            }
        }

        let proc = match UciProcess::spawn(&self.name, &self.path, &self.envs) {
            Ok(p) => Arc::new(p),
            Err(e) => {
                self.abort_initializing();
                return Err(self.unavailable(format!(
                    "failed to spawn {}: {e}",
                    self.path.display()
                )));
            }
        };

        match self.handshake(&proc) {
            Ok(()) => {
                let mut slot = lock(&self.proc);
                let mut st = lock(&self.state);
                if *st == SessionState::Terminated {
                    drop(st);
                    drop(slot);
                    proc.kill();
                    return Err(EngineError::Terminated);
                }
                *st = SessionState::Ready;
                drop(st);
                *slot = Some(proc);
                self.last_multipv.store(1, Ordering::SeqCst);
                log::info!("engine '{}' ready ({})", self.name, self.path.display());
                Ok(())
            }
            Err(e) => {
                proc.kill();
                self.abort_initializing();
                Err(e)
            }
        }
    }

    /// Roll a failed handshake back to `Uninitialized`, unless a
    /// concurrent `quit()` already terminated the session.
    fn abort_initializing(&self) {
        let mut st = lock(&self.state);
        if *st == SessionState::Initializing {
            *st = SessionState::Uninitialized;
        }
    }

    fn handshake(&self, proc: &UciProcess) -> EngineResult<()> {
        proc.send("uci").map_err(|e| self.unavailable(format!("write failed: {e}")))?;
        self.wait_for(proc, HANDSHAKE_TIMEOUT, "uciok", |f| matches!(f, Fragment::UciOk))?;

        for (name, value) in &self.default_options {
            proc.send(&format!("setoption name {name} value {value}"))
                .map_err(|e| self.unavailable(format!("write failed: {e}")))?;
        }

        proc.send("isready").map_err(|e| self.unavailable(format!("write failed: {e}")))?;
        self.wait_for(proc, READY_TIMEOUT, "readyok", |f| matches!(f, Fragment::ReadyOk))
    }

    /// Await a specific handshake fragment, recording `id` lines on the way.
    fn wait_for(
        &self,
        proc: &UciProcess,
        timeout: Duration,
        what: &str,
        pred: impl Fn(&Fragment) -> bool,
    ) -> EngineResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(self.unavailable(format!("timeout waiting for {what}")));
            }
            match proc.recv_timeout(POLL_STEP.min(deadline - now)) {
                Ok(line) => match parse_line(&line) {
                    Fragment::Id(IdFields::Name(n)) => lock(&self.identity).name = Some(n),
                    Fragment::Id(IdFields::Author(a)) => lock(&self.identity).author = Some(a),
                    f if pred(&f) => return Ok(()),
                    _ => {}
                },
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(self.unavailable(format!("engine exited before {what}")));
                }
            }
        }
    }

    /// Run exactly one search. Only valid from `Ready`; an overlapping
    /// call is a caller contract violation and fails with `Busy`.
    pub fn run_search(
        &self,
        fen: &str,
        limit: GoLimit,
        multipv: u8,
    ) -> EngineResult<AnalysisResult> {
        {
            let mut st = lock(&self.state);
            match *st {
                SessionState::Ready => *st = SessionState::Analyzing,
                SessionState::Analyzing => return Err(EngineError::Busy),
                SessionState::Terminated => return Err(EngineError::Terminated),
                SessionState::Uninitialized | SessionState::Initializing => {
                    return Err(self.unavailable("session not initialized"));
                }
            }
        }

        let outcome = self.search_inner(fen, limit, multipv.max(1));
        match &outcome {
            Err(EngineError::Crashed { .. }) | Err(EngineError::Terminated) => {
                self.force_terminate();
            }
            _ => self.set_state(SessionState::Ready),
        }
        outcome
    }

    fn search_inner(&self, fen: &str, limit: GoLimit, multipv: u8) -> EngineResult<AnalysisResult> {
        let proc = lock(&self.proc)
            .clone()
            .ok_or_else(|| self.unavailable("no engine process"))?;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.resync(&proc)?;

        proc.send(&format!("position fen {fen}")).map_err(|_| self.crashed())?;
        if u32::from(multipv) != self.last_multipv.swap(u32::from(multipv), Ordering::SeqCst) {
            proc.send(&format!("setoption name MultiPV value {multipv}"))
                .map_err(|_| self.crashed())?;
        }
        proc.send(&limit.to_go_command()).map_err(|_| self.crashed())?;

        // Per-search scratch, scoped to this generation; one slot per
        // MultiPV rank, overwritten by each newer info line.
        let mut scratch: HashMap<u8, InfoFields> = HashMap::new();
        let deadline = Instant::now() + self.search_timeout;

        loop {
            let now = Instant::now();
            if now >= deadline {
                // Cooperative cancellation; whether the engine ever answers
                // with a bestmove for this dead generation is its business.
                let _ = proc.send("stop");
                self.needs_resync.store(true, Ordering::SeqCst);
                log::warn!(
                    "engine '{}' search generation {generation} timed out after {:?}",
                    self.name,
                    self.search_timeout
                );
                return Err(EngineError::AnalysisTimeout {
                    timeout_ms: self.search_timeout.as_millis() as u64,
                });
            }

            match proc.recv_timeout(POLL_STEP.min(deadline - now)) {
                Ok(line) => match parse_line(&line) {
                    Fragment::Info(info) => {
                        if info.score.is_some() && !info.pv.is_empty() {
                            scratch.insert(info.multipv.unwrap_or(1), info);
                        }
                    }
                    Fragment::BestMove { best, ponder } => {
                        return Ok(assemble_result(fen, best, ponder, scratch, multipv));
                    }
                    _ => {}
                },
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    log::warn!("engine '{}' exited unexpectedly mid-search", self.name);
                    return Err(self.crashed());
                }
            }
        }
    }

    /// Settle the protocol stream after a timed-out generation before the
    /// next search issues its commands. A dead generation may or may not
    /// still owe a bestmove, so no debt can be assumed; instead the resync
    /// pivots on `isready`: the engine answers its command queue in order,
    /// so everything received before the `readyok` belongs to dead
    /// generations and is discarded, and nothing after it can be stale.
    fn resync(&self, proc: &UciProcess) -> EngineResult<()> {
        proc.drain();
        if !self.needs_resync.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        proc.send("isready").map_err(|_| self.crashed())?;
        let deadline = Instant::now() + READY_TIMEOUT;
        loop {
            let now = Instant::now();
            if now >= deadline {
                self.needs_resync.store(true, Ordering::SeqCst);
                return Err(
                    self.unavailable("timeout waiting for readyok after a timed-out search")
                );
            }
            match proc.recv_timeout(POLL_STEP.min(deadline - now)) {
                Ok(line) => match parse_line(&line) {
                    Fragment::ReadyOk => return Ok(()),
                    _ => log::debug!("engine '{}': discarded stale line '{line}'", self.name),
                },
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Err(self.crashed()),
            }
        }
    }

    /// Forward one `setoption`. Legal only when `Ready`.
    pub fn set_option(&self, name: &str, value: &str) -> EngineResult<()> {
        match self.state() {
            SessionState::Ready => {}
            SessionState::Analyzing => return Err(EngineError::Busy),
            SessionState::Terminated => return Err(EngineError::Terminated),
            _ => return Err(self.unavailable("session not initialized")),
        }
        let proc = lock(&self.proc)
            .clone()
            .ok_or_else(|| self.unavailable("no engine process"))?;
        if name.eq_ignore_ascii_case("multipv") {
            if let Ok(k) = value.parse::<u32>() {
                self.last_multipv.store(k.max(1), Ordering::SeqCst);
            }
        }
        proc.send(&format!("setoption name {name} value {value}")).map_err(|_| self.crashed())
    }

    /// Cooperative stop: sends `stop` if a search is in flight, no-op
    /// otherwise. The engine decides when the bestmove actually comes; the
    /// search timeout is the hard backstop.
    pub fn stop(&self) {
        if self.state() == SessionState::Analyzing {
            if let Some(proc) = lock(&self.proc).clone() {
                let _ = proc.send("stop");
            }
        }
    }

    /// Graceful shutdown; the session is unusable afterwards.
    pub fn quit(&self) {
        self.force_terminate();
    }

    fn force_terminate(&self) {
        if let Some(proc) = lock(&self.proc).take() {
            let _ = proc.send("quit");
            proc.kill();
        }
        self.set_state(SessionState::Terminated);
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        if self.state().is_live() {
            self.force_terminate();
        }
    }
}

/// Whether the FEN's side-to-move field says Black is to move.
fn black_to_move(fen: &str) -> bool {
    fen.split_whitespace().nth(1) == Some("b")
}

/// Engine scores are from the side to move; flip to White perspective and
/// keep the mate/sentinel invariant intact.
fn convert_score(score: Score, flip: bool) -> (i32, Option<i32>) {
    let mut cp = score.to_centipawns();
    let mut mate = score.mate();
    if flip {
        cp = -cp;
        mate = mate.map(|n| -n);
    }
    (cp, mate)
}

fn assemble_result(
    fen: &str,
    best: String,
    ponder: Option<String>,
    scratch: HashMap<u8, InfoFields>,
    multipv: u8,
) -> AnalysisResult {
    let flip = black_to_move(fen);

    let (nodes, nps, time_ms) = scratch
        .get(&1)
        .map(|i| (i.nodes, i.nps, i.time_ms))
        .unwrap_or_default();

    let mut lines: Vec<PvLine> = scratch
        .into_iter()
        .map(|(rank, info)| {
            let (evaluation, mate) = match info.score {
                Some(s) => convert_score(s, flip),
                None => (0, None),
            };
            PvLine {
                rank,
                best_move: info.pv.first().cloned().unwrap_or_default(),
                evaluation,
                mate,
                depth: info.depth.unwrap_or(0),
                seldepth: info.seldepth,
                pv: info.pv,
            }
        })
        .collect();
    lines.sort_by_key(|l| l.rank);

    // The bestmove announcement is authoritative for the primary line.
    let primary = lines.iter().find(|l| l.rank == 1).cloned();
    let (evaluation, mate, depth, seldepth, pv) = match &primary {
        Some(p) => (p.evaluation, p.mate, p.depth, p.seldepth, p.pv.clone()),
        None => (0, None, 0, None, vec![best.clone()]),
    };

    AnalysisResult {
        best_move: best,
        ponder,
        evaluation,
        depth,
        seldepth,
        nodes,
        nps,
        time_ms,
        mate,
        pv,
        multipv: if multipv > 1 { lines } else { Vec::new() },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_predicates() {
        assert!(SessionState::Ready.can_start_search());
        assert!(!SessionState::Analyzing.can_start_search());
        assert!(!SessionState::Terminated.can_start_search());
        assert!(SessionState::Analyzing.is_live());
        assert!(!SessionState::Uninitialized.is_live());
    }

    #[test]
    fn side_to_move_detection() {
        assert!(!black_to_move("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1"));
        assert!(black_to_move(
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1"
        ));
        assert!(!black_to_move("garbage"));
    }

    #[test]
    fn score_conversion_keeps_mate_invariant() {
        assert_eq!(convert_score(Score::Cp(35), false), (35, None));
        assert_eq!(convert_score(Score::Cp(35), true), (-35, None));
        assert_eq!(convert_score(Score::Mate(3), false), (rchess_uci::MATE_SCORE, Some(3)));
        assert_eq!(convert_score(Score::Mate(3), true), (-rchess_uci::MATE_SCORE, Some(-3)));
        assert_eq!(convert_score(Score::Mate(-2), false), (-rchess_uci::MATE_SCORE, Some(-2)));
    }

    #[test]
    fn assemble_without_info_lines_still_completes() {
        let result = assemble_result(
            crate::types::STARTPOS_FEN,
            "e2e4".to_string(),
            None,
            HashMap::new(),
            1,
        );
        assert_eq!(result.best_move, "e2e4");
        assert_eq!(result.depth, 0);
        assert_eq!(result.pv, vec!["e2e4"]);
        assert!(result.multipv.is_empty());
    }
}
