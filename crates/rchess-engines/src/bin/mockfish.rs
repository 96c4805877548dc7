//! Scripted UCI engine for integration tests.
//!
//! Speaks just enough of the protocol to exercise the orchestration
//! layer's process plumbing: handshake, MultiPV info lines, bestmove,
//! cooperative stop. Behavior is driven by environment variables so tests
//! can stand up engines with different personalities from one binary:
//!
//! - `MOCKFISH_NAME`               id string (default "Mockfish 1.0")
//! - `MOCKFISH_BESTMOVE`           move to announce (default "e2e4")
//! - `MOCKFISH_PONDER`             ponder move (default "e7e5")
//! - `MOCKFISH_CP`                 primary-line centipawns (default 23)
//! - `MOCKFISH_MATE`               if set, report `score mate N` on the primary line
//! - `MOCKFISH_DELAY_MS`           sleep before answering `go` (default 0)
//! - `MOCKFISH_HANDSHAKE_DELAY_MS` sleep before answering `uci` (default 0)
//! - `MOCKFISH_CMD_LOG`            append `go` arrival / `bestmove` emission
//!                                 events to this file
//! - `MOCKFISH_MODE`               normal | mute | mute-once | ignore-once | crash
//!
//! `mute` never answers `go`; a later `stop` is acknowledged with the
//! marker move `a2a3` so tests can detect stale-output misattribution.
//! `mute-once` behaves like `mute` for the first `go` only. `ignore-once`
//! swallows the first `go` AND its `stop` without ever emitting a
//! bestmove. `crash` exits mid-search without a bestmove.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, Write};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Alternative moves for MultiPV ranks 2 and up.
const ALT_MOVES: [&str; 3] = ["d2d4", "g1f3", "c2c4"];
/// Bestmove used when acknowledging a stop of a muted search.
const STALE_MARKER: &str = "a2a3";

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn log_event(log: &Mutex<File>, event: &str) {
    if let Ok(mut file) = log.lock() {
        let _ = writeln!(file, "{event}");
        let _ = file.flush();
    }
}

fn main() -> io::Result<()> {
    let name = env_or("MOCKFISH_NAME", "Mockfish 1.0");
    let best = env_or("MOCKFISH_BESTMOVE", "e2e4");
    let ponder = env_or("MOCKFISH_PONDER", "e7e5");
    let cp: i32 = env_or("MOCKFISH_CP", "23").parse().unwrap_or(23);
    let mate: Option<i32> = std::env::var("MOCKFISH_MATE").ok().and_then(|v| v.parse().ok());
    let delay_ms: u64 = env_or("MOCKFISH_DELAY_MS", "0").parse().unwrap_or(0);
    let handshake_delay_ms: u64 =
        env_or("MOCKFISH_HANDSHAKE_DELAY_MS", "0").parse().unwrap_or(0);
    let mode = env_or("MOCKFISH_MODE", "normal");
    let cmd_log: Option<Arc<Mutex<File>>> = std::env::var("MOCKFISH_CMD_LOG").ok().map(|path| {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .expect("opening MOCKFISH_CMD_LOG");
        Arc::new(Mutex::new(file))
    });

    // Stdin is pumped by a dedicated thread so a `go` arrival is observed
    // (and logged) even while an earlier command is still being answered.
    let (tx, rx) = mpsc::channel::<String>();
    let arrival_log = cmd_log.clone();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines().map_while(Result::ok) {
            if let Some(log) = &arrival_log {
                if line.trim().starts_with("go") {
                    log_event(log, "go");
                }
            }
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    let mut stdout = io::stdout();
    let mut multipv: u8 = 1;
    let mut go_count: u32 = 0;
    let mut muted_pending = false;

    for line in rx {
        let cmd = line.trim();
        if cmd.is_empty() {
            continue;
        }

        if cmd == "quit" {
            break;
        }
        if cmd == "uci" {
            if handshake_delay_ms > 0 {
                thread::sleep(Duration::from_millis(handshake_delay_ms));
            }
            writeln!(stdout, "id name {name}")?;
            writeln!(stdout, "id author rchess tests")?;
            writeln!(stdout, "option name Threads type spin default 1 min 1 max 128")?;
            writeln!(stdout, "option name Hash type spin default 16 min 1 max 4096")?;
            writeln!(stdout, "option name MultiPV type spin default 1 min 1 max 16")?;
            writeln!(stdout, "uciok")?;
            stdout.flush()?;
            continue;
        }
        if cmd == "isready" {
            writeln!(stdout, "readyok")?;
            stdout.flush()?;
            continue;
        }
        if let Some(rest) = cmd.strip_prefix("setoption name MultiPV value ") {
            multipv = rest.trim().parse().unwrap_or(1).max(1);
            continue;
        }
        if cmd.starts_with("setoption") || cmd.starts_with("position") || cmd == "ucinewgame" {
            continue;
        }
        if cmd == "stop" {
            if muted_pending {
                muted_pending = false;
                if let Some(log) = &cmd_log {
                    log_event(log, "bestmove");
                }
                writeln!(stdout, "bestmove {STALE_MARKER}")?;
                stdout.flush()?;
            }
            continue;
        }
        if cmd.starts_with("go") {
            go_count += 1;
            match mode.as_str() {
                "crash" => std::process::exit(2),
                "mute" => {
                    muted_pending = true;
                    continue;
                }
                "mute-once" if go_count == 1 => {
                    muted_pending = true;
                    continue;
                }
                // First search vanishes without a trace: no bestmove on
                // `go`, none on `stop` either.
                "ignore-once" if go_count == 1 => continue,
                _ => {}
            }

            if delay_ms > 0 {
                thread::sleep(Duration::from_millis(delay_ms));
            }

            let depth: u32 = cmd
                .strip_prefix("go depth ")
                .and_then(|d| d.trim().parse().ok())
                .unwrap_or(10);

            // A shallow preliminary line, then the final iteration.
            writeln!(stdout, "info depth 1 score cp {cp} nodes 20 nps 2000 time 1 pv {best}")?;
            for rank in 1..=multipv {
                let rank_tag = if multipv > 1 {
                    format!(" multipv {rank}")
                } else {
                    String::new()
                };
                let mv = if rank == 1 {
                    best.as_str()
                } else {
                    ALT_MOVES[usize::from(rank - 2) % ALT_MOVES.len()]
                };
                let score = match (rank, mate) {
                    (1, Some(n)) => format!("mate {n}"),
                    _ => format!("cp {}", cp - 30 * i32::from(rank - 1)),
                };
                writeln!(
                    stdout,
                    "info depth {depth} seldepth {}{rank_tag} score {score} nodes 1000 \
                     nps 100000 time 5 pv {mv} {ponder}",
                    depth + 2
                )?;
            }
            if let Some(log) = &cmd_log {
                log_event(log, "bestmove");
            }
            writeln!(stdout, "bestmove {best} ponder {ponder}")?;
            stdout.flush()?;
            continue;
        }
        // Unknown commands are ignored, as the protocol demands.
    }

    Ok(())
}
