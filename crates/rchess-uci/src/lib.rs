//! UCI protocol line interpreter.
//!
//! Pure classification of engine output lines: one trimmed line in, one
//! tagged [`Fragment`] out. No process handling, no session state — state
//! accumulation across fragments belongs to the engine session layer.

/// Sentinel centipawn value standing in for a forced mate.
///
/// A `score mate N` line maps to `+MATE_SCORE` (mating) or `-MATE_SCORE`
/// (getting mated) so that threshold/comparison logic can treat forced
/// mates as maximal advantage without special-casing the mate field.
pub const MATE_SCORE: i32 = 10_000;

/// Engine evaluation as reported on an `info score` token pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Score {
    /// Centipawns from the side to move.
    Cp(i32),
    /// Moves to mate; positive means the side to move mates.
    Mate(i32),
}

impl Score {
    /// Collapse to a linear centipawn value, mapping mates to the
    /// [`MATE_SCORE`] sentinel.
    pub fn to_centipawns(self) -> i32 {
        match self {
            Score::Cp(v) => v,
            Score::Mate(n) if n > 0 => MATE_SCORE,
            Score::Mate(_) => -MATE_SCORE,
        }
    }

    /// Moves-to-mate if this is a mate score.
    pub fn mate(self) -> Option<i32> {
        match self {
            Score::Cp(_) => None,
            Score::Mate(n) => Some(n),
        }
    }
}

/// Parsed fields of one `info` line. Absent tokens stay `None`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InfoFields {
    pub depth: Option<u32>,
    pub seldepth: Option<u32>,
    /// MultiPV rank (1-based). Engines omit it for single-line searches.
    pub multipv: Option<u8>,
    pub nodes: Option<u64>,
    pub nps: Option<u64>,
    pub time_ms: Option<u64>,
    pub score: Option<Score>,
    /// Principal variation, raw engine tokens. Not validated for legality.
    pub pv: Vec<String>,
}

/// Engine identity reported via `id` lines during the handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdFields {
    Name(String),
    Author(String),
}

/// One classified line of engine output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fragment {
    /// `uciok` — handshake complete.
    UciOk,
    /// `readyok` — engine synchronized.
    ReadyOk,
    /// `id name …` / `id author …`.
    Id(IdFields),
    /// `info …` search progress.
    Info(InfoFields),
    /// `bestmove <move> [ponder <move>]` — search finished.
    BestMove {
        best: String,
        ponder: Option<String>,
    },
    /// Anything else (option lists, engine chatter). Unknown output is
    /// normal in UCI and must not be an error.
    Unrecognized,
}

/// Classify one trimmed line of engine output.
pub fn parse_line(line: &str) -> Fragment {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    match tokens.first() {
        Some(&"uciok") => Fragment::UciOk,
        Some(&"readyok") => Fragment::ReadyOk,
        Some(&"id") => parse_id(&tokens[1..]),
        Some(&"info") => Fragment::Info(parse_info(&tokens[1..])),
        Some(&"bestmove") => parse_bestmove(&tokens[1..]),
        _ => Fragment::Unrecognized,
    }
}

fn parse_id(tokens: &[&str]) -> Fragment {
    match tokens.first() {
        Some(&"name") if tokens.len() > 1 => {
            Fragment::Id(IdFields::Name(tokens[1..].join(" ")))
        }
        Some(&"author") if tokens.len() > 1 => {
            Fragment::Id(IdFields::Author(tokens[1..].join(" ")))
        }
        _ => Fragment::Unrecognized,
    }
}

fn parse_bestmove(tokens: &[&str]) -> Fragment {
    let Some(best) = tokens.first() else {
        return Fragment::Unrecognized;
    };
    let ponder = match (tokens.get(1), tokens.get(2)) {
        (Some(&"ponder"), Some(mv)) => Some((*mv).to_string()),
        _ => None,
    };
    Fragment::BestMove {
        best: (*best).to_string(),
        ponder,
    }
}

fn parse_info(tokens: &[&str]) -> InfoFields {
    let mut info = InfoFields::default();
    let mut i = 0;
    while i < tokens.len() {
        match tokens[i] {
            "depth" => {
                if i + 1 < tokens.len() {
                    info.depth = tokens[i + 1].parse().ok();
                    i += 2;
                } else {
                    break;
                }
            }
            "seldepth" => {
                if i + 1 < tokens.len() {
                    info.seldepth = tokens[i + 1].parse().ok();
                    i += 2;
                } else {
                    break;
                }
            }
            "multipv" => {
                if i + 1 < tokens.len() {
                    info.multipv = tokens[i + 1].parse().ok();
                    i += 2;
                } else {
                    break;
                }
            }
            "nodes" => {
                if i + 1 < tokens.len() {
                    info.nodes = tokens[i + 1].parse().ok();
                    i += 2;
                } else {
                    break;
                }
            }
            "nps" => {
                if i + 1 < tokens.len() {
                    info.nps = tokens[i + 1].parse().ok();
                    i += 2;
                } else {
                    break;
                }
            }
            "time" => {
                if i + 1 < tokens.len() {
                    info.time_ms = tokens[i + 1].parse().ok();
                    i += 2;
                } else {
                    break;
                }
            }
            "score" => {
                if i + 2 < tokens.len() {
                    match tokens[i + 1] {
                        "cp" => {
                            if let Ok(v) = tokens[i + 2].parse::<i32>() {
                                info.score = Some(Score::Cp(v));
                            }
                        }
                        "mate" => {
                            if let Ok(v) = tokens[i + 2].parse::<i32>() {
                                info.score = Some(Score::Mate(v));
                            }
                        }
                        _ => {}
                    }
                    i += 3;
                } else {
                    break;
                }
            }
            "pv" => {
                // The pv token consumes everything to the end of the line,
                // including move strings that happen to look like keywords.
                info.pv.extend(tokens[i + 1..].iter().map(|s| s.to_string()));
                break;
            }
            _ => {
                i += 1;
            }
        }
    }
    info
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_lines() {
        assert_eq!(parse_line("uciok"), Fragment::UciOk);
        assert_eq!(parse_line("readyok"), Fragment::ReadyOk);
    }

    #[test]
    fn id_lines() {
        assert_eq!(
            parse_line("id name Stockfish 16.1"),
            Fragment::Id(IdFields::Name("Stockfish 16.1".to_string()))
        );
        assert_eq!(
            parse_line("id author the Stockfish developers"),
            Fragment::Id(IdFields::Author("the Stockfish developers".to_string()))
        );
        assert_eq!(parse_line("id"), Fragment::Unrecognized);
    }

    #[test]
    fn bestmove_with_and_without_ponder() {
        assert_eq!(
            parse_line("bestmove e2e4 ponder e7e5"),
            Fragment::BestMove {
                best: "e2e4".to_string(),
                ponder: Some("e7e5".to_string()),
            }
        );
        assert_eq!(
            parse_line("bestmove g1f3"),
            Fragment::BestMove {
                best: "g1f3".to_string(),
                ponder: None,
            }
        );
    }

    #[test]
    fn info_full_line() {
        let Fragment::Info(info) = parse_line(
            "info depth 20 seldepth 28 multipv 1 score cp 35 nodes 1500000 \
             nps 1200000 time 1250 pv e2e4 e7e5 g1f3",
        ) else {
            panic!("expected info fragment");
        };
        assert_eq!(info.depth, Some(20));
        assert_eq!(info.seldepth, Some(28));
        assert_eq!(info.multipv, Some(1));
        assert_eq!(info.score, Some(Score::Cp(35)));
        assert_eq!(info.nodes, Some(1_500_000));
        assert_eq!(info.nps, Some(1_200_000));
        assert_eq!(info.time_ms, Some(1250));
        assert_eq!(info.pv, vec!["e2e4", "e7e5", "g1f3"]);
    }

    #[test]
    fn pv_consumes_keyword_looking_tokens() {
        // Once pv starts, nothing terminates it before end of line.
        let Fragment::Info(info) = parse_line("info depth 5 pv e2e4 depth d7d5") else {
            panic!("expected info fragment");
        };
        assert_eq!(info.depth, Some(5));
        assert_eq!(info.pv, vec!["e2e4", "depth", "d7d5"]);
    }

    #[test]
    fn mate_score_maps_to_sentinel() {
        let Fragment::Info(info) = parse_line("info depth 12 score mate 3 pv d8h4") else {
            panic!("expected info fragment");
        };
        assert_eq!(info.score, Some(Score::Mate(3)));
        assert_eq!(info.score.unwrap().to_centipawns(), MATE_SCORE);
        assert_eq!(Score::Mate(-2).to_centipawns(), -MATE_SCORE);
        assert_eq!(Score::Mate(-2).mate(), Some(-2));
        assert_eq!(Score::Cp(40).mate(), None);
    }

    #[test]
    fn unknown_chatter_is_unrecognized() {
        assert_eq!(
            parse_line("option name Hash type spin default 16 min 1 max 1024"),
            Fragment::Unrecognized
        );
        assert_eq!(parse_line(""), Fragment::Unrecognized);
        assert_eq!(parse_line("Stockfish 16 by the developers"), Fragment::Unrecognized);
    }

    #[test]
    fn truncated_info_tokens_do_not_panic() {
        let Fragment::Info(info) = parse_line("info depth") else {
            panic!("expected info fragment");
        };
        assert_eq!(info.depth, None);
        let Fragment::Info(info) = parse_line("info score cp") else {
            panic!("expected info fragment");
        };
        assert_eq!(info.score, None);
    }
}
