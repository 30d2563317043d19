//! UCI-like wire protocol (chess/xiangqi/jieqi) — SPEC_FULL.md §4.A point 1.
//!
//! Command formatting generalizes USI-style handshake/search plumbing from
//! `usi`/`sfen`/`usinewgame` to the classical `uci`/`fen`/`ucinewgame`
//! vocabulary.

pub const HANDSHAKE: &str = "uci";
pub const HANDSHAKE_OK: &str = "uciok";
pub const IS_READY: &str = "isready";
pub const READY_OK: &str = "readyok";
pub const NEW_GAME: &str = "ucinewgame";
pub const STOP: &str = "stop";
pub const QUIT: &str = "quit";

pub fn set_option(name: &str, value: &str) -> String {
    format!("setoption name {name} value {value}")
}

/// Time control/search limits for a single `go` command.
#[derive(Debug, Clone, Default)]
pub struct GoLimits {
    pub wtime: Option<i64>,
    pub btime: Option<i64>,
    pub winc: Option<i64>,
    pub binc: Option<i64>,
    pub movetime: Option<i64>,
    pub depth: Option<u32>,
    pub nodes: Option<u64>,
}

pub fn go_command(limits: &GoLimits) -> String {
    let mut parts = vec!["go".to_string()];
    if let Some(v) = limits.movetime {
        parts.push(format!("movetime {v}"));
    } else {
        if let Some(v) = limits.wtime {
            parts.push(format!("wtime {v}"));
        }
        if let Some(v) = limits.btime {
            parts.push(format!("btime {v}"));
        }
        if let Some(v) = limits.winc {
            parts.push(format!("winc {v}"));
        }
        if let Some(v) = limits.binc {
            parts.push(format!("binc {v}"));
        }
    }
    if let Some(v) = limits.depth {
        parts.push(format!("depth {v}"));
    }
    if let Some(v) = limits.nodes {
        parts.push(format!("nodes {v}"));
    }
    parts.join(" ")
}

pub fn position_command(fen_or_startpos: &str, moves: &[String]) -> String {
    let mut cmd = if fen_or_startpos == "startpos" {
        "position startpos".to_string()
    } else {
        format!("position fen {fen_or_startpos}")
    };
    if !moves.is_empty() {
        cmd.push_str(" moves ");
        cmd.push_str(&moves.join(" "));
    }
    cmd
}

/// One parsed `info ...` line (subset relevant to §4.A's `go()` return shape).
#[derive(Debug, Clone, Default)]
pub struct InfoLine {
    pub score_cp: Option<i32>,
    pub mate: Option<i32>,
    pub pv: Vec<String>,
    pub depth: Option<u32>,
    pub seldepth: Option<u32>,
    pub nodes: Option<u64>,
    pub nps: Option<u64>,
    pub hashfull: Option<u32>,
    pub time_ms: Option<u64>,
}

pub fn parse_info(line: &str) -> Option<InfoLine> {
    let rest = line.strip_prefix("info ")?;
    let tokens: Vec<&str> = rest.split_whitespace().collect();
    let mut info = InfoLine::default();
    let mut i = 0;
    while i < tokens.len() {
        match tokens[i] {
            "depth" => {
                info.depth = tokens.get(i + 1).and_then(|s| s.parse().ok());
                i += 2;
            }
            "seldepth" => {
                info.seldepth = tokens.get(i + 1).and_then(|s| s.parse().ok());
                i += 2;
            }
            "nodes" => {
                info.nodes = tokens.get(i + 1).and_then(|s| s.parse().ok());
                i += 2;
            }
            "nps" => {
                info.nps = tokens.get(i + 1).and_then(|s| s.parse().ok());
                i += 2;
            }
            "hashfull" => {
                info.hashfull = tokens.get(i + 1).and_then(|s| s.parse().ok());
                i += 2;
            }
            "time" => {
                info.time_ms = tokens.get(i + 1).and_then(|s| s.parse().ok());
                i += 2;
            }
            "score" => {
                if tokens.get(i + 1) == Some(&"cp") {
                    info.score_cp = tokens.get(i + 2).and_then(|s| s.parse().ok());
                    i += 3;
                } else if tokens.get(i + 1) == Some(&"mate") {
                    info.mate = tokens.get(i + 2).and_then(|s| s.parse().ok());
                    i += 3;
                } else {
                    i += 1;
                }
            }
            "pv" => {
                info.pv = tokens[i + 1..].iter().map(|s| s.to_string()).collect();
                break;
            }
            _ => i += 1,
        }
    }
    Some(info)
}

pub fn parse_bestmove(line: &str) -> Option<String> {
    let rest = line.strip_prefix("bestmove ")?;
    rest.split_whitespace().next().map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_score_and_mate() {
        let info = parse_info("info depth 10 seldepth 14 score cp 35 nodes 1000 nps 50000 time 20 pv e2e4 e7e5").unwrap();
        assert_eq!(info.depth, Some(10));
        assert_eq!(info.score_cp, Some(35));
        assert_eq!(info.mate, None);
        assert_eq!(info.pv, vec!["e2e4", "e7e5"]);

        let mate = parse_info("info score mate -1").unwrap();
        assert_eq!(mate.mate, Some(-1));
        assert_eq!(mate.score_cp, None);
    }

    #[test]
    fn parses_bestmove() {
        assert_eq!(parse_bestmove("bestmove e2e4 ponder e7e5").as_deref(), Some("e2e4"));
        assert_eq!(parse_bestmove("info string hi"), None);
    }

    #[test]
    fn builds_position_and_go_commands() {
        assert_eq!(position_command("startpos", &[]), "position startpos");
        assert_eq!(
            position_command("8/8/8/8/8/8/8/8 w - - 0 1", &["e2e4".to_string()]),
            "position fen 8/8/8/8/8/8/8/8 w - - 0 1 moves e2e4"
        );
        let limits = GoLimits { wtime: Some(1000), btime: Some(2000), ..Default::default() };
        assert_eq!(go_command(&limits), "go wtime 1000 btime 2000");
    }
}
