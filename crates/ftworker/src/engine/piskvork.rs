//! Piskvork-like wire protocol (gomoku) — SPEC_FULL.md §4.A point 2.
//!
//! Grounded on `original_source/gomoku/piskpipe.py`'s `Engine`/`Command`
//! classes: `INFO key value`, `START n`, `BOARD`/`TURN`/`END` commands;
//! `MESSAGE`/`ERROR`/`UNKNOWN` and a bare `x,y` coordinate as replies.

pub const STOP: &str = "YXSTOP";
pub const END: &str = "END";

pub fn info(key: &str, value: &str) -> String {
    format!("INFO {key} {value}")
}

pub fn start(board_size: u32) -> String {
    format!("START {board_size}")
}

/// Full board command: `stones` is a pre-built sequence of existing moves
/// encoded the way the engine expects (`BOARD\n<x>,<y>,<color>\n...\nDONE`).
pub fn board(stones: &str) -> String {
    format!("BOARD\n{stones}DONE")
}

pub fn turn(coord: &str) -> String {
    format!("TURN {coord}")
}

/// Algebraic coordinate (`a1`) for a zero-based `(x, y)` pair, matching
/// `piskpipe.py`'s `_bestmove`: `chr(ord('a') + x) + str(1 + y)`.
pub fn coord_to_algebraic(x: u32, y: u32) -> String {
    format!("{}{}", (b'a' + x as u8) as char, y + 1)
}

/// Inverse of `coord_to_algebraic`, for translating engine-facing `x,y`
/// pairs back from the algebraic form the match engine tracks positions in.
pub fn algebraic_to_xy(s: &str) -> Option<(u32, u32)> {
    let mut chars = s.chars();
    let col = chars.next()?;
    if !col.is_ascii_lowercase() {
        return None;
    }
    let x = (col as u8 - b'a') as u32;
    let y: u32 = chars.as_str().parse().ok()?;
    Some((x, y.checked_sub(1)?))
}

#[derive(Debug, Clone, Default)]
pub struct InfoLine {
    pub eval: Option<i32>,
    pub mate: Option<i32>,
    pub depth: Option<u32>,
    pub seldepth: Option<u32>,
    pub nodes: Option<u64>,
    pub totaltime: Option<u64>,
    pub bestline: Option<Vec<String>>,
}

pub enum Incoming {
    Info(InfoLine),
    BestMove(String),
    Error(String),
    Unknown(String),
    Other,
}

/// Dispatches on the uppercase first token, matching `Engine.on_line_received`.
pub fn parse_line(line: &str) -> Incoming {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Incoming::Other;
    }
    let mut tokens = trimmed.splitn(2, ' ');
    let head = tokens.next().unwrap_or_default();
    let rest = tokens.next().unwrap_or_default();
    match head.to_ascii_uppercase().as_str() {
        "ERROR" => Incoming::Error(rest.to_string()),
        "UNKNOWN" => Incoming::Unknown(rest.to_string()),
        "INFO" => parse_info_body(rest).map(Incoming::Info).unwrap_or(Incoming::Other),
        "MESSAGE" => Incoming::Other,
        "DEBUG" => Incoming::Other,
        _ => {
            if let Some((x, y)) = parse_bare_coord(trimmed) {
                Incoming::BestMove(coord_to_algebraic(x, y))
            } else {
                Incoming::Other
            }
        }
    }
}

fn parse_bare_coord(s: &str) -> Option<(u32, u32)> {
    let (x, y) = s.split_once(',')?;
    Some((x.trim().parse().ok()?, y.trim().parse().ok()?))
}

/// Parses the `PV`/`DEPTH`/`SELDEPTH`/`NODES`/`TOTALTIME`/`EVAL`/`BESTLINE`
/// sub-keys from an `INFO` body, matching `piskpipe.py`'s `_info`.
fn parse_info_body(body: &str) -> Option<InfoLine> {
    let tokens: Vec<&str> = body.split_whitespace().collect();
    if tokens.is_empty() {
        return None;
    }
    let mut info = InfoLine::default();
    let mut seen = false;
    let mut i = 0;
    while i < tokens.len() {
        match tokens[i].to_ascii_uppercase().as_str() {
            "DEPTH" => {
                info.depth = tokens.get(i + 1).and_then(|s| s.parse().ok());
                seen = true;
                i += 2;
            }
            "SELDEPTH" => {
                info.seldepth = tokens.get(i + 1).and_then(|s| s.parse().ok());
                seen = true;
                i += 2;
            }
            "NODES" | "TOTALNODES" => {
                info.nodes = tokens.get(i + 1).and_then(|s| s.parse().ok());
                seen = true;
                i += 2;
            }
            "TOTALTIME" => {
                info.totaltime = tokens.get(i + 1).and_then(|s| s.parse().ok());
                seen = true;
                i += 2;
            }
            "EVAL" => {
                if let Some(raw) = tokens.get(i + 1) {
                    if let Some(m) = raw.strip_prefix('+').and_then(|r| r.strip_prefix('M')) {
                        info.mate = m.parse().ok();
                    } else if let Some(m) = raw.strip_prefix('-').and_then(|r| r.strip_prefix('M')) {
                        info.mate = m.parse::<i32>().ok().map(|v| -v);
                    } else {
                        info.eval = raw.parse().ok();
                    }
                }
                seen = true;
                i += 2;
            }
            "BESTLINE" | "PV" => {
                info.bestline = Some(tokens[i + 1..].iter().map(|s| s.to_string()).collect());
                seen = true;
                break;
            }
            _ => i += 1,
        }
    }
    if seen { Some(info) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_coord_becomes_bestmove() {
        match parse_line("7,7") {
            Incoming::BestMove(mv) => assert_eq!(mv, "h8"),
            _ => panic!("expected bestmove"),
        }
    }

    #[test]
    fn info_line_parses_eval_and_mate() {
        match parse_line("INFO DEPTH 12 EVAL 340 BESTLINE 7,7 7,8") {
            Incoming::Info(info) => {
                assert_eq!(info.depth, Some(12));
                assert_eq!(info.eval, Some(340));
                assert_eq!(info.bestline, Some(vec!["7,7".to_string(), "7,8".to_string()]));
            }
            _ => panic!("expected info"),
        }
        match parse_line("INFO EVAL +M3") {
            Incoming::Info(info) => assert_eq!(info.mate, Some(3)),
            _ => panic!("expected info"),
        }
    }

    #[test]
    fn message_lines_are_opaque() {
        assert!(matches!(parse_line("MESSAGE just some log text"), Incoming::Other));
    }

    #[test]
    fn error_and_unknown_are_reported() {
        assert!(matches!(parse_line("ERROR bad move"), Incoming::Error(_)));
        assert!(matches!(parse_line("UNKNOWN huh"), Incoming::Unknown(_)));
    }

    #[test]
    fn coord_roundtrip() {
        assert_eq!(coord_to_algebraic(0, 0), "a1");
        assert_eq!(algebraic_to_xy("a1"), Some((0, 0)));
        assert_eq!(algebraic_to_xy("h8"), Some((7, 7)));
    }
}
