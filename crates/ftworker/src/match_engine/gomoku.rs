//! Gomoku variant (freestyle/standard/renju, 15 or 20-board) — SPEC_FULL.md
//! §4.B "gomoku engines receive the board as a sequence of `(x,y,color)`
//! stones". Grounded on `original_source/gomoku/piskpipe.py`'s
//! `BoardCommand`/`TurnCommand`: the engine about to move always sees the
//! most recently placed stone as color `2` ("opponent"), alternating
//! backward, and switches from a full `BOARD` resend to an incremental
//! `TURN` once two or more moves have been played *in the game* (the
//! opening book's stones don't count — they're always delivered first,
//! via `BOARD`).

use anyhow::{anyhow, Result};
use regex::Regex;

use super::variant::{EngineCommand, MoveApplied, Variant};
use crate::engine::piskvork;

pub struct Gomoku {
    board_size: u32,
    /// `(x, y)` in absolute board coordinates, in play order (opening
    /// book stones first, then engine moves).
    stones: Vec<(u32, u32)>,
    opening_len: usize,
}

impl Gomoku {
    /// `start_pos` is a book line's concatenated algebraic stones
    /// (`"h8i9"`), possibly empty for an empty board.
    pub fn new(start_pos: &str, board_size: u32) -> Result<Self> {
        let re = Regex::new(r"[a-z][1-9][0-9]?").expect("static regex");
        let mut stones = Vec::new();
        for m in re.find_iter(&start_pos.to_ascii_lowercase()) {
            let (x, y) = piskvork::algebraic_to_xy(m.as_str())
                .ok_or_else(|| anyhow!("malformed gomoku opening stone: {}", m.as_str()))?;
            stones.push((x, y));
        }
        let opening_len = stones.len();
        Ok(Self { board_size, stones, opening_len })
    }

    fn board_command_body(&self) -> String {
        let mut color = if self.stones.len() % 2 == 0 { 1 } else { 2 };
        let mut body = String::new();
        for (x, y) in &self.stones {
            body.push_str(&format!("{x},{y},{color}\n"));
            color = 3 - color;
        }
        body
    }
}

impl Variant for Gomoku {
    /// Gomoku always starts with side 0 ("Black" per SPEC_FULL.md §6's
    /// side-name table); pre-placed opening stones shift whose turn it is.
    fn starting_offset(&self, _pos: &str) -> u32 {
        (self.opening_len % 2) as u32
    }

    fn apply_move(&mut self, _side_to_move: u32, mv: &str) -> Result<MoveApplied> {
        let (x, y) = piskvork::algebraic_to_xy(mv).ok_or_else(|| anyhow!("malformed gomoku move: {mv}"))?;
        self.stones.push((x, y));
        Ok(MoveApplied { is_capture: false, recorded_move: mv.to_string() })
    }

    /// No repetition/material rule for gomoku; the move-count cutoff
    /// (`default_move_limit`) is the only termination rule beyond adjudication.
    fn detect_draw_by_rules(&mut self) -> Option<&'static str> {
        None
    }

    /// Grounded on `gomoku_match.py::do_play_game` (lines 96-101): the
    /// switch to incremental `TURN` is keyed on the number of **in-game**
    /// moves (`bestmoves`), not total stones — the opening is always
    /// delivered via a full `BOARD` resend first, however many stones it
    /// already carries.
    fn encode_for_engine(&self, _history: &[String]) -> EngineCommand {
        if self.stones.len() - self.opening_len < 2 {
            EngineCommand::Board(self.board_command_body())
        } else {
            let (x, y) = *self.stones.last().expect("checked len >= 2");
            EngineCommand::Turn(format!("{x},{y}"))
        }
    }

    fn default_move_limit(&self) -> u32 {
        ((self.board_size * self.board_size) as f64 * 0.85) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_opening_starts_with_side_zero() {
        let g = Gomoku::new("", 15).unwrap();
        assert_eq!(g.starting_offset(""), 0);
    }

    #[test]
    fn first_board_command_has_no_stones() {
        let g = Gomoku::new("", 15).unwrap();
        match g.encode_for_engine(&[]) {
            EngineCommand::Board(body) => assert!(body.is_empty()),
            _ => panic!("expected board command"),
        }
    }

    #[test]
    fn switches_to_turn_after_two_stones() {
        let mut g = Gomoku::new("", 15).unwrap();
        g.apply_move(0, "h8").unwrap();
        g.apply_move(1, "h9").unwrap();
        match g.encode_for_engine(&[]) {
            EngineCommand::Turn(coord) => assert_eq!(coord, "7,8"),
            _ => panic!("expected turn command"),
        }
    }

    #[test]
    fn opening_stones_parse_in_order() {
        let g = Gomoku::new("h8i9", 15).unwrap();
        assert_eq!(g.stones, vec![(7, 7), (8, 8)]);
        assert_eq!(g.starting_offset(""), 0);
    }

    #[test]
    fn non_empty_opening_is_sent_via_board_before_any_turn() {
        let g = Gomoku::new("h8i9", 15).unwrap();
        match g.encode_for_engine(&[]) {
            EngineCommand::Board(body) => {
                assert!(body.contains("7,7"));
                assert!(body.contains("8,8"));
            }
            _ => panic!("expected board command carrying the opening"),
        }
    }
}
