//! Xiangqi variant — SPEC_FULL.md §4.B point 4 (repetition, check-exempted
//! 60-move rule). Grounded on `original_source/match/xiangqi_match.py`'s
//! `fen_to_board`/`board_to_fen`/`make_move`, `fen_record` repetition
//! tracking, and the `in_check_count` overflow-forgiveness formula.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Result};

use super::board_eval::BoardEvaluator;
use super::variant::{EngineCommand, MoveApplied, Variant};

/// 10 rows x 9 cols, `None` = empty, `Some(c)` = piece letter (uppercase = red).
pub type Board = Vec<Vec<Option<char>>>;

pub fn fen_to_board(fen: &str) -> Board {
    let placement = fen.split_whitespace().next().unwrap_or_default();
    placement
        .split('/')
        .map(|row| {
            let mut cells = Vec::new();
            for c in row.chars() {
                if let Some(n) = c.to_digit(10) {
                    for _ in 0..n {
                        cells.push(None);
                    }
                } else {
                    cells.push(Some(c));
                }
            }
            cells
        })
        .collect()
}

pub fn board_to_fen(board: &Board) -> String {
    let mut rows = Vec::with_capacity(board.len());
    for row in board {
        let mut s = String::new();
        let mut empty = 0;
        for cell in row {
            match cell {
                None => empty += 1,
                Some(c) => {
                    if empty > 0 {
                        s.push_str(&empty.to_string());
                        empty = 0;
                    }
                    s.push(*c);
                }
            }
        }
        if empty > 0 {
            s.push_str(&empty.to_string());
        }
        rows.push(s);
    }
    rows.join("/")
}

/// `pgn_to_cord`: algebraic square (`e3`) to `(row, col)`, row 0 = rank 9.
pub fn algebraic_to_cord(sq: &str) -> Option<(usize, usize)> {
    let mut chars = sq.chars();
    let file = chars.next()?;
    let rank: i32 = chars.as_str().parse().ok()?;
    let col = (file as u8).checked_sub(b'a')? as usize;
    let row = 9usize.checked_sub(rank as usize)?;
    Some((row, col))
}

pub struct Xiangqi {
    board: Board,
    opening_fen: String,
    evaluator: Arc<dyn BoardEvaluator>,
    fen_record: HashMap<String, u32>,
    in_check_count: [u32; 2], // [white/red, black]
    overflow: u32,
    plies_since_capture: u32,
}

impl Xiangqi {
    pub fn new(start_fen: &str, evaluator: Arc<dyn BoardEvaluator>) -> Self {
        let board = fen_to_board(start_fen);
        let mut fen_record = HashMap::new();
        fen_record.insert(board_to_fen(&board), 1);
        Self {
            board,
            opening_fen: start_fen.to_string(),
            evaluator,
            fen_record,
            in_check_count: [0, 0],
            overflow: 0,
            plies_since_capture: 1,
        }
    }

    pub fn fen(&self) -> String {
        board_to_fen(&self.board)
    }
}

impl Variant for Xiangqi {
    fn starting_offset(&self, pos: &str) -> u32 {
        if pos != "startpos" && pos.contains(" b") {
            1
        } else {
            0
        }
    }

    fn apply_move(&mut self, side_to_move: u32, mv: &str) -> Result<MoveApplied> {
        if mv.len() < 4 {
            bail!("malformed xiangqi move: {mv}");
        }
        let (from, to) = mv.split_at(2);
        let to = &to[..2];
        let (fr, fc) = algebraic_to_cord(from).ok_or_else(|| anyhow::anyhow!("bad square {from}"))?;
        let (tr, tc) = algebraic_to_cord(to).ok_or_else(|| anyhow::anyhow!("bad square {to}"))?;
        let piece = self.board[fr][fc].take();
        let captured = self.board[tr][tc].take();
        self.board[tr][tc] = piece;

        let is_capture = captured.is_some();
        if is_capture {
            self.fen_record.clear();
            self.plies_since_capture = 0;
        }
        self.plies_since_capture += 1;
        let current = board_to_fen(&self.board);
        *self.fen_record.entry(current.clone()).or_insert(0) += 1;

        let side_index = side_to_move as usize;
        let side_char = if side_index == 0 { 'w' } else { 'b' };
        if self.evaluator.is_in_check(&current, side_char) {
            self.in_check_count[side_index] += 1;
            if self.in_check_count[side_index] > 10 {
                self.overflow += self.in_check_count[side_index] - 10;
                self.in_check_count[side_index] = 10;
            }
        }

        Ok(MoveApplied { is_capture, recorded_move: mv.to_string() })
    }

    fn detect_draw_by_rules(&mut self) -> Option<&'static str> {
        if self.fen_record.values().any(|&count| count >= 3) {
            return Some("Draw by repetition");
        }
        let forgiveness = 2 * self.overflow;
        if self.plies_since_capture.saturating_sub(forgiveness) >= 120 {
            return Some("Draw by 60-move rule");
        }
        None
    }

    /// Grounded on `xiangqi_match.py::do_play_game`: always the fixed
    /// opening FEN plus the full move history, not a re-derived current FEN.
    fn encode_for_engine(&self, history: &[String]) -> EngineCommand {
        EngineCommand::Position(crate::engine::uci::position_command(&self.opening_fen, history))
    }

    fn default_move_limit(&self) -> u32 {
        400
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HIRATE: &str =
        "rnbakabnr/9/1c5c1/p1p1p1p1p/9/9/P1P1P1P1P/1C5C1/9/RNBAKABNR w - - 0 1";

    #[test]
    fn fen_board_roundtrip() {
        let board = fen_to_board(HIRATE);
        assert_eq!(board_to_fen(&board), HIRATE.split_whitespace().next().unwrap());
    }

    #[test]
    fn algebraic_to_cord_matches_row_convention() {
        assert_eq!(algebraic_to_cord("a0"), Some((9, 0)));
        assert_eq!(algebraic_to_cord("a9"), Some((0, 0)));
    }

    #[test]
    fn repetition_draws_after_three_occurrences() {
        let mut x = Xiangqi::new(HIRATE, Arc::new(super::super::board_eval::NullBoardEvaluator));
        // Shuffle a horse back and forth without capturing.
        for _ in 0..2 {
            x.apply_move(0, "b9c7").unwrap();
            x.apply_move(1, "b0c2").unwrap();
            x.apply_move(0, "c7b9").unwrap();
            x.apply_move(1, "c2b0").unwrap();
        }
        assert_eq!(x.detect_draw_by_rules(), Some("Draw by repetition"));
    }
}
