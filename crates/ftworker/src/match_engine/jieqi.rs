//! Jieqi variant — hidden-piece xiangqi. Grounded on
//! `original_source/jieqi/game.py`'s `JieQi` class and
//! `original_source/match/jieqi_match.py`'s `_play_one_game`.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};

use super::board_eval::BoardEvaluator;
use super::variant::{EngineCommand, MoveApplied, Variant};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    pub piece: String,
    pub visible: bool,
}

/// The JSON board-info shape produced by `book::expand_jieqi_fen`
/// (`JieQi.generate_random_board_info_from_fen` in the original), carried
/// as the GamePair's `fen` field per SPEC_FULL.md §4.C.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JieqiBoardInfo {
    pub board: Vec<Vec<Cell>>,
    pub side: String,
    #[serde(default)]
    pub moves: Vec<String>,
}

fn algebraic_to_cord(sq: &str) -> Option<(usize, usize)> {
    let mut chars = sq.chars();
    let file = chars.next()?;
    let rank: i32 = chars.as_str().parse().ok()?;
    let col = (file as u8).checked_sub(b'a')? as usize;
    let row = 9usize.checked_sub(rank as usize)?;
    Some((row, col))
}

fn piece_side(piece: &str) -> char {
    if piece.chars().next().is_some_and(|c| c.is_uppercase()) { 'w' } else { 'b' }
}

pub struct Jieqi {
    board: Vec<Vec<Cell>>,
    evaluator: Arc<dyn BoardEvaluator>,
    global_dark_pieces: HashMap<char, i32>,
    captured_pieces: [HashMap<char, i32>; 2],
    fen_record: HashMap<String, u32>,
    in_check_count: [u32; 2],
    overflow: u32,
    plies_since_capture: u32,
}

impl Jieqi {
    pub fn new(info: &JieqiBoardInfo, evaluator: Arc<dyn BoardEvaluator>) -> Self {
        let mut global_dark_pieces = HashMap::new();
        for row in &info.board {
            for cell in row {
                if !cell.visible {
                    if let Some(c) = cell.piece.chars().next() {
                        *global_dark_pieces.entry(c).or_insert(0) += 1;
                    }
                }
            }
        }
        let board = info.board.clone();
        let mut fen_record = HashMap::new();
        fen_record.insert(Self::board_to_str(&board), 1);
        let mut this = Self {
            board,
            evaluator,
            global_dark_pieces,
            captured_pieces: [HashMap::new(), HashMap::new()],
            fen_record,
            in_check_count: [0, 0],
            overflow: 0,
            plies_since_capture: 1,
        };
        for (i, mv) in info.moves.clone().into_iter().enumerate() {
            let side_to_move = (i % 2) as u32;
            let _ = this.apply_move(side_to_move, &mv);
        }
        this
    }

    /// Board-only FEN: `x`/`X` for hidden pieces (lower/upper by side),
    /// real letters for visible ones. Matches `JieQi.board_to_str`.
    fn board_to_str(board: &[Vec<Cell>]) -> String {
        let mut rows = Vec::with_capacity(board.len());
        for row in board {
            let mut s = String::new();
            let mut empty = 0;
            for cell in row {
                if cell.piece.is_empty() {
                    empty += 1;
                    continue;
                }
                if empty > 0 {
                    s.push_str(&empty.to_string());
                    empty = 0;
                }
                if cell.visible {
                    s.push_str(&cell.piece);
                } else if cell.piece.chars().next().is_some_and(|c| c.is_uppercase()) {
                    s.push('X');
                } else {
                    s.push('x');
                }
            }
            if empty > 0 {
                s.push_str(&empty.to_string());
            }
            rows.push(s);
        }
        rows.join("/")
    }

    /// FEN sent to the engines: visible pieces as-is, hidden squares masked
    /// as `x`/`X`, plus a dark-piece-count suffix for the side to move.
    /// Matches `JieQi.get_fen`.
    pub fn get_fen(&self, side: char) -> String {
        let board_str = Self::board_to_str(&self.board);
        let dark_info = self.dark_info(side);
        let mut counts: Vec<(char, i32)> = dark_info.into_iter().filter(|(_, c)| *c > 0).collect();
        counts.sort_by_key(|(p, _)| *p);
        let suffix: String = counts.iter().map(|(p, c)| format!("{p}{c}")).collect();
        format!("{board_str} {suffix} {side}")
    }

    fn dark_info(&self, side: char) -> HashMap<char, i32> {
        let mut info = self.global_dark_pieces.clone();
        let idx = if side == 'w' { 0 } else { 1 };
        for (piece, count) in &self.captured_pieces[idx] {
            *info.entry(*piece).or_insert(0) -= count;
        }
        info
    }
}

impl Variant for Jieqi {
    fn starting_offset(&self, _pos: &str) -> u32 {
        // White always moves first in jieqi (jieqi_match.py's
        // `get_offset_from_pos` always returns 0).
        0
    }

    fn apply_move(&mut self, side_to_move: u32, mv: &str) -> Result<MoveApplied> {
        if mv.len() < 4 {
            bail!("malformed jieqi move: {mv}");
        }
        let (from_sq, to_sq) = (&mv[0..2], &mv[2..4]);
        let (fr, fc) = algebraic_to_cord(from_sq).ok_or_else(|| anyhow!("bad square {from_sq}"))?;
        let (tr, tc) = algebraic_to_cord(to_sq).ok_or_else(|| anyhow!("bad square {to_sq}"))?;

        let from_cell = self.board[fr][fc].clone();
        if from_cell.piece.is_empty() {
            bail!("no piece at {from_sq}");
        }
        let target_cell = self.board[tr][tc].clone();
        let is_capture = !target_cell.piece.is_empty();
        if is_capture {
            let from_piece = from_cell.piece.chars().next().unwrap();
            let target_piece = target_cell.piece.chars().next().unwrap();
            if piece_side(&from_cell.piece) == piece_side(&target_cell.piece) {
                bail!("invalid move {mv}: same-side capture");
            }
            if !target_cell.visible {
                let idx = if piece_side(&from_cell.piece) == 'w' { 0 } else { 1 };
                *self.captured_pieces[idx].entry(target_piece).or_insert(0) += 1;
            }
        }
        if !from_cell.visible {
            *self.global_dark_pieces.entry(from_cell.piece.chars().next().unwrap()).or_insert(0) -= 1;
        }

        let revealed_from = if from_cell.visible { 'x' } else { from_cell.piece.chars().next().unwrap() };
        let revealed_target = if target_cell.visible || target_cell.piece.is_empty() {
            'x'
        } else {
            target_cell.piece.chars().next().unwrap()
        };

        self.board[tr][tc] = Cell { piece: from_cell.piece, visible: true };
        self.board[fr][fc] = Cell { piece: String::new(), visible: true };

        if is_capture {
            self.fen_record.clear();
            self.plies_since_capture = 0;
        }
        self.plies_since_capture += 1;
        let current = Self::board_to_str(&self.board);
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

        let recorded_move = format!("{mv}{revealed_from}{revealed_target}");
        Ok(MoveApplied { is_capture, recorded_move })
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

    /// The original (`jieqi_match.py`) sends a fixed opening FEN plus a
    /// move history whose reveal characters are masked per-ply
    /// (`filter_bestmoves`). This port instead resends the freshly derived
    /// `get_fen` each ply: it carries the same information (visible board +
    /// remaining hidden-piece counts) without requiring the engine to parse
    /// the reveal-augmented move suffix itself.
    fn encode_for_engine(&self, history: &[String]) -> EngineCommand {
        let side = if history.len() % 2 == 0 { 'w' } else { 'b' };
        EngineCommand::Position(crate::engine::uci::position_command(&self.get_fen(side), &[]))
    }

    fn default_move_limit(&self) -> u32 {
        400
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::match_engine::board_eval::NullBoardEvaluator;

    fn hidden(piece: &str) -> Cell {
        Cell { piece: piece.to_string(), visible: false }
    }
    fn visible(piece: &str) -> Cell {
        Cell { piece: piece.to_string(), visible: true }
    }
    fn empty() -> Cell {
        Cell { piece: String::new(), visible: true }
    }

    fn tiny_board_info() -> JieqiBoardInfo {
        // Minimal 2x2-ish board embedded in a 10-row grid; only first row used.
        let mut row0 = vec![hidden("r"), visible("k")];
        row0.extend((0..7).map(|_| empty()));
        let mut board = vec![row0];
        for _ in 0..9 {
            board.push((0..9).map(|_| empty()).collect());
        }
        JieqiBoardInfo { board, side: "w".to_string(), moves: vec![] }
    }

    #[test]
    fn make_move_reveals_hidden_piece() {
        let info = tiny_board_info();
        let mut g = Jieqi::new(&info, std::sync::Arc::new(NullBoardEvaluator));
        let applied = g.apply_move(0, "a9b9").unwrap();
        assert!(!applied.is_capture);
        assert_eq!(&applied.recorded_move[4..5], "r"); // revealed from hidden 'r'
    }

    #[test]
    fn get_fen_reports_dark_piece_counts() {
        let info = tiny_board_info();
        let g = Jieqi::new(&info, std::sync::Arc::new(NullBoardEvaluator));
        let fen = g.get_fen('w');
        assert!(fen.contains('r'));
    }
}
