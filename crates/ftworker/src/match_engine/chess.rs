//! Chess variant — SPEC_FULL.md §4.B point 4: "fifty-move claim, threefold
//! repetition, insufficient material → draw." Grounded on
//! `original_source/match/chess_match.py`, which delegates exactly these
//! three checks to `python-chess`. The Rust equivalent delegates to
//! `shakmaty` (the chess rules/position crate used for the same purpose by
//! the `Pawn-Appetit-pawn-appetit` example repo) instead of hand-rolling
//! chess rules — see DESIGN.md for why this is a new workspace dependency.

use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use shakmaty::fen::Fen;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, EnPassantMode, Position};

use super::variant::{EngineCommand, MoveApplied, Variant};

pub struct ChessVariant {
    pos: Chess,
    opening_fen: String,
    repetition: HashMap<String, u32>,
}

impl ChessVariant {
    pub fn new(start_fen: &str) -> Result<Self> {
        let pos: Chess = if start_fen == "startpos" {
            Chess::default()
        } else {
            let setup: Fen = start_fen.parse().context("invalid chess FEN")?;
            setup
                .into_position(CastlingMode::Standard)
                .map_err(|e| anyhow!("illegal starting chess position: {e:?}"))?
        };
        let mut repetition = HashMap::new();
        repetition.insert(board_key(&pos), 1);
        let opening_fen = if start_fen == "startpos" {
            "startpos".to_string()
        } else {
            Fen::from_position(pos.clone(), EnPassantMode::Legal).to_string()
        };
        Ok(Self { pos, opening_fen, repetition })
    }

    pub fn fen(&self) -> String {
        Fen::from_position(self.pos.clone(), EnPassantMode::Legal).to_string()
    }
}

fn board_key(pos: &Chess) -> String {
    // Board + side + castling + en passant, excluding move counters, so
    // transpositions that differ only by clocks still count as repeats.
    let fen = Fen::from_position(pos.clone(), EnPassantMode::Legal).to_string();
    fen.rsplit_once(' ').map(|(head, _)| head.to_string()).unwrap_or(fen)
}

impl Variant for ChessVariant {
    fn starting_offset(&self, pos: &str) -> u32 {
        let parts: Vec<&str> = pos.split_whitespace().collect();
        if parts.len() > 1 && parts[1] == "b" { 1 } else { 0 }
    }

    fn apply_move(&mut self, _side_to_move: u32, mv: &str) -> Result<MoveApplied> {
        let uci: UciMove = mv.parse().map_err(|_| anyhow!("malformed UCI move: {mv}"))?;
        let legal = uci.to_move(&self.pos).map_err(|e| anyhow!("illegal move {mv}: {e:?}"))?;
        let is_capture = self.pos.board().piece_at(legal.to()).is_some() || legal.is_en_passant();
        self.pos.play_unchecked(&legal);
        *self.repetition.entry(board_key(&self.pos)).or_insert(0) += 1;
        Ok(MoveApplied { is_capture, recorded_move: mv.to_string() })
    }

    fn detect_draw_by_rules(&mut self) -> Option<&'static str> {
        if self.pos.is_insufficient_material() {
            return Some("Draw by insufficient material");
        }
        if self.pos.halfmoves() >= 100 {
            return Some("Draw by fifty-move rule");
        }
        if self.repetition.values().any(|&count| count >= 3) {
            return Some("Draw by repetition");
        }
        None
    }

    /// Grounded on `chess_match.py::do_play_game`: the wire position is the
    /// fixed opening FEN plus the full move history, never a re-derived
    /// current-position FEN (so `history` must accumulate every engine move).
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

    #[test]
    fn starting_offset_reads_side_to_move() {
        let v = ChessVariant::new("startpos").unwrap();
        assert_eq!(v.starting_offset("startpos"), 0);
        assert_eq!(
            v.starting_offset("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR b KQkq - 0 1"),
            1
        );
    }

    #[test]
    fn applies_opening_move() {
        let mut v = ChessVariant::new("startpos").unwrap();
        let applied = v.apply_move(0, "e2e4").unwrap();
        assert!(!applied.is_capture);
        assert!(v.fen().starts_with("rnbqkbnr/pppppppp/8/8/4P3"));
    }
}
