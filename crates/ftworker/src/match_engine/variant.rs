//! The small per-variant capability set named in SPEC_FULL.md §9:
//! `{starting_offset, apply_move, detect_draw_by_rules, encode_moves_for_engine}`.
//! A tagged set of variant implementations, not a class hierarchy.

use anyhow::Result;

/// What wire command the match loop should issue for this ply.
pub enum EngineCommand {
    /// UCI-like `position fen ... moves ...` (chess/xiangqi/jieqi).
    Position(String),
    /// Piskvork full board resend (first two plies, gomoku).
    Board(String),
    /// Piskvork incremental move (gomoku, from the third ply on).
    Turn(String),
}

/// Result of applying one move to the variant's internal board.
pub struct MoveApplied {
    pub is_capture: bool,
    /// The move string as it should be recorded/sent onward (jieqi appends
    /// a reveal/capture augmentation; other variants echo the input).
    pub recorded_move: String,
}

pub trait Variant {
    /// 0 if the position's side to move is the first mover ("white" in the
    /// loop-invariant sense of §4.B), 1 otherwise.
    fn starting_offset(&self, pos: &str) -> u32;

    /// `side_to_move`: 0 if the mover is the first-mover ("white" in the
    /// §4.B loop-invariant sense), 1 otherwise.
    fn apply_move(&mut self, side_to_move: u32, mv: &str) -> Result<MoveApplied>;

    /// Variant-specific draw rule (§4.B point 4); `None` if no rule fires.
    fn detect_draw_by_rules(&mut self) -> Option<&'static str>;

    /// Builds the next engine-facing command from the move history so far.
    fn encode_for_engine(&self, history: &[String]) -> EngineCommand;

    /// Default move-count cutoff (§4.B point 6) unless the task overrides it.
    fn default_move_limit(&self) -> u32;
}
