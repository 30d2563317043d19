//! Data model shared by every component: `Task`, `GamePair`, `GameSlot`,
//! `GameRecord`, and the per-task upload batch.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Game variant identifiers (see SPEC_FULL.md §6 "Variant identifiers").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    Xiangqi,
    Jieqi,
    Chess,
    GomokuFreestyle20,
    GomokuFreestyle15,
    GomokuStandard15,
    GomokuRenju15,
}

impl Variant {
    pub fn default_book(self) -> &'static str {
        match self {
            Variant::Xiangqi => "3mvs_140-200_150560",
            Variant::Jieqi => "1mvs",
            Variant::Chess => "UHO_XXL_+0.90_+1.19",
            Variant::GomokuFreestyle20 => "f20-100M-40k",
            Variant::GomokuFreestyle15 => "f15-base-8k",
            Variant::GomokuStandard15 => "s15-100M-40k",
            Variant::GomokuRenju15 => "r15-100M-40k",
        }
    }

    pub fn is_gomoku(self) -> bool {
        matches!(
            self,
            Variant::GomokuFreestyle20
                | Variant::GomokuFreestyle15
                | Variant::GomokuStandard15
                | Variant::GomokuRenju15
        )
    }

    /// Board area used by the default move-count cutoff (§4.B point 6).
    pub fn board_area(self) -> u32 {
        match self {
            Variant::GomokuFreestyle20 => 20 * 20,
            Variant::GomokuFreestyle15 | Variant::GomokuStandard15 | Variant::GomokuRenju15 => 15 * 15,
            Variant::Xiangqi | Variant::Jieqi | Variant::Chess => 0,
        }
    }

    /// Board side length (for gomoku variants) used to construct the
    /// match-engine `Gomoku` stone tracker.
    pub fn board_size(self) -> u32 {
        match self {
            Variant::GomokuFreestyle20 => 20,
            _ => 15,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Normal,
    Spsa,
}

/// Coordinator-issued unit of work (SPEC_FULL.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    pub variant: Variant,

    pub engine_url: String,
    pub weight_url: Option<String>,
    pub baseline_engine_url: String,
    pub baseline_weight_url: Option<String>,

    /// `(game_time_s, inc_time_s, depth)`
    pub time_control: (f64, f64, u32),
    #[serde(default)]
    pub nodes: Option<u64>,
    #[serde(default)]
    pub move_time: Option<u32>,
    #[serde(default)]
    pub nodestime: Option<u32>,

    #[serde(default)]
    pub uci_options: HashMap<String, String>,
    #[serde(default)]
    pub baseline_uci_options: HashMap<String, String>,

    #[serde(default)]
    pub draw_move_limit: Option<u32>,
    #[serde(default)]
    pub draw_score_limit: Option<i32>,
    #[serde(default)]
    pub win_move_limit: Option<u32>,
    #[serde(default)]
    pub win_score_limit: Option<i32>,
    #[serde(default)]
    pub draw_as_black_win: bool,
    #[serde(default)]
    pub mate1_judge: bool,

    #[serde(default)]
    pub book: Option<String>,

    /// SPSA-only; number of games to schedule for this iteration.
    #[serde(default)]
    pub num_games: Option<u32>,
    #[serde(default)]
    pub iter: Option<u64>,
}

impl Task {
    pub fn is_spsa(&self) -> bool {
        self.kind == TaskKind::Spsa
    }
}

/// Unit enqueued in the worker queue: one opening, one color assignment.
/// Keyed by `(task_id, fen, order)`.
#[derive(Debug, Clone)]
pub struct GamePair {
    pub task_id: String,
    pub fen: String,
    /// 0: engine-under-test moves first; 1: baseline moves first.
    pub order: u8,
    pub error_count: u32,
}

/// Outcome of one finished game, from the engine-under-test's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Draw,
    Lose,
}

impl Outcome {
    pub fn flip(self) -> Outcome {
        match self {
            Outcome::Win => Outcome::Lose,
            Outcome::Lose => Outcome::Win,
            Outcome::Draw => Outcome::Draw,
        }
    }
}

/// One ply of a finished game, used for the structured `GameRecord`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveEntry {
    pub mv: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_cp: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mate: Option<i32>,
    pub engine_time_ms: u64,
    pub wall_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seldepth: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nps: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hashfull: Option<u32>,
}

/// A complete, JSON-serializable game record (SPEC_FULL.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameRecord {
    pub start_fen: String,
    pub order: u8,
    pub moves: Vec<MoveEntry>,
    /// +1/-1/0/+-2 (timeout), from the engine-under-test's perspective.
    pub result: i32,
    pub comment: String,
}

/// Result cell for one `(task_id, fen)` pair: two slots, one per order.
#[derive(Debug, Clone, Default)]
pub struct GameSlot {
    pub entries: [Option<(Outcome, GameRecord)>; 2],
}

impl GameSlot {
    pub fn is_complete(&self) -> bool {
        self.entries[0].is_some() && self.entries[1].is_some()
    }
}

/// Running per-task totals accumulated by the Result Aggregator.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskResult {
    pub wdl: [u32; 3],
    pub fwdl: [u32; 3],
    pub ptnml: [u32; 5],
    pub game_records: Vec<GameRecord>,
}

/// Pentanomial bucket from the §4.E mapping table: `score(outcome) + score(outcome)`
/// with win=2, draw=1, lose=0.
pub fn pentanomial_index(r0: Outcome, r1: Outcome) -> usize {
    fn score(o: Outcome) -> usize {
        match o {
            Outcome::Lose => 0,
            Outcome::Draw => 1,
            Outcome::Win => 2,
        }
    }
    score(r0) + score(r1)
}

/// WDL index (0=win, 1=draw, 2=lose), matching the `wdl`/`fwdl` array layout.
pub fn wdl_index(o: Outcome) -> usize {
    match o {
        Outcome::Win => 0,
        Outcome::Draw => 1,
        Outcome::Lose => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pentanomial_table_matches_spec() {
        // | r0/r1 | lose | draw | win |
        // | lose  |  0   |  1   |  2  |
        // | draw  |  1   |  2   |  3  |
        // | win   |  2   |  3   |  4  |
        assert_eq!(pentanomial_index(Outcome::Lose, Outcome::Lose), 0);
        assert_eq!(pentanomial_index(Outcome::Lose, Outcome::Draw), 1);
        assert_eq!(pentanomial_index(Outcome::Draw, Outcome::Lose), 1);
        assert_eq!(pentanomial_index(Outcome::Win, Outcome::Win), 4);
        assert_eq!(pentanomial_index(Outcome::Draw, Outcome::Win), 3);
        assert_eq!(pentanomial_index(Outcome::Win, Outcome::Lose), 2);
    }

    #[test]
    fn outcome_flip_is_involutive() {
        for o in [Outcome::Win, Outcome::Draw, Outcome::Lose] {
            assert_eq!(o.flip().flip(), o);
        }
        assert_eq!(Outcome::Win.flip(), Outcome::Lose);
        assert_eq!(Outcome::Draw.flip(), Outcome::Draw);
    }
}
