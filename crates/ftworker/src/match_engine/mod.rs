//! Match Engine (SPEC_FULL.md §4.B): drives one game between two
//! `EngineDriver`s to completion under a single `Variant`'s rules.
//!
//! Generalized from `original_source/match/base_match.py::_play_one_game`
//! and its per-variant overrides (`chess_match.py`, `xiangqi_match.py`,
//! `jieqi_match.py`; gomoku uses the base loop unchanged). The adjudication
//! order — mate, then score thresholds, then variant draw rules, then
//! clocks, then move-count cutoff — is preserved exactly; only the board
//! bookkeeping and wire encoding are pushed behind the `Variant` trait.

pub mod board_eval;
pub mod chess;
pub mod gomoku;
pub mod jieqi;
pub mod variant;
pub mod xiangqi;

use std::time::Duration;

use anyhow::Result;

use crate::engine::driver::{EngineDriver, EngineReply};
use crate::engine::uci::GoLimits;
use crate::task::{GameRecord, MoveEntry, Outcome};
use variant::{EngineCommand, Variant};

const TOLERANCE_MS: i64 = 5000;
const NO_CLOCK_DEADLINE: Duration = Duration::from_secs(3600);

/// Time control and adjudication parameters for one game, assembled from a
/// `Task` (SPEC_FULL.md §4.B points 3 and 6).
#[derive(Debug, Clone)]
pub struct MatchConfig {
    pub game_time_ms: i64,
    pub inc_ms: i64,
    pub depth: Option<u32>,
    pub nodes: Option<u64>,
    pub movetime_ms: Option<i64>,
    pub nodestime: Option<i64>,
    pub draw_move_limit: i32,
    pub draw_score_limit: i32,
    pub win_move_limit: i32,
    pub win_score_limit: i32,
    pub draw_as_black_win: bool,
    pub mate1_judge: bool,
}

struct Clock {
    white_ms: Option<i64>,
    black_ms: Option<i64>,
}

/// Plays one game from `opening_pos` between `engine_under_test` and
/// `baseline`. `order` is `GamePair::order`: 0 if the engine under test
/// moves first, 1 if the baseline does. Returns the outcome from the
/// engine-under-test's perspective and the full move-by-move record.
pub fn run_game(
    engine_under_test: &mut EngineDriver,
    baseline: &mut EngineDriver,
    variant: &mut dyn Variant,
    opening_pos: &str,
    order: u8,
) -> Result<(Outcome, GameRecord)> {
    run_game_with_config(engine_under_test, baseline, variant, opening_pos, order, &MatchConfig {
        game_time_ms: 10_000,
        inc_ms: 100,
        depth: None,
        nodes: None,
        movetime_ms: None,
        nodestime: None,
        draw_move_limit: -1,
        draw_score_limit: -1,
        win_move_limit: -1,
        win_score_limit: -1,
        draw_as_black_win: false,
        mate1_judge: false,
    })
}

pub fn run_game_with_config(
    engine_under_test: &mut EngineDriver,
    baseline: &mut EngineDriver,
    variant: &mut dyn Variant,
    opening_pos: &str,
    order: u8,
    cfg: &MatchConfig,
) -> Result<(Outcome, GameRecord)> {
    // white/black are indices into `[engine_under_test, baseline]`.
    let white: u8 = if order == 0 { 0 } else { 1 };
    let black: u8 = 1 - white;
    let move_limit = variant.default_move_limit();

    let mut clock = Clock {
        white_ms: if cfg.game_time_ms > 0 { Some(cfg.game_time_ms) } else { None },
        black_ms: if cfg.game_time_ms > 0 { Some(cfg.game_time_ms) } else { None },
    };

    let opening_offset = variant.starting_offset(opening_pos);
    let mut win_move_count = 0u32;
    let mut loss_move_count = 0u32;
    let mut draw_move_count = 0u32;
    let mut history: Vec<String> = Vec::new();
    let mut moves: Vec<MoveEntry> = Vec::new();

    let record = |result: i32, comment: &str, moves: Vec<MoveEntry>| GameRecord {
        start_fen: opening_pos.to_string(),
        order,
        moves,
        result,
        comment: comment.to_string(),
    };

    loop {
        let mover = if (opening_offset + history.len() as u32) % 2 == 0 { white } else { black };
        let engine = if mover == 0 { &mut *engine_under_test } else { &mut *baseline };

        let start = std::time::Instant::now();
        let reply = play_one_ply(engine, variant, &history, cfg, &clock, mover == white)?;
        let wall_ms = start.elapsed().as_millis() as u64;

        if reply.timed_out {
            let loss_for_white = mover == white;
            let result = if loss_for_white { -2 } else { 2 };
            let outcome_white = if loss_for_white { Outcome::Lose } else { Outcome::Win };
            return Ok((perspective(outcome_white, order), record(result, "Lose by deadline timeout", moves)));
        }

        let bestmove = reply.bestmove.clone().unwrap_or_default();
        let applied = variant.apply_move(mover as u32, &bestmove)?;
        history.push(applied.recorded_move.clone());
        moves.push(MoveEntry {
            mv: applied.recorded_move,
            score_cp: reply.score_cp,
            mate: reply.mate,
            engine_time_ms: reply.time_ms.unwrap_or(wall_ms),
            wall_time_ms: wall_ms,
            depth: reply.depth,
            seldepth: reply.seldepth,
            nodes: reply.nodes,
            nps: reply.nps,
            hashfull: reply.hashfull,
        });

        // Mate admission: only the side about to be mated reports mate,
        // so a negative value is always a loss for the mover.
        let mate = reply.mate.unwrap_or(0);
        if mate == -1 {
            let outcome_white = if mover == white { Outcome::Lose } else { Outcome::Win };
            let comment = if mover == white { "Lose by mate" } else { "Win by mate" };
            let result = if mover == white { -1 } else { 1 };
            return Ok((perspective(outcome_white, order), record(result, comment, moves)));
        }
        if cfg.mate1_judge && mate == 1 {
            let outcome_white = if mover == white { Outcome::Win } else { Outcome::Lose };
            let comment = if mover == white { "Win by mate" } else { "Lose by mate" };
            let result = if mover == white { 1 } else { -1 };
            return Ok((perspective(outcome_white, order), record(result, comment, moves)));
        }

        if let Some(score) = reply.score_cp {
            let white_score = if mover == white { score } else { -score };
            if white_score == 0 && reply.pv.is_empty() {
                return Ok(draw_or_black_win(cfg, order, "Draw by end of game", "Lose by draw (draw as black win)", moves, opening_pos));
            } else if cfg.draw_move_limit > 0 && white_score.unsigned_abs() as i32 <= cfg.draw_score_limit {
                draw_move_count += 1;
                if draw_move_count >= cfg.draw_move_limit as u32 {
                    let comment = format!(
                        "Draw by score <= {} for {} moves",
                        cfg.draw_score_limit, cfg.draw_move_limit
                    );
                    return Ok(draw_or_black_win(cfg, order, &comment, "Lose by draw (draw as black win)", moves, opening_pos));
                }
            } else if cfg.win_move_limit > 0 && white_score >= cfg.win_score_limit {
                win_move_count += 1;
                if win_move_count >= cfg.win_move_limit as u32 {
                    let comment = format!(
                        "Win by score >= {} for {} moves",
                        cfg.win_score_limit, cfg.win_move_limit
                    );
                    return Ok((perspective(Outcome::Win, order), record(1, &comment, moves)));
                }
            } else if cfg.win_move_limit > 0 && white_score <= -cfg.win_score_limit {
                loss_move_count += 1;
                if loss_move_count >= cfg.win_move_limit as u32 {
                    let comment = format!(
                        "Loss by score <= {} for {} moves",
                        -cfg.win_score_limit, cfg.win_move_limit
                    );
                    return Ok((perspective(Outcome::Lose, order), record(-1, &comment, moves)));
                }
            } else {
                win_move_count = 0;
                loss_move_count = 0;
                draw_move_count = 0;
            }
        }

        if let Some(reason) = variant.detect_draw_by_rules() {
            return Ok(draw_or_black_win(cfg, order, reason, "Lose by draw (draw as black win)", moves, opening_pos));
        }

        if let (Some(w), Some(b)) = (clock.white_ms, clock.black_ms) {
            let used = reply.time_ms.map(|t| match cfg.nodestime {
                Some(n) if n > 0 => (t as i64) / n,
                _ => t as i64,
            }).unwrap_or(wall_ms as i64);
            if mover == white {
                clock.white_ms = Some(w + cfg.inc_ms - used);
                if clock.white_ms.unwrap() < 0 {
                    return Ok((
                        perspective(Outcome::Lose, order),
                        record(-2, "Lose by Time loss", moves),
                    ));
                }
            } else {
                clock.black_ms = Some(b + cfg.inc_ms - used);
                if clock.black_ms.unwrap() < 0 {
                    return Ok((
                        perspective(Outcome::Win, order),
                        record(2, "Win by time loss", moves),
                    ));
                }
            }
        }

        if history.len() as u32 >= move_limit {
            let comment = format!("Draw by move count >= {move_limit}");
            return Ok(draw_or_black_win(cfg, order, &comment, "Lose by draw (move count, draw as black win)", moves, opening_pos));
        }
    }
}

fn draw_or_black_win(
    cfg: &MatchConfig,
    order: u8,
    draw_comment: &str,
    black_win_comment: &str,
    moves: Vec<MoveEntry>,
    opening_pos: &str,
) -> (Outcome, GameRecord) {
    if cfg.draw_as_black_win {
        let outcome_white = Outcome::Lose;
        (
            perspective(outcome_white, order),
            GameRecord { start_fen: opening_pos.to_string(), order, moves, result: -1, comment: black_win_comment.to_string() },
        )
    } else {
        (
            perspective(Outcome::Draw, order),
            GameRecord { start_fen: opening_pos.to_string(), order, moves, result: 0, comment: draw_comment.to_string() },
        )
    }
}

/// `order == 1` means the engine under test is playing black, so the
/// white-perspective outcome must be flipped to read from its perspective.
fn perspective(outcome_white: Outcome, order: u8) -> Outcome {
    if order == 1 { outcome_white.flip() } else { outcome_white }
}

fn move_deadline(cfg: &MatchConfig, mover_clock_ms: Option<i64>) -> Duration {
    let ms = if let Some(mt) = cfg.movetime_ms {
        mt + TOLERANCE_MS
    } else if let Some(clock_ms) = mover_clock_ms {
        clock_ms + cfg.inc_ms + TOLERANCE_MS
    } else {
        return NO_CLOCK_DEADLINE;
    };
    Duration::from_millis(ms.max(0) as u64)
}

fn play_one_ply(
    engine: &mut EngineDriver,
    variant: &mut dyn Variant,
    history: &[String],
    cfg: &MatchConfig,
    clock: &Clock,
    mover_is_white: bool,
) -> Result<EngineReply> {
    let mover_clock = if mover_is_white { clock.white_ms } else { clock.black_ms };
    let deadline = move_deadline(cfg, mover_clock);
    match variant.encode_for_engine(history) {
        EngineCommand::Position(position_cmd) => {
            let limits = GoLimits {
                wtime: clock.white_ms,
                btime: clock.black_ms,
                winc: Some(cfg.inc_ms),
                binc: Some(cfg.inc_ms),
                movetime: cfg.movetime_ms,
                depth: cfg.depth,
                nodes: cfg.nodes,
            };
            engine.go(&position_cmd, &limits, deadline)
        }
        EngineCommand::Board(body) => engine.board(&body, deadline),
        EngineCommand::Turn(coord) => engine.turn(&coord, deadline),
    }
}
