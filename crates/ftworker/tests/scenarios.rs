//! End-to-end scenario tests (wdl/fwdl/ptnml invariants, mate admission,
//! clock/deadline forfeits, and queue abandonment). Each test drives the
//! real `EngineDriver`/UCI protocol against a tiny `awk`-scripted fake
//! engine subprocess that answers `uci`/`isready` normally and replies to
//! `go` with canned `info`/`bestmove` lines, rather than a mock trait —
//! this exercises the actual process/pipe/encoding plumbing the way the
//! worker uses it in production.

use std::path::PathBuf;
use std::time::Duration;

use ftworker::engine::driver::{EngineConfig, EngineDriver, Protocol};
use ftworker::engine::uci::{position_command, GoLimits};
use ftworker::match_engine::chess::ChessVariant;
use ftworker::match_engine::{run_game_with_config, MatchConfig};
use ftworker::task::{GameRecord, GameSlot, MoveEntry, Outcome, Task, TaskKind, Variant as TaskVariant};

/// One script group per `go` call this engine will receive, each group a
/// `|`-separated list of lines to emit (an optional `info` line then
/// `bestmove`). An engine that should never answer `go` (hang/timeout
/// cases) is given an empty slice.
fn scripted_uci_engine(go_groups: &[&str]) -> EngineDriver {
    let replies = go_groups.join(";");
    let awk_program = r#"BEGIN{n=split(replies,groups,";");gi=0}
/^uci$/{print "uciok";fflush();next}
/^isready$/{print "readyok";fflush();next}
/^go/{gi++;m=split(groups[gi],lines,"|");for(i=1;i<=m;i++){print lines[i];fflush()}next}
{next}"#;
    let script = format!("exec awk -v replies='{replies}' '{awk_program}'");
    let cfg = EngineConfig {
        path: PathBuf::from("/bin/sh"),
        args: vec!["-c".to_string(), script],
        protocol: Protocol::Uci,
        utf8_stdio: true,
        options: Vec::new(),
    };
    EngineDriver::spawn(&cfg, "scripted".to_string()).expect("scripted fake engine spawns")
}

fn base_cfg() -> MatchConfig {
    MatchConfig {
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
    }
}

/// Scenario A: a full game pair (engine-under-test wins as white, loses as
/// black) drives `wdl`/`fwdl`/`ptnml` out the far end of `aggregate::accumulate`
/// exactly as §4.E specifies.
#[test]
fn normal_chess_pair_aggregates_wdl_and_ptnml() {
    // order 0: engine-under-test is white, wins on its first move via mate admission.
    let mut under_test = scripted_uci_engine(&["info score mate 1|bestmove e2e4"]);
    let mut baseline = scripted_uci_engine(&[]);
    let mut chess = ChessVariant::new("startpos").unwrap();
    let cfg = MatchConfig { mate1_judge: true, ..base_cfg() };
    let (r0, rec0) = run_game_with_config(&mut under_test, &mut baseline, &mut chess, "startpos", 0, &cfg).unwrap();
    assert_eq!(r0, Outcome::Win);
    assert_eq!(rec0.comment, "Win by mate");

    // order 1: baseline is white, wins on its first move the same way, so
    // the engine-under-test (playing black) loses.
    let mut under_test2 = scripted_uci_engine(&[]);
    let mut baseline2 = scripted_uci_engine(&["info score mate 1|bestmove e2e4"]);
    let mut chess2 = ChessVariant::new("startpos").unwrap();
    let (r1, rec1) = run_game_with_config(&mut under_test2, &mut baseline2, &mut chess2, "startpos", 1, &cfg).unwrap();
    assert_eq!(r1, Outcome::Lose);
    assert_eq!(rec1.comment, "Win by mate");

    let mut slot = GameSlot::default();
    slot.entries[0] = Some((r0, rec0));
    slot.entries[1] = Some((r1, rec1));
    let mut result = ftworker::task::TaskResult::default();
    ftworker::aggregate::accumulate(&mut result, TaskKind::Normal, vec![("startpos".to_string(), slot)]);

    assert_eq!(result.wdl, [1, 0, 1]);
    assert_eq!(result.fwdl, [1, 0, 0]); // fwdl tracks order-0 only, which was a Win.
    assert_eq!(result.ptnml, [0, 0, 1, 0, 0]); // score(Win)+score(Lose) = 2.
    assert_eq!(result.game_records.len(), 2);
}

/// Scenario C: a mover reporting its own forced mate always loses; the
/// inverse only wins when `mate1_judge` opts in, and otherwise the game
/// continues to a later adjudication.
#[test]
fn mate_admission_respects_mate1_judge_flag() {
    // mate -1: mover is about to be mated, loses regardless of mate1_judge.
    let mut under_test = scripted_uci_engine(&["info score mate -1|bestmove e2e4"]);
    let mut baseline = scripted_uci_engine(&[]);
    let mut chess = ChessVariant::new("startpos").unwrap();
    let (outcome, rec) =
        run_game_with_config(&mut under_test, &mut baseline, &mut chess, "startpos", 0, &base_cfg()).unwrap();
    assert_eq!(outcome, Outcome::Lose);
    assert_eq!(rec.result, -1);
    assert_eq!(rec.comment, "Lose by mate");

    // mate 1 with mate1_judge = true: immediate win for the mover.
    let mut under_test = scripted_uci_engine(&["info score mate 1|bestmove e2e4"]);
    let mut baseline = scripted_uci_engine(&[]);
    let mut chess = ChessVariant::new("startpos").unwrap();
    let cfg = MatchConfig { mate1_judge: true, ..base_cfg() };
    let (outcome, rec) = run_game_with_config(&mut under_test, &mut baseline, &mut chess, "startpos", 0, &cfg).unwrap();
    assert_eq!(outcome, Outcome::Win);
    assert_eq!(rec.comment, "Win by mate");

    // mate 1 with mate1_judge = false: does not end the game on that ply;
    // adjudication only fires later via the ordinary score thresholds.
    let mut under_test = scripted_uci_engine(&[
        "info score mate 1|bestmove e2e4",
        "info score cp 1500|bestmove g1f3",
    ]);
    let mut baseline = scripted_uci_engine(&["bestmove e7e5"]);
    let mut chess = ChessVariant::new("startpos").unwrap();
    let cfg = MatchConfig { mate1_judge: false, win_move_limit: 1, win_score_limit: 1000, ..base_cfg() };
    let (outcome, rec) = run_game_with_config(&mut under_test, &mut baseline, &mut chess, "startpos", 0, &cfg).unwrap();
    assert_eq!(outcome, Outcome::Win);
    assert!(rec.comment.starts_with("Win by score"));
    assert_eq!(rec.moves.len(), 3); // e2e4, e7e5, g1f3 — the mate-1 ply did not end the game.
}

/// Scenario D(i): an engine that never answers `go` within its deadline is
/// reported as timed out by the driver itself.
#[test]
fn hanging_engine_times_out() {
    let mut engine = scripted_uci_engine(&[]);
    let position = position_command("startpos", &[]);
    let reply = engine.go(&position, &GoLimits::default(), Duration::from_millis(300)).unwrap();
    assert!(reply.timed_out);
    assert!(reply.bestmove.is_none());
}

/// Scenario D(ii): an engine that responds, but reports spending more time
/// than its remaining clock, forfeits on time.
#[test]
fn engine_reporting_excess_time_loses_on_clock() {
    let mut under_test = scripted_uci_engine(&["info time 5000|bestmove e2e4"]);
    let mut baseline = scripted_uci_engine(&[]);
    let mut chess = ChessVariant::new("startpos").unwrap();
    let cfg = MatchConfig { game_time_ms: 1_000, inc_ms: 0, ..base_cfg() };
    let (outcome, rec) = run_game_with_config(&mut under_test, &mut baseline, &mut chess, "startpos", 0, &cfg).unwrap();
    assert_eq!(outcome, Outcome::Lose);
    assert_eq!(rec.comment, "Lose by Time loss");
    assert_eq!(rec.result, -2);
}

fn sample_task(task_id: &str) -> Task {
    Task {
        task_id: task_id.to_string(),
        kind: TaskKind::Normal,
        variant: TaskVariant::Chess,
        engine_url: "http://x/e".into(),
        weight_url: None,
        baseline_engine_url: "http://x/b".into(),
        baseline_weight_url: None,
        time_control: (10.0, 0.1, 0),
        nodes: None,
        move_time: None,
        nodestime: None,
        uci_options: Default::default(),
        baseline_uci_options: Default::default(),
        draw_move_limit: None,
        draw_score_limit: None,
        win_move_limit: None,
        win_score_limit: None,
        draw_as_black_win: false,
        mate1_judge: false,
        book: None,
        num_games: None,
        iter: None,
    }
}

fn dummy_record(result: i32) -> (Outcome, GameRecord) {
    let outcome = match result.signum() {
        1 => Outcome::Win,
        -1 => Outcome::Lose,
        _ => Outcome::Draw,
    };
    (outcome, GameRecord { start_fen: "fen".into(), order: 0, moves: Vec::<MoveEntry>::new(), result, comment: "t".into() })
}

/// Scenario E: two consecutive failures for the same `(task_id, fen)`
/// abandon only that opening — its sibling opening's slot is untouched and
/// can still be completed and drained normally.
#[test]
fn second_failure_abandons_only_its_own_opening() {
    let pool = ftworker::queue::WorkerPoolState::new();
    let task = sample_task("t-e");
    pool.add_task(task, vec!["f1".to_string(), "f2".to_string()]);
    assert_eq!(pool.queue_len(), 4); // 2 fens x 2 orders

    // A worker picks up f1's order-0 pair and reports a failure: it goes
    // back to the head of the queue once.
    let (pair, _task) = pool.next_pair(Duration::from_millis(100)).expect("queue is non-empty");
    assert_eq!((pair.task_id.as_str(), pair.fen.as_str(), pair.order), ("t-e", "f1", 0));
    pool.report_failure(pair);
    assert_eq!(pool.queue_len(), 4); // requeued at the front, not dropped
    assert!(pool.drain_abandoned().is_empty());

    // A second attempt at the same pair fails again: both of f1's orders
    // are dropped from the queue and its slot is deleted.
    let (pair, _task) = pool.next_pair(Duration::from_millis(100)).expect("queue is non-empty");
    assert_eq!((pair.task_id.as_str(), pair.fen.as_str(), pair.order), ("t-e", "f1", 0));
    pool.report_failure(pair);
    assert_eq!(pool.queue_len(), 2); // only f2's two orders remain
    let abandoned = pool.drain_abandoned();
    assert_eq!(abandoned, vec![("t-e".to_string(), "f1".to_string())]);

    pool.record_result("t-e", "f2", 0, dummy_record(1));
    pool.record_result("t-e", "f2", 1, dummy_record(-1));
    let completed = pool.drain_completed("t-e");
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].0, "f2");
    assert!(completed[0].1.is_complete());
}
