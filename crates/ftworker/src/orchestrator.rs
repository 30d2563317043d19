//! Orchestrator (SPEC_FULL.md §4.H): wires the Task Manager, Heartbeat,
//! and Result Waiter background loops plus N worker threads around one
//! shared `Context`. Grounded on `client.py`'s three daemon-thread loops
//! (`heartbeat_loop`, `task_manage_loop`, `result_waiting_loop`) and its
//! `worker_thread` pool, replacing Python's module-level globals and
//! `threading.Thread(daemon=True)` with plain `std::thread::spawn` OS
//! threads joined at shutdown.

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use rand::Rng;

use crate::aggregate;
use crate::assets::AssetStore;
use crate::context::Context;
use crate::engine::driver::{EngineConfig, EngineDriver, Protocol};
use crate::match_engine::{
    self, board_eval::NullBoardEvaluator, chess::ChessVariant, gomoku::Gomoku, jieqi::Jieqi, xiangqi::Xiangqi,
};
use crate::queue::{games_for_task, worker_count};
use crate::task::{Task, TaskKind, TaskResult, Variant};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const HEARTBEAT_ERROR_INTERVAL: Duration = Duration::from_secs(5);
const QUEUE_LOW_WATERMARK: usize = 32;
const QUEUE_POLL_INTERVAL: Duration = Duration::from_millis(200);
const GET_TASKS_ERROR_INTERVAL: Duration = Duration::from_secs(10);

/// Spawns every background thread and blocks until `ctx.running` goes
/// false (set by the ctrlc handler installed in `main`), then joins them.
pub fn run(ctx: Arc<Context>, workers: Option<usize>) -> anyhow::Result<()> {
    let n = worker_count(workers);
    info!("starting orchestrator with {n} worker threads, client_id={}", ctx.client_id);

    let mut handles = Vec::new();

    {
        let ctx = Arc::clone(&ctx);
        handles.push(std::thread::spawn(move || heartbeat_loop(ctx, n)));
    }
    {
        let ctx = Arc::clone(&ctx);
        handles.push(std::thread::spawn(move || task_manage_loop(ctx, n)));
    }
    {
        let ctx = Arc::clone(&ctx);
        handles.push(std::thread::spawn(move || result_waiting_loop(ctx)));
    }
    for id in 0..n {
        let ctx = Arc::clone(&ctx);
        handles.push(std::thread::spawn(move || worker_thread(ctx, id)));
    }

    while ctx.is_running() {
        std::thread::sleep(Duration::from_millis(200));
    }
    for handle in handles {
        let _ = handle.join();
    }
    Ok(())
}

fn heartbeat_loop(ctx: Arc<Context>, cpu_threads: usize) {
    let mut sleep_time = HEARTBEAT_INTERVAL;
    while ctx.is_running() {
        std::thread::sleep(sleep_time);
        sleep_time = HEARTBEAT_INTERVAL;
        let task_ids = ctx.pool.in_progress_task_ids();
        let Some(resp) = ctx.coordinator.heartbeat(&ctx.client_id, cpu_threads, &task_ids) else {
            sleep_time = HEARTBEAT_ERROR_INTERVAL;
            continue;
        };
        if apply_heartbeat_response(&ctx, &resp) {
            return;
        }
    }
}

/// Applies one heartbeat response's side effects: a program-version
/// mismatch shuts the worker down (returns `true`); otherwise any
/// coordinator-reported invalid tasks are dropped from the queue.
fn apply_heartbeat_response(ctx: &Context, resp: &crate::coordinator::HeartbeatResponse) -> bool {
    if let Some(remote_version) = &resp.program_version {
        if remote_version != ctx.program_version {
            warn!("program version mismatch (local {}, coordinator {remote_version}); shutting down", ctx.program_version);
            ctx.shut_down();
            return true;
        }
    }
    if !resp.invalid_task_ids.is_empty() {
        ctx.pool.remove_tasks(&resp.invalid_task_ids);
    }
    false
}

fn task_manage_loop(ctx: Arc<Context>, cpu_threads: usize) {
    let low_watermark = cpu_threads.min(QUEUE_LOW_WATERMARK);
    let mut download_failed_count: u32 = 0;
    let mut webdrives = ctx.webdrives.clone();
    while ctx.is_running() {
        if ctx.pool.queue_len() >= low_watermark {
            std::thread::sleep(QUEUE_POLL_INTERVAL);
            continue;
        }
        let Some(fetch) = ctx.coordinator.get_tasks(&ctx.client_id, cpu_threads) else {
            std::thread::sleep(GET_TASKS_ERROR_INTERVAL);
            continue;
        };
        if let Some(remote_version) = &fetch.program_version {
            if remote_version != ctx.program_version {
                warn!("program version mismatch (local {}, coordinator {remote_version}); shutting down", ctx.program_version);
                ctx.shut_down();
                return;
            }
        }
        if !fetch.webdrives.is_empty() {
            webdrives = fetch.webdrives;
        }
        let Some(task) = select_task(&ctx, fetch.tasks) else {
            std::thread::sleep(Duration::from_secs(20));
            continue;
        };
        match download_task_assets(&ctx, &task, &webdrives) {
            Ok(()) => {
                download_failed_count = 0;
                enqueue_task(&ctx, task, cpu_threads as u32);
            }
            Err(e) => {
                warn!("asset download failed for task {}: {e}", task.task_id);
                download_failed_count += 1;
                std::thread::sleep(Duration::from_secs((download_failed_count * 30) as u64));
            }
        }
    }
}

/// Picks the preferred-pick task if one of the offered tasks already has
/// every engine/weight file local; otherwise a random offered task
/// (SPEC_FULL.md §4.G "admission rule").
fn select_task(ctx: &Context, mut tasks: Vec<Task>) -> Option<Task> {
    if tasks.is_empty() {
        return None;
    }
    let preferred_idx = {
        let assets = ctx.assets.lock().expect("asset store lock poisoned");
        tasks.iter().position(|t| assets.is_preferred_pick(t))
    };
    if let Some(idx) = preferred_idx {
        return Some(tasks.swap_remove(idx));
    }
    let idx = rand::rng().random_range(0..tasks.len());
    Some(tasks.swap_remove(idx))
}

fn download_task_assets(ctx: &Context, task: &Task, webdrives: &[String]) -> anyhow::Result<()> {
    let http = reqwest::blocking::Client::new();
    let mut assets = ctx.assets.lock().expect("asset store lock poisoned");
    for url in [&task.baseline_engine_url, &task.engine_url] {
        if url.is_empty() {
            continue;
        }
        let id = AssetStore::file_id(url).unwrap_or_default();
        let name = format!("engine_{id}");
        let path = assets.ensure_downloaded(&http, url, &name, webdrives)?;
        let _ = assets.ensure_upx_compressed(&path);
    }
    for url in [&task.baseline_weight_url, &task.weight_url] {
        if let Some(url) = url {
            if url.is_empty() {
                continue;
            }
            let id = AssetStore::file_id(url).unwrap_or_default();
            let name = format!("xiangqi-{id}.nnue");
            assets.ensure_downloaded(&http, url, &name, webdrives)?;
        }
    }
    Ok(())
}

fn enqueue_task(ctx: &Context, task: Task, cpu_threads: u32) {
    let num_games = games_for_task(&task, cpu_threads);
    let book_dir = ctx.books_root.join(crate::book::book_subdir(task.variant));
    let books = crate::book::load_books(&book_dir, &["txt", "epd"]).unwrap_or_default();
    let book_name = task.book.clone().unwrap_or_else(|| task.variant.default_book().to_string());
    let lines = crate::book::ensure_book_loaded(&books, &book_name, task.variant.default_book())
        .map(|l| l.clone())
        .unwrap_or_default();
    let fens = crate::book::sample(&lines, (num_games / 2).max(1) as usize);
    info!("enqueuing {} games ({} openings) for task {}", num_games, fens.len(), task.task_id);
    ctx.pool.add_task(task, fens);
}

fn worker_thread(ctx: Arc<Context>, id: usize) {
    while ctx.is_running() {
        let Some((pair, task)) = ctx.pool.next_pair(Duration::from_millis(500)) else {
            continue;
        };
        match play_game_pair(&ctx, &task, &pair) {
            Ok(entry) => ctx.pool.record_result(&pair.task_id, &pair.fen, pair.order, entry),
            Err(e) => {
                warn!("worker {id} failed game {}/{}: {e}", pair.task_id, pair.fen);
                ctx.pool.report_failure(pair);
            }
        }
    }
}

fn play_game_pair(ctx: &Context, task: &Task, pair: &crate::task::GamePair) -> anyhow::Result<(crate::task::Outcome, crate::task::GameRecord)> {
    let (engine_under_test_url, baseline_url) = (&task.engine_url, &task.baseline_engine_url);
    let (engine_path, baseline_path) = {
        let assets = ctx.assets.lock().expect("asset store lock poisoned");
        let engine_id = AssetStore::file_id(engine_under_test_url).unwrap_or_default();
        let baseline_id = AssetStore::file_id(baseline_url).unwrap_or_default();
        (ctx.files_root.join(format!("engine_{engine_id}")), ctx.files_root.join(format!("engine_{baseline_id}")))
    };

    let protocol = if task.variant.is_gomoku() { Protocol::Piskvork } else { Protocol::Uci };
    // Only chess engines speak UTF-8 on stdio; every other family is built
    // on a GB2312 toolchain (§9 "Encoding").
    let utf8_stdio = task.variant == Variant::Chess;
    let under_test_cfg = EngineConfig {
        path: engine_path,
        args: Vec::new(),
        protocol,
        utf8_stdio,
        options: task.uci_options.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
    };
    let baseline_cfg = EngineConfig {
        path: baseline_path,
        args: Vec::new(),
        protocol,
        utf8_stdio,
        options: task.baseline_uci_options.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
    };
    let mut engine_under_test = EngineDriver::spawn(&under_test_cfg, format!("engine({})", task.task_id))?;
    let mut baseline = EngineDriver::spawn(&baseline_cfg, format!("baseline({})", task.task_id))?;

    let mut variant = build_variant(task.variant, &pair.fen)?;
    let cfg = match_config_for(task);
    let (outcome, record) = match_engine::run_game_with_config(&mut engine_under_test, &mut baseline, variant.as_mut(), &pair.fen, pair.order, &cfg)?;

    let _ = engine_under_test.quit(Duration::from_secs(5));
    let _ = baseline.quit(Duration::from_secs(5));
    Ok((outcome, record))
}

fn build_variant(variant: Variant, fen: &str) -> anyhow::Result<Box<dyn match_engine::variant::Variant>> {
    let evaluator: std::sync::Arc<dyn match_engine::board_eval::BoardEvaluator> = std::sync::Arc::new(NullBoardEvaluator);
    Ok(match variant {
        Variant::Chess => Box::new(ChessVariant::new(fen)?),
        Variant::Xiangqi => Box::new(Xiangqi::new(fen, evaluator)),
        Variant::Jieqi => {
            let info: crate::match_engine::jieqi::JieqiBoardInfo =
                serde_json::from_str(fen).or_else(|_| -> anyhow::Result<_> { crate::book::expand_jieqi_fen(fen) })?;
            Box::new(Jieqi::new(&info, evaluator))
        }
        Variant::GomokuFreestyle20 | Variant::GomokuFreestyle15 | Variant::GomokuStandard15 | Variant::GomokuRenju15 => {
            Box::new(Gomoku::new(fen, variant.board_size())?)
        }
    })
}

fn match_config_for(task: &Task) -> match_engine::MatchConfig {
    let (game_time_s, inc_s, depth) = task.time_control;
    match_engine::MatchConfig {
        game_time_ms: (game_time_s * 1000.0) as i64,
        inc_ms: (inc_s * 1000.0) as i64,
        depth: if depth > 0 { Some(depth) } else { None },
        nodes: task.nodes,
        movetime_ms: task.move_time.map(|t| t as i64 * 1000),
        nodestime: task.nodestime.map(|n| n as i64),
        draw_move_limit: task.draw_move_limit.map(|v| v as i32).unwrap_or(-1),
        draw_score_limit: task.draw_score_limit.unwrap_or(-1),
        win_move_limit: task.win_move_limit.map(|v| v as i32).unwrap_or(-1),
        win_score_limit: task.win_score_limit.unwrap_or(-1),
        draw_as_black_win: task.draw_as_black_win,
        mate1_judge: task.mate1_judge,
    }
}

const RESULT_WAITING_INTERVAL: Duration = Duration::from_secs(10);

/// Result Aggregator (SPEC_FULL.md §4.E), run every 10s. Scans every
/// currently-admitted task (not just ones that hit the abandon list, a
/// bug the original single-pass draining loop had): SPSA tasks wait for
/// every opening to fill before their one atomic batch drains, normal
/// tasks drain and upload whatever completed this cycle. A batch that
/// fails to upload is kept and retried next cycle rather than dropped,
/// for closer-to-exactly-once delivery than the original's fire-and-
/// forget `client_helper.upload_result`.
fn result_waiting_loop(ctx: Arc<Context>) {
    let mut pending: std::collections::HashMap<String, TaskResult> = std::collections::HashMap::new();
    while ctx.is_running() {
        // The abandon list's slots were already removed by `report_failure`;
        // draining it here just clears the bookkeeping list itself.
        ctx.pool.drain_abandoned();

        for task_id in ctx.pool.active_task_ids() {
            let Some(task) = ctx.pool.task(&task_id) else { continue };
            if task.kind == TaskKind::Spsa && !ctx.pool.all_filled(&task_id) {
                continue;
            }
            let completed = ctx.pool.drain_completed(&task_id);
            if completed.is_empty() {
                continue;
            }
            let entry = pending.entry(task_id.clone()).or_default();
            aggregate::accumulate(entry, task.kind, completed);
        }

        for task_id in pending.keys().cloned().collect::<Vec<_>>() {
            let Some(task) = ctx.pool.task(&task_id) else {
                pending.remove(&task_id);
                continue;
            };
            let batch = &pending[&task_id];
            if batch.wdl.iter().sum::<u32>() == 0 {
                continue;
            }
            match ctx.coordinator.upload_result(&ctx.client_id, ctx.program_version, &task, batch) {
                crate::coordinator::UploadOutcome::Ok => {
                    info!("uploaded {} game record(s) for task {task_id}", batch.game_records.len());
                    pending.remove(&task_id);
                }
                crate::coordinator::UploadOutcome::VersionMismatch => {
                    warn!("coordinator reports program version mismatch on upload; shutting down");
                    ctx.shut_down();
                    return;
                }
                crate::coordinator::UploadOutcome::Failed => {
                    warn!("upload_result failed for task {task_id}; retrying next cycle");
                }
            }
        }

        std::thread::sleep(RESULT_WAITING_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_context() -> Context {
        let tmp = std::path::PathBuf::from("/tmp");
        Context::new("tester", "http://127.0.0.1:0".into(), tmp.clone(), tmp, Vec::new())
            .expect("context construction does not touch the network")
    }

    #[test]
    fn version_mismatch_shuts_worker_down() {
        let ctx = test_context();
        assert!(ctx.is_running());
        let resp = crate::coordinator::HeartbeatResponse {
            invalid_task_ids: Vec::new(),
            program_version: Some("9.9.9".to_string()),
        };
        assert_ne!(ctx.program_version, "9.9.9");
        let shut_down = apply_heartbeat_response(&ctx, &resp);
        assert!(shut_down);
        assert!(!ctx.is_running());
    }

    #[test]
    fn matching_version_keeps_worker_running_and_drops_invalid_tasks() {
        let ctx = test_context();
        ctx.pool.add_task(
            Task {
                task_id: "stale".into(),
                kind: TaskKind::Normal,
                variant: Variant::Chess,
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
            },
            vec!["startpos".to_string()],
        );
        let resp = crate::coordinator::HeartbeatResponse {
            invalid_task_ids: vec!["stale".to_string()],
            program_version: Some(ctx.program_version.to_string()),
        };
        let shut_down = apply_heartbeat_response(&ctx, &resp);
        assert!(!shut_down);
        assert!(ctx.is_running());
        assert!(ctx.pool.task("stale").is_none());
    }
}
