//! Task Queue & Worker Pool (SPEC_FULL.md §4.D). Grounded on
//! `original_source/fishtest.py`'s `Tester` class (`task_queue`,
//! `task_results`, `abandon_list`, `lock`, `add_task`, `remove_tasks`,
//! `process_task`, `worker_thread`) and `original_source/client.py`'s
//! `add_to_task` games-per-task formula.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use log::warn;

use crate::task::{GamePair, GameSlot, Task, TaskKind};

/// Maximum consecutive failures a `GamePair` tolerates before the whole
/// task's remaining pairs for that fen are abandoned, matching
/// `process_task`'s `error_count <= 1` reinsert-once semantics.
const MAX_ERROR_COUNT: u32 = 1;

struct Inner {
    queue: std::collections::VecDeque<GamePair>,
    tasks: HashMap<String, Task>,
    results: HashMap<String, HashMap<String, GameSlot>>,
    abandoned: Vec<(String, String)>,
}

/// Shared state behind a single `Mutex` + `Condvar`: one coarse lock over
/// the queue, result map, and abandon list rather than a channel per worker.
pub struct WorkerPoolState {
    inner: Mutex<Inner>,
    not_empty: Condvar,
}

impl Default for WorkerPoolState {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerPoolState {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: std::collections::VecDeque::new(),
                tasks: HashMap::new(),
                results: HashMap::new(),
                abandoned: Vec::new(),
            }),
            not_empty: Condvar::new(),
        }
    }

    /// Enqueues a task's games: one `GamePair` per (fen, order) slot,
    /// matching `Tester.add_task`'s two-entries-per-fen layout.
    pub fn add_task(&self, task: Task, opening_fens: Vec<String>) {
        let mut inner = self.inner.lock().expect("worker pool lock poisoned");
        let task_id = task.task_id.clone();
        let mut task_results = HashMap::new();
        for fen in &opening_fens {
            task_results.insert(fen.clone(), GameSlot::default());
            for order in 0..2u8 {
                inner.queue.push_back(GamePair { task_id: task_id.clone(), fen: fen.clone(), order, error_count: 0 });
            }
        }
        inner.results.insert(task_id.clone(), task_results);
        inner.tasks.insert(task_id, task);
        self.not_empty.notify_all();
    }

    /// Blocks until a `GamePair` is available or `timeout` elapses.
    pub fn next_pair(&self, timeout: Duration) -> Option<(GamePair, Task)> {
        let mut inner = self.inner.lock().expect("worker pool lock poisoned");
        loop {
            if let Some(pair) = inner.queue.pop_front() {
                let task = inner.tasks.get(&pair.task_id).cloned();
                return task.map(|t| (pair, t));
            }
            let (guard, timed_out) = self
                .not_empty
                .wait_timeout(inner, timeout)
                .expect("worker pool lock poisoned");
            inner = guard;
            if timed_out.timed_out() && inner.queue.is_empty() {
                return None;
            }
        }
    }

    /// Reinserts a failed `GamePair` at the queue front if its error count
    /// is still tolerable, otherwise drops every remaining queue entry for
    /// that `(task_id, fen)` and records it as abandoned, matching
    /// `process_task`'s error-handling branch.
    pub fn report_failure(&self, mut pair: GamePair) {
        pair.error_count += 1;
        let mut inner = self.inner.lock().expect("worker pool lock poisoned");
        if pair.error_count <= MAX_ERROR_COUNT {
            warn!("game pair {}/{} failed (attempt {}), retrying", pair.task_id, pair.fen, pair.error_count);
            inner.queue.push_front(pair);
        } else {
            warn!("game pair {}/{} abandoned after {} failures", pair.task_id, pair.fen, pair.error_count);
            let task_id = pair.task_id.clone();
            let fen = pair.fen.clone();
            inner.queue.retain(|p| !(p.task_id == task_id && p.fen == fen));
            if let Some(slots) = inner.results.get_mut(&task_id) {
                slots.remove(&fen);
            }
            inner.abandoned.push((task_id, fen));
        }
        self.not_empty.notify_all();
    }

    pub fn record_result(&self, task_id: &str, fen: &str, order: u8, entry: (crate::task::Outcome, crate::task::GameRecord)) {
        let mut inner = self.inner.lock().expect("worker pool lock poisoned");
        if let Some(slots) = inner.results.get_mut(task_id) {
            if let Some(slot) = slots.get_mut(fen) {
                slot.entries[order as usize] = Some(entry);
            }
        }
    }

    /// Drains every completed `GameSlot` for `task_id`, removing it from
    /// the in-flight map, for the Result Aggregator to consume.
    pub fn drain_completed(&self, task_id: &str) -> Vec<(String, GameSlot)> {
        let mut inner = self.inner.lock().expect("worker pool lock poisoned");
        let Some(slots) = inner.results.get_mut(task_id) else { return Vec::new() };
        let done: Vec<String> = slots.iter().filter(|(_, s)| s.is_complete()).map(|(f, _)| f.clone()).collect();
        done.into_iter().map(|fen| { let slot = slots.remove(&fen).unwrap(); (fen, slot) }).collect()
    }

    /// Drains the abandon list, matching `client.py`'s
    /// `result_waiting_loop` draining `abandon_list` before uploading.
    pub fn drain_abandoned(&self) -> Vec<(String, String)> {
        let mut inner = self.inner.lock().expect("worker pool lock poisoned");
        std::mem::take(&mut inner.abandoned)
    }

    /// Removes every queued `GamePair` and tracked task for the given ids,
    /// matching `Tester.remove_tasks` (invoked on coordinator-reported
    /// invalid tasks).
    pub fn remove_tasks(&self, task_ids: &[String]) {
        let mut inner = self.inner.lock().expect("worker pool lock poisoned");
        inner.queue.retain(|p| !task_ids.contains(&p.task_id));
        for id in task_ids {
            inner.tasks.remove(id);
            inner.results.remove(id);
        }
    }

    pub fn queue_len(&self) -> usize {
        self.inner.lock().expect("worker pool lock poisoned").queue.len()
    }

    pub fn task(&self, task_id: &str) -> Option<Task> {
        self.inner.lock().expect("worker pool lock poisoned").tasks.get(task_id).cloned()
    }

    /// Every task_id currently admitted, whether its games are still
    /// queued, in flight, or sitting as not-yet-drained result slots. The
    /// Result Aggregator scans this set each cycle rather than only the
    /// ids that happened to go through the abandon list.
    pub fn active_task_ids(&self) -> Vec<String> {
        self.inner.lock().expect("worker pool lock poisoned").tasks.keys().cloned().collect()
    }

    /// Union of task ids with pending queue entries or not-yet-drained
    /// result slots, matching SPEC_FULL.md §5's heartbeat reporting rule
    /// (a superset of `fishtest.py`'s queue-only `get_task_ids_in_queue`).
    pub fn in_progress_task_ids(&self) -> Vec<String> {
        let inner = self.inner.lock().expect("worker pool lock poisoned");
        let mut ids: std::collections::HashSet<String> = inner.queue.iter().map(|p| p.task_id.clone()).collect();
        ids.extend(inner.results.keys().cloned());
        ids.into_iter().collect()
    }

    /// `true` once every `(task_id, fen)` slot still tracked for `task_id`
    /// has both orders filled (vacuously true once none remain) — the
    /// SPSA-all-done gate from `fishtest.py`'s `check_is_all_done`.
    pub fn all_filled(&self, task_id: &str) -> bool {
        let inner = self.inner.lock().expect("worker pool lock poisoned");
        match inner.results.get(task_id) {
            None => true,
            Some(slots) => slots.values().all(|s| s.is_complete()),
        }
    }
}

/// Resolves the worker-thread count: CLI override, else the host's
/// physical core count, matching `client.py`'s `CPU_THREADS = os.cpu_count()`
/// discovery (via `sysinfo`, already a `tools` dependency for host
/// introspection). Falls back to logical parallelism if the physical count
/// isn't available on this platform.
pub fn worker_count(cli_override: Option<usize>) -> usize {
    if let Some(n) = cli_override {
        return n;
    }
    let sys = sysinfo::System::new_all();
    sys.physical_core_count()
        .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
        .unwrap_or(1)
}

/// Games to schedule for one task, matching `client.py`'s `add_to_task`
/// `num_games`/`G` formula: a base of 6, scaled by a `cpu_threads`
/// multiplier that steps down as the per-move time budget shrinks, then
/// overridden for very shallow depth/node limits or SPSA tasks, and
/// finally rounded up to an even number (two games per opening).
pub fn games_for_task(task: &Task, cpu_threads: u32) -> u32 {
    let (game_time_s, _inc_s, depth) = task.time_control;
    let mut num_games = 6u32;
    if game_time_s >= 60.0 {
        num_games = cpu_threads;
    } else if game_time_s >= 30.0 {
        num_games = 2 * cpu_threads;
    } else if game_time_s >= 10.0 {
        num_games = 3 * cpu_threads;
    } else if game_time_s >= 5.0 {
        num_games = 6 * cpu_threads;
    } else if game_time_s >= 2.5 {
        num_games = 12 * cpu_threads;
    } else if game_time_s >= 1.25 {
        num_games = 24 * cpu_threads;
    }
    let shallow_depth = depth > 0 && depth <= 10;
    let shallow_nodes = task.nodes.is_some_and(|n| n > 0 && n <= 50_000);
    if shallow_depth || shallow_nodes {
        num_games = 6 * cpu_threads;
    }
    if task.kind == TaskKind::Spsa {
        num_games = task.num_games.unwrap_or(num_games);
    }
    round_up_even(num_games)
}

fn round_up_even(n: u32) -> u32 {
    if n % 2 == 0 { n } else { n + 1 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Variant;
    use std::collections::HashMap as Map;

    fn sample_task(kind: TaskKind, game_time_s: f64, depth: u32, nodes: Option<u64>) -> Task {
        Task {
            task_id: "t1".into(),
            kind,
            variant: Variant::Chess,
            engine_url: "http://x/engine".into(),
            weight_url: None,
            baseline_engine_url: "http://x/baseline".into(),
            baseline_weight_url: None,
            time_control: (game_time_s, 0.1, depth),
            nodes,
            move_time: None,
            nodestime: None,
            uci_options: Map::new(),
            baseline_uci_options: Map::new(),
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

    #[test]
    fn long_time_control_scales_one_to_one_with_cpu_threads() {
        let task = sample_task(TaskKind::Normal, 60.0, 0, None);
        assert_eq!(games_for_task(&task, 4), 4);
    }

    #[test]
    fn very_short_time_control_falls_back_to_unscaled_base() {
        let task = sample_task(TaskKind::Normal, 1.0, 0, None);
        assert_eq!(games_for_task(&task, 4), 6);
    }

    #[test]
    fn mid_short_time_control_scales_with_cpu_threads() {
        let task = sample_task(TaskKind::Normal, 2.0, 0, None);
        assert_eq!(games_for_task(&task, 4), 96);
    }

    #[test]
    fn shallow_depth_overrides_time_scaling() {
        let task = sample_task(TaskKind::Normal, 60.0, 6, None);
        assert_eq!(games_for_task(&task, 4), 24);
    }

    #[test]
    fn spsa_uses_explicit_num_games() {
        let mut task = sample_task(TaskKind::Spsa, 10.0, 0, None);
        task.num_games = Some(7);
        assert_eq!(games_for_task(&task, 4), 8);
    }

    #[test]
    fn all_filled_is_true_until_every_opening_completes() {
        let pool = WorkerPoolState::new();
        pool.add_task(sample_task(TaskKind::Spsa, 10.0, 0, None), vec!["f1".into(), "f2".into()]);
        assert!(!pool.all_filled("t1"));
        pool.record_result("t1", "f1", 0, (crate::task::Outcome::Win, sample_record()));
        pool.record_result("t1", "f1", 1, (crate::task::Outcome::Lose, sample_record()));
        assert!(!pool.all_filled("t1")); // f2 still has no entries
        pool.record_result("t1", "f2", 0, (crate::task::Outcome::Draw, sample_record()));
        pool.record_result("t1", "f2", 1, (crate::task::Outcome::Draw, sample_record()));
        assert!(pool.all_filled("t1"));
    }

    #[test]
    fn all_filled_is_vacuously_true_for_unknown_task() {
        let pool = WorkerPoolState::new();
        assert!(pool.all_filled("nope"));
    }

    fn sample_record() -> crate::task::GameRecord {
        crate::task::GameRecord {
            start_fen: "fen".into(),
            order: 0,
            moves: Vec::new(),
            result: 0,
            comment: "test".into(),
        }
    }

    #[test]
    fn failure_retries_once_then_abandons() {
        let pool = WorkerPoolState::new();
        let pair = GamePair { task_id: "t1".into(), fen: "f1".into(), order: 0, error_count: 0 };
        pool.report_failure(pair.clone());
        assert_eq!(pool.drain_abandoned().len(), 0);
        let mut retried = pair;
        retried.error_count = 1;
        pool.report_failure(retried);
        assert_eq!(pool.drain_abandoned().len(), 1);
    }
}
