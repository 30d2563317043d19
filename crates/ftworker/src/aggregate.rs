//! Result Aggregator (SPEC_FULL.md §4.E). Grounded on `client.py`'s
//! `result_waiting_loop`, unified into a single implementation (the
//! original duplicates this accumulation between `client.py` and
//! `fishtest.py`; SPEC_FULL.md calls for one).

use crate::task::{pentanomial_index, wdl_index, GameSlot, Outcome, TaskKind, TaskResult};

/// Accumulates every completed `(fen, GameSlot)` pair into `result`,
/// matching the wdl/fwdl/ptnml bookkeeping in `result_waiting_loop`.
///
/// `kind` is accepted for symmetry with the caller's gating (SPSA tasks
/// only reach this function once every opening has both orders filled,
/// via `WorkerPoolState::all_filled`) but does not change what gets
/// accumulated: the original always computes fwdl/ptnml per completed
/// fen regardless of task kind — its `":" in task_id` SPSA check only
/// gates *when* a task's batch is processed, never *what* is counted.
pub fn accumulate(result: &mut TaskResult, _kind: TaskKind, fen_slots: Vec<(String, GameSlot)>) {
    for (_fen, slot) in fen_slots {
        let [Some((r0, rec0)), Some((r1, rec1))] = slot.entries else {
            continue;
        };
        result.wdl[wdl_index(r0)] += 1;
        result.wdl[wdl_index(r1)] += 1;
        result.game_records.push(rec0.clone());
        result.game_records.push(rec1.clone());

        // fwdl tracks only the first-of-pair (order 0) game (§4.E).
        result.fwdl[wdl_index(r0)] += 1;
        result.ptnml[pentanomial_index(r0, r1)] += 1;
    }
}

/// `true` once every opening fen tracked for `task_id` has both order
/// slots filled and the task can be closed out (all games played).
pub fn task_is_exhausted(remaining_fens: usize) -> bool {
    remaining_fens == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{GameRecord, MoveEntry};

    fn record(result: i32) -> (Outcome, GameRecord) {
        let outcome = match result.signum() {
            1 => Outcome::Win,
            -1 => Outcome::Lose,
            _ => Outcome::Draw,
        };
        (
            outcome,
            GameRecord {
                start_fen: "fen".into(),
                order: 0,
                moves: Vec::<MoveEntry>::new(),
                result,
                comment: "test".into(),
            },
        )
    }

    #[test]
    fn accumulates_wdl_and_ptnml_for_normal_task() {
        let mut result = TaskResult::default();
        let mut slot = GameSlot::default();
        slot.entries[0] = Some(record(1));
        slot.entries[1] = Some(record(-1));
        accumulate(&mut result, TaskKind::Normal, vec![("fen".into(), slot)]);
        assert_eq!(result.wdl, [1, 0, 1]);
        assert_eq!(result.game_records.len(), 2);
        assert_eq!(result.ptnml.iter().sum::<u32>(), 1);
    }

    #[test]
    fn spsa_tasks_accumulate_pentanomial_like_normal_tasks() {
        let mut result = TaskResult::default();
        let mut slot = GameSlot::default();
        slot.entries[0] = Some(record(1));
        slot.entries[1] = Some(record(0));
        accumulate(&mut result, TaskKind::Spsa, vec![("fen".into(), slot)]);
        assert_eq!(result.wdl, [1, 1, 0]);
        assert_eq!(result.fwdl, [1, 0, 0]);
        assert_eq!(result.ptnml.iter().sum::<u32>(), 1);
    }

    #[test]
    fn incomplete_slots_are_skipped() {
        let mut result = TaskResult::default();
        let mut slot = GameSlot::default();
        slot.entries[0] = Some(record(1));
        accumulate(&mut result, TaskKind::Normal, vec![("fen".into(), slot)]);
        assert_eq!(result.wdl, [0, 0, 0]);
    }
}
