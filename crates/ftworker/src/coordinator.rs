//! Coordinator Client (SPEC_FULL.md §4.F / §6). Grounded on
//! `util/client_helper.py`'s `heartbeat`/`get_tasks`/`upload_result` and
//! `client.py`'s version-mismatch handling in `heartbeat_loop` /
//! `task_manage_loop` / `result_waiting_loop`.
//!
//! `register_task`/gendata-process handling in `client_helper.py` is dead
//! code in the original server protocol (no endpoint ever triggers it) and
//! is deliberately not ported; see DESIGN.md.

use std::collections::HashMap;
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::task::{Task, TaskKind, TaskResult, Variant};

/// Fixed query-string password `client_helper.py`'s `get_tasks` embeds.
const CLIENT_PASSWORD: &str = "ftclient!";

#[derive(Debug, Serialize)]
struct HeartbeatRequest<'a> {
    client_id: &'a str,
    core_count: usize,
    task_ids: &'a [String],
}

#[derive(Debug, Deserialize, Default)]
pub struct HeartbeatResponse {
    #[serde(default)]
    pub program_version: Option<String>,
    #[serde(default)]
    pub invalid_task_ids: Vec<String>,
}

/// The `task` sub-object inside one `/get_tasks` task entry (SPEC_FULL.md
/// §6's `GET /get_tasks` response shape).
#[derive(Debug, Deserialize)]
struct RawTaskBody {
    engine_url: String,
    #[serde(default)]
    weight_url: Option<String>,
    baseline_engine_url: String,
    #[serde(default)]
    baseline_weight_url: Option<String>,
    time_control: (f64, f64, u32),
    #[serde(default)]
    nodes: Option<u64>,
    #[serde(default)]
    move_time: Option<u32>,
    #[serde(default)]
    nodestime: Option<u32>,
    #[serde(default)]
    uci_options: HashMap<String, String>,
    #[serde(default)]
    baseline_uci_options: HashMap<String, String>,
    #[serde(default)]
    draw_move_limit: Option<u32>,
    #[serde(default)]
    draw_score_limit: Option<i32>,
    #[serde(default)]
    win_move_limit: Option<u32>,
    #[serde(default)]
    win_score_limit: Option<i32>,
    #[serde(default)]
    draw_as_black_win: bool,
    #[serde(default)]
    mate1_judge: bool,
    #[serde(default)]
    book: Option<String>,
    variant: Variant,
    #[serde(default)]
    num_games: Option<u32>,
}

/// One `/get_tasks` entry: `task_id`/`type`/`iter` sit alongside the
/// nested `task` body, not inside it.
#[derive(Debug, Deserialize)]
struct RawTaskEnvelope {
    task_id: String,
    #[serde(rename = "type")]
    kind: TaskKind,
    task: RawTaskBody,
    #[serde(default)]
    iter: Option<u64>,
}

impl RawTaskEnvelope {
    fn into_task(self) -> Task {
        let body = self.task;
        Task {
            task_id: self.task_id,
            kind: self.kind,
            variant: body.variant,
            engine_url: body.engine_url,
            weight_url: body.weight_url,
            baseline_engine_url: body.baseline_engine_url,
            baseline_weight_url: body.baseline_weight_url,
            time_control: body.time_control,
            nodes: body.nodes,
            move_time: body.move_time,
            nodestime: body.nodestime,
            uci_options: body.uci_options,
            baseline_uci_options: body.baseline_uci_options,
            draw_move_limit: body.draw_move_limit,
            draw_score_limit: body.draw_score_limit,
            win_move_limit: body.win_move_limit,
            win_score_limit: body.win_score_limit,
            draw_as_black_win: body.draw_as_black_win,
            mate1_judge: body.mate1_judge,
            book: body.book,
            num_games: body.num_games,
            iter: self.iter,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct GetTasksResponse {
    #[serde(default)]
    program_version: Option<String>,
    #[serde(default)]
    webdrives: Vec<String>,
    #[serde(default)]
    tasks: Vec<RawTaskEnvelope>,
}

/// Result of one `/get_tasks` call: the offered tasks plus the mirror
/// prefixes to download their assets from (SPEC_FULL.md §4.G).
pub struct TaskFetch {
    pub program_version: Option<String>,
    pub tasks: Vec<Task>,
    pub webdrives: Vec<String>,
}

#[derive(Debug, Serialize)]
struct UploadResultRequest<'a> {
    client_id: &'a str,
    task_id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    program_version: &'a str,
    wdl: [u32; 3],
    fwdl: [u32; 3],
    ptnml: [u32; 5],
    game_records: &'a [crate::task::GameRecord],
    iter: Option<u64>,
    vars1: Option<&'a HashMap<String, String>>,
    vars2: Option<&'a HashMap<String, String>>,
}

/// Outcome of one `upload_result` call (SPEC_FULL.md §4.F / §4.H
/// version-kill).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    Ok,
    VersionMismatch,
    Failed,
}

/// A thin, once-built HTTP client for the coordinator's JSON API. Every
/// call logs and returns a failure value on network/non-2xx error rather
/// than propagating one: a coordinator outage should not crash the
/// worker, matching `client_helper.py`'s `except Exception` swallow-and-
/// retry style.
pub struct CoordinatorClient {
    http: reqwest::blocking::Client,
    base_url: String,
}

impl CoordinatorClient {
    pub fn new(base_url: String) -> anyhow::Result<Self> {
        let http = reqwest::blocking::Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self { http, base_url })
    }

    /// `POST /heartbeat` (§6). `task_ids` should be the union of queued
    /// and in-flight task ids (`WorkerPoolState::in_progress_task_ids`).
    pub fn heartbeat(&self, client_id: &str, core_count: usize, task_ids: &[String]) -> Option<HeartbeatResponse> {
        let url = format!("{}/heartbeat", self.base_url);
        let resp = self.http.post(&url).json(&HeartbeatRequest { client_id, core_count, task_ids }).send();
        match resp {
            Ok(r) if r.status().is_success() => r.json().ok(),
            Ok(r) => {
                warn!("heartbeat rejected by coordinator: {}", r.status());
                None
            }
            Err(e) => {
                warn!("heartbeat request failed: {e}");
                None
            }
        }
    }

    /// `GET /get_tasks?password=...&client_id=...&core_count=...` (§6).
    pub fn get_tasks(&self, client_id: &str, core_count: usize) -> Option<TaskFetch> {
        let url = format!("{}/get_tasks", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("password", CLIENT_PASSWORD),
                ("client_id", client_id),
                ("core_count", &core_count.to_string()),
            ])
            .send();
        match resp {
            Ok(r) if r.status().is_success() => match r.json::<GetTasksResponse>() {
                Ok(body) => Some(TaskFetch {
                    program_version: body.program_version,
                    tasks: body.tasks.into_iter().map(RawTaskEnvelope::into_task).collect(),
                    webdrives: body.webdrives,
                }),
                Err(e) => {
                    warn!("get_tasks response decode failed: {e}");
                    None
                }
            },
            Ok(r) => {
                warn!("get_tasks rejected by coordinator: {}", r.status());
                None
            }
            Err(e) => {
                warn!("get_tasks request failed: {e}");
                None
            }
        }
    }

    /// `POST /upload_result` (§6). `"ver"` in the raw response body means
    /// the coordinator considers this client's `program_version` stale.
    pub fn upload_result(&self, client_id: &str, program_version: &str, task: &Task, result: &TaskResult) -> UploadOutcome {
        let url = format!("{}/upload_result", self.base_url);
        let is_spsa = task.kind == TaskKind::Spsa;
        let body = UploadResultRequest {
            client_id,
            task_id: &task.task_id,
            kind: if is_spsa { "spsa" } else { "normal" },
            program_version,
            wdl: result.wdl,
            fwdl: result.fwdl,
            ptnml: result.ptnml,
            game_records: &result.game_records,
            iter: task.iter,
            vars1: is_spsa.then_some(&task.uci_options),
            vars2: is_spsa.then_some(&task.baseline_uci_options),
        };
        let resp = self.http.post(&url).json(&body).send();
        match resp {
            Ok(r) if r.status().is_success() => match r.text() {
                Ok(text) => {
                    if text.trim().trim_matches('"') == "ver" {
                        UploadOutcome::VersionMismatch
                    } else {
                        UploadOutcome::Ok
                    }
                }
                Err(e) => {
                    warn!("upload_result response read failed for task {}: {e}", task.task_id);
                    UploadOutcome::Failed
                }
            },
            Ok(r) => {
                warn!("upload_result rejected by coordinator for task {}: {}", task.task_id, r.status());
                UploadOutcome::Failed
            }
            Err(e) => {
                warn!("upload_result request failed for task {}: {e}", task.task_id);
                UploadOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_with_trailing_slash_base_url() {
        let client = CoordinatorClient::new("http://localhost:6543".into());
        assert!(client.is_ok());
    }

    #[test]
    fn task_envelope_flattens_nested_body_fields() {
        let json = r#"{
            "task_id": "t42",
            "type": "normal",
            "task": {
                "engine_url": "http://x/engine_abc",
                "baseline_engine_url": "http://x/engine_def",
                "time_control": [10.0, 0.1, 0],
                "nodes": 0,
                "variant": "chess"
            }
        }"#;
        let envelope: RawTaskEnvelope = serde_json::from_str(json).unwrap();
        let task = envelope.into_task();
        assert_eq!(task.task_id, "t42");
        assert_eq!(task.kind, TaskKind::Normal);
        assert_eq!(task.variant, Variant::Chess);
        assert_eq!(task.time_control, (10.0, 0.1, 0));
    }

    #[test]
    fn quoted_ver_sentinel_is_recognized_as_version_mismatch() {
        assert_eq!("\"ver\"".trim().trim_matches('"'), "ver");
        assert_eq!("ver".trim().trim_matches('"'), "ver");
    }
}
