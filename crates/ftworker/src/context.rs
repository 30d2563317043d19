//! Global orchestrator state (SPEC_FULL.md §9 "global state scoped to a
//! `Context` object"), replacing `client.py`'s module-level globals
//! (`client_id`, `running`, `downloaded_file_list`, ...) with one struct
//! threaded through every component.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use rand::distr::Alphanumeric;
use rand::Rng;

use crate::assets::AssetStore;
use crate::coordinator::CoordinatorClient;
use crate::queue::WorkerPoolState;

pub const PROGRAM_VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct Context {
    pub running: Arc<AtomicBool>,
    pub client_id: String,
    pub program_version: &'static str,
    pub files_root: PathBuf,
    pub books_root: PathBuf,
    pub webdrives: Vec<String>,
    pub pool: Arc<WorkerPoolState>,
    pub coordinator: Arc<CoordinatorClient>,
    pub assets: Arc<Mutex<AssetStore>>,
}

impl Context {
    pub fn new(
        user: &str,
        base_url: String,
        files_root: PathBuf,
        books_root: PathBuf,
        webdrives: Vec<String>,
    ) -> anyhow::Result<Self> {
        let client_id = format!("{user}/{}", random_suffix());
        let coordinator = CoordinatorClient::new(base_url)?;
        let mut assets = AssetStore::new(files_root.clone());
        assets.scan_existing()?;
        Ok(Self {
            running: Arc::new(AtomicBool::new(true)),
            client_id,
            program_version: PROGRAM_VERSION,
            files_root,
            books_root,
            webdrives,
            pool: Arc::new(WorkerPoolState::new()),
            coordinator: Arc::new(coordinator),
            assets: Arc::new(Mutex::new(assets)),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn shut_down(&self) {
        self.running.store(false, std::sync::atomic::Ordering::SeqCst);
    }
}

fn random_suffix() -> String {
    rand::rng().sample_iter(&Alphanumeric).take(8).map(char::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_id_embeds_user_and_random_suffix() {
        let suffix = random_suffix();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
