//! CLI entry point: parses flags (optionally merged with a TOML config
//! file), builds the shared `Context`, wires a Ctrl-C handler, and runs
//! the orchestrator until shutdown.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use clap::Parser;
use serde::Deserialize;

use ftworker::context::Context;
use ftworker::orchestrator;

#[derive(clap::Parser, Debug)]
#[command(about = "distributed game-engine testing worker")]
struct Cli {
    /// Optional TOML config file; CLI flags override values loaded from it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Coordinator base URL, e.g. "https://tests.example.org"
    #[arg(long)]
    base_url: Option<String>,

    /// Account name embedded in the client id ("{user}/{rand8}")
    #[arg(long)]
    user: Option<String>,

    /// Root directory for downloaded engine/weight files
    #[arg(long)]
    files_root: Option<PathBuf>,

    /// Root directory for opening books
    #[arg(long)]
    books_root: Option<PathBuf>,

    /// Webdrive mirror URL prefixes, can be repeated
    #[arg(long = "webdrive", num_args = 1)]
    webdrives: Vec<String>,

    /// Override the worker-thread count (default: host physical core count)
    #[arg(long)]
    workers: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    base_url: Option<String>,
    user: Option<String>,
    files_root: Option<PathBuf>,
    books_root: Option<PathBuf>,
    #[serde(default)]
    webdrives: Vec<String>,
    workers: Option<usize>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();
    let file_cfg = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            toml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))?
        }
        None => FileConfig::default(),
    };

    let base_url = cli
        .base_url
        .or(file_cfg.base_url)
        .ok_or_else(|| anyhow::anyhow!(ftworker::error::WorkerError::Config("--base-url (or config base_url) is required".into())))?;
    let user = cli.user.or(file_cfg.user).unwrap_or_else(|| "anonymous".to_string());
    let files_root = cli.files_root.or(file_cfg.files_root).unwrap_or_else(|| PathBuf::from("./files"));
    let books_root = cli.books_root.or(file_cfg.books_root).unwrap_or_else(|| PathBuf::from("./books"));
    let webdrives = if cli.webdrives.is_empty() { file_cfg.webdrives } else { cli.webdrives };
    let workers = cli.workers.or(file_cfg.workers);

    if base_url.is_empty() {
        bail!(ftworker::error::WorkerError::Config("base_url must not be empty".into()));
    }

    let ctx = Arc::new(Context::new(&user, base_url, files_root, books_root, webdrives)?);
    log::info!("client_id={}", ctx.client_id);

    {
        let ctx = Arc::clone(&ctx);
        ctrlc::set_handler(move || {
            log::warn!("received interrupt signal, shutting down gracefully");
            ctx.shut_down();
        })
        .ok();
    }

    orchestrator::run(ctx, workers)
}
