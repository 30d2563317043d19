//! Error kinds a caller needs to branch on, as opposed to the
//! `anyhow::Result` used everywhere errors are only ever propagated and
//! logged (SPEC_FULL.md §3 "Errors").

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("engine process I/O error: {0}")]
    EngineIo(#[from] std::io::Error),

    #[error("engine protocol violation: {0}")]
    EngineProtocol(String),

    #[error("engine did not reply within the move deadline")]
    Timeout,

    #[error("required asset missing or unusable: {0}")]
    AssetMissing(String),

    #[error("coordinator request failed: {0}")]
    Coordinator(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}
