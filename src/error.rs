//! Error taxonomy for the scan engine.
//!
//! Two families, matching the error-handling design: [`FatalError`] aborts a
//! scan before it starts, while [`Recoverable`] is swallowed at the pid- or
//! mapping-loop boundary and never escapes a component's public API.

use std::path::PathBuf;

use thiserror::Error;

/// Configuration or environment problems. Abort before scanning.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("invalid restart mode: {0}")]
    InvalidRestartMode(String),
    #[error("no UI backend available")]
    NoUiBackend,
    #[error("invalid hook directory: {0}")]
    InvalidHookDir(PathBuf),
    #[error("unreadable configuration: {0}")]
    UnreadableConfig(String),
}

/// Races against a live system. Always handled internally; a pid or mapping
/// that hits one of these contributes no facts to the report.
#[derive(Debug, Error)]
pub(crate) enum Recoverable {
    #[error("pid vanished mid-scan")]
    Vanished,
    #[error("failed to parse: {0}")]
    ParseFailure(String),
    #[error("stat failed on {0}")]
    StatFailure(PathBuf),
}
