//! Fatal error taxonomy for a freeze run.
//!
//! Every variant aborts the run. Orchestration code wraps these in `anyhow`
//! with extra context; callers that need to branch on the kind can downcast.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FreezeError {
    /// Bad build settings or config file. Raised before any resolution starts.
    #[error("configuration error: {0}")]
    Config(String),

    /// A required root could not be located or read.
    #[error("cannot resolve module '{name}' at {}: {reason}", path.display())]
    Resolution {
        name: String,
        path: PathBuf,
        reason: String,
    },

    #[error(
        "scripts directory should not exist prior to running a build: {}",
        path.display()
    )]
    EnvironmentConflict { path: PathBuf },

    #[error("packager '{command}' failed: {reason}")]
    Packager { command: String, reason: String },
}

impl FreezeError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn resolution(name: &str, path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Resolution {
            name: name.to_string(),
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type FreezeResult<T> = std::result::Result<T, FreezeError>;
