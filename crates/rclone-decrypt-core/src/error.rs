//! Error kinds surfaced by the decrypt workflow.
//!
//! Fatal kinds unwind to the caller once staging has been cleaned up. Errors
//! raised by a single `copy` are folded into a `CopyStatus` by the copy loop
//! and never escape `decrypt`.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type DecryptResult<T> = Result<T, DecryptError>;

#[derive(Debug, Error)]
pub enum DecryptError {
    #[error("rclone executable not found: {0}")]
    ToolMissing(String),

    #[error("could not adapt rclone configuration: {0}")]
    ConfigAdaptation(String),

    #[error("could not stage target: {0}")]
    Relocation(String),

    #[error(
        "target left in staging at {} and could not be moved back to {}: {reason}; move it back manually",
        staged.display(),
        original.display()
    )]
    Stranded {
        staged: PathBuf,
        original: PathBuf,
        reason: String,
    },

    #[error("copy from `{candidate}` failed: {reason}")]
    CopyAttempt {
        candidate: String,
        /// `None` when the process was killed by a signal.
        exit_code: Option<i32>,
        reason: String,
    },

    #[error("{0}")]
    Timeout(String),

    #[error("operation interrupted")]
    Interrupted,

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse TOML settings: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to parse YAML settings: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
