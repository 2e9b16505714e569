//! `RemoteTool` implementation backed by the host `rclone` binary.

use crate::command::{classify_copy_failure, RcloneCommand};
use log::debug;
use rclone_decrypt_core::error::{DecryptError, DecryptResult};
use rclone_decrypt_core::{
    parse_listremotes, CancelToken, CandidateName, DecryptSettings, RemoteTool,
};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_RCLONE_PATHS: &[&str] = &[
    "/usr/bin/rclone",
    "/usr/local/bin/rclone",
    "/opt/homebrew/bin/rclone",
    "/snap/bin/rclone",
];

#[cfg(windows)]
const BINARY_NAME: &str = "rclone.exe";
#[cfg(not(windows))]
const BINARY_NAME: &str = "rclone";

/// Drives `rclone listremotes` and `rclone copy`.
#[derive(Debug, Clone)]
pub struct SystemRclone {
    rclone: RcloneCommand,
}

impl SystemRclone {
    /// Resolve the binary from settings and build a tool bound to `cancel`.
    pub fn from_settings(settings: &DecryptSettings, cancel: CancelToken) -> DecryptResult<Self> {
        let binary = resolve_rclone_path(settings.binary_path().as_deref())?;
        Ok(Self::with_binary(binary, settings.timeout(), cancel))
    }

    pub fn with_binary(binary: PathBuf, timeout: Duration, cancel: CancelToken) -> Self {
        debug!("using rclone at {}", binary.display());
        Self {
            rclone: RcloneCommand::new(binary, timeout, cancel),
        }
    }
}

impl RemoteTool for SystemRclone {
    type Error = DecryptError;

    fn describe(&self) -> String {
        self.rclone.binary().display().to_string()
    }

    fn ensure_available(&self) -> DecryptResult<()> {
        if self.rclone.binary().is_file() {
            Ok(())
        } else {
            Err(DecryptError::ToolMissing(format!(
                "{} no longer exists. Please install rclone and ensure it is in your PATH",
                self.rclone.binary().display()
            )))
        }
    }

    fn list_remotes(&self, config: &Path) -> DecryptResult<Vec<CandidateName>> {
        let out = self.rclone.run_verb("listremotes", config, &[])?;
        if !out.success() {
            return Err(DecryptError::ConfigAdaptation(format!(
                "rclone listremotes exited with code {}: {}",
                out.status,
                out.diagnostic()
            )));
        }
        Ok(parse_listremotes(&out.stdout))
    }

    fn copy(&self, config: &Path, source: &CandidateName, dest: &Path) -> DecryptResult<()> {
        let source_arg = source.as_source();
        let dest_arg = dest.to_string_lossy();
        let out = self
            .rclone
            .run_verb("copy", config, &[source_arg.as_str(), &*dest_arg])?;
        if out.success() {
            return Ok(());
        }

        Err(DecryptError::CopyAttempt {
            candidate: source.to_string(),
            exit_code: out.exit_code(),
            reason: classify_copy_failure(&source_arg, dest, &out),
        })
    }
}

/// Explicit path (must exist), then `PATH`, then well-known locations.
pub fn resolve_rclone_path(explicit: Option<&Path>) -> DecryptResult<PathBuf> {
    if let Some(candidate) = explicit {
        if !candidate.is_file() {
            return Err(DecryptError::ToolMissing(format!(
                "rclone binary not found at {}",
                candidate.display()
            )));
        }
        return Ok(candidate.to_path_buf());
    }

    if let Some(found) = find_in_path(BINARY_NAME) {
        return Ok(found);
    }

    DEFAULT_RCLONE_PATHS
        .iter()
        .map(Path::new)
        .find(|path| path.is_file())
        .map(Path::to_path_buf)
        .ok_or_else(|| {
            DecryptError::ToolMissing(format!(
                "tried PATH and {:?}. Please install rclone and ensure it is in your PATH",
                DEFAULT_RCLONE_PATHS
            ))
        })
}

fn find_in_path(binary: &str) -> Option<PathBuf> {
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths).find_map(|dir| {
        let candidate = dir.join(binary);
        if candidate.is_file() {
            Some(candidate)
        } else {
            None
        }
    })
}
