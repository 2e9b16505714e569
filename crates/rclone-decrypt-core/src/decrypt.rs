//! The decrypt workflow: stage, adapt, enumerate, copy, restore.
//!
//! Once the target has been moved into staging, every path out of
//! `Decryptor::decrypt` goes through `RelocatedTarget::restore` (or its `Drop`
//! during unwinding) before control returns to the caller.

use crate::attempt::{attempt_all, CopyOutcome};
use crate::cancel::CancelToken;
use crate::candidates::enumerate;
use crate::error::{DecryptError, DecryptResult};
use crate::rewrite::{ConfigRewriter, RewriteRules};
use crate::staging::StagingArea;
use crate::tool::{AdaptedConfig, CandidateName, RemoteTool};
use log::{debug, info, warn};
use std::env;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Placeholder location used when previewing an adapted config.
pub const PREVIEW_STAGING_PATH: &str = "/path/to/staging";

/// Inputs for one decrypt call, already resolved against defaults.
#[derive(Debug, Clone)]
pub struct DecryptRequest {
    pub target: PathBuf,
    pub rclone_config: PathBuf,
    pub output_dir: PathBuf,
}

/// What happened during one decrypt call.
#[derive(Debug, Clone)]
pub struct DecryptReport {
    pub target: PathBuf,
    pub output_dir: PathBuf,
    pub outcomes: Vec<CopyOutcome>,
    pub interrupted: bool,
}

impl DecryptReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn any_success(&self) -> bool {
        self.succeeded() > 0
    }
}

/// Drives one or more decrypt operations against a `RemoteTool`.
#[derive(Debug, Clone)]
pub struct Decryptor<T> {
    tool: T,
    rules: RewriteRules,
    cancel: CancelToken,
}

impl<T> Decryptor<T>
where
    T: RemoteTool<Error = DecryptError>,
{
    pub fn new(tool: T, cancel: CancelToken) -> Self {
        Self {
            tool,
            rules: RewriteRules::default(),
            cancel,
        }
    }

    pub fn with_rules(mut self, rules: RewriteRules) -> Self {
        self.rules = rules;
        self
    }

    /// Read `rclone_config` and rewrite it against `staging`.
    pub fn adapt(&self, rclone_config: &Path, staging: &Path) -> DecryptResult<AdaptedConfig> {
        let document = fs::read_to_string(rclone_config).map_err(|err| {
            DecryptError::ConfigAdaptation(format!(
                "unable to read rclone config {}: {err}",
                rclone_config.display()
            ))
        })?;
        let staging = staging.to_string_lossy();
        let rewriter = ConfigRewriter::new(self.rules.clone(), &staging);
        for header in rewriter.misplaced_locations(&document) {
            warn!(
                "{header}: `{}` appears before `{}` and was dropped; move it below the type line",
                self.rules.location_key, self.rules.type_key
            );
        }
        AdaptedConfig::materialize(rewriter.rewrite_document(&document))
    }

    /// Adapt against a placeholder path and list the candidates without
    /// touching any target.
    pub fn preview(
        &self,
        rclone_config: &Path,
    ) -> DecryptResult<(AdaptedConfig, Vec<CandidateName>)> {
        self.tool.ensure_available()?;
        let adapted = self.adapt(rclone_config, Path::new(PREVIEW_STAGING_PATH))?;
        let candidates = enumerate(&self.tool, &adapted)?;
        Ok((adapted, candidates))
    }

    /// Decrypt `request.target` into `request.output_dir`.
    ///
    /// Fails only when staging or relocation fails. Candidate failures and
    /// interruption are reported through the returned `DecryptReport`; a
    /// cancellation seen before the target moves yields an empty, interrupted
    /// report.
    pub fn decrypt(&self, request: &DecryptRequest) -> DecryptResult<DecryptReport> {
        self.tool.ensure_available()?;

        let original = absolute_path(&request.target)?;
        let output_dir = absolute_path(&request.output_dir)?;
        if fs::symlink_metadata(&original).is_err() {
            return Err(DecryptError::Relocation(format!(
                "{} does not exist",
                original.display()
            )));
        }
        if output_dir.starts_with(&original) {
            return Err(DecryptError::Relocation(format!(
                "output directory {} must not live inside the target {}",
                output_dir.display(),
                original.display()
            )));
        }
        let parent = original.parent().ok_or_else(|| {
            DecryptError::Relocation(format!("{} has no parent directory", original.display()))
        })?;
        // rclone copies the staged entry under its own name, which would
        // occupy the original path and block the move back.
        if output_dir.as_path() == parent {
            return Err(DecryptError::Relocation(format!(
                "output directory {} must not be the directory holding the target",
                output_dir.display()
            )));
        }

        let area = StagingArea::create_in(parent)?;
        let adapted = self.adapt(&request.rclone_config, area.path())?;
        let candidates = match enumerate(&self.tool, &adapted) {
            Ok(candidates) if !self.cancel.is_cancelled() => candidates,
            Ok(_) | Err(DecryptError::Interrupted) => {
                info!("interrupted before {} was staged", original.display());
                return Ok(DecryptReport {
                    target: original,
                    output_dir,
                    outcomes: Vec::new(),
                    interrupted: true,
                });
            }
            Err(err) => return Err(err),
        };

        let staged = area.relocate_in(&original)?;
        debug!(
            "staged {} at {}",
            original.display(),
            staged.staged().display()
        );
        let copied = self.copy_phase(adapted.path(), &candidates, &output_dir);
        staged.restore()?;
        drop(adapted);
        let outcomes = copied?;

        if let Err(err) = area.release() {
            warn!("{err}");
        }

        let interrupted = self.cancel.is_cancelled();
        if interrupted {
            info!("terminated rclone copy; {} restored", original.display());
        } else {
            info!(
                "Decryption complete. Files saved to: {}",
                output_dir.display()
            );
        }

        Ok(DecryptReport {
            target: original,
            output_dir,
            outcomes,
            interrupted,
        })
    }

    fn copy_phase(
        &self,
        config: &Path,
        candidates: &[CandidateName],
        output_dir: &Path,
    ) -> DecryptResult<Vec<CopyOutcome>> {
        if !output_dir.is_dir() {
            info!("Creating output directory: {}", output_dir.display());
            fs::create_dir_all(output_dir).map_err(|err| {
                DecryptError::Io(io::Error::new(
                    err.kind(),
                    format!(
                        "unable to create output directory {}: {err}",
                        output_dir.display()
                    ),
                ))
            })?;
        }

        Ok(attempt_all(
            &self.tool,
            config,
            candidates,
            output_dir,
            &self.cancel,
        ))
    }
}

/// Absolute, lexically normalised form of `path` (no symlink resolution).
pub fn absolute_path(path: &Path) -> DecryptResult<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()?.join(path)
    };

    let mut normalised = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalised.pop();
            }
            other => normalised.push(other.as_os_str()),
        }
    }
    Ok(normalised)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_path_normalises_dots() {
        let path = absolute_path(Path::new("/data/./enc/../vault/")).unwrap();
        assert_eq!(path, PathBuf::from("/data/vault"));
    }

    #[test]
    fn relative_paths_are_anchored_at_cwd() {
        let cwd = env::current_dir().unwrap();
        assert_eq!(absolute_path(Path::new("x")).unwrap(), cwd.join("x"));
    }
}
