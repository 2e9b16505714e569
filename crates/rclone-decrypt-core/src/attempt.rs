//! Runs `copy` once per candidate remote and records how each attempt went.
//!
//! Every candidate is tried even after one succeeds: a config usually holds a
//! single viable crypt remote, and failures from the others are expected.

use crate::cancel::CancelToken;
use crate::error::DecryptError;
use crate::tool::{CandidateName, RemoteTool};
use log::{info, warn};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyStatus {
    Succeeded,
    /// rclone ran and exited non-zero.
    Failed {
        exit_code: Option<i32>,
        diagnostic: String,
    },
    TimedOut { diagnostic: String },
    /// rclone could not be started at all.
    Errored { diagnostic: String },
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyOutcome {
    pub candidate: CandidateName,
    pub status: CopyStatus,
}

impl CopyOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, CopyStatus::Succeeded)
    }
}

/// Try every candidate in order; never fails.
///
/// Stops early only when `cancel` fires. The attempt in flight at that moment
/// is recorded as `Cancelled` and the rest are skipped.
pub fn attempt_all<T>(
    tool: &T,
    config: &Path,
    candidates: &[CandidateName],
    output_dir: &Path,
    cancel: &CancelToken,
) -> Vec<CopyOutcome>
where
    T: RemoteTool<Error = DecryptError>,
{
    let mut outcomes = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        if cancel.is_cancelled() {
            break;
        }

        info!("Copying and decrypting: {candidate}");
        let status = match tool.copy(config, candidate, output_dir) {
            Ok(()) => CopyStatus::Succeeded,
            Err(DecryptError::Interrupted) => CopyStatus::Cancelled,
            Err(_) if cancel.is_cancelled() => CopyStatus::Cancelled,
            Err(DecryptError::Timeout(diagnostic)) => {
                warn!("Failed to decrypt {candidate}: {diagnostic}");
                CopyStatus::TimedOut { diagnostic }
            }
            Err(DecryptError::CopyAttempt {
                exit_code, reason, ..
            }) => {
                warn!("Failed to decrypt {candidate}. rclone error: {reason}");
                CopyStatus::Failed {
                    exit_code,
                    diagnostic: reason,
                }
            }
            Err(err) => {
                let diagnostic = format!("could not run rclone: {err}");
                warn!("Failed to decrypt {candidate}. {diagnostic}");
                CopyStatus::Errored { diagnostic }
            }
        };

        let cancelled = matches!(status, CopyStatus::Cancelled);
        outcomes.push(CopyOutcome {
            candidate: candidate.clone(),
            status,
        });
        if cancelled {
            info!("terminated rclone copy");
            break;
        }
    }

    outcomes
}
