#![forbid(unsafe_code)]

//! Core building blocks for decrypting rclone crypt trees without a remote.
//!
//! The workflow rewrites an rclone configuration so its crypt remotes read from
//! a private staging directory, moves the target there, lets rclone copy the
//! decrypted view out, and always moves the target back. The external tool sits
//! behind `RemoteTool`; `rclone-decrypt-rclone` provides the real one.

pub mod attempt;
pub mod cancel;
pub mod candidates;
pub mod config;
pub mod decrypt;
pub mod error;
pub mod logging;
pub mod rewrite;
pub mod staging;
pub mod tool;

pub use attempt::{attempt_all, CopyOutcome, CopyStatus};
pub use cancel::CancelToken;
pub use candidates::{enumerate, parse_listremotes};
pub use config::{default_output_dir, default_rclone_config_path, DecryptSettings};
pub use decrypt::{DecryptReport, DecryptRequest, Decryptor};
pub use error::{DecryptError, DecryptResult};
pub use rewrite::{rewrite, ConfigRewriter, RewriteRules, ScanState};
pub use tool::{AdaptedConfig, CandidateName, RemoteTool};
