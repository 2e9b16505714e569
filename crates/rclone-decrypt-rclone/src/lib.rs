#![forbid(unsafe_code)]

//! Host integration for the decrypt workflow.
//!
//! `system` implements `RemoteTool` on top of the `rclone` CLI. `command` keeps
//! process spawning, timeouts and cancellation in one place.

mod command;
mod system;

pub use system::{resolve_rclone_path, SystemRclone, DEFAULT_RCLONE_PATHS};
