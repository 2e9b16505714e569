//! Contract for the external decrypting tool.
//!
//! The workflow only needs two verbs from rclone. Keeping them behind a trait
//! lets the staging protocol run against scripted fakes in tests.

use crate::error::{DecryptError, DecryptResult};
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::Path;
use tempfile::TempPath;

/// Name of a remote defined by the adapted configuration.
///
/// Stored without the trailing `:` that `rclone listremotes` prints.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CandidateName(String);

impl CandidateName {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let trimmed = name.trim();
        Self(trimmed.strip_suffix(':').unwrap_or(trimmed).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Source argument for `rclone copy` (the remote root, `name:`).
    pub fn as_source(&self) -> String {
        format!("{}:", self.0)
    }
}

impl fmt::Display for CandidateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Verbs the workflow drives on the external tool.
pub trait RemoteTool {
    type Error: Error + Send + Sync + 'static;

    /// Human-readable identification used in logs (usually the binary path).
    fn describe(&self) -> String;

    /// Fail fast when the tool cannot be run at all.
    fn ensure_available(&self) -> Result<(), Self::Error>;

    /// Run `listremotes` with `config` as the only configuration source.
    fn list_remotes(&self, config: &Path) -> Result<Vec<CandidateName>, Self::Error>;

    /// Run `copy <source:> <dest>`; `Ok` only on a zero exit status.
    fn copy(&self, config: &Path, source: &CandidateName, dest: &Path)
        -> Result<(), Self::Error>;
}

/// Rewritten configuration, materialised as a private temp file.
///
/// The file is closed before any subprocess reads it and removed when the value
/// is dropped, including on early returns.
#[derive(Debug)]
pub struct AdaptedConfig {
    contents: String,
    path: TempPath,
}

impl AdaptedConfig {
    pub fn materialize(contents: String) -> DecryptResult<Self> {
        let file = tempfile::Builder::new()
            .prefix("rclone-decrypt-")
            .suffix(".conf")
            .tempfile()
            .map_err(|err| {
                DecryptError::ConfigAdaptation(format!(
                    "unable to create temporary rclone config: {err}"
                ))
            })?;
        let path = file.into_temp_path();
        fs::write(&path, contents.as_bytes()).map_err(|err| {
            DecryptError::ConfigAdaptation(format!(
                "unable to write temporary rclone config {}: {err}",
                path.display()
            ))
        })?;
        Ok(Self { contents, path })
    }

    pub fn contents(&self) -> &str {
        &self.contents
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_strips_listremotes_colon() {
        let name = CandidateName::new("secret:\n");
        assert_eq!(name.as_str(), "secret");
        assert_eq!(name.as_source(), "secret:");
        assert_eq!(name.to_string(), "secret");
    }

    #[test]
    fn adapted_config_file_is_removed_on_drop() {
        let adapted = AdaptedConfig::materialize("[a]\ntype = crypt\n".into()).unwrap();
        let path = adapted.path().to_path_buf();
        assert_eq!(fs::read_to_string(&path).unwrap(), "[a]\ntype = crypt\n");
        drop(adapted);
        assert!(!path.exists());
    }
}
