//! Private staging directory and the relocation guard that brings the target
//! back.
//!
//! The staging directory is created next to the target so both moves are plain
//! renames on one filesystem. It is only ever removed with `remove_dir`, which
//! refuses non-empty directories: a target that could not be moved back is left
//! in place rather than deleted.

use crate::error::{DecryptError, DecryptResult};
use log::{debug, error, info, warn};
use std::fs;
use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

const STAGING_PREFIX: &str = ".rclone-decrypt-";

/// Operation-scoped staging directory.
#[derive(Debug)]
pub struct StagingArea {
    path: PathBuf,
    released: bool,
}

impl StagingArea {
    /// Create a fresh, private directory inside `parent`.
    pub fn create_in(parent: &Path) -> DecryptResult<Self> {
        let base = format!("{STAGING_PREFIX}{}", std::process::id());
        for idx in 0..1000u32 {
            let candidate = parent.join(format!("{base}-{idx}"));
            match create_private_dir(&candidate) {
                Ok(()) => {
                    debug!("created staging directory {}", candidate.display());
                    return Ok(Self {
                        path: candidate,
                        released: false,
                    });
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(err) => {
                    return Err(DecryptError::Relocation(format!(
                        "unable to create staging directory in {}: {err}",
                        parent.display()
                    )))
                }
            }
        }

        Err(DecryptError::Relocation(format!(
            "unable to find a free staging directory name in {}",
            parent.display()
        )))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Move `original` into the staging directory under its own base name.
    ///
    /// The returned guard borrows the area, so the directory outlives the
    /// relocation. Dropping the guard without `restore` still moves the target
    /// back.
    pub fn relocate_in(&self, original: &Path) -> DecryptResult<RelocatedTarget<'_>> {
        let name = original.file_name().ok_or_else(|| {
            DecryptError::Relocation(format!("{} has no file name", original.display()))
        })?;
        let staged = self.path.join(name);

        fs::rename(original, &staged).map_err(|err| {
            DecryptError::Relocation(format!(
                "unable to move {} into {}: {err}",
                original.display(),
                self.path.display()
            ))
        })?;
        info!("Decrypting: {}", original.display());

        Ok(RelocatedTarget {
            original: original.to_path_buf(),
            staged,
            restored: false,
            _area: PhantomData,
        })
    }

    /// Remove the (now empty) staging directory.
    pub fn release(mut self) -> DecryptResult<()> {
        self.released = true;
        fs::remove_dir(&self.path).map_err(|err| {
            DecryptError::Io(io::Error::new(
                err.kind(),
                format!(
                    "unable to remove staging directory {}: {err}",
                    self.path.display()
                ),
            ))
        })
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = fs::remove_dir(&self.path) {
            warn!(
                "staging directory {} was not removed: {err}",
                self.path.display()
            );
        }
    }
}

/// Proof that the target currently lives inside a staging area.
#[derive(Debug)]
pub struct RelocatedTarget<'a> {
    original: PathBuf,
    staged: PathBuf,
    restored: bool,
    _area: PhantomData<&'a StagingArea>,
}

impl RelocatedTarget<'_> {
    pub fn staged(&self) -> &Path {
        &self.staged
    }

    /// Move the target back to where it came from.
    pub fn restore(mut self) -> DecryptResult<()> {
        self.move_back()
    }

    fn move_back(&mut self) -> DecryptResult<()> {
        if self.restored {
            return Ok(());
        }
        self.restored = true;

        fs::rename(&self.staged, &self.original).map_err(|err| {
            let stranded = DecryptError::Stranded {
                staged: self.staged.clone(),
                original: self.original.clone(),
                reason: err.to_string(),
            };
            error!("{stranded}");
            stranded
        })?;
        debug!("restored {}", self.original.display());
        Ok(())
    }
}

impl Drop for RelocatedTarget<'_> {
    fn drop(&mut self) {
        let _ = self.move_back();
    }
}

#[cfg(unix)]
fn create_private_dir(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().mode(0o700).create(path)
}

#[cfg(not(unix))]
fn create_private_dir(path: &Path) -> io::Result<()> {
    fs::create_dir(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn staging_dirs_are_unique_siblings() {
        let dir = tempdir().unwrap();
        let first = StagingArea::create_in(dir.path()).unwrap();
        let second = StagingArea::create_in(dir.path()).unwrap();
        assert_ne!(first.path(), second.path());
        assert_eq!(first.path().parent(), Some(dir.path()));
        first.release().unwrap();
        second.release().unwrap();
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn restore_moves_target_back() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("vault");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("blob.bin"), b"ciphertext").unwrap();

        let area = StagingArea::create_in(dir.path()).unwrap();
        let staged = area.relocate_in(&target).unwrap();
        assert!(!target.exists());
        assert!(staged.staged().join("blob.bin").is_file());

        staged.restore().unwrap();
        assert_eq!(fs::read(target.join("blob.bin")).unwrap(), b"ciphertext");
        area.release().unwrap();
    }

    #[test]
    fn dropping_guard_restores_target() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("file.bin");
        fs::write(&target, b"x").unwrap();

        let area = StagingArea::create_in(dir.path()).unwrap();
        let staging = area.path().to_path_buf();
        {
            let _staged = area.relocate_in(&target).unwrap();
            assert!(!target.exists());
        }
        assert!(target.is_file());
        drop(area);
        assert!(!staging.exists());
    }

    #[test]
    fn missing_target_is_a_relocation_error() {
        let dir = tempdir().unwrap();
        let area = StagingArea::create_in(dir.path()).unwrap();
        let err = area.relocate_in(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, DecryptError::Relocation(_)));
    }

    #[test]
    fn non_empty_staging_dir_is_never_deleted() {
        let dir = tempdir().unwrap();
        let area = StagingArea::create_in(dir.path()).unwrap();
        let leftover = area.path().join("leftover");
        fs::write(&leftover, b"keep me").unwrap();

        assert!(area.release().is_err());
        assert!(leftover.is_file());
    }
}
