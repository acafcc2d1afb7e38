//! Atomic placement of output files and directories.
//!
//! Everything is staged next to its destination (`NamedTempFile::new_in`,
//! `TempDir::new_in`) and moved into place in one step, so an interrupted
//! run never leaves a half-written container behind.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::{NamedTempFile, TempDir};
use thiserror::Error;

/// Highest numeric suffix tried before giving up.
const MAX_SUFFIX: u32 = 9_999;

/// What to do when the destination name is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionPolicy {
    /// Replace the existing file or directory.
    Overwrite,
    /// Append `-1`, `-2`, ... to the stem until the name is free.
    Suffix,
}

impl CollisionPolicy {
    /// `Overwrite` when `force` is set, `Suffix` otherwise.
    pub fn from_force(force: bool) -> Self {
        if force { Self::Overwrite } else { Self::Suffix }
    }
}

/// Errors raised while placing output.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The staged file could not be moved into place.
    #[error("Failed to persist output: {0}")]
    Persist(#[from] tempfile::PersistError),

    /// Every suffixed name is already taken.
    #[error("No free file name left for {0}")]
    Exhausted(PathBuf),
}

fn candidate(dir: &Path, stem: &str, ext: Option<&str>, n: u32) -> PathBuf {
    let base = if n == 0 { stem.to_string() } else { format!("{stem}-{n}") };
    match ext {
        Some(ext) => dir.join(format!("{base}.{ext}")),
        None => dir.join(base),
    }
}

/// Write `bytes` to `dir/{stem}.{ext}` atomically and return the final path.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or written, or if
/// no free name is found under [`CollisionPolicy::Suffix`].
pub fn persist(
    bytes: &[u8],
    dir: &Path,
    stem: &str,
    ext: &str,
    policy: CollisionPolicy,
) -> Result<PathBuf, StoreError> {
    fs::create_dir_all(dir)?;
    let mut staged = NamedTempFile::new_in(dir)?;
    staged.write_all(bytes)?;
    staged.as_file().sync_all()?;

    if policy == CollisionPolicy::Overwrite {
        let path = candidate(dir, stem, Some(ext), 0);
        staged.persist(&path)?;
        return Ok(path);
    }

    for n in 0..=MAX_SUFFIX {
        let path = candidate(dir, stem, Some(ext), n);
        match staged.persist_noclobber(&path) {
            Ok(_) => {
                if n > 0 {
                    tracing::debug!(path = %path.display(), "name taken, stored with suffix");
                }
                return Ok(path);
            }
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => staged = e.file,
            Err(e) => return Err(e.into()),
        }
    }

    Err(StoreError::Exhausted(candidate(dir, stem, Some(ext), 0)))
}

/// Move a staged directory to `dir/{name}` and return the final path.
///
/// # Errors
///
/// Returns an error if the existing target cannot be removed, the rename
/// fails, or no free name is found under [`CollisionPolicy::Suffix`].
pub fn place_dir(
    staging: TempDir,
    dir: &Path,
    name: &str,
    policy: CollisionPolicy,
) -> Result<PathBuf, StoreError> {
    let target = match policy {
        CollisionPolicy::Overwrite => {
            let target = candidate(dir, name, None, 0);
            if target.is_dir() {
                fs::remove_dir_all(&target)?;
            } else if target.exists() {
                fs::remove_file(&target)?;
            }
            target
        }
        CollisionPolicy::Suffix => (0..=MAX_SUFFIX)
            .map(|n| candidate(dir, name, None, n))
            .find(|p| !p.exists())
            .ok_or_else(|| StoreError::Exhausted(candidate(dir, name, None, 0)))?,
    };

    fs::rename(staging.path(), &target)?;
    // The staging path is gone; dropping the guard is a no-op.
    drop(staging);
    Ok(target)
}
