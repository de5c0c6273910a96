//! Collision handling for stored filenames.
//!
//! Two different raw names can end up as the same stored name once escaped and
//! truncated. Whether the existing file may be replaced is the caller's call
//! (`allow_rewrite`).
//!
//! [`resolve`] is an early check so a rejected store never transfers bytes.
//! The decision that counts is made by [`commit`], which renames the finished
//! temporary file into place: a no-clobber rename when rewrite is off, an atomic
//! replace when it is on.

use std::fs;
use std::io;
use std::path::Path;

use tempfile::TempPath;
use tracing::debug;

use crate::error::{BackendError, Result};

/// What to do with a destination path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Nothing is there yet.
    Proceed,
    /// Something is there and will be replaced by a fresh regular file.
    Replace,
    /// Something is there and must be kept.
    Reject,
}

/// Inspect `path` without following symbolic links.
///
/// A dangling link still counts as an existing entry. Only `NotFound` means
/// absent; any other lookup failure is returned.
pub fn resolve(path: &Path, allow_rewrite: bool) -> io::Result<Action> {
    match fs::symlink_metadata(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Action::Proceed),
        Err(e) => Err(e),
        Ok(_) if allow_rewrite => Ok(Action::Replace),
        Ok(_) => Ok(Action::Reject),
    }
}

/// Like [`resolve`], but a rejection becomes [`BackendError::NameCollision`].
pub fn enforce(path: &Path, allow_rewrite: bool) -> Result<Action> {
    match resolve(path, allow_rewrite) {
        Ok(Action::Reject) => Err(collision(path)),
        Ok(action) => Ok(action),
        Err(e) => Err(BackendError::io("failed to inspect", path, e)),
    }
}

/// Move a fully written temporary file to `dest`.
///
/// When rewrite is allowed, whatever sits at `dest` (a file or a symbolic link)
/// is swapped out in one rename; the link target is never touched. Otherwise the
/// rename fails if `dest` appeared since [`resolve`] looked, and the temporary
/// file is removed.
pub fn commit(temp: TempPath, dest: &Path, allow_rewrite: bool) -> Result<()> {
    if allow_rewrite {
        if fs::symlink_metadata(dest).is_ok() {
            debug!(path = %dest.display(), "replacing existing entry");
        }
        let temp_name = temp.to_path_buf();
        temp.persist(dest)
            .map_err(|e| BackendError::io("failed to move into place", dest, e.error))?;

        // rename(2) succeeds without doing anything when both names already
        // link the same inode, which happens when a file is re-stored over itself.
        if fs::symlink_metadata(&temp_name).is_ok() {
            fs::remove_file(&temp_name)
                .map_err(|e| BackendError::io("failed to remove", &temp_name, e))?;
        }
        Ok(())
    } else {
        temp.persist_noclobber(dest).map_err(|e| {
            if e.error.kind() == io::ErrorKind::AlreadyExists {
                collision(dest)
            } else {
                BackendError::io("failed to move into place", dest, e.error)
            }
        })
    }
}

fn collision(path: &Path) -> BackendError {
    BackendError::NameCollision {
        path: path.to_path_buf(),
    }
}
