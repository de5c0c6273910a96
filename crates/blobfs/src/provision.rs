//! Storage root and shard directory creation.
//!
//! Directory modes are set explicitly after `mkdir`, so the result is
//! `0o777 & !umask` regardless of the process umask.

use std::fs::{self, DirBuilder, Permissions};
use std::io;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::Path;

use tracing::info;

use crate::error::{BackendError, Result};

/// Mode for created directories.
pub fn dir_mode(umask: u32) -> u32 {
    0o777 & !umask
}

/// Mode for stored files.
pub fn file_mode(umask: u32) -> u32 {
    0o666 & !umask
}

/// Make sure the storage root exists, creating it when allowed.
pub fn ensure_root(path: &Path, auto_create: bool, umask: u32) -> Result<()> {
    if path.is_dir() {
        return Ok(());
    }

    if path.exists() {
        return Err(BackendError::RootUnavailable {
            path: path.to_path_buf(),
            reason: "not a directory".to_string(),
        });
    }

    if !auto_create {
        return Err(BackendError::RootUnavailable {
            path: path.to_path_buf(),
            reason: "missing and auto-create is disabled".to_string(),
        });
    }

    if let Err(e) = create_dir(path, umask) {
        return Err(BackendError::RootUnavailable {
            path: path.to_path_buf(),
            reason: format!("unable to create directory: {e}"),
        });
    }

    if !path.is_dir() {
        return Err(BackendError::RootUnavailable {
            path: path.to_path_buf(),
            reason: "unable to create directory".to_string(),
        });
    }

    info!(path = %path.display(), mode = %format!("{:o}", dir_mode(umask)), "created storage root");
    Ok(())
}

/// Create every missing ancestor directory of `path`.
pub fn ensure_parents(path: &Path, umask: u32) -> Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };

    let missing: Vec<&Path> = parent
        .ancestors()
        .take_while(|dir| !dir.as_os_str().is_empty() && !dir.is_dir())
        .collect();

    for dir in missing.into_iter().rev() {
        create_dir(dir, umask)
            .map_err(|e| BackendError::io("failed to create directory", dir, e))?;
    }

    Ok(())
}

/// Create one directory with the umask-derived mode.
///
/// A directory created concurrently by someone else counts as success.
fn create_dir(dir: &Path, umask: u32) -> io::Result<()> {
    let mode = dir_mode(umask);
    match DirBuilder::new().mode(mode).create(dir) {
        Ok(()) => fs::set_permissions(dir, Permissions::from_mode(mode)),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && dir.is_dir() => Ok(()),
        Err(e) => Err(e),
    }
}
