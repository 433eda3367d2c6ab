//! Filesystem helpers

use crate::error::{Error, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Replace the contents of `path` without ever leaving it half written.
///
/// The new contents go to a temp file in the same directory which is then
/// renamed over the target. On failure the original file is untouched.
/// A symlink is followed and its target is replaced; the link itself stays.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let target = resolve_target(path)?;
    let path = target.as_path();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;

    // Keep the permissions of the file being replaced.
    if let Ok(metadata) = std::fs::metadata(path) {
        std::fs::set_permissions(temp.path(), metadata.permissions())?;
    }

    temp.persist(path).map_err(|e| {
        Error::from(e.error).with_context(format!("Failed to replace {}", path.display()))
    })?;

    Ok(())
}

fn resolve_target(path: &Path) -> Result<PathBuf> {
    match std::fs::symlink_metadata(path) {
        Ok(metadata) if metadata.file_type().is_symlink() => {
            std::fs::canonicalize(path).map_err(|e| {
                Error::from(e).with_context(format!("Failed to resolve link {}", path.display()))
            })
        }
        _ => Ok(path.to_path_buf()),
    }
}
