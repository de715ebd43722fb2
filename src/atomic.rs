//! Crash-safe file replacement
//!
//! Content goes to a temp file in the target's directory, is fsynced, then
//! renamed over the target. A crash mid-write leaves the old file intact.

use crate::error::{FindxError, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Atomically replace `path` with `contents`, keeping its permissions
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    let parent_dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let permissions = fs::metadata(path).ok().map(|m| m.permissions());

    let mut temp_file =
        NamedTempFile::new_in(parent_dir).map_err(|e| FindxError::io(parent_dir, e))?;
    temp_file
        .write_all(contents)
        .map_err(|e| FindxError::io(temp_file.path(), e))?;
    temp_file
        .as_file()
        .sync_all()
        .map_err(|e| FindxError::io(temp_file.path(), e))?;

    if let Some(perms) = permissions {
        fs::set_permissions(temp_file.path(), perms)
            .map_err(|e| FindxError::io(temp_file.path(), e))?;
    }

    temp_file
        .persist(path)
        .map_err(|e| FindxError::io(path, e.error))?;

    Ok(())
}

/// Hex SHA-256 of a byte slice
pub fn checksum(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
