//! Free-space probing for the backup store
//!
//! A snapshot is refused when it would eat more than the configured share of
//! the free space left on the backup partition.

use anyhow::{Context, Result};
use std::path::Path;

/// Free and total bytes on the filesystem holding a path
#[derive(Debug, Clone, Copy)]
pub struct DiskSpace {
    pub total_bytes: u64,
    pub available_bytes: u64,
}

/// Render a byte count as "1.5 MB" and friends
pub fn bytes_to_human(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;
    const TB: u64 = 1024 * GB;

    if bytes >= TB {
        format!("{:.1} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(unix)]
pub fn disk_space(path: &Path) -> Result<DiskSpace> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path =
        CString::new(path.as_os_str().as_bytes()).context("Failed to convert path to CString")?;

    // # Safety
    //
    // `libc::statvfs` is a plain C struct of integers, so a zeroed value is valid.
    // `c_path` outlives the call and the return code is checked.
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        return Err(anyhow::anyhow!(
            "Failed to get disk space for '{}': {}",
            path.display(),
            std::io::Error::last_os_error()
        ));
    }

    let frsize = stat.f_frsize as u64;
    Ok(DiskSpace {
        total_bytes: stat.f_blocks as u64 * frsize,
        available_bytes: stat.f_bavail as u64 * frsize,
    })
}

#[cfg(not(unix))]
pub fn disk_space(_path: &Path) -> Result<DiskSpace> {
    Err(anyhow::anyhow!("Disk space checking is only available on Unix"))
}

/// Refuse a snapshot of `snapshot_size` bytes if it would use more than
/// `max_percent` of the free space under `backup_dir`.
///
/// Platforms without a free-space probe always pass.
pub fn check_space_for_snapshot(backup_dir: &Path, snapshot_size: u64, max_percent: f64) -> Result<()> {
    let space = match disk_space(backup_dir) {
        Ok(space) => space,
        Err(e) if cfg!(not(unix)) => {
            tracing::debug!("Skipping disk space check: {}", e);
            return Ok(());
        }
        Err(e) => return Err(e.context("Failed to check disk space")),
    };

    let percent_of_free = if space.available_bytes > 0 {
        (snapshot_size as f64 / space.available_bytes as f64) * 100.0
    } else {
        100.0
    };

    if snapshot_size > 0 && percent_of_free > max_percent {
        anyhow::bail!(
            "Insufficient disk space for snapshot in {}: needs {} ({:.1}% of free {}, total {}), limit is {:.1}%",
            backup_dir.display(),
            bytes_to_human(snapshot_size),
            percent_of_free,
            bytes_to_human(space.available_bytes),
            bytes_to_human(space.total_bytes),
            max_percent
        );
    }

    Ok(())
}
