//! Directory traversal
//!
//! Every call to `walk` starts a fresh walk. Entries come out sorted by file
//! name within each directory, which matches `Path` ordering, so the sequence
//! is ascending by path. Symlinks are never followed.

use crate::error::SkippedFile;
use crate::filter::PathFilter;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub struct Traverser<'a> {
    filter: &'a PathFilter,
    max_files: usize,
}

impl<'a> Traverser<'a> {
    pub fn new(filter: &'a PathFilter, max_files: usize) -> Self {
        Self { filter, max_files }
    }

    /// Lazily yield eligible files, stopping quietly after `max_files`.
    ///
    /// Directories that cannot be read come out as `Err` so callers can
    /// report them instead of dropping them.
    pub fn walk(&self) -> impl Iterator<Item = Result<PathBuf, SkippedFile>> + 'a {
        let filter = self.filter;
        let max_files = self.max_files;

        WalkDir::new(filter.root())
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| !entry.file_type().is_dir() || filter.descend(entry.path()))
            .filter_map(move |entry| match entry {
                Ok(entry) => {
                    if entry.file_type().is_file() && filter.eligible(entry.path()) {
                        Some(Ok(entry.into_path()))
                    } else {
                        None
                    }
                }
                Err(err) => {
                    let path = err
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| filter.root().to_path_buf());
                    tracing::warn!("Skipping {}: {}", path.display(), err);
                    Some(Err(SkippedFile::new(path, err.to_string())))
                }
            })
            .scan(0usize, move |yielded, item| {
                if *yielded >= max_files {
                    tracing::info!("File cap of {} reached, stopping traversal", max_files);
                    return None;
                }
                if item.is_ok() {
                    *yielded += 1;
                }
                Some(item)
            })
    }
}
