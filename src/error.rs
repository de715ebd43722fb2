//! Error taxonomy for findx
//!
//! Construction-time errors (bad patterns, bad globs, bad options) abort a call
//! before any traversal starts. Per-file errors raised while a batch runs are
//! captured into that file's result instead of being propagated.

use serde::Serialize;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FindxError>;

/// Why a file was skipped instead of scanned
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnreadableReason {
    /// A NUL byte showed up in the leading sample
    Binary,
    /// File is larger than the configured limit
    TooLarge { size: u64, limit: u64 },
    /// Content is not valid UTF-8
    InvalidUtf8,
    /// Matching ran past the per-file time budget
    Timeout { elapsed_ms: u128 },
}

impl fmt::Display for UnreadableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnreadableReason::Binary => write!(f, "binary content"),
            UnreadableReason::TooLarge { size, limit } => {
                write!(f, "file is {} bytes, limit is {} bytes", size, limit)
            }
            UnreadableReason::InvalidUtf8 => write!(f, "not valid UTF-8"),
            UnreadableReason::Timeout { elapsed_ms } => {
                write!(f, "matching exceeded time budget after {} ms", elapsed_ms)
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum FindxError {
    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Invalid glob '{glob}': {message}")]
    InvalidGlob { glob: String, message: String },

    #[error("Invalid option: {0}")]
    InvalidOption(String),

    #[error("Line range {start}-{end} is out of bounds for {} ({len} lines)", .path.display())]
    LineRange {
        path: PathBuf,
        start: usize,
        end: usize,
        len: usize,
    },

    #[error("Path {} escapes the allowed root {}", .path.display(), .root.display())]
    PathSecurity { path: PathBuf, root: PathBuf },

    #[error("Cannot read {} as text: {reason}", .path.display())]
    UnreadableFile {
        path: PathBuf,
        reason: UnreadableReason,
    },

    #[error("Backup not found: {0}")]
    BackupNotFound(String),

    #[error("Source file vanished: {}", .0.display())]
    SourceVanished(PathBuf),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    #[error("Content for {} cannot round-trip as UTF-8 text", .0.display())]
    Encoding(PathBuf),

    #[error("{} changed on disk between scan and write", .0.display())]
    ConcurrentModification(PathBuf),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Backup error: {0}")]
    Backup(String),

    #[error("History error: {0}")]
    History(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FindxError {
    /// Classify an I/O error against the path it happened on.
    ///
    /// Not-found and permission errors pass through as their own variants so
    /// callers can tell them apart from generic disk failures.
    pub fn io(path: impl AsRef<Path>, err: io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        match err.kind() {
            io::ErrorKind::NotFound => FindxError::FileNotFound(path),
            io::ErrorKind::PermissionDenied => FindxError::PermissionDenied(path),
            io::ErrorKind::InvalidData => FindxError::UnreadableFile {
                path,
                reason: UnreadableReason::InvalidUtf8,
            },
            _ => FindxError::Io { path, source: err },
        }
    }

    pub fn unreadable(path: impl AsRef<Path>, reason: UnreadableReason) -> Self {
        FindxError::UnreadableFile {
            path: path.as_ref().to_path_buf(),
            reason,
        }
    }

    /// True for errors raised while validating a spec, before any file is touched
    pub fn is_construction_error(&self) -> bool {
        matches!(
            self,
            FindxError::InvalidPattern { .. }
                | FindxError::InvalidGlob { .. }
                | FindxError::InvalidOption(_)
        )
    }
}

/// A file a batch operation passed over, with the reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

impl SkippedFile {
    pub fn new(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn from_error(path: &Path, err: &FindxError) -> Self {
        let reason = match err {
            FindxError::UnreadableFile { reason, .. } => reason.to_string(),
            other => other.to_string(),
        };
        Self::new(path, reason)
    }
}
