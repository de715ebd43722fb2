//! findx: multi-file search and replace with backups and an edit history
//!
//! Every destructive write is snapshotted first and recorded in an
//! append-only history log, so any change can be audited or undone.
//! [`Engine`] is the entry point the surrounding tool layer calls.

pub mod atomic;
pub mod backup_manager;
pub mod config;
pub mod disk_space;
pub mod engine;
pub mod error;
pub mod file_types;
pub mod filter;
pub mod formatter;
pub mod guard;
pub mod history;
pub mod line_editor;
pub mod locks;
pub mod logger;
pub mod matcher;
pub mod query;
pub mod replace;
pub mod search;
pub mod walker;

// Re-export commonly used types for convenience
pub use backup_manager::{BackupManager, BackupRecord, DiffLine, DiffTag};
pub use config::Config;
pub use engine::Engine;
pub use error::{FindxError, Result, SkippedFile, UnreadableReason};
pub use formatter::ReportFormatter;
pub use history::{HistoryEntry, HistoryLog, HistoryStats, OperationKind, ReconcileReport};
pub use line_editor::EditOutcome;
pub use matcher::{PatternMatcher, Span};
pub use query::{ReplaceSpec, SearchSpec};
pub use replace::{ChangeSummary, ReplaceOutcome};
pub use search::{MatchRecord, SearchOutcome};
