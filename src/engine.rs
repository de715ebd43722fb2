//! Engine facade
//!
//! Owns every long-lived piece (backup store, history log, path locks, path
//! guard, file-type table, worker pool) and exposes the operations the tool
//! layer calls. Each operation borrows the pieces it needs for one call.

use crate::backup_manager::{BackupManager, BackupRecord, DiffLine};
use crate::config::{validate_config, Config};
use crate::error::{FindxError, Result};
use crate::file_types::FileTypeGroups;
use crate::guard::PathGuard;
use crate::history::{self, HistoryEntry, HistoryLog, HistoryStats, ReconcileReport};
use crate::line_editor::{EditOutcome, LineEditor};
use crate::locks::PathLocks;
use crate::logger::{init_debug_logging, LoggingGuard};
use crate::query::{ReplaceSpec, SearchSpec};
use crate::replace::{ReplaceEngine, ReplaceOutcome};
use crate::search::{ScanLimits, SearchEngine, SearchOutcome};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::path::{Path, PathBuf};

pub struct Engine {
    config: Config,
    groups: FileTypeGroups,
    limits: ScanLimits,
    pool: ThreadPool,
    backups: BackupManager,
    history: HistoryLog,
    locks: PathLocks,
    guard: PathGuard,
    _logging: Option<LoggingGuard>,
}

impl Engine {
    /// Validate `config` and open the on-disk state it points at.
    pub fn open(config: Config) -> Result<Self> {
        validate_config(&config).map_err(|e| FindxError::InvalidOption(format!("{:#}", e)))?;

        let logging = match config.log_dir() {
            Ok(dir) => init_debug_logging(config.logging.debug, &dir).unwrap_or_else(|e| {
                eprintln!("Warning: debug logging disabled: {:#}", e);
                None
            }),
            Err(e) => {
                eprintln!("Warning: debug logging disabled: {:#}", e);
                None
            }
        };

        if let Some(guard) = &logging {
            tracing::info!("Debug logging to {}", guard.log_path().display());
        }

        let backup_dir = config
            .backup_dir()
            .map_err(|e| FindxError::Backup(format!("{:#}", e)))?;
        let backups = BackupManager::new(backup_dir, config.backup.max_disk_usage_percent)?;

        let history_dir = config
            .history_dir()
            .map_err(|e| FindxError::History(format!("{:#}", e)))?;
        let history = HistoryLog::open(&history_dir)?;

        let guard = if config.edit.allowed_roots.is_empty() {
            PathGuard::unrestricted()
        } else {
            PathGuard::new(&config.edit.allowed_roots)?
        };

        let pool = ThreadPoolBuilder::new()
            .num_threads(config.search.workers)
            .thread_name(|i| format!("findx-worker-{}", i))
            .build()
            .map_err(|e| FindxError::InvalidOption(format!("Cannot start worker pool: {}", e)))?;

        tracing::debug!(
            "Engine ready: {} workers, backups in {}, history in {}",
            pool.current_num_threads(),
            backups.backups_dir().display(),
            history.log_path().display()
        );

        Ok(Self {
            groups: config.file_type_groups(),
            limits: ScanLimits::from_config(&config.search),
            pool,
            backups,
            history,
            locks: PathLocks::new(),
            guard,
            _logging: logging,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn search(&self, root: &Path, spec: &SearchSpec) -> Result<SearchOutcome> {
        let root = self.guard.check(root)?;
        SearchEngine::new(&self.groups, &self.limits, &self.pool).search(&root, spec)
    }

    pub fn replace(&self, root: &Path, spec: &ReplaceSpec) -> Result<ReplaceOutcome> {
        let root = self.guard.check(root)?;
        ReplaceEngine::new(
            &self.groups,
            &self.limits,
            &self.pool,
            &self.backups,
            &self.history,
            &self.locks,
        )
        .replace(&root, spec)
    }

    pub fn replace_lines(
        &self,
        file: &Path,
        start: usize,
        end: Option<usize>,
        content: &str,
    ) -> Result<EditOutcome> {
        let file = self.guard.check(file)?;
        self.editor().replace_lines(&file, start, end, content)
    }

    pub fn insert_lines(&self, file: &Path, at_line: usize, content: &str) -> Result<EditOutcome> {
        let file = self.guard.check(file)?;
        self.editor().insert_lines(&file, at_line, content)
    }

    pub fn delete_lines(&self, file: &Path, start: usize, end: Option<usize>) -> Result<EditOutcome> {
        let file = self.guard.check(file)?;
        self.editor().delete_lines(&file, start, end)
    }

    pub fn list_backups(&self, file: Option<&Path>) -> Result<Vec<BackupRecord>> {
        let file = file.map(canonical_or_given);
        self.backups.list_backups(file.as_deref())
    }

    /// Restore backup `id` over its source file.
    ///
    /// The target must still pass the path guard; a source that was deleted
    /// since the snapshot is judged by its parent directory and recreated.
    pub fn restore(&self, id: &str) -> Result<HistoryEntry> {
        let record = self.backups.get(id)?;
        if record.source_file.exists() {
            self.guard.check(&record.source_file)?;
        } else {
            let parent = record
                .source_file
                .parent()
                .ok_or_else(|| FindxError::SourceVanished(record.source_file.clone()))?;
            self.guard.check(parent)?;
        }

        self.locks
            .with_lock(&record.source_file, || self.backups.restore(id, &self.history))
    }

    pub fn diff(&self, file: &Path, id: &str) -> Result<Vec<DiffLine>> {
        let file = self.guard.check(file)?;
        self.backups.diff(&file, id)
    }

    /// Explicit retention; nothing in the engine calls this on its own.
    pub fn prune_backups(&self, keep: usize) -> Result<usize> {
        self.backups.prune_backups(keep)
    }

    pub fn query_history(&self, limit: usize, file: Option<&Path>) -> Result<Vec<HistoryEntry>> {
        let file = file.map(canonical_or_given);
        self.history.query(limit, file.as_deref())
    }

    pub fn recent_files(&self, limit: usize) -> Result<Vec<PathBuf>> {
        self.history.recent_files(limit)
    }

    pub fn history_stats(&self) -> Result<HistoryStats> {
        self.history.stats()
    }

    pub fn reconcile(&self) -> Result<ReconcileReport> {
        history::reconcile(&self.history, &self.backups)
    }

    /// Flush and close the history log. Later mutations fail with a history error.
    pub fn close(&self) -> Result<()> {
        self.history.close()
    }

    fn editor(&self) -> LineEditor<'_> {
        LineEditor::new(&self.backups, &self.history, &self.locks, self.config.edit.make_backup)
    }
}

/// Recorded paths are canonical; filters given by callers may not be.
fn canonical_or_given(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
