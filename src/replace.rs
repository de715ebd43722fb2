//! Multi-file substitution
//!
//! Best effort: each file succeeds or fails on its own and the batch keeps
//! going. Files are matched in parallel on the worker pool; each write runs
//! under that file's path lock after the content is re-read and checked
//! against what was matched.

use crate::atomic::{atomic_write, checksum};
use crate::backup_manager::BackupManager;
use crate::error::{FindxError, Result, SkippedFile, UnreadableReason};
use crate::file_types::FileTypeGroups;
use crate::filter::PathFilter;
use crate::history::{HistoryDraft, HistoryLog, OperationKind};
use crate::locks::PathLocks;
use crate::query::ReplaceSpec;
use crate::search::{ScanLimits, check_deadline, check_size, looks_binary};
use crate::walker::Traverser;
use rayon::ThreadPool;
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeSummary {
    pub file: PathBuf,
    pub occurrence_count: usize,
    /// The new content is on disk
    pub applied: bool,
    pub backup_id: Option<String>,
    pub history_id: Option<u64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReplaceOutcome {
    /// Files with at least one occurrence, in path order
    pub changes: Vec<ChangeSummary>,
    pub skipped: Vec<SkippedFile>,
    pub files_scanned: usize,
}

impl ReplaceOutcome {
    pub fn total_occurrences(&self) -> usize {
        self.changes.iter().map(|c| c.occurrence_count).sum()
    }

    pub fn files_changed(&self) -> usize {
        self.changes.iter().filter(|c| c.applied).count()
    }
}

enum FileResult {
    NoMatch,
    Changed(ChangeSummary),
    Skipped(SkippedFile),
}

pub struct ReplaceEngine<'a> {
    groups: &'a FileTypeGroups,
    limits: &'a ScanLimits,
    pool: &'a ThreadPool,
    backups: &'a BackupManager,
    history: &'a HistoryLog,
    locks: &'a PathLocks,
}

impl<'a> ReplaceEngine<'a> {
    pub fn new(
        groups: &'a FileTypeGroups,
        limits: &'a ScanLimits,
        pool: &'a ThreadPool,
        backups: &'a BackupManager,
        history: &'a HistoryLog,
        locks: &'a PathLocks,
    ) -> Self {
        Self {
            groups,
            limits,
            pool,
            backups,
            history,
            locks,
        }
    }

    /// Substitute every match in every eligible file under `root`.
    ///
    /// With `dry_run` nothing on disk changes; summaries report what would.
    pub fn replace(&self, root: &Path, spec: &ReplaceSpec) -> Result<ReplaceOutcome> {
        let filter = PathFilter::new(root, spec.search(), self.groups)?;
        let traverser = Traverser::new(&filter, self.limits.max_files);

        let mut outcome = ReplaceOutcome::default();
        let mut files = Vec::new();
        for item in traverser.walk() {
            match item {
                Ok(path) => files.push(path),
                Err(skipped) => outcome.skipped.push(skipped),
            }
        }

        tracing::debug!(
            "Replacing '{}' in {} candidate files under {} (dry run: {})",
            spec.search().pattern(),
            files.len(),
            filter.root().display(),
            spec.dry_run()
        );

        let results: Vec<FileResult> = self
            .pool
            .install(|| files.par_iter().map(|path| self.replace_file(path, spec)).collect());

        for result in results {
            match result {
                FileResult::NoMatch => outcome.files_scanned += 1,
                FileResult::Changed(summary) => {
                    outcome.files_scanned += 1;
                    outcome.changes.push(summary);
                }
                FileResult::Skipped(skipped) => outcome.skipped.push(skipped),
            }
        }

        tracing::info!(
            "Replace '{}': {} occurrences in {} files, {} written, {} skipped",
            spec.search().pattern(),
            outcome.total_occurrences(),
            outcome.changes.len(),
            outcome.files_changed(),
            outcome.skipped.len()
        );
        Ok(outcome)
    }

    fn replace_file(&self, path: &Path, spec: &ReplaceSpec) -> FileResult {
        let (original, updated, count) = match substitute(path, spec, self.limits) {
            Ok(Some(found)) => found,
            Ok(None) => return FileResult::NoMatch,
            Err(e) => {
                tracing::debug!("Skipping {}: {}", path.display(), e);
                return FileResult::Skipped(SkippedFile::from_error(path, &e));
            }
        };

        let mut summary = ChangeSummary {
            file: path.to_path_buf(),
            occurrence_count: count,
            applied: false,
            backup_id: None,
            history_id: None,
            error: None,
        };
        if spec.dry_run() {
            return FileResult::Changed(summary);
        }

        let committed = self.locks.with_lock(path, || {
            self.commit(path, &original, &updated, count, spec, &mut summary)
        });
        if let Err(e) = committed {
            tracing::warn!("Replace in {} failed: {}", path.display(), e);
            summary.error = Some(e.to_string());
        }
        FileResult::Changed(summary)
    }

    /// Write one file's new content. Runs under the path lock.
    fn commit(
        &self,
        path: &Path,
        original: &[u8],
        updated: &str,
        count: usize,
        spec: &ReplaceSpec,
        summary: &mut ChangeSummary,
    ) -> Result<()> {
        let current = fs::read(path).map_err(|e| FindxError::io(path, e))?;
        if checksum(&current) != checksum(original) {
            return Err(FindxError::ConcurrentModification(path.to_path_buf()));
        }

        if spec.make_backup() {
            summary.backup_id = Some(self.backups.snapshot(path)?.id);
        }

        atomic_write(path, updated.as_bytes())?;
        summary.applied = true;

        let entry = self.history.append(
            HistoryDraft::new(path, OperationKind::Replace)
                .backup(summary.backup_id.clone())
                .detail(format!(
                    "{} occurrence(s) of '{}' -> '{}'",
                    count,
                    spec.search().pattern(),
                    spec.replacement()
                )),
        )?;
        summary.history_id = Some(entry.id);
        Ok(())
    }
}

/// Read `path` and apply the substitution in memory.
///
/// Returns the original bytes, the new text and the occurrence count, or
/// `None` when nothing matched. Line endings are carried through untouched.
fn substitute(
    path: &Path,
    spec: &ReplaceSpec,
    limits: &ScanLimits,
) -> Result<Option<(Vec<u8>, String, usize)>> {
    check_size(path, limits)?;
    let bytes = fs::read(path).map_err(|e| FindxError::io(path, e))?;
    if looks_binary(&bytes) {
        return Err(FindxError::unreadable(path, UnreadableReason::Binary));
    }
    let text = std::str::from_utf8(&bytes)
        .map_err(|_| FindxError::unreadable(path, UnreadableReason::InvalidUtf8))?;

    let matcher = spec.matcher();
    let started = Instant::now();
    let mut updated = String::with_capacity(text.len());
    let mut total = 0;

    for line in text.split_inclusive('\n') {
        check_deadline(path, started, limits.file_timeout)?;
        let body = line.trim_end_matches('\n').trim_end_matches('\r');
        let (replaced, count) = matcher.replace_line(body, spec.replacement());
        total += count;
        updated.push_str(&replaced);
        updated.push_str(&line[body.len()..]);
    }

    if total == 0 {
        return Ok(None);
    }
    Ok(Some((bytes, updated, total)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::ThreadPoolBuilder;
    use tempfile::TempDir;

    struct Fixture {
        _state: TempDir,
        tree: TempDir,
        groups: FileTypeGroups,
        limits: ScanLimits,
        pool: ThreadPool,
        backups: BackupManager,
        history: HistoryLog,
        locks: PathLocks,
    }

    impl Fixture {
        fn new() -> Self {
            let state = TempDir::new().unwrap();
            let backups = BackupManager::new(state.path().join("backups"), 100.0).unwrap();
            let history = HistoryLog::open(&state.path().join("history")).unwrap();
            Self {
                _state: state,
                tree: TempDir::new().unwrap(),
                groups: FileTypeGroups::default(),
                limits: ScanLimits::default(),
                pool: ThreadPoolBuilder::new().num_threads(2).build().unwrap(),
                backups,
                history,
                locks: PathLocks::new(),
            }
        }

        fn engine(&self) -> ReplaceEngine<'_> {
            ReplaceEngine::new(
                &self.groups,
                &self.limits,
                &self.pool,
                &self.backups,
                &self.history,
                &self.locks,
            )
        }

        fn create_test_file(&self, name: &str, content: &str) -> PathBuf {
            let path = self.tree.path().join(name);
            fs::write(&path, content).unwrap();
            path
        }
    }

    #[test]
    fn test_replace_applies_and_records() {
        let fx = Fixture::new();
        let file = fx.create_test_file("a.txt", "foo\nbar\nfoo\n");
        let spec = ReplaceSpec::builder("foo", "baz").dry_run(false).build().unwrap();

        let outcome = fx.engine().replace(fx.tree.path(), &spec).unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "baz\nbar\nbaz\n");
        assert_eq!(outcome.changes.len(), 1);
        let change = &outcome.changes[0];
        assert_eq!(change.occurrence_count, 2);
        assert!(change.applied);
        assert!(change.error.is_none());

        let history = fx.history.query(10, None).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, OperationKind::Replace);
        assert_eq!(history[0].backup_ref, change.backup_id);
        assert_eq!(fx.backups.list_backups(None).unwrap().len(), 1);
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let fx = Fixture::new();
        let file = fx.create_test_file("a.txt", "foo\nbar\nfoo\n");
        let spec = ReplaceSpec::builder("foo", "baz").build().unwrap();

        let outcome = fx.engine().replace(fx.tree.path(), &spec).unwrap();
        assert_eq!(outcome.changes[0].occurrence_count, 2);
        assert!(!outcome.changes[0].applied);
        assert_eq!(fs::read_to_string(&file).unwrap(), "foo\nbar\nfoo\n");
        assert!(fx.history.query(10, None).unwrap().is_empty());
        assert!(fx.backups.list_backups(None).unwrap().is_empty());
    }

    #[test]
    fn test_zero_match_files_are_not_listed() {
        let fx = Fixture::new();
        fx.create_test_file("a.txt", "foo\n");
        fx.create_test_file("b.txt", "nothing here\n");
        let spec = ReplaceSpec::builder("foo", "x").dry_run(false).build().unwrap();

        let outcome = fx.engine().replace(fx.tree.path(), &spec).unwrap();
        assert_eq!(outcome.files_scanned, 2);
        assert_eq!(outcome.changes.len(), 1);
        assert_eq!(fx.history.query(10, None).unwrap().len(), 1);
    }

    #[test]
    fn test_second_run_is_a_no_op() {
        let fx = Fixture::new();
        fx.create_test_file("a.txt", "foo foo\n");
        let spec = ReplaceSpec::builder("foo", "bar").dry_run(false).build().unwrap();

        fx.engine().replace(fx.tree.path(), &spec).unwrap();
        let again = fx.engine().replace(fx.tree.path(), &spec).unwrap();
        assert_eq!(again.total_occurrences(), 0);
        assert!(again.changes.is_empty());
        assert_eq!(fx.history.query(10, None).unwrap().len(), 1);
    }

    #[test]
    fn test_regex_backreferences() {
        let fx = Fixture::new();
        let file = fx.create_test_file("v.txt", "version = 1.2\r\nother\r\n");
        let spec = ReplaceSpec::builder(r"(\d+)\.(\d+)", "$2.$1")
            .search(|s| s.regex(true))
            .dry_run(false)
            .make_backup(false)
            .build()
            .unwrap();

        let outcome = fx.engine().replace(fx.tree.path(), &spec).unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "version = 2.1\r\nother\r\n");
        assert!(outcome.changes[0].backup_id.is_none());
    }

    #[test]
    fn test_literal_replacement_is_verbatim() {
        let fx = Fixture::new();
        let file = fx.create_test_file("a.txt", "price: 5\n");
        let spec = ReplaceSpec::builder("5", "$1")
            .dry_run(false)
            .make_backup(false)
            .build()
            .unwrap();

        fx.engine().replace(fx.tree.path(), &spec).unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "price: $1\n");
    }

    #[test]
    fn test_binary_file_is_skipped() {
        let fx = Fixture::new();
        fs::write(fx.tree.path().join("data.bin"), b"foo\0").unwrap();
        let spec = ReplaceSpec::builder("foo", "x").dry_run(false).build().unwrap();

        let outcome = fx.engine().replace(fx.tree.path(), &spec).unwrap();
        assert!(outcome.changes.is_empty());
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(fs::read(fx.tree.path().join("data.bin")).unwrap(), b"foo\0");
    }

    #[test]
    fn test_changed_between_scan_and_write_is_refused() {
        let fx = Fixture::new();
        let file = fx.create_test_file("a.txt", "foo\n");
        let spec = ReplaceSpec::builder("foo", "bar").dry_run(false).build().unwrap();
        let engine = fx.engine();

        let mut summary = ChangeSummary {
            file: file.clone(),
            occurrence_count: 1,
            applied: false,
            backup_id: None,
            history_id: None,
            error: None,
        };
        let err = engine
            .commit(&file, b"stale content\n", "bar\n", 1, &spec, &mut summary)
            .unwrap_err();
        assert!(matches!(err, FindxError::ConcurrentModification(_)));
        assert!(!summary.applied);
        assert_eq!(fs::read_to_string(&file).unwrap(), "foo\n");
        assert!(fx.backups.list_backups(None).unwrap().is_empty());
    }

    #[test]
    #[cfg(unix)]
    fn test_write_failure_is_per_file() {
        use std::os::unix::fs::PermissionsExt;

        let fx = Fixture::new();
        let locked_dir = fx.tree.path().join("locked");
        fs::create_dir(&locked_dir).unwrap();
        fs::write(locked_dir.join("a.txt"), "foo\n").unwrap();
        fx.create_test_file("b.txt", "foo\n");
        fs::set_permissions(&locked_dir, fs::Permissions::from_mode(0o555)).unwrap();

        // root ignores directory permissions, nothing to observe then
        if fs::write(locked_dir.join("probe"), "x").is_ok() {
            fs::set_permissions(&locked_dir, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let spec = ReplaceSpec::builder("foo", "bar")
            .dry_run(false)
            .make_backup(false)
            .build()
            .unwrap();
        let outcome = fx.engine().replace(fx.tree.path(), &spec).unwrap();
        fs::set_permissions(&locked_dir, fs::Permissions::from_mode(0o755)).unwrap();

        // path order puts b.txt before locked/
        assert_eq!(outcome.changes.len(), 2);
        assert!(outcome.changes[0].applied);
        let failed = &outcome.changes[1];
        assert!(failed.file.ends_with("locked/a.txt"));
        assert!(!failed.applied);
        assert!(failed.error.is_some());
        assert_eq!(fs::read_to_string(fx.tree.path().join("b.txt")).unwrap(), "bar\n");
    }
}
