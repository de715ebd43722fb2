//! Append-only edit history
//!
//! Entries are stored as JSON Lines in `history.jsonl`. The next id is kept in
//! a separate `sequence` file and is also re-derived from the log on open, so
//! ids are never reused across restarts even if the counter write was lost.
//! Appends take an `fs2` lock on the log file, which makes the log safe to
//! share between handles and processes.

use crate::atomic::{atomic_write, checksum};
use crate::backup_manager::{BackupManager, BackupRecord};
use crate::error::{FindxError, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

pub const HISTORY_FILE_NAME: &str = "history.jsonl";
pub const SEQUENCE_FILE_NAME: &str = "sequence";
const MOST_EDITED_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    EditLines,
    Insert,
    Delete,
    Replace,
    Restore,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::EditLines => "edit_lines",
            OperationKind::Insert => "insert",
            OperationKind::Delete => "delete",
            OperationKind::Replace => "replace",
            OperationKind::Restore => "restore",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub file: PathBuf,
    pub kind: OperationKind,
    /// 1-based inclusive
    pub line_range: Option<(usize, usize)>,
    pub backup_ref: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

/// An entry before the log assigns its id and timestamp
#[derive(Debug, Clone)]
pub struct HistoryDraft {
    file: PathBuf,
    kind: OperationKind,
    line_range: Option<(usize, usize)>,
    backup_ref: Option<String>,
    detail: Option<String>,
}

impl HistoryDraft {
    pub fn new(file: impl Into<PathBuf>, kind: OperationKind) -> Self {
        Self {
            file: file.into(),
            kind,
            line_range: None,
            backup_ref: None,
            detail: None,
        }
    }

    pub fn lines(mut self, start: usize, end: usize) -> Self {
        self.line_range = Some((start, end));
        self
    }

    pub fn backup(mut self, backup_ref: Option<String>) -> Self {
        self.backup_ref = backup_ref;
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HistoryStats {
    pub total_entries: usize,
    pub by_kind: BTreeMap<OperationKind, usize>,
    /// Most frequently edited files, busiest first
    pub most_edited: Vec<(PathBuf, usize)>,
}

struct Writer {
    file: File,
    next_id: u64,
}

/// The single writer for the edit history.
///
/// Opened once, shared by reference with everything that mutates files, and
/// closed at shutdown. Appends after `close` fail.
pub struct HistoryLog {
    log_path: PathBuf,
    seq_path: PathBuf,
    writer: Mutex<Option<Writer>>,
}

impl HistoryLog {
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| FindxError::io(dir, e))?;
        let log_path = dir.join(HISTORY_FILE_NAME);
        let seq_path = dir.join(SEQUENCE_FILE_NAME);

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| FindxError::io(&log_path, e))?;

        let next_id = {
            let _file_lock = LogFileLock::acquire(&file, &log_path)?;
            terminate_torn_tail(&file, &log_path)?;

            let stored = read_sequence(&seq_path);
            let max_logged = read_entries(&log_path)?.iter().map(|e| e.id).max();
            match max_logged {
                Some(max) => stored.max(max + 1),
                None => stored.max(1),
            }
        };

        tracing::debug!("Opened history at {} (next id {})", log_path.display(), next_id);

        Ok(Self {
            log_path,
            seq_path,
            writer: Mutex::new(Some(Writer { file, next_id })),
        })
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    /// Record a mutation that has already been durably written.
    ///
    /// Runs under an exclusive lock on the log file, so every handle on the
    /// same directory (in this process or another) draws from one counter.
    /// The id is reserved in the sequence file before the line is written; a
    /// failed write is truncated away and its id is skipped, never reused.
    pub fn append(&self, draft: HistoryDraft) -> Result<HistoryEntry> {
        let mut guard = self.lock();
        let writer = guard
            .as_mut()
            .ok_or_else(|| FindxError::History("history log is closed".to_string()))?;

        let _file_lock = LogFileLock::acquire(&writer.file, &self.log_path)?;
        terminate_torn_tail(&writer.file, &self.log_path)?;

        let id = writer.next_id.max(read_sequence(&self.seq_path));
        atomic_write(&self.seq_path, (id + 1).to_string().as_bytes())?;
        writer.next_id = id + 1;

        let entry = HistoryEntry {
            id,
            timestamp: Utc::now(),
            file: draft.file,
            kind: draft.kind,
            line_range: draft.line_range,
            backup_ref: draft.backup_ref,
            detail: draft.detail,
        };

        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');
        let start = writer
            .file
            .metadata()
            .map_err(|e| FindxError::io(&self.log_path, e))?
            .len();
        if let Err(e) = (&writer.file)
            .write_all(line.as_bytes())
            .and_then(|_| writer.file.sync_data())
        {
            if let Err(rollback) = writer.file.set_len(start) {
                tracing::warn!(
                    "Could not truncate partial history line in {}: {}",
                    self.log_path.display(),
                    rollback
                );
            }
            return Err(FindxError::io(&self.log_path, e));
        }

        tracing::info!(
            "History #{}: {} {}{}",
            entry.id,
            entry.kind,
            entry.file.display(),
            entry
                .backup_ref
                .as_deref()
                .map(|b| format!(" (backup {})", b))
                .unwrap_or_default()
        );
        Ok(entry)
    }

    /// Entries newest first, optionally only those for exactly `file`
    pub fn query(&self, limit: usize, file: Option<&Path>) -> Result<Vec<HistoryEntry>> {
        let mut entries = self.entries()?;
        if let Some(file) = file {
            entries.retain(|e| e.file == file);
        }
        entries.sort_by(|a, b| b.id.cmp(&a.id));
        entries.truncate(limit);
        Ok(entries)
    }

    /// Distinct files touched, most recently edited first
    pub fn recent_files(&self, limit: usize) -> Result<Vec<PathBuf>> {
        let mut entries = self.entries()?;
        entries.sort_by(|a, b| b.id.cmp(&a.id));

        let mut seen = HashSet::new();
        Ok(entries
            .into_iter()
            .filter(|e| seen.insert(e.file.clone()))
            .map(|e| e.file)
            .take(limit)
            .collect())
    }

    pub fn stats(&self) -> Result<HistoryStats> {
        let entries = self.entries()?;
        let mut stats = HistoryStats {
            total_entries: entries.len(),
            ..HistoryStats::default()
        };

        let mut per_file: HashMap<PathBuf, usize> = HashMap::new();
        for entry in entries {
            *stats.by_kind.entry(entry.kind).or_default() += 1;
            *per_file.entry(entry.file).or_default() += 1;
        }

        let mut most_edited: Vec<(PathBuf, usize)> = per_file.into_iter().collect();
        most_edited.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        most_edited.truncate(MOST_EDITED_LIMIT);
        stats.most_edited = most_edited;
        Ok(stats)
    }

    /// Flush and stop accepting appends
    pub fn close(&self) -> Result<()> {
        if let Some(writer) = self.lock().take() {
            writer
                .file
                .sync_all()
                .map_err(|e| FindxError::io(&self.log_path, e))?;
            tracing::debug!("Closed history at {}", self.log_path.display());
        }
        Ok(())
    }

    fn entries(&self) -> Result<Vec<HistoryEntry>> {
        // Holding the writer lock keeps a half-written append out of the read
        let _guard = self.lock();
        read_entries(&self.log_path)
    }

    fn lock(&self) -> MutexGuard<'_, Option<Writer>> {
        self.writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn read_sequence(path: &Path) -> u64 {
    match fs::read_to_string(path) {
        Ok(text) => text.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring malformed history sequence file {}", path.display());
            0
        }),
        Err(_) => 0,
    }
}

/// Parse the log, skipping lines that do not decode
fn read_entries(path: &Path) -> Result<Vec<HistoryEntry>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(FindxError::io(path, e)),
    };

    let mut entries = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| FindxError::io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<HistoryEntry>(&line) {
            Ok(entry) => entries.push(entry),
            Err(e) => tracing::warn!(
                "Skipping unreadable history line {} in {}: {}",
                idx + 1,
                path.display(),
                e
            ),
        }
    }
    Ok(entries)
}

/// Exclusive advisory lock on the log file, released on drop
struct LogFileLock<'a> {
    file: &'a File,
    path: &'a Path,
}

impl<'a> LogFileLock<'a> {
    fn acquire(file: &'a File, path: &'a Path) -> Result<Self> {
        file.lock_exclusive().map_err(|e| {
            FindxError::History(format!("Failed to lock {}: {}", path.display(), e))
        })?;
        Ok(Self { file, path })
    }
}

impl Drop for LogFileLock<'_> {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(self.file) {
            tracing::warn!("Failed to unlock {}: {}", self.path.display(), e);
        }
    }
}

/// A crash mid-append can leave a line without its newline; close it off so
/// the next append starts on a fresh line. Callers hold the log file lock.
fn terminate_torn_tail(mut file: &File, path: &Path) -> Result<()> {
    let len = file.metadata().map_err(|e| FindxError::io(path, e))?.len();
    if len == 0 {
        return Ok(());
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))
        .and_then(|_| file.read_exact(&mut last))
        .map_err(|e| FindxError::io(path, e))?;
    if last[0] != b'\n' {
        tracing::warn!("History log {} ends mid-line, terminating it", path.display());
        file.write_all(b"\n")
            .and_then(|_| file.sync_data())
            .map_err(|e| FindxError::io(path, e))?;
    }
    Ok(())
}

/// A backup no history entry points at
#[derive(Debug, Clone, Serialize)]
pub struct OrphanedBackup {
    pub record: BackupRecord,
    /// The live file no longer matches the snapshot, so a write probably
    /// happened without its history entry
    pub live_differs: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub entries_checked: usize,
    pub backups_checked: usize,
    pub orphaned_backups: Vec<OrphanedBackup>,
    /// History ids whose backup reference no longer exists
    pub dangling_refs: Vec<u64>,
}

impl ReconcileReport {
    pub fn is_consistent(&self) -> bool {
        self.orphaned_backups.is_empty() && self.dangling_refs.is_empty()
    }
}

/// Cross-check backups against history entries.
///
/// Finds snapshots whose mutation never made it into the log (or never
/// happened), and entries pointing at snapshots that were pruned.
pub fn reconcile(history: &HistoryLog, backups: &BackupManager) -> Result<ReconcileReport> {
    let entries = history.entries()?;
    let records = backups.list_backups(None)?;

    let referenced: HashSet<&str> = entries.iter().filter_map(|e| e.backup_ref.as_deref()).collect();
    let known: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();

    let mut report = ReconcileReport {
        entries_checked: entries.len(),
        backups_checked: records.len(),
        ..ReconcileReport::default()
    };

    report.dangling_refs = entries
        .iter()
        .filter(|e| e.backup_ref.as_deref().is_some_and(|b| !known.contains(b)))
        .map(|e| e.id)
        .collect();

    for record in &records {
        if referenced.contains(record.id.as_str()) {
            continue;
        }
        let live_differs = match fs::read(&record.source_file) {
            Ok(bytes) => checksum(&bytes) != record.checksum,
            Err(_) => true,
        };
        tracing::warn!(
            "Backup {} of {} has no history entry{}",
            record.id,
            record.source_file.display(),
            if live_differs { " and the file has changed since" } else { "" }
        );
        report.orphaned_backups.push(OrphanedBackup {
            record: record.clone(),
            live_differs,
        });
    }

    Ok(report)
}
