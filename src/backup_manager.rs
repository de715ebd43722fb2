use crate::atomic::{atomic_write, checksum};
use crate::disk_space::check_space_for_snapshot;
use crate::error::{FindxError, Result};
use crate::history::{HistoryDraft, HistoryEntry, HistoryLog, OperationKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

const RECORD_FILE_NAME: &str = "backup.json";

/// One whole-file snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub id: String,
    pub source_file: PathBuf,
    pub snapshot_path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub size: u64,
    /// Hex SHA-256 of the snapshot bytes
    pub checksum: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffTag {
    Added,
    Removed,
    Unchanged,
}

/// One line of a snapshot-vs-live comparison
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffLine {
    pub tag: DiffTag,
    pub content: String,
    /// 1-based line in the snapshot
    pub old_line: Option<usize>,
    /// 1-based line in the live file
    pub new_line: Option<usize>,
}

/// Owns every snapshot under `backups_dir`, one directory per backup.
///
/// Nothing here deletes a snapshot on its own; `prune_backups` only runs when
/// a caller asks for it.
pub struct BackupManager {
    backups_dir: PathBuf,
    max_disk_usage_percent: f64,
    counter: AtomicU64,
}

impl BackupManager {
    pub fn new(backups_dir: impl Into<PathBuf>, max_disk_usage_percent: f64) -> Result<Self> {
        let backups_dir = backups_dir.into();

        // Create backups directory if it doesn't exist
        fs::create_dir_all(&backups_dir).map_err(|e| FindxError::io(&backups_dir, e))?;

        Ok(Self {
            backups_dir,
            max_disk_usage_percent,
            counter: AtomicU64::new(0),
        })
    }

    /// Get the backup directory path
    pub fn backups_dir(&self) -> &Path {
        &self.backups_dir
    }

    /// Copy the current content of `file` into a new backup.
    ///
    /// Ids look like `20250101-120000123-1a2b3c4d-000000`: millisecond timestamp,
    /// a hash of the source path, and a per-process counter. A clash with an
    /// existing directory just moves on to the next counter value.
    pub fn snapshot(&self, file: &Path) -> Result<BackupRecord> {
        let bytes = match fs::read(file) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(FindxError::SourceVanished(file.to_path_buf()));
            }
            Err(e) => return Err(FindxError::io(file, e)),
        };

        let file_name = file
            .file_name()
            .ok_or_else(|| FindxError::Backup(format!("Invalid file name: {}", file.display())))?;

        check_space_for_snapshot(&self.backups_dir, bytes.len() as u64, self.max_disk_usage_percent)
            .map_err(|e| FindxError::Backup(format!("{:#}", e)))?;

        let created_at = Utc::now();
        let path_hash = checksum(file.as_os_str().as_encoded_bytes());
        let (id, backup_dir) = loop {
            let seq = self.counter.fetch_add(1, Ordering::Relaxed);
            let id = format!(
                "{}-{}-{:06}",
                created_at.format("%Y%m%d-%H%M%S%3f"),
                &path_hash[..8],
                seq
            );
            let dir = self.backups_dir.join(&id);
            match fs::create_dir(&dir) {
                Ok(()) => break (id, dir),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(FindxError::io(&dir, e)),
            }
        };

        let record = BackupRecord {
            id,
            source_file: file.to_path_buf(),
            snapshot_path: backup_dir.join(file_name),
            created_at,
            size: bytes.len() as u64,
            checksum: checksum(&bytes),
        };

        if let Err(e) = write_snapshot(&record, &bytes, &backup_dir) {
            if let Err(cleanup) = fs::remove_dir_all(&backup_dir) {
                tracing::warn!("Failed to clean up {}: {}", backup_dir.display(), cleanup);
            }
            return Err(e);
        }

        tracing::info!(
            "Backup {} created for {} ({} bytes)",
            record.id,
            file.display(),
            record.size
        );
        Ok(record)
    }

    pub fn get(&self, id: &str) -> Result<BackupRecord> {
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(FindxError::BackupNotFound(id.to_string()));
        }

        let record_path = self.backups_dir.join(id).join(RECORD_FILE_NAME);
        let json = match fs::read_to_string(&record_path) {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(FindxError::BackupNotFound(id.to_string()));
            }
            Err(e) => return Err(FindxError::io(&record_path, e)),
        };
        Ok(serde_json::from_str(&json)?)
    }

    /// All backups oldest first, optionally only those of `file`
    pub fn list_backups(&self, file: Option<&Path>) -> Result<Vec<BackupRecord>> {
        let mut backups = Vec::new();

        let entries =
            fs::read_dir(&self.backups_dir).map_err(|e| FindxError::io(&self.backups_dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| FindxError::io(&self.backups_dir, e))?;
            let record_path = entry.path().join(RECORD_FILE_NAME);

            let Ok(json) = fs::read_to_string(&record_path) else {
                continue;
            };
            match serde_json::from_str::<BackupRecord>(&json) {
                Ok(record) => {
                    if file.is_none_or(|f| record.source_file == f) {
                        backups.push(record);
                    }
                }
                Err(e) => tracing::debug!("Ignoring {}: {}", record_path.display(), e),
            }
        }

        // Equal timestamps fall back to the id for a stable order
        backups.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(backups)
    }

    pub fn latest_backup(&self, file: &Path) -> Result<Option<BackupRecord>> {
        Ok(self.list_backups(Some(file))?.pop())
    }

    /// Put a snapshot's content back over its source file.
    ///
    /// The write is atomic and is logged as a `Restore` entry that points at
    /// the backup. The backup itself is kept.
    pub fn restore(&self, id: &str, history: &HistoryLog) -> Result<HistoryEntry> {
        let record = self.get(id)?;
        let bytes = fs::read(&record.snapshot_path).map_err(|e| {
            FindxError::Backup(format!(
                "Snapshot {} is unreadable: {}",
                record.snapshot_path.display(),
                e
            ))
        })?;
        if checksum(&bytes) != record.checksum {
            return Err(FindxError::Backup(format!(
                "Snapshot {} does not match its recorded checksum",
                record.snapshot_path.display()
            )));
        }

        atomic_write(&record.source_file, &bytes)?;
        tracing::info!("Restored {} from backup {}", record.source_file.display(), id);

        history.append(
            HistoryDraft::new(&record.source_file, OperationKind::Restore)
                .backup(Some(record.id.clone()))
                .detail(format!("restored {} bytes", bytes.len())),
        )
    }

    /// Line diff from the snapshot to the live content of `file`.
    ///
    /// The backup must be a snapshot of `file`; any other id is `BackupNotFound`.
    pub fn diff(&self, file: &Path, id: &str) -> Result<Vec<DiffLine>> {
        let record = self.get(id)?;
        if !same_file(&record.source_file, file) {
            return Err(FindxError::BackupNotFound(format!(
                "{} (not a backup of {})",
                id,
                file.display()
            )));
        }
        let old = read_text(&record.snapshot_path)?;
        let new = read_text(file)?;

        let diff = TextDiff::from_lines(&old, &new);
        Ok(diff
            .iter_all_changes()
            .map(|change| DiffLine {
                tag: match change.tag() {
                    ChangeTag::Delete => DiffTag::Removed,
                    ChangeTag::Insert => DiffTag::Added,
                    ChangeTag::Equal => DiffTag::Unchanged,
                },
                content: change.value().trim_end_matches(['\n', '\r']).to_string(),
                old_line: change.old_index().map(|i| i + 1),
                new_line: change.new_index().map(|i| i + 1),
            })
            .collect())
    }

    /// Keep only the `keep` newest backups; returns how many were removed
    pub fn prune_backups(&self, keep: usize) -> Result<usize> {
        let backups = self.list_backups(None)?;
        if backups.len() <= keep {
            return Ok(0);
        }

        let to_remove = backups.len() - keep;
        for backup in backups.iter().take(to_remove) {
            let backup_dir = self.backups_dir.join(&backup.id);
            fs::remove_dir_all(&backup_dir).map_err(|e| FindxError::io(&backup_dir, e))?;
        }

        tracing::info!("Pruned {} backups, kept {}", to_remove, keep);
        Ok(to_remove)
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn write_snapshot(record: &BackupRecord, bytes: &[u8], backup_dir: &Path) -> Result<()> {
    let mut snapshot =
        File::create(&record.snapshot_path).map_err(|e| FindxError::io(&record.snapshot_path, e))?;
    snapshot
        .write_all(bytes)
        .and_then(|_| snapshot.sync_all())
        .map_err(|e| FindxError::io(&record.snapshot_path, e))?;

    let record_path = backup_dir.join(RECORD_FILE_NAME);
    let json = serde_json::to_string_pretty(record)?;
    fs::write(&record_path, json).map_err(|e| FindxError::io(&record_path, e))
}

fn read_text(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| FindxError::io(path, e))?;
    String::from_utf8(bytes).map_err(|_| FindxError::Encoding(path.to_path_buf()))
}
