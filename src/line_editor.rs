//! Line-range edits on a single file
//!
//! Line numbers are 1-based and inclusive. Every edit runs under the file's
//! path lock: snapshot (when enabled), atomic write, then the history entry.

use crate::atomic::atomic_write;
use crate::backup_manager::BackupManager;
use crate::error::{FindxError, Result};
use crate::history::{HistoryDraft, HistoryLog, OperationKind};
use crate::locks::PathLocks;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditOutcome {
    pub file: PathBuf,
    pub backup_id: Option<String>,
    pub history_id: u64,
    pub lines_before: usize,
    pub lines_after: usize,
}

pub struct LineEditor<'a> {
    backups: &'a BackupManager,
    history: &'a HistoryLog,
    locks: &'a PathLocks,
    make_backup: bool,
}

impl<'a> LineEditor<'a> {
    pub fn new(
        backups: &'a BackupManager,
        history: &'a HistoryLog,
        locks: &'a PathLocks,
        make_backup: bool,
    ) -> Self {
        Self {
            backups,
            history,
            locks,
            make_backup,
        }
    }

    /// Replace lines `start..=end` (end defaults to start) with `content`
    pub fn replace_lines(
        &self,
        file: &Path,
        start: usize,
        end: Option<usize>,
        content: &str,
    ) -> Result<EditOutcome> {
        let end = end.unwrap_or(start);
        self.edit(file, OperationKind::EditLines, (start, end), |lines, eol| {
            check_range(file, start, end, lines.len())?;
            let mut new_lines = content_lines(content, eol);
            if end == lines.len() && !lines[end - 1].ends_with('\n') {
                // An unterminated last line stays unterminated
                if let Some(last) = new_lines.last_mut() {
                    let body_len = last.trim_end_matches(['\r', '\n']).len();
                    last.truncate(body_len);
                }
            }
            let count = new_lines.len();
            lines.splice(start - 1..end, new_lines);
            Ok(format!("replaced lines {}-{} with {} line(s)", start, end, count))
        })
    }

    /// Insert `content` before `at_line`; `len + 1` appends
    pub fn insert_lines(&self, file: &Path, at_line: usize, content: &str) -> Result<EditOutcome> {
        self.edit(file, OperationKind::Insert, (at_line, at_line), |lines, eol| {
            if at_line < 1 || at_line > lines.len() + 1 {
                return Err(FindxError::LineRange {
                    path: file.to_path_buf(),
                    start: at_line,
                    end: at_line,
                    len: lines.len(),
                });
            }
            if at_line == lines.len() + 1 {
                if let Some(last) = lines.last_mut() {
                    if !last.ends_with('\n') {
                        last.push_str(eol);
                    }
                }
            }
            let new_lines = content_lines(content, eol);
            let count = new_lines.len();
            lines.splice(at_line - 1..at_line - 1, new_lines);
            Ok(format!("inserted {} line(s) before line {}", count, at_line))
        })
    }

    /// Remove lines `start..=end` (end defaults to start)
    pub fn delete_lines(&self, file: &Path, start: usize, end: Option<usize>) -> Result<EditOutcome> {
        let end = end.unwrap_or(start);
        self.edit(file, OperationKind::Delete, (start, end), |lines, _| {
            check_range(file, start, end, lines.len())?;
            lines.drain(start - 1..end);
            Ok(format!("deleted lines {}-{}", start, end))
        })
    }

    fn edit<F>(
        &self,
        file: &Path,
        kind: OperationKind,
        range: (usize, usize),
        apply: F,
    ) -> Result<EditOutcome>
    where
        F: FnOnce(&mut Vec<String>, &str) -> Result<String>,
    {
        self.locks.with_lock(file, || {
            let bytes = fs::read(file).map_err(|e| FindxError::io(file, e))?;
            let text = String::from_utf8(bytes).map_err(|_| FindxError::Encoding(file.to_path_buf()))?;
            let eol = if text.contains("\r\n") { "\r\n" } else { "\n" };

            let mut lines: Vec<String> = text.split_inclusive('\n').map(str::to_string).collect();
            let lines_before = lines.len();
            let detail = apply(&mut lines, eol)?;
            let new_text = lines.concat();

            let backup_id = if self.make_backup {
                Some(self.backups.snapshot(file)?.id)
            } else {
                None
            };

            atomic_write(file, new_text.as_bytes())?;

            let entry = self.history.append(
                HistoryDraft::new(file, kind)
                    .lines(range.0, range.1)
                    .backup(backup_id.clone())
                    .detail(detail),
            )?;

            Ok(EditOutcome {
                file: file.to_path_buf(),
                backup_id,
                history_id: entry.id,
                lines_before,
                lines_after: lines.len(),
            })
        })
    }
}

fn check_range(file: &Path, start: usize, end: usize, len: usize) -> Result<()> {
    if start < 1 || start > end || end > len {
        return Err(FindxError::LineRange {
            path: file.to_path_buf(),
            start,
            end,
            len,
        });
    }
    Ok(())
}

/// Split new content into terminated lines using the file's line ending.
///
/// Empty content is a single blank line.
fn content_lines(content: &str, eol: &str) -> Vec<String> {
    if content.is_empty() {
        return vec![eol.to_string()];
    }
    content.lines().map(|line| format!("{}{}", line, eol)).collect()
}
