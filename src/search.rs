//! Multi-file search
//!
//! Files are streamed line by line; only the context window and the records
//! for the file at hand are held in memory. Files are scanned in ordered
//! chunks on the worker pool, and results are merged in path order so the
//! first `max_results` records are always the same ones.

use crate::config::SearchConfig;
use crate::error::{FindxError, Result, SkippedFile, UnreadableReason};
use crate::file_types::FileTypeGroups;
use crate::filter::PathFilter;
use crate::matcher::Span;
use crate::query::SearchSpec;
use crate::walker::Traverser;
use rayon::ThreadPool;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Leading bytes inspected for a NUL when deciding a file is binary
pub const BINARY_SNIFF_LEN: usize = 8 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchRecord {
    pub file: PathBuf,
    /// 1-based
    pub line_number: usize,
    pub line_text: String,
    pub spans: Vec<Span>,
    pub context_before: Vec<String>,
    pub context_after: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchOutcome {
    pub matches: Vec<MatchRecord>,
    pub skipped: Vec<SkippedFile>,
    pub files_scanned: usize,
    pub files_with_matches: usize,
    /// The result cap was reached; more matches may exist
    pub truncated: bool,
}

/// Per-file resource limits shared by search and replace
#[derive(Debug, Clone)]
pub struct ScanLimits {
    pub max_file_size: u64,
    pub max_files: usize,
    pub file_timeout: Duration,
}

impl ScanLimits {
    pub fn from_config(config: &SearchConfig) -> Self {
        Self {
            max_file_size: config.max_file_size_bytes,
            max_files: config.max_files,
            file_timeout: Duration::from_millis(config.file_timeout_ms),
        }
    }
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self::from_config(&SearchConfig::default())
    }
}

pub struct SearchEngine<'a> {
    groups: &'a FileTypeGroups,
    limits: &'a ScanLimits,
    pool: &'a ThreadPool,
}

impl<'a> SearchEngine<'a> {
    pub fn new(groups: &'a FileTypeGroups, limits: &'a ScanLimits, pool: &'a ThreadPool) -> Self {
        Self {
            groups,
            limits,
            pool,
        }
    }

    /// Search every eligible file under `root`.
    ///
    /// Only a bad root fails the call; unreadable files land in
    /// `SearchOutcome::skipped`.
    pub fn search(&self, root: &Path, spec: &SearchSpec) -> Result<SearchOutcome> {
        let filter = PathFilter::new(root, spec, self.groups)?;
        let traverser = Traverser::new(&filter, self.limits.max_files);
        let max_results = spec.max_results();
        let chunk_size = self.pool.current_num_threads().max(1) * 4;

        tracing::debug!(
            "Searching {} for '{}' (max {} results)",
            filter.root().display(),
            spec.pattern(),
            max_results
        );

        let mut outcome = SearchOutcome::default();
        let mut walk = traverser.walk();

        'chunks: loop {
            let mut chunk = Vec::with_capacity(chunk_size);
            for item in walk.by_ref() {
                match item {
                    Ok(path) => {
                        chunk.push(path);
                        if chunk.len() == chunk_size {
                            break;
                        }
                    }
                    Err(skipped) => outcome.skipped.push(skipped),
                }
            }
            if chunk.is_empty() {
                break;
            }

            let remaining = max_results - outcome.matches.len();
            let results: Vec<Result<Vec<MatchRecord>>> = self.pool.install(|| {
                chunk
                    .par_iter()
                    .map(|path| scan_file(path, spec, self.limits, remaining))
                    .collect()
            });

            for (path, result) in chunk.iter().zip(results) {
                match result {
                    Ok(records) => {
                        outcome.files_scanned += 1;
                        if !records.is_empty() {
                            outcome.files_with_matches += 1;
                        }
                        for record in records {
                            if outcome.matches.len() == max_results {
                                outcome.truncated = true;
                                break 'chunks;
                            }
                            outcome.matches.push(record);
                        }
                    }
                    Err(e) => {
                        tracing::debug!("Skipping {}: {}", path.display(), e);
                        outcome.skipped.push(SkippedFile::from_error(path, &e));
                    }
                }
                if outcome.matches.len() == max_results {
                    outcome.truncated = true;
                    break 'chunks;
                }
            }
        }

        tracing::info!(
            "Search for '{}' found {} matches in {} files ({} scanned, {} skipped)",
            spec.pattern(),
            outcome.matches.len(),
            outcome.files_with_matches,
            outcome.files_scanned,
            outcome.skipped.len()
        );
        Ok(outcome)
    }
}

/// Reject files above the size limit before reading them
pub(crate) fn check_size(path: &Path, limits: &ScanLimits) -> Result<()> {
    let size = fs::metadata(path).map_err(|e| FindxError::io(path, e))?.len();
    if size > limits.max_file_size {
        return Err(FindxError::unreadable(
            path,
            UnreadableReason::TooLarge {
                size,
                limit: limits.max_file_size,
            },
        ));
    }
    Ok(())
}

pub(crate) fn looks_binary(bytes: &[u8]) -> bool {
    bytes[..bytes.len().min(BINARY_SNIFF_LEN)].contains(&0)
}

pub(crate) fn check_deadline(path: &Path, started: Instant, budget: Duration) -> Result<()> {
    let elapsed = started.elapsed();
    if elapsed > budget {
        return Err(FindxError::unreadable(
            path,
            UnreadableReason::Timeout {
                elapsed_ms: elapsed.as_millis(),
            },
        ));
    }
    Ok(())
}

/// Scan one file, returning at most `limit` records in line order
fn scan_file(
    path: &Path,
    spec: &SearchSpec,
    limits: &ScanLimits,
    limit: usize,
) -> Result<Vec<MatchRecord>> {
    check_size(path, limits)?;

    let file = File::open(path).map_err(|e| FindxError::io(path, e))?;
    let mut reader = BufReader::with_capacity(64 * 1024, file);
    let head = reader.fill_buf().map_err(|e| FindxError::io(path, e))?;
    if looks_binary(head) {
        return Err(FindxError::unreadable(path, UnreadableReason::Binary));
    }

    let matcher = spec.matcher();
    let context = spec.context_lines();
    let started = Instant::now();

    let mut records: Vec<MatchRecord> = Vec::new();
    let mut before: VecDeque<String> = VecDeque::with_capacity(context + 1);
    // Indices into `records` still collecting trailing context
    let mut pending: Vec<usize> = Vec::new();
    let mut line = String::new();
    let mut line_number = 0;

    loop {
        line.clear();
        let read = reader
            .read_line(&mut line)
            .map_err(|e| FindxError::io(path, e))?;
        if read == 0 {
            break;
        }
        line_number += 1;
        check_deadline(path, started, limits.file_timeout)?;

        let text = line.trim_end_matches('\n').trim_end_matches('\r');

        pending.retain(|&idx| {
            let after = &mut records[idx].context_after;
            after.push(text.to_string());
            after.len() < context
        });

        if records.len() < limit {
            let spans = matcher.find(text);
            if !spans.is_empty() {
                records.push(MatchRecord {
                    file: path.to_path_buf(),
                    line_number,
                    line_text: text.to_string(),
                    spans,
                    context_before: before.iter().cloned().collect(),
                    context_after: Vec::new(),
                });
                if context > 0 {
                    pending.push(records.len() - 1);
                }
            }
        } else if pending.is_empty() {
            break;
        }

        if context > 0 {
            if before.len() == context {
                before.pop_front();
            }
            before.push_back(text.to_string());
        }
    }

    Ok(records)
}
