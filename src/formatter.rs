use crate::backup_manager::{BackupRecord, DiffLine, DiffTag};
use crate::history::HistoryEntry;
use crate::replace::ReplaceOutcome;
use crate::search::{MatchRecord, SearchOutcome};
use colored::*;
use std::io::IsTerminal;
use std::path::Path;

/// Human-readable rendering of engine results
pub struct ReportFormatter {
    use_color: bool,
}

impl ReportFormatter {
    /// Color when stdout is a terminal and NO_COLOR is unset
    pub fn auto() -> Self {
        Self {
            use_color: Self::should_use_color(),
        }
    }

    pub fn plain() -> Self {
        Self { use_color: false }
    }

    fn should_use_color() -> bool {
        // Check NO_COLOR env var (https://no-color.org/)
        if std::env::var("NO_COLOR").is_ok() {
            return false;
        }
        std::io::stdout().is_terminal()
    }

    fn file_header(&self, path: &Path) -> String {
        let name = path.display().to_string();
        if self.use_color {
            format!("{}\n", name.bold().cyan())
        } else {
            format!("{}\n", name)
        }
    }

    /// Matches grouped per file, the matched line marked with `>>`
    pub fn format_search(&self, outcome: &SearchOutcome) -> String {
        let mut output = String::new();

        if outcome.matches.is_empty() {
            output.push_str("No matches found.\n");
        }

        let mut current: Option<&Path> = None;
        for record in &outcome.matches {
            if current != Some(record.file.as_path()) {
                if current.is_some() {
                    output.push('\n');
                }
                output.push_str(&self.file_header(&record.file));
                current = Some(record.file.as_path());
            } else {
                output.push_str("--\n");
            }
            self.push_record(&mut output, record);
        }

        let files = outcome.files_with_matches;
        output.push_str(&format!(
            "\nTotal: {} match{} in {} file{} ({} scanned)",
            outcome.matches.len(),
            if outcome.matches.len() == 1 { "" } else { "es" },
            files,
            if files == 1 { "" } else { "s" },
            outcome.files_scanned
        ));
        if outcome.truncated {
            output.push_str(", result cap reached");
        }
        output.push('\n');

        self.push_skipped(&mut output, &outcome.skipped);
        output
    }

    fn push_record(&self, output: &mut String, record: &MatchRecord) {
        let first = record.line_number - record.context_before.len();
        for (i, line) in record.context_before.iter().enumerate() {
            output.push_str(&self.context_line(first + i, line));
        }

        let highlighted = if self.use_color {
            let mut text = String::new();
            let mut last = 0;
            for span in &record.spans {
                text.push_str(&record.line_text[last..span.start]);
                text.push_str(&record.line_text[span.start..span.end].red().bold().to_string());
                last = span.end;
            }
            text.push_str(&record.line_text[last..]);
            format!("L{}: {} {}\n", record.line_number, ">>".yellow().bold(), text)
        } else {
            format!("L{}: >> {}\n", record.line_number, record.line_text)
        };
        output.push_str(&highlighted);

        for (i, line) in record.context_after.iter().enumerate() {
            output.push_str(&self.context_line(record.line_number + 1 + i, line));
        }
    }

    fn context_line(&self, line_number: usize, text: &str) -> String {
        if self.use_color {
            format!("L{}:    {}\n", line_number, text.dimmed())
        } else {
            format!("L{}:    {}\n", line_number, text)
        }
    }

    fn push_skipped(&self, output: &mut String, skipped: &[crate::error::SkippedFile]) {
        if skipped.is_empty() {
            return;
        }
        output.push_str(&format!("Skipped {} file(s):\n", skipped.len()));
        for s in skipped {
            if self.use_color {
                output.push_str(&format!("  {}: {}\n", s.path.display(), s.reason.yellow()));
            } else {
                output.push_str(&format!("  {}: {}\n", s.path.display(), s.reason));
            }
        }
    }

    /// Per-file change counts for a replace run or its preview
    pub fn format_replace(&self, outcome: &ReplaceOutcome, dry_run: bool) -> String {
        let mut output = String::new();

        if outcome.changes.is_empty() {
            output.push_str("No changes would be made.\n");
            self.push_skipped(&mut output, &outcome.skipped);
            return output;
        }

        let header = if dry_run { "Dry run:" } else { "Applied:" };
        if self.use_color {
            output.push_str(&format!("{}\n", header.bold().green()));
        } else {
            output.push_str(&format!("{}\n", header));
        }

        for change in &outcome.changes {
            let file = change.file.display().to_string();
            let mut line = if self.use_color {
                format!("  {}: {} occurrence(s)", file.cyan(), change.occurrence_count)
            } else {
                format!("  {}: {} occurrence(s)", file, change.occurrence_count)
            };
            if let Some(id) = &change.backup_id {
                line.push_str(&format!(", backup {}", id));
            }
            if let Some(err) = &change.error {
                if self.use_color {
                    line.push_str(&format!(" [{}]", err.red()));
                } else {
                    line.push_str(&format!(" [failed: {}]", err));
                }
            }
            output.push_str(&line);
            output.push('\n');
        }

        output.push_str(&format!(
            "\nTotal: {} occurrence(s) across {} file(s)",
            outcome.total_occurrences(),
            outcome.changes.len()
        ));
        if !dry_run {
            output.push_str(&format!(", {} written", outcome.files_changed()));
        }
        output.push('\n');

        self.push_skipped(&mut output, &outcome.skipped);
        output
    }

    /// Snapshot-vs-live diff, showing changed lines with `context_size` lines
    /// around each group of changes
    pub fn format_diff(&self, path: &Path, diff: &[DiffLine], context_size: usize) -> String {
        let mut output = self.file_header(path);

        let shown = filter_lines_with_context(diff, context_size);
        for entry in &shown {
            let Some(line) = entry else {
                if self.use_color {
                    output.push_str(&format!("{}\n", "...".dimmed()));
                } else {
                    output.push_str("...\n");
                }
                continue;
            };

            let line_num = line.new_line.or(line.old_line).unwrap_or(0);
            let indicator = match line.tag {
                DiffTag::Unchanged => "=",
                DiffTag::Added => "+",
                DiffTag::Removed => "-",
            };

            if self.use_color {
                let colored_line = match line.tag {
                    DiffTag::Unchanged => {
                        format!("L{}: {} {}\n", line_num, indicator.dimmed(), line.content.dimmed())
                    }
                    DiffTag::Added => format!(
                        "L{}: {} {}\n",
                        line_num,
                        indicator.green().bold(),
                        line.content.green().bold()
                    ),
                    DiffTag::Removed => format!(
                        "L{}: {} {}\n",
                        line_num,
                        indicator.red().bold(),
                        line.content.red()
                    ),
                };
                output.push_str(&colored_line);
            } else {
                output.push_str(&format!("L{}: {} {}\n", line_num, indicator, line.content));
            }
        }

        let added = diff.iter().filter(|d| d.tag == DiffTag::Added).count();
        let removed = diff.iter().filter(|d| d.tag == DiffTag::Removed).count();
        if added + removed == 0 {
            output.push_str("No differences.\n");
        } else {
            output.push_str(&format!("\nTotal: {} added, {} removed\n", added, removed));
        }
        output
    }

    pub fn format_history(&self, entries: &[HistoryEntry]) -> String {
        let mut output = String::new();

        if entries.is_empty() {
            output.push_str("No edit history found.\n");
            return output;
        }

        if self.use_color {
            output.push_str(&"Edit History:\n\n".bold().white().to_string());
        } else {
            output.push_str("Edit History:\n\n");
        }

        for entry in entries {
            let range = entry
                .line_range
                .map(|(s, e)| if s == e { format!(" line {}", s) } else { format!(" lines {}-{}", s, e) })
                .unwrap_or_default();
            if self.use_color {
                output.push_str(&format!("#{} {}{}\n", entry.id.to_string().yellow(), entry.kind, range));
                output.push_str(&format!("  File: {}\n", entry.file.display().to_string().cyan()));
            } else {
                output.push_str(&format!("#{} {}{}\n", entry.id, entry.kind, range));
                output.push_str(&format!("  File: {}\n", entry.file.display()));
            }
            output.push_str(&format!("  Time: {}\n", entry.timestamp.format("%Y-%m-%d %H:%M:%S")));
            if let Some(backup) = &entry.backup_ref {
                output.push_str(&format!("  Backup: {}\n", backup));
            }
            if let Some(detail) = &entry.detail {
                output.push_str(&format!("  {}\n", detail));
            }
            output.push('\n');
        }

        output
    }

    pub fn format_backups(&self, records: &[BackupRecord]) -> String {
        if records.is_empty() {
            return "No backups found.\n".to_string();
        }

        let mut output = String::new();
        for record in records {
            let id = if self.use_color {
                record.id.yellow().to_string()
            } else {
                record.id.clone()
            };
            output.push_str(&format!(
                "{}  {}  {}  {} bytes\n",
                id,
                record.created_at.format("%Y-%m-%d %H:%M:%S"),
                record.source_file.display(),
                record.size
            ));
        }
        output
    }
}

/// Changed lines plus context, grouping changes that sit close together.
/// `None` marks a gap between groups.
fn filter_lines_with_context(lines: &[DiffLine], context_size: usize) -> Vec<Option<&DiffLine>> {
    let changed: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, l)| l.tag != DiffTag::Unchanged)
        .map(|(i, _)| i)
        .collect();

    let Some(&first) = changed.first() else {
        return Vec::new();
    };
    if context_size == 0 {
        return changed.iter().map(|&i| Some(&lines[i])).collect();
    }

    // Two changes share a group when their context windows touch
    let group_threshold = context_size * 2 + 1;
    let mut groups: Vec<(usize, usize)> = vec![(first, first)];
    for &idx in &changed[1..] {
        match groups.last_mut() {
            Some(group) if idx - group.1 <= group_threshold => group.1 = idx,
            _ => groups.push((idx, idx)),
        }
    }

    let mut result = Vec::new();
    let mut last_end: Option<usize> = None;
    for (group_start, group_end) in groups {
        let start = group_start.saturating_sub(context_size);
        let end = (group_end + context_size + 1).min(lines.len());

        if last_end.is_some_and(|prev| start > prev) {
            result.push(None);
        }
        let from = last_end.map_or(start, |prev| start.max(prev));
        result.extend(lines[from..end].iter().map(Some));
        last_end = Some(end);
    }
    result
}
