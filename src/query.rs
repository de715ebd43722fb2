//! Immutable search and replace specifications
//!
//! Specs are built through builders and validated once: the pattern is compiled
//! and every glob is parsed before the spec exists, so a bad spec is rejected
//! before any traversal begins.

use crate::config::SearchConfig;
use crate::error::{FindxError, Result};
use crate::matcher::PatternMatcher;
use globset::{Glob, GlobSet, GlobSetBuilder};

pub const DEFAULT_MAX_RESULTS: usize = 1000;
pub const DEFAULT_CONTEXT_LINES: usize = 2;
pub const MAX_CONTEXT_LINES: usize = 100;

/// Excludes applied unless the builder turns them off
pub const DEFAULT_EXCLUDES: &[&str] = &[
    ".git",
    "node_modules",
    "__pycache__",
    "*.pyc",
    "*.pyo",
    ".DS_Store",
    "Thumbs.db",
    "*.log",
    ".env",
    ".vscode",
    ".idea",
    "dist",
    "build",
    "*.egg-info",
    ".pytest_cache",
    "coverage",
    ".coverage",
    "*.min.js",
    "*.min.css",
];

#[derive(Debug, Clone)]
pub struct SearchSpec {
    pattern: String,
    is_regex: bool,
    case_sensitive: bool,
    whole_word: bool,
    include_globs: Vec<String>,
    exclude_globs: Vec<String>,
    file_types: Vec<String>,
    max_results: usize,
    context_lines: usize,
    show_hidden: bool,
    matcher: PatternMatcher,
    include_set: Option<GlobSet>,
    exclude_set: GlobSet,
}

impl SearchSpec {
    pub fn builder(pattern: impl Into<String>) -> SearchSpecBuilder {
        SearchSpecBuilder::new(pattern)
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_regex(&self) -> bool {
        self.is_regex
    }

    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    pub fn whole_word(&self) -> bool {
        self.whole_word
    }

    pub fn include_globs(&self) -> &[String] {
        &self.include_globs
    }

    /// Effective excludes, defaults included
    pub fn exclude_globs(&self) -> &[String] {
        &self.exclude_globs
    }

    pub fn file_types(&self) -> &[String] {
        &self.file_types
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    pub fn context_lines(&self) -> usize {
        self.context_lines
    }

    pub fn show_hidden(&self) -> bool {
        self.show_hidden
    }

    pub fn matcher(&self) -> &PatternMatcher {
        &self.matcher
    }

    pub(crate) fn include_set(&self) -> Option<&GlobSet> {
        self.include_set.as_ref()
    }

    pub(crate) fn exclude_set(&self) -> &GlobSet {
        &self.exclude_set
    }
}

#[derive(Debug, Clone)]
pub struct SearchSpecBuilder {
    pattern: String,
    is_regex: bool,
    case_sensitive: bool,
    whole_word: bool,
    include_globs: Vec<String>,
    exclude_globs: Vec<String>,
    file_types: Vec<String>,
    max_results: usize,
    context_lines: usize,
    show_hidden: bool,
    default_excludes: bool,
}

impl SearchSpecBuilder {
    fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            is_regex: false,
            case_sensitive: false,
            whole_word: false,
            include_globs: Vec::new(),
            exclude_globs: Vec::new(),
            file_types: Vec::new(),
            max_results: DEFAULT_MAX_RESULTS,
            context_lines: DEFAULT_CONTEXT_LINES,
            show_hidden: false,
            default_excludes: true,
        }
    }

    /// Take result cap and context size from the `[search]` config section
    pub fn defaults_from(mut self, config: &SearchConfig) -> Self {
        self.max_results = config.max_results;
        self.context_lines = config.context_lines;
        self
    }

    pub fn regex(mut self, yes: bool) -> Self {
        self.is_regex = yes;
        self
    }

    pub fn case_sensitive(mut self, yes: bool) -> Self {
        self.case_sensitive = yes;
        self
    }

    pub fn whole_word(mut self, yes: bool) -> Self {
        self.whole_word = yes;
        self
    }

    pub fn include(mut self, glob: impl Into<String>) -> Self {
        self.include_globs.push(glob.into());
        self
    }

    pub fn exclude(mut self, glob: impl Into<String>) -> Self {
        self.exclude_globs.push(glob.into());
        self
    }

    pub fn file_type(mut self, group: impl Into<String>) -> Self {
        self.file_types.push(group.into());
        self
    }

    pub fn max_results(mut self, n: usize) -> Self {
        self.max_results = n;
        self
    }

    pub fn context_lines(mut self, n: usize) -> Self {
        self.context_lines = n;
        self
    }

    pub fn show_hidden(mut self, yes: bool) -> Self {
        self.show_hidden = yes;
        self
    }

    pub fn default_excludes(mut self, yes: bool) -> Self {
        self.default_excludes = yes;
        self
    }

    pub fn build(self) -> Result<SearchSpec> {
        if self.max_results == 0 {
            return Err(FindxError::InvalidOption(
                "max_results must be at least 1".to_string(),
            ));
        }
        if self.context_lines > MAX_CONTEXT_LINES {
            return Err(FindxError::InvalidOption(format!(
                "context_lines is {} (max {})",
                self.context_lines, MAX_CONTEXT_LINES
            )));
        }

        let matcher = PatternMatcher::compile(
            &self.pattern,
            self.is_regex,
            self.case_sensitive,
            self.whole_word,
        )?;

        let include_set = if self.include_globs.is_empty() {
            None
        } else {
            Some(build_glob_set(&self.include_globs)?)
        };

        let mut exclude_globs: Vec<String> = Vec::new();
        if self.default_excludes {
            exclude_globs.extend(DEFAULT_EXCLUDES.iter().map(|g| g.to_string()));
        }
        exclude_globs.extend(self.exclude_globs);
        let exclude_set = build_glob_set(&exclude_globs)?;

        Ok(SearchSpec {
            pattern: self.pattern,
            is_regex: self.is_regex,
            case_sensitive: self.case_sensitive,
            whole_word: self.whole_word,
            include_globs: self.include_globs,
            exclude_globs,
            file_types: self.file_types,
            max_results: self.max_results,
            context_lines: self.context_lines,
            show_hidden: self.show_hidden,
            matcher,
            include_set,
            exclude_set,
        })
    }
}

fn build_glob_set(globs: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for glob in globs {
        let trimmed = glob.trim().trim_end_matches('/');
        let compiled = Glob::new(trimmed).map_err(|e| FindxError::InvalidGlob {
            glob: glob.clone(),
            message: e.to_string(),
        })?;
        builder.add(compiled);
    }
    builder.build().map_err(|e| FindxError::InvalidGlob {
        glob: globs.join(","),
        message: e.to_string(),
    })
}

/// Search options plus what to substitute and how to apply it.
///
/// `dry_run` defaults to true: a spec has to opt in to touching the disk.
#[derive(Debug, Clone)]
pub struct ReplaceSpec {
    search: SearchSpec,
    replacement: String,
    dry_run: bool,
    make_backup: bool,
}

impl ReplaceSpec {
    pub fn builder(pattern: impl Into<String>, replacement: impl Into<String>) -> ReplaceSpecBuilder {
        ReplaceSpecBuilder {
            search: SearchSpecBuilder::new(pattern),
            replacement: replacement.into(),
            dry_run: true,
            make_backup: true,
        }
    }

    pub fn search(&self) -> &SearchSpec {
        &self.search
    }

    pub fn replacement(&self) -> &str {
        &self.replacement
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn make_backup(&self) -> bool {
        self.make_backup
    }

    pub fn matcher(&self) -> &PatternMatcher {
        self.search.matcher()
    }
}

#[derive(Debug, Clone)]
pub struct ReplaceSpecBuilder {
    search: SearchSpecBuilder,
    replacement: String,
    dry_run: bool,
    make_backup: bool,
}

impl ReplaceSpecBuilder {
    /// Adjust the underlying search options
    pub fn search(mut self, f: impl FnOnce(SearchSpecBuilder) -> SearchSpecBuilder) -> Self {
        self.search = f(self.search);
        self
    }

    pub fn dry_run(mut self, yes: bool) -> Self {
        self.dry_run = yes;
        self
    }

    pub fn make_backup(mut self, yes: bool) -> Self {
        self.make_backup = yes;
        self
    }

    pub fn build(self) -> Result<ReplaceSpec> {
        Ok(ReplaceSpec {
            search: self.search.build()?,
            replacement: self.replacement,
            dry_run: self.dry_run,
            make_backup: self.make_backup,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let spec = SearchSpec::builder("foo").build().unwrap();
        assert!(!spec.is_regex());
        assert!(!spec.case_sensitive());
        assert!(!spec.whole_word());
        assert!(!spec.show_hidden());
        assert_eq!(spec.max_results(), DEFAULT_MAX_RESULTS);
        assert_eq!(spec.context_lines(), DEFAULT_CONTEXT_LINES);
        assert_eq!(spec.exclude_globs().len(), DEFAULT_EXCLUDES.len());
        assert!(spec.include_set().is_none());
    }

    #[test]
    fn test_malformed_regex_rejected_at_build() {
        let err = SearchSpec::builder("a(b").regex(true).build().unwrap_err();
        assert!(err.is_construction_error());
    }

    #[test]
    fn test_malformed_glob_rejected_at_build() {
        let err = SearchSpec::builder("x").include("a[").build().unwrap_err();
        assert!(matches!(err, FindxError::InvalidGlob { .. }));
    }

    #[test]
    fn test_zero_max_results_rejected() {
        let err = SearchSpec::builder("x").max_results(0).build().unwrap_err();
        assert!(matches!(err, FindxError::InvalidOption(_)));
    }

    #[test]
    fn test_context_lines_cap() {
        assert!(SearchSpec::builder("x").context_lines(MAX_CONTEXT_LINES).build().is_ok());
        assert!(SearchSpec::builder("x").context_lines(MAX_CONTEXT_LINES + 1).build().is_err());
    }

    #[test]
    fn test_default_excludes_can_be_disabled() {
        let spec = SearchSpec::builder("x")
            .default_excludes(false)
            .exclude("*.tmp")
            .build()
            .unwrap();
        assert_eq!(spec.exclude_globs(), &["*.tmp".to_string()]);
    }

    #[test]
    fn test_replace_spec_defaults_to_dry_run() {
        let spec = ReplaceSpec::builder("foo", "bar").build().unwrap();
        assert!(spec.dry_run());
        assert!(spec.make_backup());
        assert_eq!(spec.replacement(), "bar");
    }

    #[test]
    fn test_replace_spec_search_options() {
        let spec = ReplaceSpec::builder(r"(\d+)", "<$1>")
            .search(|s| s.regex(true).case_sensitive(true).include("*.txt"))
            .dry_run(false)
            .build()
            .unwrap();
        assert!(spec.search().is_regex());
        assert_eq!(spec.search().include_globs(), &["*.txt".to_string()]);
        assert!(!spec.dry_run());
    }
}
