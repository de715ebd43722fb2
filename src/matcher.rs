//! Pattern compilation and line matching
//!
//! Both literal and regex searches compile down to one `Regex`; the rest of the
//! engine never looks at raw pattern syntax. Matching is line-oriented, so a
//! match never spans a newline.

use crate::error::{FindxError, Result};
use regex::{Captures, Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

const REGEX_SIZE_LIMIT: usize = 10 * (1 << 20);
const REGEX_DFA_SIZE_LIMIT: usize = 10 * (1 << 20);

/// Byte offsets of one match inside the original line, end exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone)]
pub struct PatternMatcher {
    regex: Regex,
    pattern: String,
    literal: bool,
}

impl PatternMatcher {
    /// Compile a search pattern.
    ///
    /// Literal patterns have every metacharacter escaped. `whole_word` wraps the
    /// effective pattern in word boundaries; case-insensitivity is a regex flag so
    /// spans always index into the original line.
    pub fn compile(
        pattern: &str,
        is_regex: bool,
        case_sensitive: bool,
        whole_word: bool,
    ) -> Result<Self> {
        if pattern.is_empty() {
            return Err(FindxError::InvalidPattern {
                pattern: String::new(),
                message: "pattern is empty".to_string(),
            });
        }

        let body = if is_regex {
            pattern.to_string()
        } else {
            regex::escape(pattern)
        };
        let effective = if whole_word {
            format!(r"\b(?:{})\b", body)
        } else {
            body
        };

        let regex = RegexBuilder::new(&effective)
            .case_insensitive(!case_sensitive)
            .size_limit(REGEX_SIZE_LIMIT)
            .dfa_size_limit(REGEX_DFA_SIZE_LIMIT)
            .build()
            .map_err(|e| FindxError::InvalidPattern {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            regex,
            pattern: pattern.to_string(),
            literal: !is_regex,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_literal(&self) -> bool {
        self.literal
    }

    pub fn is_match(&self, line: &str) -> bool {
        self.regex.is_match(line)
    }

    /// All non-overlapping matches in `line`, left to right
    pub fn find(&self, line: &str) -> Vec<Span> {
        self.regex
            .find_iter(line)
            .map(|m| Span {
                start: m.start(),
                end: m.end(),
            })
            .collect()
    }

    pub fn count(&self, line: &str) -> usize {
        self.regex.find_iter(line).count()
    }

    /// Substitute every match in `line`.
    ///
    /// Regex patterns expand `$1` / `${name}` references in the replacement;
    /// literal patterns insert the replacement verbatim. Returns the new line and
    /// the number of substitutions made.
    pub fn replace_line<'a>(&self, line: &'a str, replacement: &str) -> (Cow<'a, str>, usize) {
        let mut count = 0;
        let replaced = if self.literal {
            self.regex.replace_all(line, |_: &Captures| {
                count += 1;
                replacement.to_string()
            })
        } else {
            self.regex.replace_all(line, |caps: &Captures| {
                count += 1;
                let mut expanded = String::new();
                caps.expand(replacement, &mut expanded);
                expanded
            })
        };
        (replaced, count)
    }
}
