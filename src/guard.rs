use crate::error::{FindxError, Result};
use std::path::{Path, PathBuf};

/// Bounds direct single-file operations to a set of allowed roots.
///
/// With no roots configured every existing path is allowed.
#[derive(Debug, Clone, Default)]
pub struct PathGuard {
    roots: Vec<PathBuf>,
}

impl PathGuard {
    /// Guard that admits every path
    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// Roots are canonicalized up front so symlinked roots compare correctly.
    pub fn new<I, P>(roots: I) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let roots = roots
            .into_iter()
            .map(|r| {
                let r = r.as_ref();
                r.canonicalize().map_err(|e| FindxError::io(r, e))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { roots })
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Canonicalize `path` and check it sits under an allowed root.
    ///
    /// Returns the canonical path; a missing file surfaces as `FileNotFound`.
    pub fn check(&self, path: &Path) -> Result<PathBuf> {
        let canonical = path.canonicalize().map_err(|e| FindxError::io(path, e))?;
        if self.roots.is_empty() || self.roots.iter().any(|r| canonical.starts_with(r)) {
            return Ok(canonical);
        }
        Err(FindxError::PathSecurity {
            path: canonical,
            root: self.roots[0].clone(),
        })
    }
}
