//! Traversal eligibility
//!
//! `PathFilter` is a pure predicate over paths under one root. Anything it
//! cannot classify (unreadable metadata, failed canonicalization) is excluded.

use crate::error::{FindxError, Result};
use crate::file_types::{FileTypeGroups, extension_of};
use crate::query::SearchSpec;
use globset::GlobSet;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone)]
pub struct PathFilter {
    root: PathBuf,
    include: Option<GlobSet>,
    exclude: GlobSet,
    extensions: Option<BTreeSet<String>>,
    show_hidden: bool,
}

impl PathFilter {
    /// Build a filter for `root` from the spec's globs and file-type groups.
    ///
    /// The root is canonicalized once here; every later check compares
    /// canonical paths against it.
    pub fn new(root: &Path, spec: &SearchSpec, groups: &FileTypeGroups) -> Result<Self> {
        let root = root.canonicalize().map_err(|e| FindxError::io(root, e))?;
        let extensions = if spec.file_types().is_empty() {
            None
        } else {
            groups.resolve(spec.file_types())
        };

        Ok(Self {
            root,
            include: spec.include_set().cloned(),
            exclude: spec.exclude_set().clone(),
            extensions,
            show_hidden: spec.show_hidden(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Should a regular file at `path` be scanned?
    pub fn eligible(&self, path: &Path) -> bool {
        let Some(rel) = self.relative(path) else {
            return false;
        };

        match fs::metadata(path) {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return false,
            Err(e) => {
                tracing::debug!("Excluding {}: metadata unavailable: {}", path.display(), e);
                return false;
            }
        }

        if !self.within_root(path) {
            tracing::warn!("Excluding {}: resolves outside {}", path.display(), self.root.display());
            return false;
        }
        if !self.show_hidden && is_hidden(&rel) {
            return false;
        }
        if self.excluded(&rel) {
            return false;
        }

        if let Some(include) = &self.include {
            let by_name = rel.file_name().is_some_and(|name| include.is_match(name));
            if !by_name && !include.is_match(&rel) {
                return false;
            }
        }

        match &self.extensions {
            None => true,
            Some(allowed) => extension_of(path).is_some_and(|ext| allowed.contains(&ext)),
        }
    }

    /// Should traversal recurse into the directory at `dir`?
    pub fn descend(&self, dir: &Path) -> bool {
        let Some(rel) = self.relative(dir) else {
            return false;
        };
        if rel.as_os_str().is_empty() {
            return true;
        }
        if !self.show_hidden && is_hidden(&rel) {
            return false;
        }
        !self.excluded(&rel) && self.within_root(dir)
    }

    /// Does `path` resolve (symlinks and `..` included) inside the root?
    pub fn within_root(&self, path: &Path) -> bool {
        match path.canonicalize() {
            Ok(canonical) => canonical.starts_with(&self.root),
            Err(_) => false,
        }
    }

    fn relative(&self, path: &Path) -> Option<PathBuf> {
        if path == self.root {
            // A single-file root is judged by its own name
            return if path.is_file() {
                path.file_name().map(PathBuf::from)
            } else {
                Some(PathBuf::new())
            };
        }
        path.strip_prefix(&self.root).ok().map(Path::to_path_buf)
    }

    /// Matches the relative path, the file name, or any ancestor directory
    fn excluded(&self, rel: &Path) -> bool {
        if self.exclude.is_empty() {
            return false;
        }
        if self.exclude.is_match(rel) {
            return true;
        }
        rel.ancestors()
            .filter(|a| !a.as_os_str().is_empty())
            .any(|a| {
                self.exclude.is_match(a)
                    || a.file_name().is_some_and(|name| self.exclude.is_match(name))
            })
    }
}

fn is_hidden(rel: &Path) -> bool {
    rel.components().any(|c| match c {
        Component::Normal(name) => name.to_string_lossy().starts_with('.'),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, rel: &str, content: &str) -> PathBuf {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path.canonicalize().unwrap()
    }

    fn filter_for(dir: &TempDir, spec: SearchSpec) -> PathFilter {
        PathFilter::new(dir.path(), &spec, &FileTypeGroups::default()).unwrap()
    }

    #[test]
    fn test_plain_file_is_eligible() {
        let dir = TempDir::new().unwrap();
        let file = create_test_file(dir.path(), "src/main.rs", "fn main() {}");
        let filter = filter_for(&dir, SearchSpec::builder("x").build().unwrap());
        assert!(filter.eligible(&file));
    }

    #[test]
    fn test_hidden_files_need_show_hidden() {
        let dir = TempDir::new().unwrap();
        let file = create_test_file(dir.path(), ".config/settings.txt", "x");

        let hidden_off = filter_for(&dir, SearchSpec::builder("x").build().unwrap());
        assert!(!hidden_off.eligible(&file));

        let hidden_on = filter_for(&dir, SearchSpec::builder("x").show_hidden(true).build().unwrap());
        assert!(hidden_on.eligible(&file));
    }

    #[test]
    fn test_include_glob_by_name_or_path() {
        let dir = TempDir::new().unwrap();
        let rs = create_test_file(dir.path(), "src/lib.rs", "");
        let md = create_test_file(dir.path(), "README.md", "");

        let filter = filter_for(&dir, SearchSpec::builder("x").include("*.rs").build().unwrap());
        assert!(filter.eligible(&rs));
        assert!(!filter.eligible(&md));

        let by_path = filter_for(&dir, SearchSpec::builder("x").include("src/**").build().unwrap());
        assert!(by_path.eligible(&rs));
        assert!(!by_path.eligible(&md));
    }

    #[test]
    fn test_default_excludes_cover_ancestors() {
        let dir = TempDir::new().unwrap();
        let dep = create_test_file(dir.path(), "node_modules/pkg/index.js", "");
        let log = create_test_file(dir.path(), "logs/app.log", "");
        let filter = filter_for(&dir, SearchSpec::builder("x").build().unwrap());

        assert!(!filter.eligible(&dep));
        assert!(!filter.eligible(&log));
        assert!(!filter.descend(&dir.path().canonicalize().unwrap().join("node_modules")));
    }

    #[test]
    fn test_file_type_groups() {
        let dir = TempDir::new().unwrap();
        let py = create_test_file(dir.path(), "a.py", "");
        let css = create_test_file(dir.path(), "b.css", "");
        let txt = create_test_file(dir.path(), "c.txt", "");

        let filter = filter_for(&dir, SearchSpec::builder("x").file_type("code").build().unwrap());
        assert!(filter.eligible(&py));
        assert!(!filter.eligible(&css));

        // unknown group names are bare extensions
        let filter = filter_for(&dir, SearchSpec::builder("x").file_type("txt").build().unwrap());
        assert!(filter.eligible(&txt));
        assert!(!filter.eligible(&py));

        let filter = filter_for(&dir, SearchSpec::builder("x").file_type("all").build().unwrap());
        assert!(filter.eligible(&css));
    }

    #[test]
    fn test_missing_file_fails_closed() {
        let dir = TempDir::new().unwrap();
        let filter = filter_for(&dir, SearchSpec::builder("x").build().unwrap());
        assert!(!filter.eligible(&filter.root().join("ghost.txt")));
    }

    #[test]
    fn test_path_outside_root_rejected() {
        let outer = TempDir::new().unwrap();
        let inside = outer.path().join("inside");
        fs::create_dir_all(&inside).unwrap();
        let outside = create_test_file(outer.path(), "outside.txt", "");

        let spec = SearchSpec::builder("x").build().unwrap();
        let filter = PathFilter::new(&inside, &spec, &FileTypeGroups::default()).unwrap();
        assert!(!filter.eligible(&outside));
        assert!(!filter.eligible(&filter.root().join("..").join("outside.txt")));
    }

    #[test]
    #[cfg(unix)]
    fn test_symlink_escaping_root_rejected() {
        let outer = TempDir::new().unwrap();
        let root = outer.path().join("root");
        fs::create_dir_all(&root).unwrap();
        let target = create_test_file(outer.path(), "secret.txt", "s");
        std::os::unix::fs::symlink(&target, root.join("link.txt")).unwrap();

        let spec = SearchSpec::builder("x").build().unwrap();
        let filter = PathFilter::new(&root, &spec, &FileTypeGroups::default()).unwrap();
        assert!(!filter.eligible(&filter.root().join("link.txt")));
    }
}
