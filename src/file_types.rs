//! Named file-type groups
//!
//! A group is a named set of extensions ("code", "web", ...). The built-in table
//! can be overridden group by group from the `[file_types]` config section.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Group name that matches every file regardless of extension
pub const ALL_GROUP: &str = "all";

const DEFAULT_GROUPS: &[(&str, &[&str])] = &[
    (
        "code",
        &[
            "py", "js", "ts", "jsx", "tsx", "java", "c", "cpp", "h", "cs", "php", "rb", "go",
            "rs", "swift",
        ],
    ),
    ("web", &["html", "css", "scss", "sass", "less", "vue", "svelte"]),
    ("config", &["json", "yaml", "yml", "toml", "ini", "cfg", "conf"]),
    ("docs", &["md", "txt", "rst", "doc", "docx", "pdf"]),
    ("data", &["csv", "xlsx", "xml", "sql"]),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTypeGroups {
    groups: BTreeMap<String, BTreeSet<String>>,
}

impl Default for FileTypeGroups {
    fn default() -> Self {
        let groups = DEFAULT_GROUPS
            .iter()
            .map(|(name, exts)| {
                let set = exts.iter().map(|e| e.to_string()).collect();
                (name.to_string(), set)
            })
            .collect();
        Self { groups }
    }
}

impl FileTypeGroups {
    /// Defaults with the given groups replacing (or adding to) the built-ins
    pub fn with_overrides(overrides: &BTreeMap<String, Vec<String>>) -> Self {
        let mut table = Self::default();
        for (name, exts) in overrides {
            let set = exts.iter().map(|e| normalize_extension(e)).collect();
            table.groups.insert(name.to_lowercase(), set);
        }
        table
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn extensions(&self, group: &str) -> Option<&BTreeSet<String>> {
        self.groups.get(&group.to_lowercase())
    }

    /// Resolve requested group names into one extension set.
    ///
    /// Unknown names are taken as bare extensions, so `["code", "md"]` selects
    /// every code file plus markdown. Returns `None` when "all" is requested.
    pub fn resolve<'a, I>(&self, requested: I) -> Option<BTreeSet<String>>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut resolved = BTreeSet::new();
        for name in requested {
            let key = name.trim().to_lowercase();
            if key == ALL_GROUP {
                return None;
            }
            match self.groups.get(&key) {
                Some(exts) => resolved.extend(exts.iter().cloned()),
                None => {
                    resolved.insert(normalize_extension(&key));
                }
            }
        }
        Some(resolved)
    }
}

/// Lowercase extension of `path` without the leading dot
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
}

fn normalize_extension(ext: &str) -> String {
    ext.trim()
        .trim_start_matches("*.")
        .trim_start_matches('.')
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_groups_present() {
        let table = FileTypeGroups::default();
        let names: Vec<&str> = table.names().collect();
        assert_eq!(names, vec!["code", "config", "data", "docs", "web"]);
        assert!(table.extensions("code").unwrap().contains("rs"));
        assert!(table.extensions("CODE").unwrap().contains("py"));
    }

    #[test]
    fn test_resolve_mixes_groups_and_extensions() {
        let table = FileTypeGroups::default();
        let requested = vec!["web".to_string(), ".MD".to_string()];
        let exts = table.resolve(&requested).unwrap();
        assert!(exts.contains("html"));
        assert!(exts.contains("md"));
        assert!(!exts.contains("rs"));
    }

    #[test]
    fn test_resolve_all_means_unrestricted() {
        let table = FileTypeGroups::default();
        let requested = vec!["code".to_string(), "all".to_string()];
        assert!(table.resolve(&requested).is_none());
    }

    #[test]
    fn test_overrides_replace_group() {
        let mut overrides = BTreeMap::new();
        overrides.insert("code".to_string(), vec!["*.zig".to_string()]);
        overrides.insert("notes".to_string(), vec![".org".to_string()]);
        let table = FileTypeGroups::with_overrides(&overrides);

        let code = table.extensions("code").unwrap();
        assert_eq!(code.len(), 1);
        assert!(code.contains("zig"));
        assert!(table.extensions("notes").unwrap().contains("org"));
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of(Path::new("a/b/Main.RS")), Some("rs".to_string()));
        assert_eq!(extension_of(Path::new("Makefile")), None);
    }
}
