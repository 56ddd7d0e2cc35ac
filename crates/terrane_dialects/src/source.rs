//! Source tree discovery.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use terrane_model::{Dialect, ParseError};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::detect::detect;
use crate::error::{DialectError, DialectResult};

/// Directories never descended into.
pub const IGNORE_DIRS: &[&str] = &[".git", "node_modules", "__pycache__", ".terraform", "target"];

/// Files above this size are reported instead of read.
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

const CANDIDATE_EXTENSIONS: &[&str] = &["tf", "yaml", "yml", "json", "template"];

/// Discovery limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryOptions {
    pub max_file_size: u64,
    pub ignore_dirs: Vec<String>,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            max_file_size: MAX_FILE_SIZE,
            ignore_dirs: IGNORE_DIRS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// One readable source file.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Path relative to the tree root, `/`-separated
    pub path: String,
    pub text: String,
    /// Dialect inferred from the path and content
    pub detected: Option<Dialect>,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        let path = path.into();
        let text = text.into();
        let detected = detect(&path, &text);
        Self { path, text, detected }
    }
}

/// Files discovered under a root, sorted by path.
#[derive(Debug, Clone, Default)]
pub struct SourceTree {
    pub root: PathBuf,
    pub files: Vec<SourceFile>,
    /// Oversized or unreadable files
    pub errors: Vec<ParseError>,
}

impl SourceTree {
    /// Walk `root` (a directory or a single file).
    pub fn discover(root: &Path, options: &DiscoveryOptions) -> DialectResult<Self> {
        if !root.exists() {
            return Err(DialectError::NotFound(root.to_path_buf()));
        }
        let metadata = std::fs::metadata(root).map_err(|source| DialectError::Unreadable {
            path: root.to_path_buf(),
            source,
        })?;

        info!("Discovering sources under {:?}", root);
        let mut tree = SourceTree {
            root: root.to_path_buf(),
            ..Default::default()
        };

        if metadata.is_file() {
            let name = root
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            tree.read_file(root, name, options);
        } else {
            let ignore = &options.ignore_dirs;
            let walker = WalkDir::new(root)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| {
                    e.depth() == 0
                        || !(e.file_type().is_dir()
                            && ignore.iter().any(|d| e.file_name().to_string_lossy() == d.as_str()))
                });

            for entry in walker {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(err) => {
                        warn!("Skipping unreadable entry: {}", err);
                        let path = err.path().map(|p| relative(root, p)).unwrap_or_default();
                        tree.errors.push(ParseError::new(path, None, err.to_string()));
                        continue;
                    }
                };
                if !entry.file_type().is_file() || !is_candidate(entry.path()) {
                    continue;
                }
                let rel = relative(root, entry.path());
                tree.read_file(entry.path(), rel, options);
            }
        }

        tree.files.sort_by(|a, b| a.path.cmp(&b.path));
        debug!("Discovered {} candidate files", tree.files.len());
        Ok(tree)
    }

    /// Build a tree from in-memory files.
    pub fn from_files<I, P, T>(files: I) -> Self
    where
        I: IntoIterator<Item = (P, T)>,
        P: Into<String>,
        T: Into<String>,
    {
        let mut files: Vec<SourceFile> = files
            .into_iter()
            .map(|(path, text)| SourceFile::new(path, text))
            .collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Self {
            root: PathBuf::new(),
            files,
            errors: Vec::new(),
        }
    }

    fn read_file(&mut self, path: &Path, rel: String, options: &DiscoveryOptions) {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > options.max_file_size => {
                warn!("Skipping {} ({} bytes exceeds limit)", rel, meta.len());
                self.errors.push(ParseError::new(
                    rel,
                    None,
                    format!("file exceeds size limit of {} bytes", options.max_file_size),
                ));
                return;
            }
            Ok(_) => {}
            Err(err) => {
                self.errors.push(ParseError::new(rel, None, err.to_string()));
                return;
            }
        }

        match std::fs::read_to_string(path) {
            Ok(text) => {
                let file = SourceFile::new(rel, text);
                if file.detected.is_none() {
                    debug!("No dialect detected for {}", file.path);
                }
                self.files.push(file);
            }
            Err(err) => self.errors.push(ParseError::new(rel, None, err.to_string())),
        }
    }

    /// Dialects detected across all files.
    pub fn dialects(&self) -> BTreeSet<Dialect> {
        self.files.iter().filter_map(|f| f.detected).collect()
    }

    /// Choose the tree's dialect.
    ///
    /// With a hint, files detected as another dialect are dropped. Without
    /// one, the tree must infer to exactly one dialect.
    pub fn select_dialect(&mut self, hint: Option<Dialect>) -> DialectResult<Dialect> {
        let dialect = match hint {
            Some(dialect) => dialect,
            None => {
                let found = self.dialects();
                match found.len() {
                    0 => return Err(DialectError::NoSources(self.root.clone())),
                    1 => found.into_iter().next().ok_or_else(|| DialectError::NoSources(self.root.clone()))?,
                    _ => return Err(DialectError::Ambiguous(found.into_iter().collect())),
                }
            }
        };

        let before = self.files.len();
        self.files.retain(|f| f.detected == Some(dialect));
        if self.files.len() != before {
            debug!("Skipped {} files not in dialect {}", before - self.files.len(), dialect);
        }
        info!("Using dialect {} for {} files", dialect, self.files.len());
        Ok(dialect)
    }
}

fn is_candidate(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| CANDIDATE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn relative(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_discover_skips_ignored_dirs() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".terraform/modules")).unwrap();
        fs::write(dir.path().join(".terraform/modules/x.tf"), "resource \"a_b\" \"c\" {}").unwrap();
        fs::write(dir.path().join("main.tf"), "resource \"aws_vpc\" \"main\" {}").unwrap();
        fs::write(dir.path().join("README.md"), "# docs").unwrap();

        let tree = SourceTree::discover(dir.path(), &DiscoveryOptions::default()).unwrap();
        let paths: Vec<_> = tree.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["main.tf"]);
    }

    #[test]
    fn test_oversized_file_is_reported() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("big.tf"), "x".repeat(64)).unwrap();
        let options = DiscoveryOptions {
            max_file_size: 16,
            ..Default::default()
        };

        let tree = SourceTree::discover(dir.path(), &options).unwrap();
        assert!(tree.files.is_empty());
        assert_eq!(tree.errors.len(), 1);
        assert!(tree.errors[0].message.contains("size limit"));
    }

    #[test]
    fn test_missing_root() {
        let err = SourceTree::discover(Path::new("/definitely/not/here"), &DiscoveryOptions::default()).unwrap_err();
        assert!(matches!(err, DialectError::NotFound(_)));
    }

    #[test]
    fn test_ambiguous_without_hint() {
        let mut tree = SourceTree::from_files(vec![
            ("main.tf", "resource \"aws_vpc\" \"main\" {}"),
            ("app.yaml", "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cfg\n"),
        ]);
        assert!(matches!(tree.clone().select_dialect(None), Err(DialectError::Ambiguous(_))));
        assert_eq!(tree.select_dialect(Some(Dialect::Kubernetes)).unwrap(), Dialect::Kubernetes);
        assert_eq!(tree.files.len(), 1);
    }
}
