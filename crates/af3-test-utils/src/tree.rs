//! [`ConfigTree`] builder for config directory test scenarios.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Files to lay out in a temporary config directory.
///
/// # Example
///
/// ```rust
/// use af3_test_utils::ConfigTree;
///
/// let dir = ConfigTree::new()
///     .file("train.yaml", "defaults:\n  - data: pdb\n")
///     .file("data/pdb.yaml", "crop_size: 384\n")
///     .build();
/// dir.assert_file_exists("data/pdb.yaml");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigTree {
    files: BTreeMap<String, String>,
}

impl ConfigTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from every file below `root`, keyed by relative path.
    ///
    /// # Panics
    /// Panics if `root` cannot be read.
    pub fn from_dir(root: &Path) -> Self {
        let mut tree = Self::new();
        collect(root, root, &mut tree.files);
        tree
    }

    /// Add or replace the file at `path` (relative, `/`-separated).
    pub fn file(mut self, path: &str, content: &str) -> Self {
        self.files.insert(path.to_string(), content.to_string());
        self
    }

    /// Drop the file at `path`.
    pub fn without(mut self, path: &str) -> Self {
        self.files.remove(path);
        self
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Write every file into a fresh temporary directory.
    pub fn build(self) -> ConfigDir {
        let dir = ConfigDir {
            temp_dir: TempDir::new().unwrap(),
        };
        for (path, content) in &self.files {
            dir.write(path, content);
        }
        dir
    }
}

fn collect(root: &Path, dir: &Path, files: &mut BTreeMap<String, String>) {
    let entries = fs::read_dir(dir)
        .unwrap_or_else(|e| panic!("Could not read directory {}: {e}", dir.display()));
    for entry in entries {
        let path = entry.unwrap().path();
        if path.is_dir() {
            collect(root, &path, files);
            continue;
        }
        let relative: Vec<String> = path
            .strip_prefix(root)
            .unwrap()
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let content = fs::read_to_string(&path)
            .unwrap_or_else(|_| panic!("Could not read file: {}", path.display()));
        files.insert(relative.join("/"), content);
    }
}

/// A temporary config directory; removed on drop.
pub struct ConfigDir {
    temp_dir: TempDir,
}

impl ConfigDir {
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn join(&self, path: &str) -> PathBuf {
        self.path().join(path)
    }

    /// Write `content` at `path`, creating parent directories.
    pub fn write(&self, path: &str, content: &str) {
        let full_path = self.join(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&full_path, content).unwrap();
    }

    /// Assert that `path` (relative to the directory root) exists.
    ///
    /// # Panics
    /// Panics with a descriptive message if the path does not exist.
    pub fn assert_file_exists(&self, path: &str) {
        let full_path = self.join(path);
        assert!(
            full_path.exists(),
            "Expected file to exist: {}",
            full_path.display()
        );
    }

    /// Assert that the file at `path` contains `content`.
    ///
    /// # Panics
    /// Panics if the file cannot be read or does not contain `content`.
    pub fn assert_file_contains(&self, path: &str, content: &str) {
        let full_path = self.join(path);
        let file_content = fs::read_to_string(&full_path)
            .unwrap_or_else(|_| panic!("Could not read file: {}", full_path.display()));
        assert!(
            file_content.contains(content),
            "File {} does not contain expected content.\nExpected: {}\nActual: {}",
            full_path.display(),
            content,
            file_content
        );
    }
}
