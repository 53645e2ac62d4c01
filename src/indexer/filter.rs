//! Eligibility rules for repository files.
//!
//! Precision over recall: build output, VCS metadata, manifests and lock
//! files are kept out of the index entirely.

use std::collections::HashSet;
use std::path::{Component, Path};

use super::languages::Language;
use crate::config::FilterConfig;

#[derive(Debug, Clone)]
pub struct FileFilter {
    exclude_dirs: HashSet<String>,
    exclude_files: HashSet<String>,
}

impl FileFilter {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            exclude_dirs: config.exclude_dirs.iter().cloned().collect(),
            exclude_files: config.exclude_files.iter().cloned().collect(),
        }
    }

    /// Whether a directory with this name is pruned from the walk.
    pub fn is_excluded_dir(&self, dir_name: &str) -> bool {
        self.exclude_dirs.contains(dir_name)
    }

    /// `path` is relative to the repository root and includes `filename`.
    pub fn is_eligible(&self, path: &Path, filename: &str) -> bool {
        self.check(path, filename).is_some()
    }

    /// Language of an eligible file, `None` for rejected files.
    pub fn classify(&self, relative_path: &Path) -> Option<Language> {
        let filename = relative_path.file_name()?.to_str()?;
        self.check(relative_path, filename)
    }

    fn check(&self, path: &Path, filename: &str) -> Option<Language> {
        // 1. directory segments
        if let Some(parent) = path.parent() {
            for component in parent.components() {
                if let Component::Normal(segment) = component {
                    if segment.to_str().is_some_and(|s| self.is_excluded_dir(s)) {
                        return None;
                    }
                }
            }
        }

        // 2. bare filename
        if self.exclude_files.contains(filename) {
            return None;
        }

        // 3. extension allow-list
        let ext = Path::new(filename).extension()?.to_str()?;
        Language::from_extension(ext)
    }
}

impl Default for FileFilter {
    fn default() -> Self {
        Self::new(&FilterConfig::default())
    }
}
