//! Repository acquisition.
//!
//! Maps a repository locator to a deterministic local directory under the
//! data dir and clones into it once. Acquiring an already-present
//! repository is a no-op that never touches the network.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::{debug, info};

/// Errors raised while acquiring a repository. All of them are fatal for
/// the build that asked for the repository.
#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("cannot derive a local name from locator '{0}'")]
    InvalidLocator(String),

    #[error("failed to execute git (is it installed?): {0}")]
    GitUnavailable(#[source] std::io::Error),

    #[error("git clone of {locator} failed: {stderr}")]
    CloneFailed { locator: String, stderr: String },

    #[error("filesystem error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AcquisitionError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Copies a remote repository into a local directory.
pub trait Fetcher: Send + Sync {
    /// Fetch `locator` into `dest`. `dest` does not exist when called.
    fn fetch(&self, locator: &str, dest: &Path) -> Result<(), AcquisitionError>;
}

/// Fetcher backed by the `git` command-line client.
#[derive(Debug, Clone, Default)]
pub struct GitCli {
    pub shallow: bool,
}

impl Fetcher for GitCli {
    fn fetch(&self, locator: &str, dest: &Path) -> Result<(), AcquisitionError> {
        let mut cmd = Command::new("git");
        cmd.arg("clone");
        if self.shallow {
            cmd.args(["--depth", "1"]);
        }
        cmd.arg("--").arg(locator).arg(dest);

        let output = cmd.output().map_err(AcquisitionError::GitUnavailable)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AcquisitionError::CloneFailed {
                locator: locator.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(())
    }
}

/// A repository available on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalRepo {
    pub locator: String,
    /// Directory name under the data dir; part of the index key.
    pub name: String,
    pub root: PathBuf,
}

/// Acquires repositories into `data_dir`.
pub struct RepoAcquirer<F: Fetcher> {
    data_dir: PathBuf,
    fetcher: F,
}

impl<F: Fetcher> RepoAcquirer<F> {
    pub fn new(data_dir: impl Into<PathBuf>, fetcher: F) -> Self {
        Self {
            data_dir: data_dir.into(),
            fetcher,
        }
    }

    /// Deterministic local root for `locator`, without fetching anything.
    pub fn local_root(&self, locator: &str) -> Result<(String, PathBuf), AcquisitionError> {
        let name = local_name(locator)?;
        let root = self.data_dir.join(&name);
        Ok((name, root))
    }

    /// Return the local copy of `locator`, cloning it first if needed.
    ///
    /// The clone is written to `{root}.partial` and renamed into place only
    /// after the fetcher succeeds.
    pub fn acquire(&self, locator: &str) -> Result<LocalRepo, AcquisitionError> {
        let (name, root) = self.local_root(locator)?;

        if has_content(&root) {
            debug!("Repository already present at {}", root.display());
            return Ok(LocalRepo {
                locator: locator.to_string(),
                name,
                root,
            });
        }

        fs::create_dir_all(&self.data_dir).map_err(|e| AcquisitionError::io(&self.data_dir, e))?;

        let partial = self.data_dir.join(format!("{name}.partial"));
        if partial.exists() {
            fs::remove_dir_all(&partial).map_err(|e| AcquisitionError::io(&partial, e))?;
        }

        info!("Cloning {locator} into {}", root.display());
        if let Err(e) = self.fetcher.fetch(locator, &partial) {
            // Best-effort cleanup; the fetch error is what matters.
            let _ = fs::remove_dir_all(&partial);
            return Err(e);
        }

        if root.exists() {
            // An empty directory left behind by someone else.
            fs::remove_dir_all(&root).map_err(|e| AcquisitionError::io(&root, e))?;
        }
        fs::rename(&partial, &root).map_err(|e| AcquisitionError::io(&root, e))?;

        Ok(LocalRepo {
            locator: locator.to_string(),
            name,
            root,
        })
    }
}

/// Derive the local directory name from a locator:
/// `https://github.com/org/my-repo.git` → `my-repo`.
pub fn local_name(locator: &str) -> Result<String, AcquisitionError> {
    let trimmed = locator.trim().trim_end_matches('/');
    let last = trimmed.rsplit(['/', ':', '\\']).next().unwrap_or(trimmed);
    let last = last.strip_suffix(".git").unwrap_or(last);

    let name: String = last
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if name.is_empty() || name.chars().all(|c| c == '.') {
        return Err(AcquisitionError::InvalidLocator(locator.to_string()));
    }

    Ok(name)
}

fn has_content(root: &Path) -> bool {
    fs::read_dir(root)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

/// Read `README.md` from a repository root, verbatim.
///
/// Display-only pass-through: any failure yields `None`.
#[must_use]
pub fn read_repo_readme(local_root: &Path) -> Option<String> {
    fs::read_to_string(local_root.join("README.md")).ok()
}
